use std::sync::Arc;

use campus_protocol::{
    CHAT_HOME_PATH, ChatHistoryPage, ChatId, ChatListItem, GroupedChats, HistoryPageKey,
    chat_path, group_chats_by_date, history_page_key,
};
use campus_transport::ChatApi;
use chrono::{DateTime, Utc};
use snafu::ResultExt;

use super::cache::HistoryCache;
use super::navigation::{Navigator, Notifier};
use super::view::SessionContext;
use crate::error::{DeleteChatSnafu, LoadHistorySnafu, SessionResult};

pub const DELETE_SUCCESS_MESSAGE: &str = "Chat deleted successfully";
pub const DELETE_FAILURE_MESSAGE: &str = "Failed to delete chat";

/// Paged list of past conversations, newest first.
pub struct ChatHistoryFeed {
    api: Arc<dyn ChatApi>,
    cache: Arc<HistoryCache>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    page_size: usize,
    pages: Vec<ChatHistoryPage>,
}

impl ChatHistoryFeed {
    pub fn new(context: &SessionContext, page_size: usize) -> Self {
        Self {
            api: context.api.clone(),
            cache: context.history.clone(),
            navigator: context.navigator.clone(),
            notifier: context.notifier.clone(),
            page_size,
            pages: Vec::new(),
        }
    }

    /// Fetches the next page; returns false once the listing is exhausted.
    pub async fn load_more(&mut self) -> SessionResult<bool> {
        let Some(key) = history_page_key(self.pages.len(), self.pages.last(), self.page_size)
        else {
            return Ok(false);
        };

        let page = self.fetch_page(&key).await?;
        self.pages.push(page);
        Ok(true)
    }

    /// Refetches the loaded pages whose cache entries went stale.
    ///
    /// Cursors are recomputed from the refreshed pages, so a new chat at the
    /// top shifts every later page. Returns true when anything was refetched.
    pub async fn revalidate(&mut self) -> SessionResult<bool> {
        let loaded = self.pages.len();
        let mut refreshed: Vec<ChatHistoryPage> = Vec::with_capacity(loaded);
        let mut refetched = false;

        for index in 0..loaded {
            let Some(key) = history_page_key(index, refreshed.last(), self.page_size) else {
                break;
            };
            refetched |= self.cache.is_stale(&key.to_path()).await;
            refreshed.push(self.fetch_page(&key).await?);
        }

        self.pages = refreshed;
        Ok(refetched)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn chats(&self) -> Vec<ChatListItem> {
        self.pages
            .iter()
            .flat_map(|page| page.chats.iter().cloned())
            .collect()
    }

    pub fn grouped(&self, now: DateTime<Utc>) -> GroupedChats {
        group_chats_by_date(&self.chats(), now)
    }

    pub fn has_reached_end(&self) -> bool {
        self.pages.iter().any(|page| !page.has_more)
    }

    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|page| page.chats.is_empty())
    }

    /// Deletes a chat and drops it from every loaded page.
    ///
    /// When `current_path` shows the deleted chat the shell is sent home.
    pub async fn delete_chat(&mut self, chat_id: &ChatId, current_path: &str) -> SessionResult<()> {
        let is_current_chat = current_path == chat_path(chat_id);

        if let Err(source) = self.api.delete_chat(chat_id).await {
            tracing::warn!(chat_id = %chat_id, error = %source, "failed to delete chat");
            self.notifier.error(DELETE_FAILURE_MESSAGE);
            return Err(source).context(DeleteChatSnafu {
                stage: "delete-chat",
                chat_id: chat_id.to_string(),
            });
        }

        for page in &mut self.pages {
            page.chats.retain(|chat| &chat.id != chat_id);
        }
        self.cache
            .update_pages(|page| page.chats.retain(|chat| &chat.id != chat_id))
            .await;
        tracing::info!(chat_id = %chat_id, "deleted chat");
        self.notifier.success(DELETE_SUCCESS_MESSAGE);

        if is_current_chat {
            self.navigator.replace(CHAT_HOME_PATH);
            self.navigator.refresh();
        }
        Ok(())
    }

    async fn fetch_page(&self, key: &HistoryPageKey) -> SessionResult<ChatHistoryPage> {
        let cache_key = key.to_path();
        if let Some(page) = self.cache.get_fresh(&cache_key).await {
            return Ok(page);
        }

        let page = self
            .api
            .fetch_history(key)
            .await
            .context(LoadHistorySnafu {
                stage: "fetch-history-page",
            })?;
        self.cache.insert(cache_key, page.clone()).await;
        Ok(page)
    }
}
