use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use campus_protocol::ChatId;
use campus_transport::ChatApi;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use super::cache::HistoryCache;

pub const DEFAULT_AUTOSAVE_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Payload equals the last saved one; nothing was scheduled.
    Unchanged,
    Scheduled,
}

/// Debounced writer of conversation snapshots.
///
/// Holds at most one pending timer. When the timer fires it waits for the
/// previous save to finish, claims the payload as last saved and hands it to a
/// detached save task, so rescheduling or dropping the writer never aborts a
/// request already on the wire.
pub struct AutosaveWriter {
    api: Arc<dyn ChatApi>,
    history: Arc<HistoryCache>,
    delay: Duration,
    last_saved: Arc<ArcSwap<String>>,
    save_gate: Arc<Mutex<()>>,
    pending: Option<JoinHandle<()>>,
}

impl AutosaveWriter {
    pub fn new(api: Arc<dyn ChatApi>, history: Arc<HistoryCache>, delay: Duration) -> Self {
        Self {
            api,
            history,
            delay,
            last_saved: Arc::new(ArcSwap::from_pointee(String::new())),
            save_gate: Arc::new(Mutex::new(())),
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Snapshot most recently claimed by a save, or the loaded baseline.
    pub fn last_saved(&self) -> Arc<String> {
        self.last_saved.load_full()
    }

    /// Marks `payload` as already persisted, e.g. right after loading it.
    ///
    /// A timer armed for earlier content is dropped with it.
    pub fn record_baseline(&mut self, payload: String) {
        self.cancel_pending();
        self.last_saved.store(Arc::new(payload));
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Waits for the armed timer to fire and for the save it starts to finish.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.pending.take()
            && let Err(error) = handle.await
        {
            tracing::debug!(error = %error, "autosave timer did not complete");
        }
        let _turn = self.save_gate.lock().await;
    }

    /// Arms the timer for `payload` unless it equals the last saved snapshot.
    ///
    /// Any previously armed timer is dropped, including when content reverts
    /// to the saved snapshot.
    pub fn schedule(&mut self, chat_id: ChatId, payload: String) -> ScheduleOutcome {
        self.cancel_pending();
        if self.last_saved.load().as_str() == payload {
            return ScheduleOutcome::Unchanged;
        }

        let job = SaveJob {
            api: self.api.clone(),
            history: self.history.clone(),
            last_saved: self.last_saved.clone(),
            chat_id,
        };
        let save_gate = self.save_gate.clone();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let turn = save_gate.lock_owned().await;
            // No await between claiming and spawning, so an abort cannot split them.
            let claimed = Arc::new(payload);
            job.last_saved.store(claimed.clone());
            tokio::spawn(job.run(claimed, turn));
        }));
        ScheduleOutcome::Scheduled
    }
}

impl Drop for AutosaveWriter {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

struct SaveJob {
    api: Arc<dyn ChatApi>,
    history: Arc<HistoryCache>,
    last_saved: Arc<ArcSwap<String>>,
    chat_id: ChatId,
}

impl SaveJob {
    async fn run(self, claimed: Arc<String>, _turn: OwnedMutexGuard<()>) {
        match self
            .api
            .save_chat(&self.chat_id, claimed.as_str().to_owned())
            .await
        {
            Ok(()) => {
                tracing::debug!(chat_id = %self.chat_id, "autosaved chat");
                self.history.invalidate_history().await;
            }
            Err(error) => {
                tracing::warn!(
                    chat_id = %self.chat_id,
                    error = %error,
                    "autosave failed, the next change will retry"
                );
                // Only forget the snapshot if no newer save has claimed the marker since.
                let previous = self
                    .last_saved
                    .compare_and_swap(&claimed, Arc::new(String::new()));
                if !Arc::ptr_eq(&*previous, &claimed) {
                    tracing::debug!(chat_id = %self.chat_id, "newer snapshot already claimed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::test_support::FakeChatApi;
    use campus_protocol::{ChatHistoryPage, HISTORY_PAGE_SIZE, HistoryPageKey};

    fn chat_id() -> ChatId {
        ChatId::parse("abc123").expect("valid chat id")
    }

    fn writer(api: &Arc<FakeChatApi>, history: &Arc<HistoryCache>) -> AutosaveWriter {
        AutosaveWriter::new(api.clone(), history.clone(), DEFAULT_AUTOSAVE_DEBOUNCE)
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_one_save_of_the_latest_payload() {
        let api = Arc::new(FakeChatApi::default());
        let history = Arc::new(HistoryCache::new());
        let mut writer = writer(&api, &history);

        for payload in ["a", "ab", "abc"] {
            assert_eq!(
                writer.schedule(chat_id(), payload.to_string()),
                ScheduleOutcome::Scheduled
            );
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(api.saves().is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(api.saves(), vec![(chat_id(), "abc".to_string())]);
        assert_eq!(writer.last_saved().as_str(), "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_payload_is_not_rescheduled() {
        let api = Arc::new(FakeChatApi::default());
        let history = Arc::new(HistoryCache::new());
        let mut writer = writer(&api, &history);

        writer.record_baseline("loaded".to_string());
        assert_eq!(
            writer.schedule(chat_id(), "loaded".to_string()),
            ScheduleOutcome::Unchanged
        );
        assert!(!writer.has_pending());

        writer.schedule(chat_id(), "edited".to_string());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(
            writer.schedule(chat_id(), "edited".to_string()),
            ScheduleOutcome::Unchanged
        );
        assert_eq!(api.saves().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reverting_to_the_saved_snapshot_drops_the_armed_save() {
        let api = Arc::new(FakeChatApi::default());
        let history = Arc::new(HistoryCache::new());
        let mut writer = writer(&api, &history);

        writer.record_baseline("loaded".to_string());
        writer.schedule(chat_id(), "loaded typo".to_string());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            writer.schedule(chat_id(), "loaded".to_string()),
            ScheduleOutcome::Unchanged
        );
        assert!(!writer.has_pending());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(api.saves().is_empty());
        assert_eq!(writer.last_saved().as_str(), "loaded");
    }

    #[tokio::test(start_paused = true)]
    async fn recording_a_baseline_drops_the_armed_save() {
        let api = Arc::new(FakeChatApi::default());
        let history = Arc::new(HistoryCache::new());
        let mut writer = writer(&api, &history);

        writer.schedule(chat_id(), "edited".to_string());
        tokio::time::sleep(Duration::from_millis(100)).await;
        writer.record_baseline("reloaded".to_string());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(api.saves().is_empty());
        assert_eq!(writer.last_saved().as_str(), "reloaded");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_writer_cancels_the_pending_save() {
        let api = Arc::new(FakeChatApi::default());
        let history = Arc::new(HistoryCache::new());
        let mut writer = writer(&api, &history);

        writer.schedule(chat_id(), "draft".to_string());
        drop(writer);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(api.saves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_retried_on_the_next_schedule() {
        let api = Arc::new(FakeChatApi::default());
        api.fail_saves(true);
        let history = Arc::new(HistoryCache::new());
        let mut writer = writer(&api, &history);

        writer.schedule(chat_id(), "draft".to_string());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(api.save_attempts(), 1);
        assert_eq!(writer.last_saved().as_str(), "");

        api.fail_saves(false);
        assert_eq!(
            writer.schedule(chat_id(), "draft".to_string()),
            ScheduleOutcome::Scheduled
        );
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(api.saves(), vec![(chat_id(), "draft".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_waits_for_the_armed_save() {
        let api = Arc::new(FakeChatApi::default());
        let history = Arc::new(HistoryCache::new());
        let mut writer = writer(&api, &history);

        writer.schedule(chat_id(), "draft".to_string());
        writer.settle().await;
        assert_eq!(api.saves(), vec![(chat_id(), "draft".to_string())]);
        assert!(!writer.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_save_invalidates_history() {
        let api = Arc::new(FakeChatApi::default());
        let history = Arc::new(HistoryCache::new());
        let key = HistoryPageKey::first(HISTORY_PAGE_SIZE).to_path();
        history
            .insert(
                key.clone(),
                ChatHistoryPage {
                    chats: Vec::new(),
                    has_more: false,
                },
            )
            .await;
        let mut writer = writer(&api, &history);

        writer.schedule(chat_id(), "draft".to_string());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(history.is_stale(&key).await);
    }
}
