use chrono::{DateTime, Days, Months, Utc};

use super::chat::{ChatHistoryPage, ChatListItem};
use super::ids::ChatId;

pub const HISTORY_PATH: &str = "/api/ai/history";
pub const HISTORY_PAGE_SIZE: usize = 20;

/// Cache key and request coordinates for one page of chat history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryPageKey {
    pub limit: usize,
    pub ending_before: Option<ChatId>,
}

impl HistoryPageKey {
    pub fn first(limit: usize) -> Self {
        Self {
            limit,
            ending_before: None,
        }
    }

    /// Path with query string; doubles as the cache key.
    pub fn to_path(&self) -> String {
        match &self.ending_before {
            Some(cursor) => format!(
                "{HISTORY_PATH}?ending_before={cursor}&limit={}",
                self.limit
            ),
            None => format!("{HISTORY_PATH}?limit={}", self.limit),
        }
    }
}

/// Returns true for any cache key that names a history listing.
pub fn is_history_key(key: &str) -> bool {
    key.starts_with(HISTORY_PATH)
}

/// Key of the page after `previous_page`, or `None` once the listing is exhausted.
pub fn history_page_key(
    page_index: usize,
    previous_page: Option<&ChatHistoryPage>,
    limit: usize,
) -> Option<HistoryPageKey> {
    if previous_page.is_some_and(|page| !page.has_more) {
        return None;
    }

    if page_index == 0 {
        return Some(HistoryPageKey::first(limit));
    }

    let last_chat = previous_page?.chats.last()?;
    Some(HistoryPageKey {
        limit,
        ending_before: Some(last_chat.id.clone()),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedChats {
    pub today: Vec<ChatListItem>,
    pub yesterday: Vec<ChatListItem>,
    pub last_week: Vec<ChatListItem>,
    pub last_month: Vec<ChatListItem>,
    pub older: Vec<ChatListItem>,
}

impl GroupedChats {
    /// Non-empty groups with their headings, newest first.
    pub fn sections(&self) -> Vec<(&'static str, &[ChatListItem])> {
        [
            ("Today", self.today.as_slice()),
            ("Yesterday", self.yesterday.as_slice()),
            ("Last 7 days", self.last_week.as_slice()),
            ("Last 30 days", self.last_month.as_slice()),
            ("Older", self.older.as_slice()),
        ]
        .into_iter()
        .filter(|(_, chats)| !chats.is_empty())
        .collect()
    }
}

/// Buckets chats by creation date relative to `now`, keeping input order inside each bucket.
pub fn group_chats_by_date(chats: &[ChatListItem], now: DateTime<Utc>) -> GroupedChats {
    let today = now.date_naive();
    let yesterday = today.checked_sub_days(Days::new(1));
    let one_week_ago = now.checked_sub_days(Days::new(7)).unwrap_or(now);
    let one_month_ago = now.checked_sub_months(Months::new(1)).unwrap_or(now);

    let mut groups = GroupedChats::default();
    for chat in chats {
        let created = chat.created_at;
        let bucket = if created.date_naive() == today {
            &mut groups.today
        } else if Some(created.date_naive()) == yesterday {
            &mut groups.yesterday
        } else if created > one_week_ago {
            &mut groups.last_week
        } else if created > one_month_ago {
            &mut groups.last_month
        } else {
            &mut groups.older
        };
        bucket.push(chat.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn chat(id: &str, created_at: DateTime<Utc>) -> ChatListItem {
        ChatListItem {
            id: ChatId::parse(id).expect("id"),
            title: format!("chat {id}"),
            created_at,
        }
    }

    #[test]
    fn first_page_has_no_cursor() {
        let key = history_page_key(0, None, HISTORY_PAGE_SIZE).expect("first key");
        assert_eq!(key.to_path(), "/api/ai/history?limit=20");
        assert!(is_history_key(&key.to_path()));
        assert!(!is_history_key("/api/ai/chat/abc"));
    }

    #[test]
    fn next_page_paginates_backward_from_last_chat() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let previous = ChatHistoryPage {
            chats: vec![chat("c2", now), chat("c1", now)],
            has_more: true,
        };

        let key = history_page_key(1, Some(&previous), 20).expect("second key");
        assert_eq!(key.to_path(), "/api/ai/history?ending_before=c1&limit=20");
    }

    #[test]
    fn pagination_stops_at_end_or_on_empty_page() {
        let exhausted = ChatHistoryPage {
            chats: Vec::new(),
            has_more: false,
        };
        assert_eq!(history_page_key(1, Some(&exhausted), 20), None);
        assert_eq!(history_page_key(0, Some(&exhausted), 20), None);

        let empty_but_more = ChatHistoryPage {
            chats: Vec::new(),
            has_more: true,
        };
        assert_eq!(history_page_key(2, Some(&empty_but_more), 20), None);
        assert_eq!(history_page_key(2, None, 20), None);
    }

    #[test]
    fn chats_are_grouped_by_relative_age() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let chats = vec![
            chat("today", Utc.with_ymd_and_hms(2026, 10, 18, 1, 0, 0).unwrap()),
            chat("yesterday", Utc.with_ymd_and_hms(2026, 10, 17, 23, 0, 0).unwrap()),
            chat("week", Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap()),
            chat("month", Utc.with_ymd_and_hms(2026, 9, 25, 9, 0, 0).unwrap()),
            chat("older", Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()),
        ];

        let grouped = group_chats_by_date(&chats, now);
        assert_eq!(grouped.today[0].id.as_str(), "today");
        assert_eq!(grouped.yesterday[0].id.as_str(), "yesterday");
        assert_eq!(grouped.last_week[0].id.as_str(), "week");
        assert_eq!(grouped.last_month[0].id.as_str(), "month");
        assert_eq!(grouped.older[0].id.as_str(), "older");
        assert_eq!(grouped.sections().len(), 5);
    }
}
