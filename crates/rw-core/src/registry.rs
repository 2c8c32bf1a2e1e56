//! Which chats have a running audit, and who receives its reports.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};

use crate::domain::{ChatId, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub admin_id: UserId,
    pub chat_id: ChatId,
    pub since: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created,
    AlreadyActive,
}

/// At most one subscription per chat.
///
/// `subscribe` does its check and insert under a single lock, so any number of
/// concurrent callers naming the same chat get exactly one `Created`.
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_chat: Mutex<HashMap<ChatId, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChatId, Subscription>> {
        // The map holds plain values; a panic elsewhere cannot leave it half-written.
        self.by_chat.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, admin_id: UserId, chat_id: ChatId) -> SubscribeOutcome {
        let mut map = self.lock();
        if map.contains_key(&chat_id) {
            return SubscribeOutcome::AlreadyActive;
        }
        map.insert(
            chat_id,
            Subscription {
                admin_id,
                chat_id,
                since: Utc::now(),
            },
        );
        SubscribeOutcome::Created
    }

    /// Remove the chat's subscription if `admin_id` is its recipient.
    pub fn unsubscribe(&self, admin_id: UserId, chat_id: ChatId) -> bool {
        let mut map = self.lock();
        match map.get(&chat_id) {
            Some(sub) if sub.admin_id == admin_id => {
                map.remove(&chat_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self, chat_id: ChatId) -> bool {
        self.lock().contains_key(&chat_id)
    }

    pub fn is_recipient(&self, admin_id: UserId, chat_id: ChatId) -> bool {
        self.lock()
            .get(&chat_id)
            .map(|s| s.admin_id == admin_id)
            .unwrap_or(false)
    }

    pub fn get(&self, chat_id: ChatId) -> Option<Subscription> {
        self.lock().get(&chat_id).cloned()
    }

    /// All subscriptions, ordered by chat id.
    pub fn list(&self) -> Vec<Subscription> {
        let mut out: Vec<_> = self.lock().values().cloned().collect();
        out.sort_by_key(|s| s.chat_id);
        out
    }
}
