//! In-memory fakes for the gateway and directory ports (tests only).

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{BotIdentity, ChatId, ChatMember, Identity, MemberRole, MessageId, UserId},
    errors::{GatewayError, StoreError},
    messaging::port::MessagingGateway,
    ports::DirectoryStore,
};

pub const BOT_ID: UserId = UserId(777);

#[derive(Default)]
pub struct FakeGateway {
    roles: Mutex<HashMap<(ChatId, UserId), MemberRole>>,
    admins: Mutex<HashMap<ChatId, Vec<ChatMember>>>,
    failing_roles: Mutex<HashSet<(ChatId, UserId)>>,
    /// Sends whose text contains any of these substrings fail.
    failing_sends: Mutex<Vec<String>>,
    sent: Mutex<Vec<(UserId, String)>>,
    /// Delay before `chat_administrators` answers.
    admins_delay: Mutex<Option<Duration>>,
    role_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeGateway {
    pub fn set_role(&self, chat: ChatId, user: UserId, role: MemberRole) {
        self.roles.lock().unwrap().insert((chat, user), role);
    }

    pub fn set_bot_role(&self, chat: ChatId, role: MemberRole) {
        self.set_role(chat, BOT_ID, role);
    }

    pub fn fail_role_lookup(&self, chat: ChatId, user: UserId) {
        self.failing_roles.lock().unwrap().insert((chat, user));
    }

    pub fn set_admins(&self, chat: ChatId, admins: Vec<ChatMember>) {
        self.admins.lock().unwrap().insert(chat, admins);
    }

    pub fn slow_admin_lookup(&self, delay: Duration) {
        *self.admins_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_sends_containing(&self, needle: &str) {
        self.failing_sends.lock().unwrap().push(needle.to_string());
    }

    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn role_calls(&self) -> usize {
        self.role_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingGateway for FakeGateway {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<MessageId, GatewayError> {
        let failing = self
            .failing_sends
            .lock()
            .unwrap()
            .iter()
            .any(|n| text.contains(n.as_str()));
        if failing {
            return Err(GatewayError::Forbidden("bot was blocked by the user".to_string()));
        }
        self.sent.lock().unwrap().push((user_id, text.to_string()));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i32;
        Ok(MessageId(id))
    }

    async fn chat_administrators(&self, chat_id: ChatId) -> Result<Vec<ChatMember>, GatewayError> {
        let delay = *self.admins_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.admins
            .lock()
            .unwrap()
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("chat {chat_id}")))
    }

    async fn chat_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MemberRole, GatewayError> {
        self.role_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_roles.lock().unwrap().contains(&(chat_id, user_id)) {
            return Err(GatewayError::Network("timed out".to_string()));
        }
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(&(chat_id, user_id))
            .copied()
            .unwrap_or(MemberRole::Left))
    }

    async fn get_self(&self) -> Result<BotIdentity, GatewayError> {
        Ok(BotIdentity {
            user_id: BOT_ID,
            username: "roster_bot".to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    allowed: Mutex<Vec<String>>,
    members: Mutex<HashMap<ChatId, Vec<Identity>>>,
    /// Number of upcoming `list_members` calls that fail.
    member_failures: AtomicUsize,
    /// Number of upcoming `list_allowed` calls that fail.
    allowed_failures: AtomicUsize,
    member_reads: AtomicUsize,
    allowed_reads: AtomicUsize,
    /// Delay inside each `list_members` call.
    member_read_delay: Mutex<Option<Duration>>,
    members_in_flight: AtomicUsize,
    panic_on_member_read: AtomicBool,
    peak_member_reads: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_allowed(names: &[&str]) -> Self {
        let dir = Self::default();
        dir.set_allowed(names);
        dir
    }

    pub fn set_allowed(&self, names: &[&str]) {
        *self.allowed.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_members(&self, chat: ChatId, members: Vec<Identity>) {
        self.members.lock().unwrap().insert(chat, members);
    }

    pub fn members_of(&self, chat: ChatId) -> Vec<Identity> {
        self.members
            .lock()
            .unwrap()
            .get(&chat)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_next_member_reads(&self, n: usize) {
        self.member_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_allowed_reads(&self, n: usize) {
        self.allowed_failures.store(n, Ordering::SeqCst);
    }

    pub fn slow_member_reads(&self, delay: Duration) {
        *self.member_read_delay.lock().unwrap() = Some(delay);
    }

    /// Make `list_members` panic, taking the calling task down with it.
    pub fn panic_on_member_reads(&self) {
        self.panic_on_member_read.store(true, Ordering::SeqCst);
    }

    /// Highest number of `list_members` calls seen running at once.
    pub fn peak_member_reads(&self) -> usize {
        self.peak_member_reads.load(Ordering::SeqCst)
    }

    pub fn member_reads(&self) -> usize {
        self.member_reads.load(Ordering::SeqCst)
    }

    pub fn allowed_reads(&self) -> usize {
        self.allowed_reads.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DirectoryStore for FakeDirectory {
    async fn list_allowed(&self) -> Result<Vec<String>, StoreError> {
        self.allowed_reads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.allowed_failures) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(self.allowed.lock().unwrap().clone())
    }

    async fn list_members(&self, chat_id: ChatId) -> Result<Vec<Identity>, StoreError> {
        self.member_reads.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_member_read.load(Ordering::SeqCst) {
            panic!("directory exploded");
        }
        let in_flight = self.members_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_member_reads.fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.member_read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.members_in_flight.fetch_sub(1, Ordering::SeqCst);

        if Self::take_failure(&self.member_failures) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(self.members_of(chat_id))
    }

    async fn upsert_member(&self, identity: &Identity, chat_id: ChatId) -> Result<(), StoreError> {
        let mut members = self.members.lock().unwrap();
        let list = members.entry(chat_id).or_default();
        match list.iter_mut().find(|m| m.user_id == identity.user_id) {
            Some(existing) => *existing = identity.clone(),
            None => list.push(identity.clone()),
        }
        Ok(())
    }

    async fn delete_member(&self, user_id: UserId, chat_id: ChatId) -> Result<(), StoreError> {
        if let Some(list) = self.members.lock().unwrap().get_mut(&chat_id) {
            list.retain(|m| m.user_id != user_id);
        }
        Ok(())
    }
}
