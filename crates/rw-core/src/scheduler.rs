//! Recurring per-chat membership audits.
//!
//! - One tokio task per subscribed chat, started by `start`
//! - Each tick: refresh allow-list, read chat members, diff, report to the admin
//! - A failed tick is logged and the loop waits for the next one
//! - Ticks for one chat never overlap, manual ones included; a slow tick delays
//!   the next
//! - `stop` cancels one chat, `shutdown` cancels all; both wait for the loop to
//!   finish its current tick

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    allowlist::AllowlistCache,
    differ::diff,
    dispatch::{DispatchResult, NotificationDispatcher},
    domain::{ChatId, UserId},
    errors::StoreError,
    ports::DirectoryStore,
    registry::{SubscribeOutcome, SubscriptionRegistry},
};

/// Outcome of one successful audit tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub members: usize,
    pub violations: usize,
    pub dispatch: DispatchResult,
}

/// A tick that could not complete, tagged with the step that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("refreshing allow-list: {0}")]
    Allowlist(StoreError),

    #[error("listing chat members: {0}")]
    Members(StoreError),
}

/// Returned by `start` once `shutdown` has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("audit scheduler is shut down")]
pub struct SchedulerClosed;

impl AuditError {
    pub fn step(&self) -> &'static str {
        match self {
            AuditError::Allowlist(_) => "allowlist",
            AuditError::Members(_) => "members",
        }
    }
}

#[derive(Clone)]
pub struct AuditScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    interval: Duration,
    allowlist: Arc<AllowlistCache>,
    store: Arc<dyn DirectoryStore>,
    dispatcher: NotificationDispatcher,
    registry: SubscriptionRegistry,
    shutdown: CancellationToken,
    tasks: tokio::sync::Mutex<HashMap<ChatId, AuditTask>>,
    /// Serialises ticks per chat (scheduled and manual).
    tick_locks: Mutex<HashMap<ChatId, Arc<tokio::sync::Mutex<()>>>>,
}

struct AuditTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AuditScheduler {
    pub fn new(
        interval: Duration,
        allowlist: Arc<AllowlistCache>,
        store: Arc<dyn DirectoryStore>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                interval: interval.max(Duration::from_secs(1)),
                allowlist,
                store,
                dispatcher,
                registry: SubscriptionRegistry::new(),
                shutdown: CancellationToken::new(),
                tasks: tokio::sync::Mutex::new(HashMap::new()),
                tick_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn allowlist(&self) -> &AllowlistCache {
        &self.inner.allowlist
    }

    /// Subscribe `admin_id` to `chat_id` and spawn its audit loop.
    ///
    /// Only a `Created` subscription spawns. The task table lock is held across
    /// subscribe-and-spawn so a concurrent `stop` cannot leave a task without a
    /// subscription.
    pub async fn start(
        &self,
        admin_id: UserId,
        chat_id: ChatId,
    ) -> Result<SubscribeOutcome, SchedulerClosed> {
        let mut tasks = self.inner.tasks.lock().await;
        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerClosed);
        }

        let outcome = self.inner.registry.subscribe(admin_id, chat_id);
        if outcome == SubscribeOutcome::AlreadyActive {
            return Ok(outcome);
        }

        let cancel = self.inner.shutdown.child_token();
        let scheduler = self.clone();
        let cancel_for_task = cancel.clone();
        let handle = tokio::spawn(async move {
            scheduler.audit_loop(admin_id, chat_id, cancel_for_task).await;
        });
        tasks.insert(chat_id, AuditTask { cancel, handle });

        tracing::info!(
            chat_id = chat_id.0,
            admin_id = admin_id.0,
            interval_secs = self.inner.interval.as_secs(),
            "audit loop started"
        );
        Ok(outcome)
    }

    /// Stop the chat's audit if `admin_id` is its recipient.
    ///
    /// Returns once the loop has exited. A tick already in flight is allowed to
    /// finish first, and the table lock stays held so no new loop for the chat
    /// can start meanwhile.
    pub async fn stop(&self, admin_id: UserId, chat_id: ChatId) -> bool {
        let mut tasks = self.inner.tasks.lock().await;
        if !self.inner.registry.unsubscribe(admin_id, chat_id) {
            return false;
        }
        if let Some(task) = tasks.remove(&chat_id) {
            task.cancel.cancel();
            Self::join(chat_id, task.handle).await;
        }
        tracing::info!(chat_id = chat_id.0, admin_id = admin_id.0, "audit loop stopped");
        true
    }

    /// Cancel every audit loop and wait for them to exit.
    pub async fn shutdown(&self) {
        let drained: Vec<(ChatId, AuditTask)> = {
            let mut tasks = self.inner.tasks.lock().await;
            self.inner.shutdown.cancel();
            tasks.drain().collect()
        };
        let count = drained.len();
        for (chat_id, task) in drained {
            task.cancel.cancel();
            Self::join(chat_id, task.handle).await;
        }
        tracing::info!(tasks = count, "audit scheduler shut down");
    }

    async fn join(chat_id: ChatId, handle: JoinHandle<()>) {
        if let Err(e) = handle.await {
            tracing::warn!(chat_id = chat_id.0, "audit loop ended abnormally: {e}");
        }
    }

    fn tick_lock(&self, chat_id: ChatId) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .tick_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(chat_id)
            .or_default()
            .clone()
    }

    /// Number of running audit loops.
    pub async fn running(&self) -> usize {
        self.inner.tasks.lock().await.len()
    }

    /// One audit pass: refresh allow-list, read members, diff, report.
    ///
    /// The allow-list snapshot is read once and used for the whole pass. Waits
    /// for any other pass over the same chat to finish first.
    pub async fn run_tick(
        &self,
        admin_id: UserId,
        chat_id: ChatId,
    ) -> Result<TickReport, AuditError> {
        let lock = self.tick_lock(chat_id);
        let _guard = lock.lock().await;

        let allowlist = self
            .inner
            .allowlist
            .refresh()
            .await
            .map_err(AuditError::Allowlist)?;
        let members = self
            .inner
            .store
            .list_members(chat_id)
            .await
            .map_err(AuditError::Members)?;

        let violations = diff(&members, &allowlist);
        let dispatch = self
            .inner
            .dispatcher
            .report(admin_id, chat_id, &violations)
            .await;

        Ok(TickReport {
            members: members.len(),
            violations: violations.len(),
            dispatch,
        })
    }

    async fn audit_loop(&self, admin_id: UserId, chat_id: ChatId, cancel: CancellationToken) {
        let mut tick = interval(self.inner.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
              biased;
              _ = cancel.cancelled() => break,
              _ = tick.tick() => {
                tracing::debug!(chat_id = chat_id.0, "audit tick");
                match self.run_tick(admin_id, chat_id).await {
                  Ok(report) => tracing::info!(
                    chat_id = chat_id.0,
                    members = report.members,
                    violations = report.violations,
                    "audit tick complete"
                  ),
                  Err(e) => tracing::error!(
                    chat_id = chat_id.0,
                    step = e.step(),
                    "audit tick failed: {e}"
                  ),
                }
              }
            }
        }
        tracing::debug!(chat_id = chat_id.0, "audit loop exited");
    }
}
