//! Command-level entry points used by the routing layer.
//!
//! Each method maps one user command or membership event onto the gate,
//! registry, scheduler and directory. Results are plain enums; turning them into
//! user-facing text is the adapter's job.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    allowlist::AllowlistCache,
    authz::{Authorization, AuthorizationGate, DenyReason},
    dispatch::NotificationDispatcher,
    domain::{ChatId, Identity, UserId},
    errors::{GatewayError, StoreError},
    messaging::port::MessagingGateway,
    ports::DirectoryStore,
    registry::{SubscribeOutcome, Subscription},
    scheduler::{AuditError, AuditScheduler, SchedulerClosed, TickReport},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartReply {
    Started,
    AlreadyActive { recipient: UserId },
    Denied(DenyReason),
    ShuttingDown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckReply {
    Completed(TickReport),
    NotRecipient,
    Denied(DenyReason),
    Failed(AuditError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReply {
    Stopped,
    NotRecipient,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub subscriptions: Vec<Subscription>,
    pub allowlist_size: usize,
    pub allowlist_refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Monitor {
    gate: Arc<AuthorizationGate>,
    scheduler: AuditScheduler,
    store: Arc<dyn DirectoryStore>,
    gateway: Arc<dyn MessagingGateway>,
}

impl Monitor {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        store: Arc<dyn DirectoryStore>,
        interval: std::time::Duration,
    ) -> Self {
        let allowlist = Arc::new(AllowlistCache::new(store.clone()));
        let scheduler = AuditScheduler::new(
            interval,
            allowlist,
            store.clone(),
            NotificationDispatcher::new(gateway.clone()),
        );
        Self {
            gate: Arc::new(AuthorizationGate::new(gateway.clone())),
            scheduler,
            store,
            gateway,
        }
    }

    pub fn scheduler(&self) -> &AuditScheduler {
        &self.scheduler
    }

    /// Authorize, subscribe, and spawn the chat's audit loop.
    ///
    /// For a chat without an audit the administrators are written to the
    /// directory first, so the immediate first tick already sees them.
    pub async fn start(&self, chat_id: ChatId, requester: UserId) -> StartReply {
        if let Authorization::Denied(reason) = self.gate.authorize(chat_id, requester).await {
            tracing::info!(
                chat_id = chat_id.0,
                user_id = requester.0,
                ?reason,
                "start denied"
            );
            return StartReply::Denied(reason);
        }

        if !self.scheduler.registry().is_active(chat_id) {
            if let Err(e) = self.seed_administrators(chat_id).await {
                tracing::warn!(chat_id = chat_id.0, "seeding administrators failed: {e}");
            }
        }

        match self.scheduler.start(requester, chat_id).await {
            Ok(SubscribeOutcome::Created) => StartReply::Started,
            Ok(SubscribeOutcome::AlreadyActive) => {
                let recipient = self
                    .scheduler
                    .registry()
                    .get(chat_id)
                    .map(|s| s.admin_id)
                    .unwrap_or(requester);
                StartReply::AlreadyActive { recipient }
            }
            Err(SchedulerClosed) => StartReply::ShuttingDown,
        }
    }

    /// Run one audit pass now, for the chat's current recipient only.
    ///
    /// Roles are re-checked: an admin may have been demoted since `start`.
    pub async fn check(&self, chat_id: ChatId, requester: UserId) -> CheckReply {
        if !self.scheduler.registry().is_recipient(requester, chat_id) {
            return CheckReply::NotRecipient;
        }
        if let Authorization::Denied(reason) = self.gate.authorize(chat_id, requester).await {
            return CheckReply::Denied(reason);
        }

        tracing::info!(chat_id = chat_id.0, user_id = requester.0, "manual audit");
        match self.scheduler.run_tick(requester, chat_id).await {
            Ok(report) => CheckReply::Completed(report),
            Err(e) => {
                tracing::error!(chat_id = chat_id.0, step = e.step(), "manual audit failed: {e}");
                CheckReply::Failed(e)
            }
        }
    }

    /// Stop the chat's audit. Only the recipient may do this; roles are not
    /// consulted so a demoted admin can still silence their own reports.
    pub async fn stop(&self, chat_id: ChatId, requester: UserId) -> StopReply {
        if self.scheduler.stop(requester, chat_id).await {
            StopReply::Stopped
        } else {
            StopReply::NotRecipient
        }
    }

    pub async fn status(&self, requester: UserId) -> StatusReport {
        let subscriptions = self
            .scheduler
            .registry()
            .list()
            .into_iter()
            .filter(|s| s.admin_id == requester)
            .collect();
        let allowlist = self.scheduler.allowlist();
        StatusReport {
            subscriptions,
            allowlist_size: allowlist.current().await.len(),
            allowlist_refreshed_at: allowlist.refreshed_at().await,
        }
    }

    pub async fn on_join(&self, identity: &Identity, chat_id: ChatId) -> Result<(), StoreError> {
        self.store
            .upsert_member(identity, chat_id)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    chat_id = chat_id.0,
                    user_id = identity.user_id.0,
                    "recording join failed: {e}"
                )
            })?;
        tracing::info!(
            chat_id = chat_id.0,
            user_id = identity.user_id.0,
            "member {} recorded",
            identity.label()
        );
        Ok(())
    }

    pub async fn on_leave(&self, user_id: UserId, chat_id: ChatId) -> Result<(), StoreError> {
        self.store
            .delete_member(user_id, chat_id)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    chat_id = chat_id.0,
                    user_id = user_id.0,
                    "recording leave failed: {e}"
                )
            })?;
        tracing::info!(chat_id = chat_id.0, user_id = user_id.0, "member removed");
        Ok(())
    }

    /// Record a message author as a member (membership inferred from activity).
    pub async fn observe_sender(
        &self,
        identity: &Identity,
        chat_id: ChatId,
    ) -> Result<(), StoreError> {
        self.store.upsert_member(identity, chat_id).await
    }

    /// Write the chat's current non-bot administrators to the directory.
    /// Returns how many were written.
    pub async fn seed_administrators(&self, chat_id: ChatId) -> Result<usize, SeedError> {
        let admins = self.gateway.chat_administrators(chat_id).await?;
        let mut written = 0usize;
        for admin in admins.into_iter().filter(|a| !a.is_bot) {
            self.store.upsert_member(&admin.identity, chat_id).await?;
            written += 1;
        }
        tracing::debug!(chat_id = chat_id.0, written, "administrators seeded");
        Ok(written)
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
