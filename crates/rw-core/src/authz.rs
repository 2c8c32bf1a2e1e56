//! Who may start or trigger an audit for a chat.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::{
    domain::{BotIdentity, ChatId, UserId},
    errors::GatewayError,
    messaging::port::MessagingGateway,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// The bot cannot see the member list without admin rights.
    BotNotAdmin,
    RequesterNotAdmin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied(DenyReason),
}

/// Requires both the bot and the requester to be owner/administrator of the chat.
///
/// Gateway failures count as a denial; the gate never returns an error.
pub struct AuthorizationGate {
    gateway: Arc<dyn MessagingGateway>,
    me: OnceCell<BotIdentity>,
}

impl AuthorizationGate {
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        Self {
            gateway,
            me: OnceCell::new(),
        }
    }

    async fn bot_identity(&self) -> Result<&BotIdentity, GatewayError> {
        self.me
            .get_or_try_init(|| async { self.gateway.get_self().await })
            .await
    }

    pub async fn authorize(&self, chat_id: ChatId, requester: UserId) -> Authorization {
        let bot_role = match self.bot_identity().await {
            Ok(me) => self.gateway.chat_member(chat_id, me.user_id).await,
            Err(e) => Err(e),
        };
        match bot_role {
            Ok(role) if role.is_privileged() => {}
            Ok(role) => {
                tracing::debug!(chat_id = chat_id.0, ?role, "bot lacks admin rights");
                return Authorization::Denied(DenyReason::BotNotAdmin);
            }
            Err(e) => {
                tracing::warn!(chat_id = chat_id.0, "bot role lookup failed: {e}");
                return Authorization::Denied(DenyReason::BotNotAdmin);
            }
        }

        match self.gateway.chat_member(chat_id, requester).await {
            Ok(role) if role.is_privileged() => Authorization::Allowed,
            Ok(_) => Authorization::Denied(DenyReason::RequesterNotAdmin),
            Err(e) => {
                tracing::warn!(
                    chat_id = chat_id.0,
                    user_id = requester.0,
                    "requester role lookup failed: {e}"
                );
                Authorization::Denied(DenyReason::RequesterNotAdmin)
            }
        }
    }
}
