//! Telegram adapter (teloxide).
//!
//! This crate implements the `rw-core` MessagingGateway over the Telegram Bot
//! API and routes updates into the core `Monitor`.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ChatMemberKind, User},
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use rw_core::{
    domain::{BotIdentity, ChatId, ChatMember, Identity, MemberRole, MessageId, UserId},
    errors::GatewayError,
    messaging::port::MessagingGateway,
};

#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_user(user_id: UserId) -> teloxide::types::UserId {
        teloxide::types::UserId(user_id.0 as u64)
    }

    fn map_err(e: RequestError) -> GatewayError {
        match e {
            RequestError::Api(api) => match api {
                ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::BotKickedFromSupergroup
                | ApiError::UserDeactivated
                | ApiError::CantInitiateConversation => GatewayError::Forbidden(api.to_string()),
                ApiError::ChatNotFound | ApiError::UserNotFound => {
                    GatewayError::NotFound(api.to_string())
                }
                other => GatewayError::Api(other.to_string()),
            },
            RequestError::RetryAfter(_) => GatewayError::RateLimited,
            RequestError::Network(e) => GatewayError::Network(e.to_string()),
            other => GatewayError::Api(other.to_string()),
        }
    }

    /// Run a request, honouring one Telegram `RetryAfter` before giving up.
    async fn with_retry<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> Result<T, GatewayError>
    where
        Fut: std::future::IntoFuture<Output = Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::debug!("telegram flood control, retrying after {}s", d.as_secs());
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

pub fn identity_of(user: &User) -> Identity {
    Identity {
        user_id: UserId(user.id.0 as i64),
        display_name: user.full_name(),
        username: user.username.clone(),
    }
}

pub fn role_of(kind: &ChatMemberKind) -> MemberRole {
    match kind {
        ChatMemberKind::Owner(_) => MemberRole::Owner,
        ChatMemberKind::Administrator(_) => MemberRole::Administrator,
        ChatMemberKind::Member => MemberRole::Member,
        ChatMemberKind::Restricted(_) => MemberRole::Restricted,
        ChatMemberKind::Left => MemberRole::Left,
        ChatMemberKind::Banned(_) => MemberRole::Banned,
    }
}

/// Whether a membership state counts as "in the chat".
pub fn is_present(kind: &ChatMemberKind) -> bool {
    match kind {
        ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_) | ChatMemberKind::Member => {
            true
        }
        ChatMemberKind::Restricted(r) => r.is_member,
        ChatMemberKind::Left | ChatMemberKind::Banned(_) => false,
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<MessageId, GatewayError> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(teloxide::types::ChatId(user_id.0), text.to_string())
            })
            .await?;
        Ok(MessageId(msg.id.0))
    }

    async fn chat_administrators(&self, chat_id: ChatId) -> Result<Vec<ChatMember>, GatewayError> {
        let admins = self
            .with_retry(|| self.bot.get_chat_administrators(Self::tg_chat(chat_id)))
            .await?;
        Ok(admins
            .iter()
            .map(|m| ChatMember {
                identity: identity_of(&m.user),
                role: role_of(&m.kind),
                is_bot: m.user.is_bot,
            })
            .collect())
    }

    async fn chat_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MemberRole, GatewayError> {
        let member = self
            .with_retry(|| {
                self.bot
                    .get_chat_member(Self::tg_chat(chat_id), Self::tg_user(user_id))
            })
            .await?;
        Ok(role_of(&member.kind))
    }

    async fn get_self(&self) -> Result<BotIdentity, GatewayError> {
        let me = self.with_retry(|| self.bot.get_me()).await?;
        Ok(BotIdentity {
            user_id: UserId(me.user.id.0 as i64),
            username: me.username().to_string(),
        })
    }
}
