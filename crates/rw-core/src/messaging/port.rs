use async_trait::async_trait;

use crate::{
    domain::{BotIdentity, ChatId, ChatMember, MemberRole, MessageId, UserId},
    errors::GatewayError,
};

/// Port to the remote messaging API.
///
/// All calls are network-bound and may fail; callers decide whether a failure is
/// fatal (it never is for the audit loop).
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send a plain-text message to a user's private chat.
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<MessageId, GatewayError>;

    async fn chat_administrators(&self, chat_id: ChatId) -> Result<Vec<ChatMember>, GatewayError>;

    async fn chat_member(&self, chat_id: ChatId, user_id: UserId)
        -> Result<MemberRole, GatewayError>;

    async fn get_self(&self) -> Result<BotIdentity, GatewayError>;
}
