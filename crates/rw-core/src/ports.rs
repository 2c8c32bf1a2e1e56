use async_trait::async_trait;

use crate::{
    domain::{ChatId, Identity, UserId},
    errors::StoreError,
};

/// Port to the persistent member directory.
///
/// The directory is the system's record of "who is in chat X" as last observed
/// through join/leave events. It may lag the real membership.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Every allow-listed username.
    async fn list_allowed(&self) -> Result<Vec<String>, StoreError>;

    /// Members recorded for `chat_id`, in insertion order.
    async fn list_members(&self, chat_id: ChatId) -> Result<Vec<Identity>, StoreError>;

    /// Insert or refresh a member record, unique on `(user_id, chat_id)`.
    async fn upsert_member(&self, identity: &Identity, chat_id: ChatId) -> Result<(), StoreError>;

    async fn delete_member(&self, user_id: UserId, chat_id: ChatId) -> Result<(), StoreError>;
}
