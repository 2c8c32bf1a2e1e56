use std::fmt;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric, negative for groups).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat participant as the directory knows it.
///
/// `username` is the join key against the allow-list. It is optional (Telegram
/// users may have none) and compared case-sensitively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub username: Option<String>,
}

impl Identity {
    pub fn new(user_id: i64, display_name: impl Into<String>, username: Option<&str>) -> Self {
        Self {
            user_id: UserId(user_id),
            display_name: display_name.into(),
            username: username.map(str::to_string),
        }
    }

    /// `Name (@username)` or just `Name` when there is no username.
    pub fn label(&self) -> String {
        match &self.username {
            Some(u) => format!("{} (@{u})", self.display_name),
            None => self.display_name.clone(),
        }
    }
}

/// Role of a user inside a chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberRole {
    /// Owner or administrator.
    pub fn is_privileged(self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Administrator)
    }
}

/// A chat member with its role, as returned by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMember {
    pub identity: Identity,
    pub role: MemberRole,
    pub is_bot: bool,
}

/// The bot's own account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: UserId,
    pub username: String,
}
