/// Failure talking to the messaging gateway (Telegram today).
///
/// Every variant is recoverable: the audit loop logs it and carries on with the
/// next tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by gateway")]
    RateLimited,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("gateway api error: {0}")]
    Api(String),
}

/// Failure talking to the directory store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("directory store unavailable: {0}")]
    Unavailable(String),

    #[error("directory query failed: {0}")]
    Query(String),
}

/// Core error type.
///
/// Adapter crates map their library errors into `GatewayError` / `StoreError`;
/// this enum is what startup code and the binary see.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
