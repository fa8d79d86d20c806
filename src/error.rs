use thiserror::Error;

/// Library-wide error type. Scheduler loops log-and-continue on these rather
/// than propagate past a single tick; the HTTP layer wraps them in `anyhow`
/// for handler-level context.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("pricing error: {0}")]
    Pricing(String),

    #[error("admission rejected: {0}")]
    Admission(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TradingError>;
