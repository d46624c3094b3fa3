use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DebtError {
    #[error("person name must not be empty")]
    EmptyPersonName,

    #[error("amount must not be negative (got {0})")]
    NegativeAmount(Decimal),

    #[error("amount paid must not be negative (got {0})")]
    NegativeAmountPaid(Decimal),

    #[error("debt has no id; insert it first")]
    MissingId,

    #[error("debt already persisted with id {0}")]
    AlreadyPersisted(i64),

    #[error("debt {0} not found")]
    NotFound(i64),

    #[error("DB error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DebtError>;
