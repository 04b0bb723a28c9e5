use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoyaltyError {
    #[error("order already submitted by this user")]
    Exists,
    #[error("order number is owned by another user")]
    Conflict,
    #[error("not found")]
    NotFound,
    #[error("not enough points on balance")]
    NotEnoughMoney,
    #[error("reconciliation cancelled")]
    Cancelled,
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl LoyaltyError {
    /// Errors that end a reconciliation task without touching the ledger.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::InternalError(_) | Self::HttpError(_) | Self::JsonError(_) | Self::IoError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LoyaltyError>;
