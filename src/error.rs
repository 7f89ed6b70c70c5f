//! Error types for OrderChain

use thiserror::Error;

/// Failures that abort the operation in progress.
///
/// A block that fails acceptance is not an error; see
/// [`Rejection`](crate::blockchain::Rejection).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Duplicate balance for {client_id} and {asset}")]
    DuplicateBalance { client_id: String, asset: String },
    #[error("Hash collision: {0}")]
    HashCollision(String),
    #[error("Duplicate order: {0}")]
    DuplicateOrder(String),
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),
    #[error("Nonce space exhausted")]
    NonceExhausted,
    #[error("Invalid chain: {0}")]
    InvalidChain(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ChainError::DuplicateBalance {
            client_id: "Ada".to_string(),
            asset: "ETH".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate balance for Ada and ETH");

        let err = ChainError::HashCollision("abc".to_string());
        assert_eq!(err.to_string(), "Hash collision: abc");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<u64, _> = serde_json::from_str("not json");
        let err: ChainError = parse.unwrap_err().into();
        assert!(matches!(err, ChainError::Serialization(_)));
    }
}
