//! Error types for TallyChain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Invalid amount: transaction amount must be greater than zero")]
    InvalidAmount,
    #[error("Invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },
    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: u64, required: u64 },
    #[error("Invalid block index: expected {expected}, got {got}")]
    InvalidIndex { expected: u64, got: u64 },
    #[error("Invalid block linkage: parent hash does not match the current tip")]
    InvalidParent,
    #[error("Invalid proof of work")]
    InvalidProofOfWork,
    #[error("Invalid Merkle root")]
    InvalidMerkleRoot,
    #[error("Invalid state root")]
    InvalidStateRoot,
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Transaction already exists in pool")]
    Duplicate,
    #[error("Mempool is full")]
    MempoolFull,
    #[error("Block not found: {0}")]
    BlockNotFound(String),
    #[error("Chain tip not found")]
    TipNotFound,
    #[error("Mining aborted")]
    MiningAborted,
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Wallet error: {0}")]
    WalletError(String),
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl ChainError {
    /// True for rejections of a block or transaction on its merits, as opposed
    /// to storage, lookup or mining failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChainError::InvalidSignature(_)
                | ChainError::InvalidAmount
                | ChainError::InvalidNonce { .. }
                | ChainError::InsufficientBalance { .. }
                | ChainError::InvalidIndex { .. }
                | ChainError::InvalidParent
                | ChainError::InvalidProofOfWork
                | ChainError::InvalidMerkleRoot
                | ChainError::InvalidStateRoot
                | ChainError::InvalidBlock(_)
                | ChainError::InvalidTransaction(_)
                | ChainError::Duplicate
        )
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
