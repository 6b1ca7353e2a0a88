use thiserror::Error;

use crate::blockchain::Bytes32;

/// Errors raised while tracking or extending a DAO treasury chain
#[derive(Debug, Error)]
pub enum DaoError {
    /// Rejected before any I/O: bad percentages, identity collisions, missing bindings
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// No reachable peer; the caller may retry later
    #[error("Network unavailable: {0}")]
    TransientNetwork(String),

    /// The treasury launcher has no children on chain yet
    #[error("Treasury {0} is not confirmed on chain yet")]
    NotYetConfirmed(Bytes32),

    /// A chain invariant is broken; state must not be advanced
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Construction failed after an auxiliary token wallet was created; the
    /// wallet has been removed again
    #[error("Spend construction failed after token wallet {wallet_id} was created: {source}")]
    PartialConstruction {
        wallet_id: u32,
        #[source]
        source: Box<DaoError>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A host collaborator failed for reasons of its own
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl DaoError {
    /// Whether re-invoking the same operation later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DaoError::TransientNetwork(_) | DaoError::NotYetConfirmed(_)
        )
    }
}

impl From<sled::Error> for DaoError {
    fn from(err: sled::Error) -> Self {
        DaoError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for DaoError {
    fn from(err: config::ConfigError) -> Self {
        DaoError::Config(err.to_string())
    }
}

pub type DaoResult<T> = Result<T, DaoError>;
