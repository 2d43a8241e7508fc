//! Error types for block production

use coin_state::{CoinViewError, StoreError};
use primitive_types::H256;
use thiserror::Error;

/// Result type alias for block production operations
pub type Result<T> = std::result::Result<T, BlockProductionError>;

/// Errors that can occur during block production
///
/// Transient conditions (stale tip, stake ineligibility, abandoned template)
/// are not errors: assembly reports them as `Ok(None)`.
#[derive(Debug, Error)]
pub enum BlockProductionError {
    /// Coin overlay failure while selecting or applying transactions
    #[error("Coin view error: {0}")]
    CoinView(#[from] CoinViewError),

    /// Durable store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A pool transaction spends an output that is neither confirmed nor pending
    #[error("Pool transaction {txid:?} has an input missing from both chain and pool")]
    PoolInconsistency {
        /// Offending transaction
        txid: H256,
    },

    /// The assembled block failed the external validity check
    #[error("Template rejected by block validity check: {reason}")]
    TemplateInvalid {
        /// Validator message
        reason: String,
    },

    /// The assembled block breaks a local budget or uniqueness rule
    #[error("Template invariant violated: {reason}")]
    InvariantViolation {
        /// Which rule failed
        reason: String,
    },

    /// Block submission failed
    #[error("Block submission failed: {0}")]
    SubmissionFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tracing subscriber could not be installed
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// A blocking assembly or hashing task panicked or was cancelled
    #[error("Blocking task failed: {0}")]
    TaskFailed(String),

    /// Mining is not running
    #[error("Mining not active")]
    NotActive,

    /// Mining is already running
    #[error("Mining already running")]
    AlreadyRunning,
}

impl BlockProductionError {
    /// Whether the caller can simply try again later.
    pub fn is_recoverable(&self) -> bool {
        match self {
            BlockProductionError::Store(err) => err.is_recoverable(),
            BlockProductionError::CoinView(CoinViewError::Store(err)) => err.is_recoverable(),
            BlockProductionError::TemplateInvalid { .. }
            | BlockProductionError::SubmissionFailed(_)
            | BlockProductionError::NotActive
            | BlockProductionError::AlreadyRunning => true,
            _ => false,
        }
    }

    /// Whether the error points at a bug or corrupted state rather than a transient condition.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            BlockProductionError::PoolInconsistency { .. }
                | BlockProductionError::InvariantViolation { .. }
                | BlockProductionError::CoinView(CoinViewError::MissingInput { .. })
                | BlockProductionError::Store(StoreError::Corrupted { .. })
                | BlockProductionError::TaskFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::OutPoint;

    #[test]
    fn test_classification() {
        let io = BlockProductionError::Store(StoreError::Io {
            message: "busy".into(),
        });
        assert!(io.is_recoverable());
        assert!(!io.is_critical());

        let missing = BlockProductionError::from(CoinViewError::MissingInput {
            outpoint: OutPoint::null(),
        });
        assert!(missing.is_critical());
        assert!(!missing.is_recoverable());

        let invalid = BlockProductionError::TemplateInvalid {
            reason: "bad-cb-amount".into(),
        };
        assert!(invalid.is_recoverable());
        assert!(invalid.to_string().contains("bad-cb-amount"));

        let panicked = BlockProductionError::TaskFailed("task 7 panicked".into());
        assert!(panicked.is_critical());
        assert!(!panicked.is_recoverable());
    }
}
