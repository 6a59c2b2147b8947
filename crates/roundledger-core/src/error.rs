use crate::types::{AccountId, Amount, RoundId, Timestamp};
use thiserror::Error;

/// Failure category shared by every engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    PreconditionFailed,
    AccessDenied,
    Expired,
    NotFound,
    Internal,
}

/// Round engine errors.
///
/// All business-rule failures are local and synchronous; the engine never retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Claim period expired for round {round_id} at {expired_at}")]
    Expired {
        round_id: RoundId,
        expired_at: Timestamp,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::AccessDenied(message.into())
    }

    pub fn poisoned(component: &str) -> Self {
        Self::Internal(format!("{component} lock poisoned"))
    }
}

/// Typed ledger rejection reasons. Checked before any mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("{role} {account} is blacklisted")]
    Blacklisted { role: &'static str, account: AccountId },

    #[error("ledger is paused")]
    Paused,

    #[error("balance {balance} below holding threshold {threshold}")]
    BelowThreshold { balance: Amount, threshold: Amount },

    #[error("{parameter} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        parameter: &'static str,
        value: Amount,
        min: Amount,
        max: Amount,
    },

    #[error("no upload permit for {0}")]
    NoPermit(AccountId),

    #[error("{0} is not authorized")]
    Unauthorized(AccountId),

    #[error("invalid burn evidence: {0}")]
    InvalidEvidence(String),

    #[error("burn proof '{0}' not found")]
    ProofNotFound(String),

    #[error("{0} is a protected system account")]
    ProtectedAccount(AccountId),
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance { .. }
            | LedgerError::BelowThreshold { .. }
            | LedgerError::OutOfRange { .. }
            | LedgerError::NoPermit(_)
            | LedgerError::ProtectedAccount(_) => EngineError::PreconditionFailed(err.to_string()),
            LedgerError::Blacklisted { .. }
            | LedgerError::Paused
            | LedgerError::Unauthorized(_) => EngineError::AccessDenied(err.to_string()),
            LedgerError::InvalidEvidence(_) => EngineError::Validation(err.to_string()),
            LedgerError::ProofNotFound(_) => EngineError::NotFound(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_reasons_map_to_taxonomy() {
        let blacklisted: EngineError = LedgerError::Blacklisted {
            role: "sender",
            account: AccountId::new("mallory"),
        }
        .into();
        assert_eq!(blacklisted.kind(), ErrorKind::AccessDenied);
        assert!(blacklisted.to_string().contains("sender mallory is blacklisted"));

        let short: EngineError = LedgerError::InsufficientBalance {
            needed: 10,
            available: 3,
        }
        .into();
        assert_eq!(short.kind(), ErrorKind::PreconditionFailed);

        let paused: EngineError = LedgerError::Paused.into();
        assert_eq!(paused.kind(), ErrorKind::AccessDenied);
    }
}
