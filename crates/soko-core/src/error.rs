use thiserror::Error;

/// Errors surfaced by the marketplace engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("insufficient funds in account {account_id}: available {available_minor}, required {required_minor}")]
    InsufficientFunds {
        account_id: String,
        available_minor: i64,
        required_minor: i64,
    },

    #[error("illegal hold state for escrow {hold_id}: {status} does not permit {operation}")]
    IllegalHoldState {
        hold_id: String,
        status: String,
        operation: &'static str,
    },

    #[error("concurrent modification of {entity} {id}: expected version {expected}, found {found}")]
    ConcurrentModification {
        entity: &'static str,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("verification required: {0}")]
    VerificationRequired(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("state lock poisoned")]
    LockPoisoned,

    #[error("journal error: {0}")]
    Journal(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    pub fn invalid_transition(
        entity: &'static str,
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id: id.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn constraint(detail: impl Into<String>) -> Self {
        Self::ConstraintViolation(detail.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_identifiers() {
        let err = EngineError::invalid_transition("bid", "b-1", "pending", "paid");
        assert_eq!(
            err.to_string(),
            "invalid transition for bid b-1: pending -> paid"
        );

        let err = EngineError::InsufficientFunds {
            account_id: "a-1".to_string(),
            available_minor: 500,
            required_minor: 1000,
        };
        assert!(err.to_string().contains("available 500"));
        assert!(err.to_string().contains("required 1000"));
    }
}
