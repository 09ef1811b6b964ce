//! Error types for the casegen pipeline
//!
//! Four failure families surface to callers:
//! - validation (bad input, illegal transition, malformed commit)
//! - transport (model, tracker or vector calls exhausted their retries)
//! - parse (a contract never reduced to JSON after the full ladder)
//! - completeness (coverage gaps left open with synthesis disabled)

use casegen_contract::ContractError;
use casegen_kernel::{KernelError, StateMachineError, StoreError};

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Caller input rejected before any work was done
    #[error("validation error: {0}")]
    Validation(String),

    /// Outbound call failed after retries
    #[error("transport error in {stage}: {message}")]
    Transport { stage: String, message: String },

    /// Model output never became valid JSON
    #[error("parse error in {stage}: {source}")]
    Parse {
        stage: String,
        #[source]
        source: ContractError,
    },

    /// Coverage still incomplete after backfill
    #[error("completeness error: {0}")]
    Completeness(String),

    /// Session kernel rejected the operation
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    /// Case store failure outside the session kernel
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::Validation`]
    #[inline]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for [`PipelineError::Transport`]
    #[inline]
    pub fn transport(stage: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            stage: stage.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for [`PipelineError::Parse`]
    #[inline]
    pub fn parse(stage: impl Into<String>, source: ContractError) -> Self {
        Self::Parse {
            stage: stage.into(),
            source,
        }
    }

    /// Check if the operation may succeed when retried unchanged
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Parse { .. })
    }

    /// Whether the caller supplied something unacceptable
    ///
    /// Illegal phase transitions count as validation failures.
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Kernel(KernelError::StateMachine(_))
        )
    }

    /// Whether the error is an illegal or terminal phase transition
    #[inline]
    #[must_use]
    pub fn is_transition_rejection(&self) -> bool {
        matches!(
            self,
            Self::Kernel(KernelError::StateMachine(
                StateMachineError::IllegalTransition { .. } | StateMachineError::Terminal { .. }
            ))
        )
    }
}

impl From<StateMachineError> for PipelineError {
    fn from(err: StateMachineError) -> Self {
        Self::Kernel(KernelError::StateMachine(err))
    }
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use casegen_kernel::Phase;

    #[test]
    fn retryable_classification() {
        assert!(PipelineError::transport("analysis", "timeout").is_retryable());
        assert!(PipelineError::parse("analysis", ContractError::Empty).is_retryable());
        assert!(!PipelineError::validation("empty requirement").is_retryable());
        assert!(!PipelineError::Completeness("aspects".into()).is_retryable());
    }

    #[test]
    fn illegal_transition_is_validation() {
        let err: PipelineError = StateMachineError::IllegalTransition {
            from: Phase::Init,
            to: Phase::Commit,
        }
        .into();
        assert!(err.is_validation());
        assert!(err.is_transition_rejection());
        assert!(err.to_string().contains("init -> commit"));
    }
}
