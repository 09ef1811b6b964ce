//! Phase legality table and pure transitions
//!
//! Forward progress, same-phase retry and backward-to-Requirement are legal;
//! `Failed` may move into any active phase for recovery. Administrative
//! transitions bypass the table for system-triggered resets.

use crate::error::StateMachineError;
use crate::types::{Phase, PhaseStatus, Session, SessionStatus};
use chrono::Utc;

/// How a transition is authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    /// Checked against the legality table and terminal status
    Checked,
    /// System-triggered reset; bypasses all checks
    Administrative,
}

/// Validates a state transition.
///
/// Illegal transitions return an error; the `strict-debug` feature turns
/// them into panics for local debugging.
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal phase transition attempted: {from:?} -> {to:?}");

        #[cfg(not(feature = "strict-debug"))]
        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// Legal next phases for `from`.
#[must_use]
pub fn allowed_transitions(from: Phase) -> Vec<Phase> {
    use Phase::*;
    match from {
        Init => vec![Init, Requirement, Failed],
        Requirement => vec![Requirement, Analysis, Failed],
        Analysis => vec![Analysis, Pretestcase, Requirement, Failed],
        Pretestcase => vec![Pretestcase, Testcase, Requirement, Failed],
        Testcase => vec![Testcase, Commit, Requirement, Failed],
        Commit => vec![Commit, Requirement, Failed],
        Failed => vec![Requirement, Analysis, Pretestcase, Testcase, Commit],
    }
}

fn allowed(from: Phase, to: Phase) -> bool {
    allowed_transitions(from).into_iter().any(|p| p == to)
}

/// Move `session` into `to`, resetting phase progress.
///
/// Pure: only the session fields change. Entering a phase clears the last
/// error and reactivates the session.
pub fn apply_transition(
    session: &mut Session,
    to: Phase,
    mode: TransitionMode,
) -> Result<(), StateMachineError> {
    if mode == TransitionMode::Checked {
        if session.status.is_terminal() {
            return Err(StateMachineError::Terminal {
                status: session.status,
            });
        }
        validate_transition(session.phase, to)?;
    }

    let from = session.phase;
    session.phase = to;
    session.phase_status = PhaseStatus::Pending;
    session.status = if to == Phase::Failed {
        SessionStatus::Failed
    } else {
        SessionStatus::Active
    };
    session.last_error = None;
    session.updated_at = Utc::now();

    tracing::debug!(session = %session.key, %from, %to, ?mode, "phase transition");
    Ok(())
}

/// Record a stage failure without moving the phase.
pub fn apply_failure(session: &mut Session, message: impl Into<String>) {
    session.phase_status = PhaseStatus::Failed;
    session.status = SessionStatus::Failed;
    session.last_error = Some(message.into());
    session.updated_at = Utc::now();
}

/// Mark the current phase finished; finishing `Commit` completes the session.
pub fn apply_completion(session: &mut Session) {
    session.phase_status = PhaseStatus::Completed;
    if session.phase == Phase::Commit {
        session.status = SessionStatus::Completed;
    }
    session.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LocaleSettings, SessionKey};

    fn session_in(phase: Phase) -> Session {
        let mut s = Session::new(SessionKey::generate("ws"), "TCG-1", "set", LocaleSettings::default());
        s.phase = phase;
        s
    }

    #[test]
    fn forward_retry_and_revision_are_legal() {
        assert!(validate_transition(Phase::Analysis, Phase::Pretestcase).is_ok());
        assert!(validate_transition(Phase::Analysis, Phase::Analysis).is_ok());
        assert!(validate_transition(Phase::Testcase, Phase::Requirement).is_ok());
    }

    #[test]
    fn skipping_phases_is_illegal() {
        assert!(validate_transition(Phase::Init, Phase::Analysis).is_err());
        assert!(validate_transition(Phase::Requirement, Phase::Testcase).is_err());
        assert!(validate_transition(Phase::Failed, Phase::Init).is_err());
    }

    #[test]
    fn administrative_bypasses_table_and_terminal_status() {
        let mut s = session_in(Phase::Commit);
        s.status = SessionStatus::Completed;
        assert!(apply_transition(&mut s, Phase::Analysis, TransitionMode::Checked).is_err());
        apply_transition(&mut s, Phase::Requirement, TransitionMode::Administrative).unwrap();
        assert_eq!(s.phase, Phase::Requirement);
        assert_eq!(s.status, SessionStatus::Active);
    }

    #[test]
    fn failure_keeps_phase() {
        let mut s = session_in(Phase::Analysis);
        apply_failure(&mut s, "model unavailable");
        assert_eq!(s.phase, Phase::Analysis);
        assert_eq!(s.phase_status, PhaseStatus::Failed);
        assert_eq!(s.status, SessionStatus::Failed);
        assert_eq!(s.last_error.as_deref(), Some("model unavailable"));

        // Same-phase retry is still legal and clears the error.
        apply_transition(&mut s, Phase::Analysis, TransitionMode::Checked).unwrap();
        assert_eq!(s.status, SessionStatus::Active);
        assert!(s.last_error.is_none());
    }

    #[test]
    fn completing_commit_completes_session() {
        let mut s = session_in(Phase::Commit);
        apply_completion(&mut s);
        assert_eq!(s.status, SessionStatus::Completed);

        let mut s = session_in(Phase::Testcase);
        apply_completion(&mut s);
        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.phase_status, PhaseStatus::Completed);
    }
}
