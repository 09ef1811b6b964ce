//! Store-backed phase operations
//!
//! The stored session row is the only source of truth for phase state:
//! every operation re-reads it, applies a pure change from
//! [`crate::state_machine`], and writes it back.

use crate::error::KernelResult;
use crate::state_machine::{apply_completion, apply_failure, apply_transition, TransitionMode};
use crate::store::SessionStore;
use crate::types::{Phase, PhaseStatus, Session, SessionKey, SessionStatus};

/// Phase operations over a [`SessionStore`]
#[derive(Clone, Copy)]
pub struct PhaseMachine<'a> {
    store: &'a dyn SessionStore,
}

impl std::fmt::Debug for PhaseMachine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseMachine").finish_non_exhaustive()
    }
}

impl<'a> PhaseMachine<'a> {
    /// Wrap a store
    #[inline]
    #[must_use]
    pub fn new(store: &'a dyn SessionStore) -> Self {
        Self { store }
    }

    /// Enter `to` and mark it running.
    ///
    /// # Errors
    /// Illegal or terminal transitions in checked mode; store failures.
    pub async fn enter(&self, key: &SessionKey, to: Phase, mode: TransitionMode) -> KernelResult<Session> {
        let mut session = self.store.load_session(key).await?;
        apply_transition(&mut session, to, mode)?;
        session.phase_status = PhaseStatus::Running;
        self.store.save_session(&session).await?;
        Ok(session)
    }

    /// Mark the stored phase completed.
    ///
    /// # Errors
    /// Store failures.
    pub async fn complete(&self, key: &SessionKey) -> KernelResult<Session> {
        let mut session = self.store.load_session(key).await?;
        apply_completion(&mut session);
        self.store.save_session(&session).await?;
        tracing::info!(session = %key, phase = %session.phase, "phase completed");
        Ok(session)
    }

    /// Record a stage failure; the phase is left unchanged.
    ///
    /// # Errors
    /// Store failures.
    pub async fn fail(&self, key: &SessionKey, message: &str) -> KernelResult<Session> {
        let mut session = self.store.load_session(key).await?;
        apply_failure(&mut session, message);
        self.store.save_session(&session).await?;
        tracing::warn!(session = %key, phase = %session.phase, error = message, "phase failed");
        Ok(session)
    }

    /// Cancel the session.
    ///
    /// # Errors
    /// Store failures.
    pub async fn cancel(&self, key: &SessionKey) -> KernelResult<Session> {
        let mut session = self.store.load_session(key).await?;
        session.status = SessionStatus::Cancelled;
        session.updated_at = chrono::Utc::now();
        self.store.save_session(&session).await?;
        Ok(session)
    }
}
