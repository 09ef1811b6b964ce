//! casegen-kernel - session phase state machine
//!
//! Owns the pieces of the pipeline that hold real state:
//! - the phase legality table and pure transitions
//! - store-backed phase operations (enter / complete / fail / cancel)
//! - persistence contracts for sessions, drafts and committed cases
//! - an in-memory reference store
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use casegen_kernel::prelude::*;
//!
//! let store = MemoryStore::new();
//! let session = Session::new(SessionKey::generate("ws"), "TCG-1", "set-1", LocaleSettings::default());
//! let key = session.key.clone();
//! store.create_session(session).await?;
//!
//! let machine = PhaseMachine::new(&store);
//! machine.enter(&key, Phase::Requirement, TransitionMode::Checked).await?;
//! machine.complete(&key).await?;
//! ```

pub mod error;
pub mod machine;
pub mod memory;
pub mod state_machine;
pub mod store;
pub mod types;

pub use error::{KernelError, KernelResult, StateMachineError, StoreError};
pub use machine::PhaseMachine;
pub use memory::MemoryStore;
pub use state_machine::{allowed_transitions, validate_transition, TransitionMode};
pub use store::{CaseRow, CaseStore, CategoryId, SessionStore};
pub use types::{
    Draft, DraftTrace, LocaleSettings, Phase, PhaseStatus, Session, SessionId, SessionKey,
    SessionStatus,
};

/// Common imports
pub mod prelude {
    pub use crate::{
        CaseStore, Draft, LocaleSettings, MemoryStore, Phase, PhaseMachine, PhaseStatus, Session,
        SessionKey, SessionStatus, SessionStore, TransitionMode,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
