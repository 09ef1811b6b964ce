//! Persistence contracts
//!
//! Sessions and drafts are read-modify-write keyed by (workspace, session).
//! Cases are inserted keyed by (workspace, target set, category, case
//! number) with case numbers unique within their set.

use crate::error::StoreError;
use crate::types::{Draft, Phase, Session, SessionKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifier of a category node in the external hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub u64);

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cat-{}", self.0)
    }
}

/// One case row as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRow {
    /// Case number, unique within the target set
    pub case_number: String,
    /// Category the case is filed under
    pub category_id: CategoryId,
    /// Case title
    pub title: String,
    /// Full case body
    pub body: serde_json::Value,
}

/// Session and draft persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session.
    async fn create_session(&self, session: Session) -> Result<(), StoreError>;

    /// Read the stored session.
    async fn load_session(&self, key: &SessionKey) -> Result<Session, StoreError>;

    /// Overwrite the stored session.
    async fn save_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Write the draft for its phase, bumping the version; returns the stored draft.
    async fn put_draft(&self, key: &SessionKey, draft: Draft) -> Result<Draft, StoreError>;

    /// Latest draft for a phase, if any.
    async fn get_draft(&self, key: &SessionKey, phase: Phase) -> Result<Option<Draft>, StoreError>;
}

/// Destination store for committed cases
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Resolve (creating as needed) the nested category for `path`.
    async fn ensure_category(
        &self,
        workspace: &str,
        target_set: &str,
        path: &[String],
    ) -> Result<CategoryId, StoreError>;

    /// Insert all rows atomically; any uniqueness violation inserts nothing.
    async fn insert_cases(
        &self,
        workspace: &str,
        target_set: &str,
        rows: Vec<CaseRow>,
    ) -> Result<usize, StoreError>;

    /// Number of rows in a target set.
    async fn count_cases(&self, workspace: &str, target_set: &str) -> Result<usize, StoreError>;
}
