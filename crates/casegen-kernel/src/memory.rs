//! In-memory store
//!
//! Reference implementation of [`SessionStore`] and [`CaseStore`]. Each
//! case batch is checked and inserted under one lock, which gives the same
//! all-or-nothing behavior as a database transaction.

use crate::error::StoreError;
use crate::store::{CaseRow, CaseStore, CategoryId, SessionStore};
use crate::types::{Draft, Phase, Session, SessionKey};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Default maximum category nesting depth
pub const DEFAULT_MAX_CATEGORY_DEPTH: usize = 5;

#[derive(Debug, Default)]
struct CategoryTree {
    next_id: u64,
    nodes: HashMap<(String, String, Option<CategoryId>, String), CategoryId>,
}

/// Thread-safe in-memory store
#[derive(Debug)]
pub struct MemoryStore {
    sessions: DashMap<SessionKey, Session>,
    drafts: DashMap<(SessionKey, Phase), Draft>,
    categories: Mutex<CategoryTree>,
    cases: Mutex<HashMap<(String, String), Vec<CaseRow>>>,
    max_category_depth: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            drafts: DashMap::new(),
            categories: Mutex::new(CategoryTree::default()),
            cases: Mutex::new(HashMap::new()),
            max_category_depth: DEFAULT_MAX_CATEGORY_DEPTH,
        }
    }

    /// With a category depth limit
    #[inline]
    #[must_use]
    pub fn with_max_category_depth(mut self, depth: usize) -> Self {
        self.max_category_depth = depth;
        self
    }

    /// Snapshot of the rows in a target set
    #[must_use]
    pub fn cases(&self, workspace: &str, target_set: &str) -> Vec<CaseRow> {
        self.cases
            .lock()
            .get(&(workspace.to_string(), target_set.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of distinct categories created so far
    #[must_use]
    pub fn category_count(&self) -> usize {
        self.categories.lock().nodes.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: Session) -> Result<(), StoreError> {
        match self.sessions.entry(session.key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                what: format!("session {}", session.key),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    async fn load_session(&self, key: &SessionKey) -> Result<Session, StoreError> {
        self.sessions
            .get(key)
            .map(|s| s.value().clone())
            .ok_or_else(|| StoreError::not_found(format!("session {key}")))
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        match self.sessions.get_mut(&session.key) {
            Some(mut stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(StoreError::not_found(format!("session {}", session.key))),
        }
    }

    async fn put_draft(&self, key: &SessionKey, mut draft: Draft) -> Result<Draft, StoreError> {
        if !self.sessions.contains_key(key) {
            return Err(StoreError::not_found(format!("session {key}")));
        }
        let slot = (key.clone(), draft.phase);
        let previous = self.drafts.get(&slot).map_or(0, |d| d.version);
        draft.version = previous + 1;
        draft.updated_at = Utc::now();
        self.drafts.insert(slot, draft.clone());
        Ok(draft)
    }

    async fn get_draft(&self, key: &SessionKey, phase: Phase) -> Result<Option<Draft>, StoreError> {
        Ok(self.drafts.get(&(key.clone(), phase)).map(|d| d.value().clone()))
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn ensure_category(
        &self,
        workspace: &str,
        target_set: &str,
        path: &[String],
    ) -> Result<CategoryId, StoreError> {
        if path.is_empty() {
            return Err(StoreError::InvalidCategory(String::new()));
        }
        if path.len() > self.max_category_depth {
            return Err(StoreError::CategoryDepthExceeded {
                depth: path.len(),
                limit: self.max_category_depth,
            });
        }
        if let Some(bad) = path.iter().find(|s| s.trim().is_empty()) {
            return Err(StoreError::InvalidCategory(bad.clone()));
        }

        let mut tree = self.categories.lock();
        let mut parent: Option<CategoryId> = None;
        for segment in path {
            let node_key = (
                workspace.to_string(),
                target_set.to_string(),
                parent,
                segment.trim().to_string(),
            );
            let id = match tree.nodes.get(&node_key) {
                Some(id) => *id,
                None => {
                    tree.next_id += 1;
                    let id = CategoryId(tree.next_id);
                    tree.nodes.insert(node_key, id);
                    id
                }
            };
            parent = Some(id);
        }
        parent.ok_or_else(|| StoreError::InvalidCategory(path.join(".")))
    }

    async fn insert_cases(
        &self,
        workspace: &str,
        target_set: &str,
        rows: Vec<CaseRow>,
    ) -> Result<usize, StoreError> {
        let mut cases = self.cases.lock();
        let set = cases
            .entry((workspace.to_string(), target_set.to_string()))
            .or_default();

        let mut seen: HashSet<&str> = set.iter().map(|r| r.case_number.as_str()).collect();
        for row in &rows {
            if !seen.insert(row.case_number.as_str()) {
                tracing::warn!(
                    target_set,
                    case_number = %row.case_number,
                    "duplicate case number, rolling back batch"
                );
                return Err(StoreError::DuplicateCase {
                    target_set: target_set.to_string(),
                    case_number: row.case_number.clone(),
                });
            }
        }

        let inserted = rows.len();
        set.extend(rows);
        Ok(inserted)
    }

    async fn count_cases(&self, workspace: &str, target_set: &str) -> Result<usize, StoreError> {
        Ok(self
            .cases
            .lock()
            .get(&(workspace.to_string(), target_set.to_string()))
            .map_or(0, Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocaleSettings;
    use serde_json::json;

    fn row(n: &str) -> CaseRow {
        CaseRow {
            case_number: n.to_string(),
            category_id: CategoryId(1),
            title: format!("case {n}"),
            body: json!({}),
        }
    }

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(str::to_string).collect()
    }

    #[tokio::test]
    async fn draft_versions_increment() {
        let store = MemoryStore::new();
        let session = Session::new(SessionKey::generate("ws"), "T-1", "set", LocaleSettings::default());
        let key = session.key.clone();
        store.create_session(session).await.unwrap();

        let d1 = store
            .put_draft(&key, Draft::new(Phase::Requirement, Some("a".into()), json!({})))
            .await
            .unwrap();
        let d2 = store
            .put_draft(&key, Draft::new(Phase::Requirement, Some("b".into()), json!({})))
            .await
            .unwrap();
        assert_eq!(d1.version, 1);
        assert_eq!(d2.version, 2);
        let latest = store.get_draft(&key, Phase::Requirement).await.unwrap().unwrap();
        assert_eq!(latest.text.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn duplicate_session_rejected() {
        let store = MemoryStore::new();
        let session = Session::new(SessionKey::generate("ws"), "T-1", "set", LocaleSettings::default());
        store.create_session(session.clone()).await.unwrap();
        assert!(matches!(
            store.create_session(session).await,
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn categories_are_reused() {
        let store = MemoryStore::new();
        let a = store.ensure_category("ws", "set", &path("Auth.Login")).await.unwrap();
        let b = store.ensure_category("ws", "set", &path("Auth.Login")).await.unwrap();
        let c = store.ensure_category("ws", "set", &path("Auth.Logout")).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.category_count(), 3);
    }

    #[tokio::test]
    async fn category_depth_limit() {
        let store = MemoryStore::new().with_max_category_depth(2);
        let err = store.ensure_category("ws", "set", &path("a.b.c")).await.unwrap_err();
        assert!(err.is_category_rejection());
    }

    #[tokio::test]
    async fn batch_with_duplicate_is_rolled_back() {
        let store = MemoryStore::new();
        store.insert_cases("ws", "set", vec![row("1")]).await.unwrap();

        let err = store
            .insert_cases("ws", "set", vec![row("2"), row("1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCase { .. }));
        assert_eq!(store.count_cases("ws", "set").await.unwrap(), 1);

        let err = store
            .insert_cases("ws", "set", vec![row("3"), row("3")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCase { .. }));
        assert_eq!(store.count_cases("ws", "set").await.unwrap(), 1);
    }
}
