//! Commit adapter
//!
//! Revalidates the final cases, resolves each dotted section path into a
//! nested category (falling back to the shared default category when the
//! store rejects the path) and inserts every row in one atomic batch.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::report::FallbackEvent;
use crate::testcase::{GeneratedTestCase, QualityGate};
use casegen_kernel::{CaseRow, CaseStore, CategoryId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Outcome of a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitReport {
    pub commit_id: Uuid,
    pub target_set: String,
    pub inserted: usize,
    /// Cases filed under the default category
    pub default_category_count: usize,
    pub events: Vec<FallbackEvent>,
}

/// Writes gated cases to a [`CaseStore`]
pub struct CommitAdapter<'a> {
    store: &'a dyn CaseStore,
    gate: &'a QualityGate,
    config: &'a PipelineConfig,
}

impl std::fmt::Debug for CommitAdapter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitAdapter").finish_non_exhaustive()
    }
}

impl<'a> CommitAdapter<'a> {
    #[must_use]
    pub fn new(store: &'a dyn CaseStore, gate: &'a QualityGate, config: &'a PipelineConfig) -> Self {
        Self { store, gate, config }
    }

    /// Reject empty lists, duplicate or malformed ids and cases failing the gate.
    ///
    /// # Errors
    /// [`PipelineError::Validation`] naming the first offending case.
    pub fn revalidate(&self, ticket: &str, cases: &[GeneratedTestCase]) -> PipelineResult<()> {
        if cases.is_empty() {
            return Err(PipelineError::validation("no cases to commit"));
        }
        let width = self.config.numbering.width;
        let pattern = format!(r"^{}\.\d{{{width}}}\.\d{{{width}}}$", regex::escape(ticket));
        let id_format = Regex::new(&pattern).map_err(|e| PipelineError::Config(format!("case id pattern: {e}")))?;

        let mut seen = HashSet::new();
        for case in cases {
            if !seen.insert(case.id.as_str()) {
                return Err(PipelineError::validation(format!("duplicate case id {}", case.id)));
            }
            if !id_format.is_match(&case.id) {
                return Err(PipelineError::validation(format!("malformed case id {}", case.id)));
            }
            let issues = self.gate.check(case);
            if !issues.is_empty() {
                let issues: Vec<String> = issues.iter().map(ToString::to_string).collect();
                return Err(PipelineError::validation(format!(
                    "case {} fails the quality gate: {}",
                    case.id,
                    issues.join("; ")
                )));
            }
        }
        Ok(())
    }

    /// Revalidate and insert `cases` atomically.
    ///
    /// # Errors
    /// Validation failures; [`PipelineError::Store`] when the batch is
    /// rejected, in which case nothing was inserted.
    pub async fn commit(
        &self,
        workspace: &str,
        target_set: &str,
        ticket: &str,
        cases: &[GeneratedTestCase],
    ) -> PipelineResult<CommitReport> {
        self.revalidate(ticket, cases)?;

        let mut events = Vec::new();
        let mut resolved: HashMap<&str, CategoryId> = HashMap::new();
        let mut default_id: Option<CategoryId> = None;
        let mut default_category_count = 0;
        let mut rows = Vec::with_capacity(cases.len());

        for case in cases {
            let path = case.section_path.as_str();
            let category_id = match resolved.get(path) {
                Some(id) => *id,
                None => {
                    let segments: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
                    match self.store.ensure_category(workspace, target_set, &segments).await {
                        Ok(id) => {
                            resolved.insert(path, id);
                            id
                        }
                        Err(e) if e.is_category_rejection() => {
                            tracing::warn!(case = %case.id, path, error = %e, "using default category");
                            events.push(FallbackEvent::DefaultCategory {
                                case_id: case.id.clone(),
                                path: path.to_string(),
                                reason: e.to_string(),
                            });
                            default_category_count += 1;
                            match default_id {
                                Some(id) => id,
                                None => {
                                    let name = vec![self.config.commit.default_category.clone()];
                                    let id = self.store.ensure_category(workspace, target_set, &name).await?;
                                    default_id = Some(id);
                                    id
                                }
                            }
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            };
            let body = serde_json::to_value(case)
                .map_err(|e| PipelineError::validation(format!("case {} does not serialize: {e}", case.id)))?;
            rows.push(CaseRow {
                case_number: case.id.clone(),
                category_id,
                title: case.title.clone(),
                body,
            });
        }

        let inserted = self.store.insert_cases(workspace, target_set, rows).await?;
        let report = CommitReport {
            commit_id: Uuid::new_v4(),
            target_set: target_set.to_string(),
            inserted,
            default_category_count,
            events,
        };
        tracing::info!(
            commit = %report.commit_id,
            target_set,
            inserted,
            default_category_count,
            "cases committed"
        );
        Ok(report)
    }
}
