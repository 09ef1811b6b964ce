//! Session workflow
//!
//! Drives one session through its phases. Every operation:
//!
//! 1. enters its phase through [`PhaseMachine`] (illegal transitions are
//!    rejected before anything runs)
//! 2. runs the stage inside a tracing span
//! 3. writes the phase draft with its fallback events
//! 4. marks the phase completed, or records the failure and returns it
//!
//! Drafts of earlier phases are never touched by a failing stage.

use crate::analysis::{AnalysisGenerator, AnalysisItem, CoverageSeed};
use crate::commit::{CommitAdapter, CommitReport};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::external::{ContextSearch, TicketTracker};
use crate::ir::{IrBuilder, LinkRef, TicketSources};
use crate::keywords::Keywords;
use crate::llm::{CallTrace, ContractCaller, ModelClient, RetryPolicy};
use crate::report::StageReport;
use crate::stage1::{assemble, Stage1Plan};
use crate::testcase::{GeneratedTestCase, QualityGate, TestcaseGenerator};
use casegen_kernel::{
    CaseStore, Draft, LocaleSettings, Phase, PhaseMachine, Session, SessionKey, SessionStore,
    TransitionMode,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// The pipeline bound to its collaborators
pub struct Workflow {
    sessions: Arc<dyn SessionStore>,
    cases: Arc<dyn CaseStore>,
    model: Arc<dyn ModelClient>,
    tracker: Arc<dyn TicketTracker>,
    context: Option<ContextSearch>,
    config: PipelineConfig,
    keywords: Keywords,
    gate: QualityGate,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("context", &self.context)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn absorb(report: &mut StageReport, traces: &[CallTrace]) {
    for trace in traces {
        report.calls += trace.calls;
        report.usage += trace.usage;
        report.cost += trace.cost;
    }
}

fn payload_field<T: DeserializeOwned>(draft: &Draft, field: &str) -> PipelineResult<T> {
    let value = draft
        .payload
        .get(field)
        .cloned()
        .ok_or_else(|| PipelineError::validation(format!("{} draft has no {field}", draft.phase)))?;
    serde_json::from_value(value)
        .map_err(|e| PipelineError::validation(format!("{} draft field {field}: {e}", draft.phase)))
}

impl Workflow {
    /// Validate `config` and bind the collaborators.
    ///
    /// # Errors
    /// [`PipelineError::Config`] for an invalid configuration.
    pub fn new(
        config: PipelineConfig,
        sessions: Arc<dyn SessionStore>,
        cases: Arc<dyn CaseStore>,
        model: Arc<dyn ModelClient>,
        tracker: Arc<dyn TicketTracker>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            keywords: Keywords::from_config(&config.keywords)?,
            gate: QualityGate::from_config(&config.quality)?,
            retry: RetryPolicy::from_config(&config.retry),
            sessions,
            cases,
            model,
            tracker,
            context: None,
            config,
        })
    }

    /// Builder: related-snippet lookup for the analysis prompt
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: ContextSearch) -> Self {
        self.context = Some(context);
        self
    }

    /// Builder: override the retry policy for every outbound call
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn caller(&self) -> ContractCaller<'_> {
        ContractCaller::new(self.model.as_ref(), &self.config).with_retry(self.retry.clone())
    }

    /// Create a session for `ticket_key` in `Init`.
    ///
    /// # Errors
    /// [`PipelineError::Validation`] for a blank ticket or target set.
    pub async fn start(
        &self,
        workspace: &str,
        ticket_key: &str,
        target_set: &str,
        locale: LocaleSettings,
    ) -> PipelineResult<Session> {
        if ticket_key.trim().is_empty() || target_set.trim().is_empty() {
            return Err(PipelineError::validation("ticket key and target set are required"));
        }
        let session = Session::new(SessionKey::generate(workspace), ticket_key.trim(), target_set.trim(), locale);
        self.sessions.create_session(session.clone()).await?;
        tracing::info!(session = %session.key, ticket = %session.ticket_key, "session started");
        Ok(session)
    }

    /// Current session row.
    ///
    /// # Errors
    /// Store failures.
    pub async fn session(&self, key: &SessionKey) -> PipelineResult<Session> {
        Ok(self.sessions.load_session(key).await?)
    }

    /// Latest draft of `phase`, if any.
    ///
    /// # Errors
    /// Store failures.
    pub async fn draft(&self, key: &SessionKey, phase: Phase) -> PipelineResult<Option<Draft>> {
        Ok(self.sessions.get_draft(key, phase).await?)
    }

    /// Cancel the session; checked transitions are refused afterwards.
    ///
    /// # Errors
    /// Store failures.
    pub async fn cancel(&self, key: &SessionKey) -> PipelineResult<Session> {
        Ok(PhaseMachine::new(self.sessions.as_ref()).cancel(key).await?)
    }

    async fn require_draft(&self, key: &SessionKey, phase: Phase) -> PipelineResult<Draft> {
        self.sessions
            .get_draft(key, phase)
            .await?
            .ok_or_else(|| PipelineError::validation(format!("no {phase} draft for session {key}")))
    }

    async fn write_draft(
        &self,
        key: &SessionKey,
        draft: Draft,
        report: &mut StageReport,
    ) -> PipelineResult<()> {
        let draft = draft.with_events(report.event_values());
        let stored = self.sessions.put_draft(key, draft).await?;
        report.draft_version = stored.version;
        Ok(())
    }

    /// Enter `phase`, run `stage`, then complete or record the failure
    async fn run_stage<T>(
        &self,
        key: &SessionKey,
        phase: Phase,
        mode: TransitionMode,
        stage: impl Future<Output = PipelineResult<T>>,
    ) -> PipelineResult<T> {
        let machine = PhaseMachine::new(self.sessions.as_ref());
        machine.enter(key, phase, mode).await?;
        let span = tracing::info_span!("stage", session = %key, %phase);
        match stage.instrument(span).await {
            Ok(value) => {
                machine.complete(key).await?;
                Ok(value)
            }
            Err(err) => {
                machine.fail(key, &err.to_string()).await?;
                Err(err)
            }
        }
    }

    /// Fetch the ticket and write the requirement draft. Always resets the
    /// session to `Requirement`.
    ///
    /// # Errors
    /// Tracker failures after retries; an empty requirement.
    pub async fn fetch_requirement(&self, key: &SessionKey) -> PipelineResult<StageReport> {
        self.run_stage(key, Phase::Requirement, TransitionMode::Administrative, self.fetch_stage(key))
            .await
    }

    async fn fetch_stage(&self, key: &SessionKey) -> PipelineResult<StageReport> {
        let session = self.sessions.load_session(key).await?;
        let ticket = session.ticket_key.as_str();
        let ac_field = self.config.ir.acceptance_criteria_field.as_str();
        let fields = TicketSources::fields(ac_field);

        let issue = self
            .retry
            .run("get_issue", || self.tracker.get_issue(ticket, &fields))
            .await
            .map_err(|e| PipelineError::transport("tracker", e))?;
        let mut sources = TicketSources::from_issue(&issue, ac_field);

        let limit = self.config.context.related_issue_limit;
        if limit > 0 {
            let query = format!("issue in linkedIssues(\"{ticket}\")");
            match self.tracker.search_issues(&query, &["summary"], limit).await {
                Ok(related) => {
                    for issue in related.into_iter().filter(|i| i.key != ticket) {
                        sources.push_link(LinkRef {
                            relation: "relates to".to_string(),
                            summary: issue.text("summary"),
                            key: issue.key,
                        });
                    }
                }
                Err(e) => tracing::warn!(ticket, error = %e, "related issue search failed"),
            }
        }

        let requirement = sources.requirement_text();
        if requirement.trim().is_empty() {
            return Err(PipelineError::validation(format!("ticket {ticket} has no requirement text")));
        }

        let mut report = StageReport::new(Phase::Requirement);
        let draft = Draft::new(Phase::Requirement, Some(requirement), json!({ "sources": sources }))
            .with_quality(json!({ "links": sources.links.len(), "comments": sources.comments.len() }));
        self.write_draft(key, draft, &mut report).await?;
        Ok(report)
    }

    /// Replace the requirement text by hand.
    ///
    /// # Errors
    /// [`PipelineError::Validation`] for blank text or an illegal transition.
    pub async fn revise_requirement(&self, key: &SessionKey, text: &str) -> PipelineResult<StageReport> {
        if text.trim().is_empty() {
            return Err(PipelineError::validation("requirement text is empty"));
        }
        self.run_stage(key, Phase::Requirement, TransitionMode::Checked, async {
            let session = self.sessions.load_session(key).await?;
            let sources = match self.sessions.get_draft(key, Phase::Requirement).await? {
                Some(draft) => payload_field::<TicketSources>(&draft, "sources")?,
                None => {
                    let mut sources = TicketSources::default();
                    sources.meta.key = session.ticket_key.clone();
                    sources
                }
            };
            let mut report = StageReport::new(Phase::Requirement);
            let draft = Draft::new(Phase::Requirement, Some(text.trim().to_string()), json!({ "sources": sources }))
                .with_quality(json!({ "revised": true }));
            self.write_draft(key, draft, &mut report).await?;
            Ok(report)
        })
        .await
    }

    /// Build the IR, analysis items and complete coverage seeds.
    ///
    /// # Errors
    /// See [`AnalysisGenerator::generate`].
    pub async fn run_analysis(&self, key: &SessionKey) -> PipelineResult<StageReport> {
        self.run_stage(key, Phase::Analysis, TransitionMode::Checked, self.analysis_stage(key))
            .await
    }

    async fn analysis_stage(&self, key: &SessionKey) -> PipelineResult<StageReport> {
        let requirement = self.require_draft(key, Phase::Requirement).await?;
        let sources: TicketSources = payload_field(&requirement, "sources")?;
        let text = requirement.text.clone().unwrap_or_default();

        let caller = self.caller();
        let build = IrBuilder::new(&self.config, &self.keywords)
            .with_caller(&caller)
            .build(&sources, &text)
            .await?;
        let context = match &self.context {
            Some(search) => search.related(&text).await,
            None => Vec::new(),
        };
        let outcome = AnalysisGenerator::new(&caller, &self.config, &self.keywords)
            .generate(&build.ir, &context)
            .await?;

        let mut report = StageReport::new(Phase::Analysis);
        report.events.extend(build.events);
        report.events.extend(outcome.events);
        absorb(&mut report, build.trace.as_slice());
        absorb(&mut report, &outcome.traces);

        let (covered, ignored) = build.ir.coverage_counts();
        let quality = json!({
            "claims": build.ir.claims.len(),
            "sentences": { "covered": covered, "ignored": ignored },
            "items": outcome.items.len(),
            "seeds": outcome.seeds.len(),
            "gap": outcome.gap,
        });
        let payload = json!({
            "ir": build.ir,
            "items": outcome.items,
            "seeds": outcome.seeds,
            "context": context,
        });
        self.write_draft(key, Draft::new(Phase::Analysis, None, payload).with_quality(quality), &mut report)
            .await?;
        tracing::info!(session = %key, items = outcome.items.len(), seeds = outcome.seeds.len(), events = report.events.len(), "analysis stored");
        Ok(report)
    }

    /// Number the seeds into the stage-1 plan.
    ///
    /// # Errors
    /// A missing analysis draft; seeds referring to unknown items.
    pub async fn run_pretestcase(&self, key: &SessionKey) -> PipelineResult<StageReport> {
        self.run_stage(key, Phase::Pretestcase, TransitionMode::Checked, async {
            let analysis = self.require_draft(key, Phase::Analysis).await?;
            let items: Vec<AnalysisItem> = payload_field(&analysis, "items")?;
            let seeds: Vec<CoverageSeed> = payload_field(&analysis, "seeds")?;
            let plan = assemble(&items, &seeds, &self.config.numbering)?;

            let mut report = StageReport::new(Phase::Pretestcase);
            let quality = json!({ "sections": plan.sections.len(), "entries": plan.len() });
            let draft = Draft::new(Phase::Pretestcase, None, json!({ "plan": plan })).with_quality(quality);
            self.write_draft(key, draft, &mut report).await?;
            Ok(report)
        })
        .await
    }

    /// Generate, audit and gate cases for every stage-1 section.
    ///
    /// # Errors
    /// See [`TestcaseGenerator::generate`].
    pub async fn run_testcases(&self, key: &SessionKey) -> PipelineResult<StageReport> {
        self.run_stage(key, Phase::Testcase, TransitionMode::Checked, self.testcase_stage(key))
            .await
    }

    async fn testcase_stage(&self, key: &SessionKey) -> PipelineResult<StageReport> {
        let session = self.sessions.load_session(key).await?;
        let pretestcase = self.require_draft(key, Phase::Pretestcase).await?;
        let plan: Stage1Plan = payload_field(&pretestcase, "plan")?;

        let caller = self.caller();
        let outcome = TestcaseGenerator::new(
            &caller,
            &self.config,
            &self.gate,
            &session.ticket_key,
            &session.locale.output_language,
        )
        .generate(&plan)
        .await?;

        let mut report = StageReport::new(Phase::Testcase);
        report.events = outcome.events;
        absorb(&mut report, &outcome.traces);
        let quality = json!({
            "cases": outcome.cases.len(),
            "baseline_sections": report.baseline_sections(),
            "passing": outcome.cases.iter().filter(|c| self.gate.passes(c)).count(),
        });
        let draft = Draft::new(Phase::Testcase, None, json!({ "cases": outcome.cases })).with_quality(quality);
        self.write_draft(key, draft, &mut report).await?;
        Ok(report)
    }

    /// Revalidate and persist the cases; completes the session.
    ///
    /// # Errors
    /// Validation failures; store rejections, which insert nothing.
    pub async fn commit(&self, key: &SessionKey) -> PipelineResult<(StageReport, CommitReport)> {
        self.run_stage(key, Phase::Commit, TransitionMode::Checked, async {
            let session = self.sessions.load_session(key).await?;
            let testcases = self.require_draft(key, Phase::Testcase).await?;
            let cases: Vec<GeneratedTestCase> = payload_field(&testcases, "cases")?;

            let commit = CommitAdapter::new(self.cases.as_ref(), &self.gate, &self.config)
                .commit(&key.workspace, &session.target_set, &session.ticket_key, &cases)
                .await?;

            let mut report = StageReport::new(Phase::Commit);
            report.events.clone_from(&commit.events);
            let payload: Value = json!({ "report": commit });
            let quality = json!({ "inserted": commit.inserted, "default_category": commit.default_category_count });
            self.write_draft(key, Draft::new(Phase::Commit, None, payload).with_quality(quality), &mut report)
                .await?;
            Ok((report, commit))
        })
        .await
    }

    /// Fetch through commit in one call; stops at the first failure.
    ///
    /// # Errors
    /// The first stage failure.
    pub async fn run_to_commit(&self, key: &SessionKey) -> PipelineResult<(Vec<StageReport>, CommitReport)> {
        let mut reports = vec![self.fetch_requirement(key).await?];
        reports.push(self.run_analysis(key).await?);
        reports.push(self.run_pretestcase(key).await?);
        reports.push(self.run_testcases(key).await?);
        let (report, commit) = self.commit(key).await?;
        reports.push(report);
        Ok((reports, commit))
    }
}
