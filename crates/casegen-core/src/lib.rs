//! casegen core - ticket to test case pipeline
//!
//! Turns a tracker ticket into committed test cases:
//! - fetches the ticket and builds a cited requirement IR
//! - asks the model for analysis items and coverage seeds, backfilling
//!   until every item, section and aspect is covered
//! - numbers the seeds into a stage-1 plan
//! - generates, audits and quality-gates test cases per section
//! - revalidates and commits the cases atomically
//!
//! Every model call goes through [`ContractCaller`], which repairs or
//! regenerates malformed JSON and records what it had to do.
//!
//! # Example
//!
//! ```rust,ignore
//! use casegen_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example(model: Arc<dyn ModelClient>, tracker: Arc<dyn TicketTracker>) -> PipelineResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let workflow = Workflow::new(PipelineConfig::new(), store.clone(), store, model, tracker)?;
//!
//! let session = workflow.start("ws", "TCG-1", "regression", LocaleSettings::default()).await?;
//! let (reports, commit) = workflow.run_to_commit(&session.key).await?;
//! println!("{} cases committed after {} stages", commit.inserted, reports.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Pipeline stages
pub mod analysis;
pub mod commit;
pub mod ir;
pub mod stage1;
pub mod testcase;
pub mod workflow;

// Plumbing
pub mod config;
pub mod error;
pub mod external;
pub mod keywords;
pub mod llm;
pub mod payload;
pub mod report;
pub mod telemetry;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use analysis::{
    AnalysisGenerator, AnalysisItem, AnalysisOutcome, Aspect, Category, CoverageGap, CoverageSeed,
    SeedState,
};
pub use commit::{CommitAdapter, CommitReport};
pub use config::{
    CommitConfig, ContextConfig, CoverageConfig, IrConfig, KeywordConfig, ModelsConfig,
    NumberingConfig, PipelineConfig, QualityConfig, RetryConfig, StageModelConfig, TestcaseConfig,
};
pub use error::{PipelineError, PipelineResult};
pub use external::{
    ContextSearch, Embedder, ExternalError, Issue, TicketTracker, VectorHit, VectorSearch,
};
pub use ir::{IrBuilder, RequirementIr, TicketSources};
pub use keywords::{KeywordSet, Keywords};
pub use llm::{
    CallTrace, ContractCaller, ContractReply, HttpModelClient, ModelClient, ModelError,
    ModelRequest, ModelResponse, RetryPolicy, Stage, Usage,
};
pub use report::{FallbackEvent, StageReport};
pub use stage1::{Stage1Entry, Stage1Plan, Stage1Section};
pub use testcase::{GeneratedTestCase, Priority, QualityGate, QualityIssue, TestcaseGenerator};
pub use workflow::Workflow;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the pipeline
    pub use crate::{
        GeneratedTestCase, ModelClient, PipelineConfig, PipelineError, PipelineResult,
        StageReport, TicketTracker, Workflow,
    };
    pub use casegen_kernel::{LocaleSettings, MemoryStore, Phase, SessionKey, SessionStatus};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
