//! Analysis stage driver
//!
//! analysis call → coverage call → normalize → backfill rounds →
//! deterministic synthesis. Output always passes [`check_coverage`] or the
//! stage fails with [`PipelineError::Completeness`].

use crate::analysis::completeness::{check_coverage, CoverageGap};
use crate::analysis::payload::{seeds_from_value, AnalysisPayload};
use crate::analysis::seeds::SeedNormalizer;
use crate::analysis::synthesis::{deterministic_analysis, synthesize_seeds};
use crate::analysis::{AnalysisItem, CoverageSeed};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::ir::RequirementIr;
use crate::keywords::Keywords;
use crate::llm::{prompts, CallTrace, ContractCaller, ContractReply, Stage};
use crate::report::FallbackEvent;
use futures::future::join_all;
use serde_json::{json, Value};

/// Result of the analysis stage
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub items: Vec<AnalysisItem>,
    pub seeds: Vec<CoverageSeed>,
    /// Final gap, empty on success
    pub gap: CoverageGap,
    pub events: Vec<FallbackEvent>,
    pub traces: Vec<CallTrace>,
}

/// Events and traces collected while the stage runs
#[derive(Debug, Default)]
struct Ledger {
    events: Vec<FallbackEvent>,
    traces: Vec<CallTrace>,
}

impl Ledger {
    fn absorb(&mut self, reply: &ContractReply) {
        self.events.extend(reply.trace.events());
        self.traces.push(reply.trace.clone());
    }
}

fn empty_seeds() -> Option<Value> {
    Some(json!({ "seeds": [] }))
}

/// Produces analysis items and complete coverage seeds
pub struct AnalysisGenerator<'a> {
    caller: &'a ContractCaller<'a>,
    config: &'a PipelineConfig,
    keywords: &'a Keywords,
}

impl std::fmt::Debug for AnalysisGenerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisGenerator").finish_non_exhaustive()
    }
}

impl<'a> AnalysisGenerator<'a> {
    #[must_use]
    pub fn new(caller: &'a ContractCaller<'a>, config: &'a PipelineConfig, keywords: &'a Keywords) -> Self {
        Self {
            caller,
            config,
            keywords,
        }
    }

    /// Run the stage.
    ///
    /// # Errors
    /// Analysis call failures when the deterministic fallback is disabled;
    /// [`PipelineError::Completeness`] when gaps survive every round.
    pub async fn generate(&self, ir: &RequirementIr, context: &[String]) -> PipelineResult<AnalysisOutcome> {
        let mut ledger = Ledger::default();
        let items = self.items(ir, context, &mut ledger).await?;
        let normalizer = SeedNormalizer::new(&items, ir, self.keywords);

        let prompt = prompts::coverage(&json!(items), &json!(ir.reference_columns));
        let raw = match self.caller.call_json(Stage::Coverage, &prompt, empty_seeds()).await {
            Ok(reply) => {
                ledger.absorb(&reply);
                seeds_from_value(&reply.value)
            }
            Err(e) if self.config.coverage.deterministic_backfill => {
                tracing::warn!(error = %e, "coverage call failed, continuing with backfill");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let mut seeds = normalizer.normalize(raw);

        for round in 1..=self.config.coverage.backfill_max_rounds {
            let gap = check_coverage(&items, &seeds);
            if gap.is_complete() {
                break;
            }
            let before = seeds.len();
            let (batches, replies) = self.backfill_round(&items, &gap).await;
            let mut added = Vec::new();
            for reply in replies {
                ledger.absorb(&reply);
                added.extend(seeds_from_value(&reply.value));
            }
            seeds.extend(added);
            seeds = normalizer.normalize(seeds);
            let seeds_added = seeds.len().saturating_sub(before);
            tracing::info!(round, batches, seeds_added, "backfill round");
            ledger.events.push(FallbackEvent::BackfillRound {
                round,
                batches,
                seeds_added,
            });
        }

        let mut gap = check_coverage(&items, &seeds);
        if !gap.is_complete() && self.config.coverage.deterministic_backfill {
            let synthesized = synthesize_seeds(&items, &seeds, &gap, self.keywords);
            tracing::info!(seeds = synthesized.len(), %gap, "closing coverage gap deterministically");
            ledger.events.push(FallbackEvent::DeterministicBackfill {
                seeds: synthesized.len(),
            });
            seeds.extend(synthesized);
            seeds = normalizer.normalize(seeds);
            gap = check_coverage(&items, &seeds);
        }
        if !gap.is_complete() {
            return Err(PipelineError::Completeness(gap.to_string()));
        }

        Ok(AnalysisOutcome {
            items,
            seeds,
            gap,
            events: ledger.events,
            traces: ledger.traces,
        })
    }

    async fn items(
        &self,
        ir: &RequirementIr,
        context: &[String],
        ledger: &mut Ledger,
    ) -> PipelineResult<Vec<AnalysisItem>> {
        let prompt = prompts::analysis(&json!(ir), context);
        let reason = match self.caller.call_json(Stage::Analysis, &prompt, None).await {
            Ok(reply) => {
                ledger.absorb(&reply);
                let items = AnalysisPayload::from_value(&reply.value).into_items(ir);
                if !items.is_empty() {
                    return Ok(items);
                }
                "analysis returned no items".to_string()
            }
            Err(e) if self.config.coverage.analysis_fallback => e.to_string(),
            Err(e) => return Err(e),
        };
        if !self.config.coverage.analysis_fallback {
            return Err(PipelineError::Completeness(reason));
        }
        tracing::warn!(ticket = %ir.meta.key, %reason, "using deterministic analysis");
        ledger.events.push(FallbackEvent::DeterministicAnalysis { reason });
        Ok(deterministic_analysis(ir))
    }

    /// Backfill calls over uncovered items, or over all items when only
    /// sections or aspects are missing. Failed batches are skipped.
    async fn backfill_round(&self, items: &[AnalysisItem], gap: &CoverageGap) -> (usize, Vec<ContractReply>) {
        let targets: Vec<&AnalysisItem> = if gap.missing_ids.is_empty() {
            items.iter().collect()
        } else {
            items.iter().filter(|i| gap.missing_ids.contains(&i.id)).collect()
        };
        let aspects = json!(gap.missing_aspects);
        let prompts: Vec<String> = targets
            .chunks(self.config.coverage.backfill_batch_size.max(1))
            .map(|batch| prompts::backfill(&json!(batch), &aspects))
            .collect();
        let batches = prompts.len();

        let results = join_all(
            prompts
                .iter()
                .map(|p| self.caller.call_json(Stage::Backfill, p, empty_seeds())),
        )
        .await;
        let replies = results
            .into_iter()
            .filter_map(|r| match r {
                Ok(reply) => Some(reply),
                Err(e) => {
                    tracing::warn!(error = %e, "backfill batch failed");
                    None
                }
            })
            .collect();
        (batches, replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Aspect;
    use crate::llm::RetryPolicy;
    use crate::test_support::{ir_with, StageScript};
    use pretty_assertions::assert_eq;

    async fn run(script: &StageScript, config: &PipelineConfig) -> PipelineResult<AnalysisOutcome> {
        let keywords = Keywords::from_config(&config.keywords)?;
        let caller = ContractCaller::new(script, config).with_retry(RetryPolicy::immediate(1));
        AnalysisGenerator::new(&caller, config, &keywords)
            .generate(&ir_with(&["FLOW-001"]), &[])
            .await
    }

    fn analysis_reply() -> Value {
        json!({"sections": [{"name": "Login", "items": [
            {"title": "User logs in with OTP", "requirement_ids": ["FLOW-001"]}
        ]}]})
    }

    #[tokio::test]
    async fn model_coverage_passes_without_fallbacks() {
        let seeds: Vec<Value> = Aspect::ALL
            .iter()
            .map(|a| json!({"title": format!("OTP {a}"), "aspect": a.as_str(), "analysis_ids": ["001.001"]}))
            .collect();
        let script = StageScript::default()
            .reply(Stage::Analysis, analysis_reply())
            .reply(Stage::Coverage, json!({ "seeds": seeds }));
        let outcome = run(&script, &PipelineConfig::new()).await.unwrap();

        assert!(outcome.events.is_empty());
        assert_eq!(outcome.seeds.len(), 4);
        assert!(outcome.gap.is_complete());
        assert_eq!(script.calls_to(Stage::Backfill), 0);
    }

    #[tokio::test]
    async fn backfill_rounds_add_missing_aspects() {
        let script = StageScript::default()
            .reply(Stage::Analysis, analysis_reply())
            .reply(Stage::Coverage, json!({"seeds": [{"title": "Valid OTP", "analysis_ids": ["001.001"]}]}))
            .reply(
                Stage::Backfill,
                json!({"seeds": [
                    {"title": "Wrong OTP", "aspect": "error", "analysis_ids": ["001.001"]},
                    {"title": "Six digit limit", "aspect": "edge", "analysis_ids": ["001.001"]},
                    {"title": "Locked account", "aspect": "permission", "analysis_ids": ["001.001"]}
                ]}),
            );
        let outcome = run(&script, &PipelineConfig::new()).await.unwrap();

        assert_eq!(
            outcome.events,
            vec![FallbackEvent::BackfillRound {
                round: 1,
                batches: 1,
                seeds_added: 3
            }]
        );
        assert_eq!(outcome.seeds.len(), 4);
    }

    #[tokio::test]
    async fn silent_model_degrades_to_deterministic_output() {
        let script = StageScript::default();
        let outcome = run(&script, &PipelineConfig::new()).await.unwrap();

        let names: Vec<_> = outcome.events.iter().map(FallbackEvent::name).collect();
        assert_eq!(names[0], "deterministic_analysis");
        assert!(names.contains(&"syntax_repaired"));
        assert!(names.contains(&"empty_payload_substituted"));
        assert_eq!(names.last(), Some(&"deterministic_backfill"));
        assert!(outcome.gap.is_complete());
        assert_eq!(outcome.items[0].requirement_ids, vec!["FLOW-001"]);
    }

    #[tokio::test]
    async fn gaps_fail_the_stage_without_synthesis() {
        let mut config = PipelineConfig::new();
        config.coverage.deterministic_backfill = false;
        config.coverage.backfill_max_rounds = 1;
        let script = StageScript::default().reply(Stage::Analysis, analysis_reply());
        let err = run(&script, &config).await.unwrap_err();
        assert!(matches!(err, PipelineError::Completeness(_)));
    }
}
