//! Per-section testcase generation
//!
//! For each stage-1 section, in numbering order:
//!
//! 1. baselines for every entry
//! 2. generation call, alignment, one supplement call for incomplete entries
//! 3. quality gate: LLM repair rounds, then deterministic repair, then baseline
//! 4. audit call with the same align/supplement protocol, then the gate again
//!
//! A failed generation or audit call replaces the whole section with its
//! baselines when `force_complete` is set and fails the stage otherwise.
//! Failed supplement and repair calls only skip that step.

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::llm::{prompts, CallTrace, ContractCaller, ContractReply, Stage};
use crate::report::FallbackEvent;
use crate::stage1::{Stage1Plan, Stage1Section};
use crate::testcase::{align, build_baseline, raw_cases, GeneratedTestCase, QualityGate, RawCase};
use serde_json::{json, Value};
use tracing::Instrument;

/// Result of the testcase stage
#[derive(Debug, Clone)]
pub struct TestcaseOutcome {
    /// Final cases in numbering order
    pub cases: Vec<GeneratedTestCase>,
    pub events: Vec<FallbackEvent>,
    pub traces: Vec<CallTrace>,
}

/// Generates gated cases for a stage-1 plan
pub struct TestcaseGenerator<'a> {
    caller: &'a ContractCaller<'a>,
    config: &'a PipelineConfig,
    gate: &'a QualityGate,
    ticket: &'a str,
    language: &'a str,
}

impl std::fmt::Debug for TestcaseGenerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestcaseGenerator")
            .field("ticket", &self.ticket)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Working state of one section
struct SectionRun<'s> {
    section: &'s Stage1Section,
    baselines: Vec<GeneratedTestCase>,
    events: Vec<FallbackEvent>,
    traces: Vec<CallTrace>,
}

impl SectionRun<'_> {
    fn absorb(&mut self, reply: &ContractReply) {
        self.events.extend(reply.trace.events());
        self.traces.push(reply.trace.clone());
    }
}

impl<'a> TestcaseGenerator<'a> {
    #[must_use]
    pub fn new(
        caller: &'a ContractCaller<'a>,
        config: &'a PipelineConfig,
        gate: &'a QualityGate,
        ticket: &'a str,
        language: &'a str,
    ) -> Self {
        Self {
            caller,
            config,
            gate,
            ticket,
            language,
        }
    }

    /// Generate every section of `plan`.
    ///
    /// # Errors
    /// Model failures when `force_complete` is off.
    pub async fn generate(&self, plan: &Stage1Plan) -> PipelineResult<TestcaseOutcome> {
        let mut outcome = TestcaseOutcome {
            cases: Vec::with_capacity(plan.len()),
            events: Vec::new(),
            traces: Vec::new(),
        };

        for section in &plan.sections {
            let mut run = SectionRun {
                section,
                baselines: section
                    .entries
                    .iter()
                    .map(|e| build_baseline(e, self.ticket, self.gate))
                    .collect(),
                events: Vec::new(),
                traces: Vec::new(),
            };
            let span = tracing::info_span!("section", number = %section.number, name = %section.name);
            let result = self.run_section(&mut run).instrument(span).await;
            outcome.traces.append(&mut run.traces);
            match result {
                Ok(cases) => {
                    outcome.events.append(&mut run.events);
                    outcome.cases.extend(cases);
                }
                Err(e) if self.config.testcase.force_complete => {
                    tracing::warn!(section = %section.name, error = %e, "section replaced with baseline cases");
                    outcome.events.append(&mut run.events);
                    outcome.events.push(FallbackEvent::SectionBaseline {
                        section: section.name.clone(),
                        reason: e.to_string(),
                    });
                    outcome.cases.extend(run.baselines);
                }
                Err(e) => return Err(e),
            }
        }

        for case in &outcome.cases {
            if self.gate.api_floor_applies(case) {
                tracing::warn!(case = %case.id, title = %case.title, "API-style step floor applied");
                outcome.events.push(FallbackEvent::ApiStepFloor {
                    case_id: case.id.clone(),
                });
            }
        }
        Ok(outcome)
    }

    async fn run_section(&self, run: &mut SectionRun<'_>) -> PipelineResult<Vec<GeneratedTestCase>> {
        let section = run.section;
        let entries = json!(section.entries);

        let prompt = prompts::testcases(&section.name, &entries, self.language);
        let reply = self.caller.call_json(Stage::Testcase, &prompt, None).await?;
        run.absorb(&reply);
        let fallback = run.baselines.clone();
        let cases = self.fill(run, raw_cases(&reply.value), &fallback, true).await;
        let mut cases = self.gate_section(run, cases).await;

        if self.config.testcase.audit {
            let prompt = prompts::audit(&section.name, &entries, &json!(cases), self.language);
            let reply = self.caller.call_json(Stage::Audit, &prompt, None).await?;
            run.absorb(&reply);
            let audited = self.fill(run, raw_cases(&reply.value), &cases, false).await;
            cases = self.gate_section(run, audited).await;
        }
        Ok(cases)
    }

    /// Align `raw` onto the section's entries, supplement incomplete ones
    /// once, and take `fallback` for whatever is still incomplete.
    async fn fill(
        &self,
        run: &mut SectionRun<'_>,
        raw: Vec<RawCase>,
        fallback: &[GeneratedTestCase],
        record_baseline: bool,
    ) -> Vec<GeneratedTestCase> {
        let section = run.section;
        let entries: Vec<_> = section.entries.iter().collect();
        let mut cases: Vec<Option<GeneratedTestCase>> = align(&entries, raw, self.ticket)
            .into_iter()
            .zip(&entries)
            .zip(&run.baselines)
            .map(|((raw, entry), base)| raw.map(|r| r.into_case(self.ticket, entry, base.priority)))
            .collect();

        let incomplete: Vec<usize> = cases
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.as_ref().is_some_and(GeneratedTestCase::is_complete))
            .map(|(i, _)| i)
            .collect();
        if !incomplete.is_empty() {
            let subset: Vec<_> = incomplete.iter().map(|i| entries[*i]).collect();
            let prompt = prompts::supplement(&section.name, &json!(subset), self.language);
            let supplemented = match self.caller.call_json(Stage::Supplement, &prompt, None).await {
                Ok(reply) => {
                    run.absorb(&reply);
                    run.events.push(FallbackEvent::Supplemented {
                        section: section.name.clone(),
                        entries: subset.len(),
                    });
                    raw_cases(&reply.value)
                }
                Err(e) => {
                    tracing::warn!(section = %section.name, entries = subset.len(), error = %e, "supplement call failed");
                    Vec::new()
                }
            };
            for (slot, raw) in incomplete.iter().zip(align(&subset, supplemented, self.ticket)) {
                let Some(raw) = raw else { continue };
                let case = raw.into_case(self.ticket, entries[*slot], run.baselines[*slot].priority);
                if case.is_complete() {
                    cases[*slot] = Some(case);
                }
            }
        }

        cases
            .into_iter()
            .enumerate()
            .map(|(i, case)| match case {
                Some(case) if case.is_complete() => case,
                _ => {
                    if record_baseline {
                        run.events.push(FallbackEvent::CaseBaseline {
                            case_id: fallback[i].id.clone(),
                            issues: vec!["incomplete after supplement".to_string()],
                        });
                    }
                    fallback[i].clone()
                }
            })
            .collect()
    }

    /// Gate with LLM repair rounds, then deterministic repair, then baseline
    async fn gate_section(&self, run: &mut SectionRun<'_>, mut cases: Vec<GeneratedTestCase>) -> Vec<GeneratedTestCase> {
        let section = run.section;
        for round in 1..=self.config.quality.max_repair_rounds {
            let failing: Vec<usize> = (0..cases.len()).filter(|i| !self.gate.passes(&cases[*i])).collect();
            if failing.is_empty() {
                break;
            }
            let payload: Vec<Value> = failing
                .iter()
                .map(|i| {
                    let issues: Vec<String> = self.gate.check(&cases[*i]).iter().map(ToString::to_string).collect();
                    json!({ "case": cases[*i], "issues": issues })
                })
                .collect();
            let prompt = prompts::quality_repair(&json!(payload), self.language);
            let reply = match self.caller.call_json(Stage::QualityRepair, &prompt, None).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(section = %section.name, round, error = %e, "quality repair call failed");
                    break;
                }
            };
            run.absorb(&reply);
            let subset: Vec<_> = failing.iter().map(|i| &section.entries[*i]).collect();
            for (slot, raw) in failing.iter().zip(align(&subset, raw_cases(&reply.value), self.ticket)) {
                if let Some(raw) = raw {
                    let case = raw.into_case(self.ticket, &section.entries[*slot], cases[*slot].priority);
                    if case.is_complete() {
                        cases[*slot] = case;
                    }
                }
            }
        }

        let mut out = Vec::with_capacity(cases.len());
        for (case, baseline) in cases.into_iter().zip(&run.baselines) {
            let issues = self.gate.check(&case);
            if issues.is_empty() {
                out.push(case);
                continue;
            }
            let repaired = self.gate.repair(&case, baseline);
            if self.gate.passes(&repaired) {
                tracing::debug!(case = %case.id, "case repaired deterministically");
                run.events.push(FallbackEvent::CaseRepaired { case_id: case.id });
                out.push(repaired);
            } else {
                run.events.push(FallbackEvent::CaseBaseline {
                    case_id: case.id,
                    issues: issues.iter().map(ToString::to_string).collect(),
                });
                out.push(baseline.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::llm::RetryPolicy;
    use crate::stage1::Stage1Entry;
    use crate::test_support::{entry, StageScript};
    use pretty_assertions::assert_eq;

    fn plan(entries: Vec<Stage1Entry>) -> Stage1Plan {
        Stage1Plan {
            sections: vec![Stage1Section {
                number: "010".into(),
                name: "Login".into(),
                entries,
            }],
        }
    }

    fn login_plan() -> Stage1Plan {
        plan(vec![
            entry("010.010", "Valid OTP", &["Enter the OTP"], &["Dashboard is shown"]),
            entry("010.020", "Expired OTP", &["Wait 6 minutes"], &["Error message is shown"]),
        ])
    }

    fn good(id: &str, title: &str) -> Value {
        json!({"id": id, "title": title, "preconditions": ["Account exists"],
               "steps": ["Open login", "Enter email", "Enter OTP"], "expected": "Dashboard is shown"})
    }

    async fn run(script: &StageScript, config: &PipelineConfig, plan: &Stage1Plan) -> PipelineResult<TestcaseOutcome> {
        let gate = QualityGate::from_config(&config.quality)?;
        let caller = ContractCaller::new(script, config).with_retry(RetryPolicy::immediate(1));
        TestcaseGenerator::new(&caller, config, &gate, "TCG-1", "en").generate(plan).await
    }

    fn no_audit() -> PipelineConfig {
        let mut config = PipelineConfig::new();
        config.testcase.audit = false;
        config
    }

    #[tokio::test]
    async fn nominal_section_keeps_model_cases() {
        let script = StageScript::default().reply(
            Stage::Testcase,
            json!({"cases": [good("010.020", "Expired OTP"), good("010.010", "Valid OTP")]}),
        );
        let outcome = run(&script, &no_audit(), &login_plan()).await.unwrap();
        assert!(outcome.events.is_empty(), "{:?}", outcome.events);
        let ids: Vec<_> = outcome.cases.iter().map(|c| (c.id.as_str(), c.title.as_str())).collect();
        assert_eq!(ids, vec![("TCG-1.010.010", "Valid OTP"), ("TCG-1.010.020", "Expired OTP")]);
    }

    #[tokio::test]
    async fn audit_replaces_generated_cases() {
        let script = StageScript::default()
            .reply(Stage::Testcase, json!({"cases": [good("010.010", "Valid OTP"), good("010.020", "Expired OTP")]}))
            .reply(Stage::Audit, json!({"cases": [good("010.010", "Valid OTP (audited)")]}));
        let outcome = run(&script, &PipelineConfig::new(), &login_plan()).await.unwrap();
        assert_eq!(outcome.cases[0].title, "Valid OTP (audited)");
        // omitted by the audit and not supplemented: the generated case stays
        assert_eq!(outcome.cases[1].title, "Expired OTP");
        assert_eq!(script.calls_to(Stage::Supplement), 3);
    }

    #[tokio::test]
    async fn missing_cases_are_supplemented() {
        let script = StageScript::default()
            .reply(Stage::Testcase, json!({"cases": [good("010.020", "Expired OTP")]}))
            .reply(Stage::Supplement, json!({"cases": [good("010.010", "Valid OTP")]}));
        let outcome = run(&script, &no_audit(), &login_plan()).await.unwrap();
        assert_eq!(
            outcome.events,
            vec![FallbackEvent::Supplemented {
                section: "Login".into(),
                entries: 1
            }]
        );
        assert_eq!(outcome.cases[0].preconditions, vec!["Account exists"]);
    }

    #[tokio::test]
    async fn failing_cases_are_repaired_deterministically() {
        let thin = json!({"id": "010.010", "title": "Valid OTP", "steps": ["Enter OTP"], "expected": "Dashboard is shown"});
        let script = StageScript::default()
            .reply(Stage::Testcase, json!({"cases": [thin, good("010.020", "Expired OTP")]}));
        let outcome = run(&script, &no_audit(), &login_plan()).await.unwrap();
        assert_eq!(
            outcome.events,
            vec![FallbackEvent::CaseRepaired {
                case_id: "TCG-1.010.010".into()
            }]
        );
        let gate = QualityGate::from_config(&PipelineConfig::new().quality).unwrap();
        assert!(outcome.cases.iter().all(|c| gate.passes(c)));
        assert_eq!(outcome.cases[0].steps[0], "Enter OTP");
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_baselines() {
        let script = StageScript::default();
        let outcome = run(&script, &no_audit(), &login_plan()).await.unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].name(), "section_baseline");
        assert_eq!(outcome.cases.len(), 2);
        assert!(outcome.cases[0].steps.contains(&"Enter the OTP".to_string()));

        let mut strict = no_audit();
        strict.testcase.force_complete = false;
        let err = run(&StageScript::default(), &strict, &login_plan()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[tokio::test]
    async fn api_step_floor_is_flagged() {
        let script = StageScript::default().reply(
            Stage::Testcase,
            json!({"cases": [{"id": "010.010", "title": "Login API rejects expired OTP", "preconditions": ["OTP issued"],
                   "steps": ["POST /login with the OTP", "Read the response"], "expected": "Response status is 401"}]}),
        );
        let p = plan(vec![entry("010.010", "Login API rejects expired OTP", &[], &[])]);
        let outcome = run(&script, &no_audit(), &p).await.unwrap();
        assert_eq!(
            outcome.events,
            vec![FallbackEvent::ApiStepFloor {
                case_id: "TCG-1.010.010".into()
            }]
        );
        assert_eq!(outcome.cases[0].steps.len(), 2);
    }
}
