//! Prompt assembly
//!
//! Every prompt ends with an `INPUT:` block holding the JSON the model
//! works on, so the instruction text can change freely without touching
//! the contract.

use crate::llm::Stage;
use serde_json::{json, Value};

/// Marker preceding the JSON input block
pub const INPUT_MARKER: &str = "\nINPUT:\n";

fn render(instructions: &str, shape: &Value, input: &Value) -> String {
    format!(
        "{instructions}\n\nRespond with exactly one JSON object shaped like:\n{shape}\n{INPUT_MARKER}{input}"
    )
}

/// JSON input block of a prompt, if it parses
#[must_use]
pub fn input_of(prompt: &str) -> Option<Value> {
    let (_, tail) = prompt.rsplit_once(INPUT_MARKER)?;
    serde_json::from_str(tail.trim()).ok()
}

/// Claim extraction over the chunk index
#[must_use]
pub fn ir_extraction(chunks: &Value) -> String {
    render(
        "Extract requirement claims from the ticket chunks. Cite every claim with the chunk id \
         and zero-based sentence ids it comes from. Do not invent facts.",
        &json!({
            "actors": [{"text": "...", "chunk_id": "desc", "sentence_ids": [0], "quote": "..."}],
            "entities": [], "flows": [], "rules": [], "non_functional": [],
            "out_of_scope": [], "open_questions": [], "ambiguities": []
        }),
        &json!({ "chunks": chunks }),
    )
}

/// Analysis items from the IR
#[must_use]
pub fn analysis(ir: &Value, context: &[String]) -> String {
    render(
        "Group the requirement into analysis sections. Each item names what must be verified \
         and lists the requirement ids it traces to.",
        &json!({"sections": [{"name": "...", "items": [
            {"title": "...", "details": ["..."], "checks": ["..."], "expected": ["..."], "requirement_ids": ["FLOW-001"]}
        ]}]}),
        &json!({ "ir": ir, "related_context": context }),
    )
}

/// Coverage seeds over the analysis items
#[must_use]
pub fn coverage(items: &Value, reference_columns: &Value) -> String {
    render(
        "Plan test coverage. Every analysis item and every section needs at least one seed; \
         together the seeds must cover the happy, edge, error and permission aspects.",
        &json!({"seeds": [{
            "group": "...", "title": "...", "aspect": "happy|edge|error|permission",
            "category": "happy|negative|boundary", "state": "ok|assume|ask",
            "analysis_ids": ["001.001"], "checks": ["..."], "expected": ["..."], "hints": ["..."],
            "reference_column": null
        }]}),
        &json!({ "items": items, "reference_columns": reference_columns }),
    )
}

/// Backfill seeds for uncovered items and aspects
#[must_use]
pub fn backfill(items: &Value, missing_aspects: &Value) -> String {
    render(
        "Add coverage seeds for the listed analysis items. Include seeds for the missing aspects.",
        &json!({"seeds": [{"group": "...", "title": "...", "aspect": "error", "analysis_ids": ["001.001"]}]}),
        &json!({ "items": items, "missing_aspects": missing_aspects }),
    )
}

/// Test cases for one section's stage-1 entries
#[must_use]
pub fn testcases(section: &str, entries: &Value, language: &str) -> String {
    render(
        &format!(
            "Write one test case per entry of section {section:?} in language {language:?}. \
             Keep each entry id. Give preconditions, concrete steps and exactly one observable \
             expected result."
        ),
        &json!({"cases": [{
            "id": "010.010", "title": "...", "preconditions": ["..."], "steps": ["..."],
            "expected": "...", "priority": "high|medium|low"
        }]}),
        &json!({ "section": section, "entries": entries }),
    )
}

/// Fill entries whose cases came back incomplete
#[must_use]
pub fn supplement(section: &str, entries: &Value, language: &str) -> String {
    render(
        &format!(
            "These entries of section {section:?} have no complete test case yet. Write them \
             in language {language:?}, keeping each entry id."
        ),
        &json!({"cases": [{"id": "010.010", "title": "...", "preconditions": [], "steps": [], "expected": "..."}]}),
        &json!({ "section": section, "entries": entries }),
    )
}

/// Review generated cases against their entries
#[must_use]
pub fn audit(section: &str, entries: &Value, cases: &Value, language: &str) -> String {
    render(
        &format!(
            "Audit the test cases of section {section:?} against their entries. Return every \
             case, corrected where it misses the entry's intent. Language {language:?}."
        ),
        &json!({"cases": [{"id": "010.010", "title": "...", "preconditions": [], "steps": [], "expected": "..."}]}),
        &json!({ "section": section, "entries": entries, "cases": cases }),
    )
}

/// Fix cases that failed the quality gate
#[must_use]
pub fn quality_repair(failing: &Value, language: &str) -> String {
    render(
        &format!(
            "Each case failed the listed quality checks. Return corrected cases with the same \
             ids in language {language:?}."
        ),
        &json!({"cases": [{"id": "010.010", "title": "...", "preconditions": [], "steps": [], "expected": "..."}]}),
        &json!({ "cases": failing }),
    )
}

/// Second attempt after an unusable reply
#[must_use]
pub fn regenerate(stage: Stage, original: &str) -> String {
    format!(
        "Your previous {stage} reply was not a complete JSON object. Answer again with valid \
         JSON only.\n\n{original}"
    )
}

/// Syntax repair of a broken reply
#[must_use]
pub fn repair_syntax(stage: Stage, broken: &str) -> String {
    format!(
        "The following {stage} reply is broken JSON. Return the same content as one valid JSON \
         object without changing its meaning.{INPUT_MARKER}{broken}"
    )
}
