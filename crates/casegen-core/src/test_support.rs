//! Shared fixtures for unit tests

use crate::analysis::{item_id, AnalysisItem, Aspect, Category, SeedState};
use crate::stage1::Stage1Entry;
use crate::ir::{Citation, Claim, ClaimKind, IrSource, RequirementIr, TicketMeta};
use crate::llm::{ModelClient, ModelError, ModelRequest, ModelResponse, Stage};

/// IR holding flow claims with the given ids
pub(crate) fn ir_with(ids: &[&str]) -> RequirementIr {
    RequirementIr {
        meta: TicketMeta {
            key: "TCG-1".into(),
            ..TicketMeta::default()
        },
        source: IrSource::Model,
        chunks: Vec::new(),
        claims: ids
            .iter()
            .map(|id| Claim {
                id: (*id).to_string(),
                kind: ClaimKind::Flow,
                text: (*id).to_string(),
                citation: Citation {
                    chunk_id: "desc".into(),
                    sentence_ids: vec![],
                    quote: String::new(),
                },
            })
            .collect(),
        coverage: Vec::new(),
        tables: Vec::new(),
        reference_columns: Vec::new(),
        format_markers: Vec::new(),
        scenarios: Vec::new(),
    }
}

/// Item `s.n` in `section`
pub(crate) fn item(s: usize, n: usize, section: &str, title: &str) -> AnalysisItem {
    AnalysisItem {
        id: item_id(s, n),
        section: section.to_string(),
        title: title.to_string(),
        details: Vec::new(),
        checks: vec![format!("Check {title}")],
        expected: vec![format!("{title} is shown")],
        requirement_ids: Vec::new(),
    }
}

/// Replies queued per stage; an exhausted queue answers with an empty reply
#[derive(Default)]
pub(crate) struct StageScript {
    replies: std::sync::Mutex<std::collections::HashMap<Stage, std::collections::VecDeque<String>>>,
    pub(crate) calls: std::sync::Mutex<Vec<Stage>>,
}

impl StageScript {
    pub(crate) fn reply(self, stage: Stage, content: serde_json::Value) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(content.to_string());
        self
    }

    pub(crate) fn calls_to(&self, stage: Stage) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| **s == stage).count()
    }
}

#[async_trait::async_trait]
impl ModelClient for StageScript {
    async fn call(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.calls.lock().unwrap().push(request.stage);
        let content = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&request.stage)
            .and_then(std::collections::VecDeque::pop_front)
            .unwrap_or_default();
        Ok(ModelResponse::text(content))
    }
}

/// Error-aspect entry `id` in section "Login"
pub(crate) fn entry(id: &str, title: &str, checks: &[&str], expected: &[&str]) -> Stage1Entry {
    let (section_no, test_no) = id.split_once('.').unwrap_or((id, id));
    Stage1Entry {
        id: id.into(),
        section_no: section_no.into(),
        test_no: test_no.into(),
        section: "Login".into(),
        title: title.into(),
        aspect: Aspect::Error,
        category: Category::Negative,
        state: SeedState::Ok,
        analysis_ids: vec!["001.001".into()],
        requirement_ids: vec![],
        details: vec![],
        checks: checks.iter().map(|s| (*s).to_string()).collect(),
        expected: expected.iter().map(|s| (*s).to_string()).collect(),
        hints: vec![],
        reference_column: None,
    }
}
