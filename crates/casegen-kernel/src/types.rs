//! Session and draft types
//!
//! A session is owned by exactly one workflow instance and only changes
//! through phase-transition operations. Drafts are versioned per phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique session identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Ulid);

impl SessionId {
    /// Generate new session ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store key for a session: (workspace, session id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Owning workspace
    pub workspace: String,
    /// Session within the workspace
    pub session_id: SessionId,
}

impl SessionKey {
    /// Create a key for a fresh session in `workspace`
    #[inline]
    #[must_use]
    pub fn generate(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            session_id: SessionId::new(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.workspace, self.session_id)
    }
}

/// Pipeline phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Session created, nothing fetched
    Init,
    /// Requirement text captured from the ticket
    Requirement,
    /// IR, analysis items and coverage seeds
    Analysis,
    /// Stage-1 numbered entries
    Pretestcase,
    /// Generated and audited test cases
    Testcase,
    /// Cases written to the target store
    Commit,
    /// Unrecoverable; only left for recovery
    Failed,
}

impl Phase {
    /// All phases in pipeline order
    pub const ALL: [Phase; 7] = [
        Phase::Init,
        Phase::Requirement,
        Phase::Analysis,
        Phase::Pretestcase,
        Phase::Testcase,
        Phase::Commit,
        Phase::Failed,
    ];

    /// Stable lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Requirement => "requirement",
            Phase::Analysis => "analysis",
            Phase::Pretestcase => "pretestcase",
            Phase::Testcase => "testcase",
            Phase::Commit => "commit",
            Phase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Entered, handler not started
    Pending,
    /// Handler running
    Running,
    /// Handler finished and its checks passed
    Completed,
    /// Handler failed; phase left in place for retry
    Failed,
}

/// Overall session status, tracked orthogonally to the phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// In progress
    Active,
    /// Commit completed
    Completed,
    /// Last stage failed
    Failed,
    /// Abandoned by the caller
    Cancelled,
}

impl SessionStatus {
    /// Whether checked transitions are refused in this status
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

/// Locale settings for generated text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleSettings {
    /// Language test cases are written in
    pub output_language: String,
    /// Language of the ticket, when known
    pub source_language: Option<String>,
}

impl Default for LocaleSettings {
    fn default() -> Self {
        Self {
            output_language: "en".to_string(),
            source_language: None,
        }
    }
}

/// A generation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Store key
    pub key: SessionKey,
    /// Source ticket (e.g. "TCG-1")
    pub ticket_key: String,
    /// Target case set in the external store
    pub target_set: String,
    /// Locale settings
    pub locale: LocaleSettings,
    /// Current phase
    pub phase: Phase,
    /// Progress of the current phase
    pub phase_status: PhaseStatus,
    /// Overall status
    pub status: SessionStatus,
    /// Message from the last failed stage
    pub last_error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session in `Init`
    #[must_use]
    pub fn new(
        key: SessionKey,
        ticket_key: impl Into<String>,
        target_set: impl Into<String>,
        locale: LocaleSettings,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            ticket_key: ticket_key.into(),
            target_set: target_set.into(),
            locale,
            phase: Phase::Init,
            phase_status: PhaseStatus::Pending,
            status: SessionStatus::Active,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trace metadata attached to a draft
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftTrace {
    /// blake3 hex digest of text + payload
    pub fingerprint: String,
    /// Fallback/repair events fired while producing the draft
    pub events: Vec<serde_json::Value>,
}

/// Versioned per-phase artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    /// Phase that produced it
    pub phase: Phase,
    /// Monotonic version per (session, phase), starting at 1
    pub version: u32,
    /// Free text, if any
    pub text: Option<String>,
    /// Structured payload
    pub payload: serde_json::Value,
    /// Quality metadata (counts, gate results)
    pub quality: serde_json::Value,
    /// Trace metadata
    pub trace: DraftTrace,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    /// Build a draft; version is assigned by the store on write.
    #[must_use]
    pub fn new(phase: Phase, text: Option<String>, payload: serde_json::Value) -> Self {
        let fingerprint = fingerprint(text.as_deref(), &payload);
        Self {
            phase,
            version: 0,
            text,
            payload,
            quality: serde_json::Value::Object(serde_json::Map::new()),
            trace: DraftTrace {
                fingerprint,
                events: Vec::new(),
            },
            updated_at: Utc::now(),
        }
    }

    /// With quality metadata
    #[inline]
    #[must_use]
    pub fn with_quality(mut self, quality: serde_json::Value) -> Self {
        self.quality = quality;
        self
    }

    /// With trace events
    #[inline]
    #[must_use]
    pub fn with_events(mut self, events: Vec<serde_json::Value>) -> Self {
        self.trace.events = events;
        self
    }
}

/// Content fingerprint of a draft body
#[must_use]
pub fn fingerprint(text: Option<&str>, payload: &serde_json::Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(text.unwrap_or_default().as_bytes());
    hasher.update(&[0]);
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_session_starts_in_init() {
        let s = Session::new(SessionKey::generate("ws"), "TCG-1", "set-1", LocaleSettings::default());
        assert_eq!(s.phase, Phase::Init);
        assert_eq!(s.status, SessionStatus::Active);
        assert!(s.last_error.is_none());
    }

    #[test]
    fn fingerprint_is_deterministic_and_sensitive() {
        let a = fingerprint(Some("x"), &json!({"a": 1}));
        let b = fingerprint(Some("x"), &json!({"a": 1}));
        let c = fingerprint(Some("x"), &json!({"a": 2}));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(serde_json::to_value(Phase::Pretestcase).unwrap(), json!("pretestcase"));
    }
}
