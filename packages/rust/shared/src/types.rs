//! Core domain types for GrantScout discovery runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// GrantId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for grant identifiers (time-sortable).
///
/// Assigned once when a grant is parsed and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(pub Uuid);

impl GrantId {
    /// Generate a new time-sortable grant identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GrantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for GrantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Grant
// ---------------------------------------------------------------------------

/// Lifecycle state of an opportunity.
///
/// Extraction only ever yields `Open`, `Upcoming` or `Unknown`; `Closed` is
/// assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GrantStatus {
    Open,
    Upcoming,
    Closed,
    #[default]
    Unknown,
}

impl GrantStatus {
    /// Lenient, case-insensitive parse. Anything unrecognised is `Unknown`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Self::Open,
            "UPCOMING" => Self::Upcoming,
            "CLOSED" => Self::Closed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Upcoming => "UPCOMING",
            Self::Closed => "CLOSED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered funding opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    /// Unique identifier, generated at parse time.
    pub id: GrantId,
    pub agency_name: String,
    pub program_title: String,
    pub funding_type: String,
    pub brief_description: String,
    pub eligibility_criteria: String,
    #[serde(default)]
    pub application_deadline: Option<String>,
    #[serde(default)]
    pub funding_amount: Option<String>,
    pub geographic_scope: String,
    pub official_application_link: String,
    pub status: GrantStatus,
    /// Heuristic trust weight in `[0.90, 0.99)`, assigned by the parser's scorer.
    pub confidence_score: f64,
    /// When this record was parsed out of a provider response.
    pub discovered_at: DateTime<Utc>,
}

impl Grant {
    /// The deduplication key: the lower-cased program title.
    pub fn dedup_key(&self) -> String {
        normalize_title(&self.program_title)
    }
}

/// Normalize a program title into its deduplication key.
pub fn normalize_title(title: &str) -> String {
    title.to_lowercase()
}

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// Severity of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable progress record emitted during a discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SearchConfig
// ---------------------------------------------------------------------------

/// Parameters for one discovery run. Read-only while the run is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search keywords. Order shapes the prompt, not the semantics.
    pub keywords: Vec<String>,
    /// Funding year to target.
    pub year: i32,
    /// Digest recipient; empty disables delivery.
    #[serde(default)]
    pub email_recipient: String,
    #[serde(default)]
    pub notification_enabled: bool,
}

impl SearchConfig {
    /// Whether a digest should go out for a run that found `new_count` grants.
    ///
    /// All three must hold: something new, notifications on, and a recipient.
    pub fn should_notify(&self, new_count: usize) -> bool {
        new_count > 0 && self.notification_enabled && !self.email_recipient.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// GroundingSource
// ---------------------------------------------------------------------------

/// A reference the extraction provider cited while grounding its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}
