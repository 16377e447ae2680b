//! Blackboard Finding entity and claim modes (§3.1, §4.F).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of contribution a finding represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingType {
    /// A new fact surfaced during investigation.
    Discovery,
    /// An interpretation or synthesis over existing findings.
    Analysis,
    /// A question raised for another agent to answer.
    Question,
    /// An answer to a previously posted question.
    Answer,
}

/// An immutable, append-only contribution to the shared blackboard (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Unique id, assigned at post time.
    pub id: Uuid,
    /// Id of the agent (worker) that posted this finding.
    pub agent_id: String,
    /// Topic this finding is filed under; subscriptions match against this.
    pub topic: String,
    /// Kind of contribution.
    pub finding_type: FindingType,
    /// Free-text content.
    pub content: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Free-form tags for query filtering.
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Finding {
    /// Construct a new finding, clamping `confidence` into `[0, 1]`.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        topic: impl Into<String>,
        finding_type: FindingType,
        content: impl Into<String>,
        confidence: f64,
        tags: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            topic: topic.into(),
            finding_type,
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            tags,
            created_at: now,
        }
    }
}

/// Advisory claim mode over a logical resource (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimMode {
    /// Shared, non-exclusive read intent.
    Read,
    /// Shared, non-exclusive write intent.
    Write,
    /// Exclusive — no other claim (of any mode) may coexist.
    Exclusive,
}

/// A query over posted findings (§4.F).
#[derive(Debug, Clone, Default)]
pub struct FindingQuery {
    /// Restrict to this topic, if set.
    pub topic: Option<String>,
    /// Restrict to findings posted by this agent, if set.
    pub agent_id: Option<String>,
    /// Restrict to findings carrying all of these tags, if non-empty.
    pub tags: Vec<String>,
}
