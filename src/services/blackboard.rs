//! The Shared Blackboard (§4.F) — an append-only, write-mostly findings store plus
//! advisory resource claims.
//!
//! No direct teacher analog exists for this subsystem; it is structured as an
//! `Arc`-friendly `Mutex`-guarded store following the same concurrency idiom as
//! `services/circuit_breaker.rs`'s `Arc<RwLock<HashMap<..>>>` service shape, since
//! the blackboard is explicitly "not on the critical path of task readiness" (§4.F)
//! and can tolerate a coarser lock than the queue.

use std::sync::Mutex;

use chrono::Utc;

use crate::domain::error::BlackboardError;
use crate::domain::models::{ClaimMode, Event, Finding, FindingQuery, FindingType};
use crate::domain::ports::EventSink;

struct Claim {
    agent_id: String,
    mode: ClaimMode,
}

#[derive(Default)]
struct BlackboardState {
    findings: Vec<Finding>,
    claims: std::collections::HashMap<String, Vec<Claim>>,
    subscriptions: Vec<(String, Box<dyn Fn(&Finding) + Send + Sync>)>,
}

/// Append-only findings store with advisory resource claims (§4.F).
pub struct Blackboard {
    state: Mutex<BlackboardState>,
    sink: Box<dyn EventSink>,
}

impl Blackboard {
    /// Construct an empty blackboard.
    #[must_use]
    pub fn new(sink: Box<dyn EventSink>) -> Self {
        Self { state: Mutex::new(BlackboardState::default()), sink }
    }

    /// Post a finding. At-post deduplication: a finding sharing `(topic, content)`
    /// with an existing one merges to whichever carries the higher confidence,
    /// rather than appending a duplicate (§4.F).
    #[tracing::instrument(skip(self, content))]
    pub fn post(
        &self,
        agent_id: impl Into<String>,
        topic: impl Into<String>,
        finding_type: FindingType,
        content: impl Into<String>,
        confidence: f64,
        tags: Vec<String>,
    ) -> Finding {
        let agent_id = agent_id.into();
        let topic = topic.into();
        let content = content.into();
        let now = Utc::now();
        let candidate = Finding::new(agent_id.clone(), topic.clone(), finding_type, content.clone(), confidence, tags, now);

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = state
            .findings
            .iter_mut()
            .find(|f| f.topic == topic && f.content == content)
        {
            if candidate.confidence > existing.confidence {
                *existing = candidate.clone();
            }
            let result = existing.clone();
            drop(state);
            self.sink.emit(Event::BlackboardFinding { agent_id, topic, at: now });
            return result;
        }

        state.findings.push(candidate.clone());
        let matching_subscribers: Vec<&Box<dyn Fn(&Finding) + Send + Sync>> = state
            .subscriptions
            .iter()
            .filter(|(pattern, _)| topic_matches(pattern, &candidate.topic))
            .map(|(_, cb)| cb)
            .collect();
        for cb in matching_subscribers {
            cb(&candidate);
        }
        drop(state);

        self.sink.emit(Event::BlackboardFinding { agent_id, topic, at: now });
        candidate
    }

    /// Query posted findings (§4.F).
    #[must_use]
    pub fn query(&self, query: &FindingQuery) -> Vec<Finding> {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state
            .findings
            .iter()
            .filter(|f| query.topic.as_deref().is_none_or(|t| f.topic == t))
            .filter(|f| query.agent_id.as_deref().is_none_or(|a| f.agent_id == a))
            .filter(|f| query.tags.iter().all(|t| f.tags.contains(t)))
            .cloned()
            .collect()
    }

    /// Claim a logical resource. `exclusive` fails if any other claim already
    /// exists on the resource, regardless of that claim's own mode (§4.F).
    pub fn claim(&self, resource: impl Into<String>, agent_id: impl Into<String>, mode: ClaimMode) -> Result<(), BlackboardError> {
        let resource = resource.into();
        let agent_id = agent_id.into();
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let existing = state.claims.entry(resource.clone()).or_default();

        if mode == ClaimMode::Exclusive && !existing.is_empty() {
            return Err(BlackboardError::AlreadyClaimed(resource, existing[0].agent_id.clone()));
        }
        if existing.iter().any(|c| c.mode == ClaimMode::Exclusive) {
            return Err(BlackboardError::AlreadyClaimed(resource, existing[0].agent_id.clone()));
        }

        existing.push(Claim { agent_id, mode });
        Ok(())
    }

    /// Release a previously held claim.
    pub fn release(&self, resource: &str, agent_id: &str) -> Result<(), BlackboardError> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(claims) = state.claims.get_mut(resource) else {
            return Err(BlackboardError::NoSuchClaim(resource.to_string(), agent_id.to_string()));
        };
        let before = claims.len();
        claims.retain(|c| c.agent_id != agent_id);
        if claims.len() == before {
            return Err(BlackboardError::NoSuchClaim(resource.to_string(), agent_id.to_string()));
        }
        Ok(())
    }

    /// Register a subscription; `callback` fires synchronously for every future
    /// post whose topic matches `topic_pattern` (an exact match or a `*` wildcard
    /// suffix, e.g. `"build.*"`) (§4.F).
    pub fn subscribe(&self, topic_pattern: impl Into<String>, callback: impl Fn(&Finding) + Send + Sync + 'static) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.subscriptions.push((topic_pattern.into(), Box::new(callback)));
    }
}

fn topic_matches(pattern: &str, topic: &str) -> bool {
    pattern.strip_suffix('*').map_or_else(|| pattern == topic, |prefix| topic.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NullEventSink;

    fn board() -> Blackboard {
        Blackboard::new(Box::new(NullEventSink))
    }

    #[test]
    fn duplicate_topic_and_content_merges_to_higher_confidence() {
        let bb = board();
        bb.post("agent-a", "build", FindingType::Discovery, "compile error in foo.rs", 0.4, vec![]);
        bb.post("agent-b", "build", FindingType::Discovery, "compile error in foo.rs", 0.9, vec![]);

        let results = bb.query(&FindingQuery { topic: Some("build".to_string()), ..Default::default() });
        assert_eq!(results.len(), 1);
        assert!((results[0].confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(results[0].agent_id, "agent-b");
    }

    #[test]
    fn exclusive_claim_blocks_any_further_claim() {
        let bb = board();
        bb.claim("file.rs", "agent-a", ClaimMode::Exclusive).unwrap();
        assert!(bb.claim("file.rs", "agent-b", ClaimMode::Read).is_err());
    }

    #[test]
    fn release_then_reclaim_succeeds() {
        let bb = board();
        bb.claim("file.rs", "agent-a", ClaimMode::Exclusive).unwrap();
        bb.release("file.rs", "agent-a").unwrap();
        assert!(bb.claim("file.rs", "agent-b", ClaimMode::Exclusive).is_ok());
    }

    #[test]
    fn subscription_fires_synchronously_on_matching_post() {
        let bb = board();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bb.subscribe("build.*", move |f| seen_clone.lock().unwrap().push(f.content.clone()));

        bb.post("agent-a", "build.rust", FindingType::Discovery, "hello", 1.0, vec![]);
        bb.post("agent-a", "other", FindingType::Discovery, "ignored", 1.0, vec![]);

        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
    }
}
