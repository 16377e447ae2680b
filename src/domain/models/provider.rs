//! Provider health bookkeeping and wire types for the Fallback Provider Chain (§3.1, §4.A).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit-breaker state for a single provider, tracked distinctly per the Design
/// Note in SPEC_FULL.md §9 ("a cleaner reimplementation should track
/// `{healthy, tripped, half-open}` distinctly").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Provider is available and has not tripped its failure threshold.
    Healthy,
    /// Provider is in cooldown; excluded from the candidate loop.
    Tripped,
    /// Cooldown has elapsed; the next call is probational. A failure here re-trips
    /// immediately, a success returns the provider to `Healthy`.
    HalfOpen,
}

/// Running health record for one provider (§3.1 "Provider Health").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Timestamp of the most recent failure, if any.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Cooldown expiry; present while `Tripped`.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Total calls made through this provider.
    pub total_requests: u64,
    /// Total calls that failed.
    pub total_failures: u64,
    /// `(total_requests - total_failures) / total_requests`, or `1.0` with no requests yet.
    pub success_rate: f64,
    /// Explicit manual override set by an operator (`mark_healthy`/`mark_unhealthy`),
    /// taking precedence over the computed circuit state until it expires.
    pub manual_override: Option<(CircuitState, Option<DateTime<Utc>>)>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            last_failure_at: None,
            cooldown_until: None,
            total_requests: 0,
            total_failures: 0,
            success_rate: 1.0,
            manual_override: None,
        }
    }
}

impl ProviderHealth {
    /// Circuit state as of `now`, honoring any live manual override.
    #[must_use]
    pub fn circuit_state(&self, now: DateTime<Utc>) -> CircuitState {
        if let Some((state, expires)) = &self.manual_override {
            if expires.is_none_or(|e| now < e) {
                return *state;
            }
        }
        match self.cooldown_until {
            Some(until) if now < until => CircuitState::Tripped,
            Some(_) => CircuitState::HalfOpen,
            None => CircuitState::Healthy,
        }
    }

    /// Record a successful call: reset consecutive failures, recompute success rate.
    pub fn record_success(&mut self) {
        self.total_requests += 1;
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        self.recompute_success_rate();
    }

    /// Record a failed call; trips the circuit once `failure_threshold` consecutive
    /// failures accumulate (§4.A).
    pub fn record_failure(&mut self, now: DateTime<Utc>, cooldown_ms: u64, failure_threshold: u32) {
        self.total_requests += 1;
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.last_failure_at = Some(now);
        if self.consecutive_failures >= failure_threshold {
            self.cooldown_until = Some(now + chrono::Duration::milliseconds(cooldown_ms as i64));
        }
        self.recompute_success_rate();
    }

    /// Clear an expired cooldown explicitly (the candidate loop does this on entry
    /// per §4.A: "On entering the candidate loop, any expired cooldown is cleared").
    pub fn clear_expired_cooldown(&mut self, now: DateTime<Utc>) {
        if let Some(until) = self.cooldown_until {
            if now >= until {
                self.cooldown_until = None;
            }
        }
    }

    fn recompute_success_rate(&mut self) {
        self.success_rate = if self.total_requests == 0 {
            1.0
        } else {
            (self.total_requests - self.total_failures) as f64 / self.total_requests as f64
        };
    }

    /// Manually force a health state for an optional duration.
    pub fn set_manual_override(&mut self, state: CircuitState, until: Option<DateTime<Utc>>) {
        self.manual_override = Some((state, until));
    }
}

/// A single chat message exchanged with a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"system" | "user" | "assistant" | "tool"`.
    pub role: String,
    /// Message body.
    pub content: String,
}

/// A tool definition a provider may be offered for `chat_with_tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name as the model will invoke it.
    pub name: String,
    /// JSON schema (or provider-native equivalent) describing accepted arguments.
    pub parameters: serde_json::Value,
}

/// Call options shared by `chat`/`chat_with_tools`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Maximum tokens the provider should generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

/// A provider's response to a `chat`/`chat_with_tools` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated text content.
    pub content: String,
    /// Tool calls the model requested, if any.
    pub tool_calls: Vec<ToolCall>,
    /// Tokens consumed by this call.
    pub tokens_used: u32,
    /// Model identifier that produced the response.
    pub model: String,
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Arguments, as raw JSON.
    pub args: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_consecutive_failures() {
        let mut h = ProviderHealth::default();
        let now = Utc::now();
        h.record_failure(now, 60_000, 3);
        h.record_failure(now, 60_000, 3);
        h.record_success();
        assert_eq!(h.consecutive_failures, 0);
        assert_eq!(h.circuit_state(now), CircuitState::Healthy);
    }

    #[test]
    fn threshold_failures_trip_circuit() {
        let mut h = ProviderHealth::default();
        let now = Utc::now();
        for _ in 0..3 {
            h.record_failure(now, 60_000, 3);
        }
        assert_eq!(h.circuit_state(now), CircuitState::Tripped);
    }

    #[test]
    fn cooldown_elapsed_becomes_half_open() {
        let mut h = ProviderHealth::default();
        let now = Utc::now();
        for _ in 0..3 {
            h.record_failure(now, 1, 3);
        }
        let later = now + chrono::Duration::milliseconds(10);
        assert_eq!(h.circuit_state(later), CircuitState::HalfOpen);
    }
}
