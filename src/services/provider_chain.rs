//! The Fallback Provider Chain (§4.A).
//!
//! Grounded on `infrastructure/substrates/registry.rs`'s ordered-traversal registry
//! shape combined with `services/circuit_breaker.rs`'s cooldown/health state
//! machine — the teacher's registry routes by agent type rather than failing over
//! by priority, so the traversal loop itself is new, but the health bookkeeping
//! (`consecutive_failures`, `cooldown_until`, `success_rate`) mirrors
//! `CircuitBreaker::record_failure`/`record_success` closely.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::error::ProviderChainError;
use crate::domain::models::{ChatMessage, ChatOptions, ChatResponse, CircuitState, Event, ProviderHealth, ToolSpec};
use crate::domain::ports::{EventSink, LanguageModelProvider};

/// Tunables for the chain's health/cooldown bookkeeping (§4.A).
#[derive(Debug, Clone)]
pub struct ProviderChainConfig {
    /// Cooldown duration once a provider trips (§4.A).
    pub cooldown_ms: u64,
    /// Consecutive failures before a provider trips (§4.A).
    pub failure_threshold: u32,
    /// Skip providers that report `is_configured() == false` in the candidate loop.
    pub skip_unconfigured: bool,
}

impl Default for ProviderChainConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 60_000,
            failure_threshold: 3,
            skip_unconfigured: true,
        }
    }
}

/// Orders a list of [`LanguageModelProvider`]s and fails over between them,
/// tracking per-provider health (§4.A).
pub struct ProviderChain {
    providers: Vec<Arc<dyn LanguageModelProvider>>,
    health: RwLock<HashMap<String, ProviderHealth>>,
    config: ProviderChainConfig,
    sink: Box<dyn EventSink>,
}

impl ProviderChain {
    /// Construct a chain over `providers`, in whatever order they are given —
    /// traversal order is (re-)established from each provider's own `priority()`.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn LanguageModelProvider>>, config: ProviderChainConfig, sink: Box<dyn EventSink>) -> Self {
        Self {
            providers,
            health: RwLock::new(HashMap::new()),
            config,
            sink,
        }
    }

    fn ordered_candidates(&self) -> Vec<Arc<dyn LanguageModelProvider>> {
        let mut ordered = self.providers.clone();
        ordered.sort_by_key(|p| p.priority());
        ordered
    }

    /// Plain chat completion, traversing providers in priority order (§4.A).
    #[tracing::instrument(skip(self, messages, options))]
    pub async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse, ProviderChainError> {
        self.call(messages, None, options).await
    }

    /// Chat completion with tool definitions, degrading to `chat` for providers that
    /// don't advertise `supports_tools()` (§4.A).
    #[tracing::instrument(skip(self, messages, tools, options))]
    pub async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderChainError> {
        self.call(messages, Some(tools), options).await
    }

    async fn call(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderChainError> {
        let candidates = self.ordered_candidates();
        if candidates.is_empty() {
            return Err(ProviderChainError::NotConfigured);
        }

        let now = Utc::now();
        let mut best_error: Option<ProviderChainError> = None;
        let mut previous_name: Option<String> = None;

        for provider in &candidates {
            if self.config.skip_unconfigured && !provider.is_configured() {
                continue;
            }
            {
                let mut health = self.health.write().await;
                let record = health.entry(provider.name().to_string()).or_default();
                record.clear_expired_cooldown(now);
                if record.circuit_state(now) == CircuitState::Tripped {
                    continue;
                }
            }

            if let Some(from) = &previous_name {
                self.sink.emit(Event::ProviderFallback { from: from.clone(), to: provider.name().to_string(), at: now });
            }
            previous_name = Some(provider.name().to_string());

            let result = match tools {
                Some(tools) if provider.supports_tools() => provider.chat_with_tools(messages, tools, options).await,
                _ => provider.chat(messages, options).await,
            };

            match result {
                Ok(response) => {
                    let mut health = self.health.write().await;
                    health.entry(provider.name().to_string()).or_default().record_success();
                    self.sink.emit(Event::ProviderSuccess { provider: provider.name().to_string(), at: now });
                    return Ok(response);
                }
                Err(err) => {
                    self.sink.emit(Event::ProviderFailure {
                        provider: provider.name().to_string(),
                        reason: err.to_string(),
                        at: now,
                    });
                    let mut health = self.health.write().await;
                    let record = health.entry(provider.name().to_string()).or_default();
                    let was_tripped = record.circuit_state(now) == CircuitState::Tripped;
                    record.record_failure(now, self.config.cooldown_ms, self.config.failure_threshold);
                    if !was_tripped && record.circuit_state(now) == CircuitState::Tripped {
                        self.sink.emit(Event::ProviderCooldownStart {
                            provider: provider.name().to_string(),
                            until: record.cooldown_until.unwrap_or(now),
                            at: now,
                        });
                    }
                    drop(health);

                    if best_error.as_ref().is_none_or(|best| err.priority() > best.priority()) {
                        best_error = Some(err);
                    }
                }
            }
        }

        self.sink.emit(Event::ChainExhausted { at: now });
        Err(ProviderChainError::ChainExhausted(Box::new(
            best_error.unwrap_or(ProviderChainError::NotConfigured),
        )))
    }

    /// Manually force a provider's health state (§4.A "clients may manually mark a
    /// provider healthy or unhealthy").
    pub async fn set_manual_override(&self, provider_name: &str, state: CircuitState, until: Option<DateTime<Utc>>) {
        let mut health = self.health.write().await;
        health.entry(provider_name.to_string()).or_default().set_manual_override(state, until);
        if state != CircuitState::Tripped {
            self.sink.emit(Event::ProviderCooldownEnd { provider: provider_name.to_string(), at: Utc::now() });
        }
    }

    /// Snapshot of current per-provider health, for diagnostics/tests.
    pub async fn health_snapshot(&self) -> HashMap<String, ProviderHealth> {
        self.health.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NullEventSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        name: &'static str,
        priority: u32,
        fail_calls: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModelProvider for FlakyProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn chat(&self, _messages: &[ChatMessage], _options: &ChatOptions) -> Result<ChatResponse, ProviderChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.calls.load(Ordering::SeqCst) <= self.fail_calls.load(Ordering::SeqCst) {
                Err(ProviderChainError::NetworkError("boom".to_string()))
            } else {
                Ok(ChatResponse {
                    content: format!("from {}", self.name),
                    tool_calls: Vec::new(),
                    tokens_used: 1,
                    model: self.name.to_string(),
                })
            }
        }
    }

    /// Scenario 6: two-provider chain, primary fails every call, secondary succeeds.
    #[tokio::test]
    async fn failover_to_secondary_provider() {
        let primary = Arc::new(FlakyProvider {
            name: "primary",
            priority: 0,
            fail_calls: AtomicUsize::new(usize::MAX),
            calls: AtomicUsize::new(0),
        });
        let secondary = Arc::new(FlakyProvider {
            name: "secondary",
            priority: 1,
            fail_calls: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let chain = ProviderChain::new(
            vec![primary.clone(), secondary.clone()],
            ProviderChainConfig::default(),
            Box::new(NullEventSink),
        );

        let response = chain.chat(&[], &ChatOptions::default()).await.unwrap();
        assert_eq!(response.content, "from secondary");

        let health = chain.health_snapshot().await;
        assert_eq!(health["primary"].consecutive_failures, 1);
        assert_eq!(health["secondary"].total_requests, 1);
    }

    #[tokio::test]
    async fn chain_exhausted_when_every_provider_fails() {
        let provider = Arc::new(FlakyProvider {
            name: "only",
            priority: 0,
            fail_calls: AtomicUsize::new(usize::MAX),
            calls: AtomicUsize::new(0),
        });
        let chain = ProviderChain::new(vec![provider], ProviderChainConfig::default(), Box::new(NullEventSink));

        let err = chain.chat(&[], &ChatOptions::default()).await.unwrap_err();
        assert!(matches!(err, ProviderChainError::ChainExhausted(_)));
    }

    #[tokio::test]
    async fn circuit_trips_after_failure_threshold() {
        let provider = Arc::new(FlakyProvider {
            name: "only",
            priority: 0,
            fail_calls: AtomicUsize::new(usize::MAX),
            calls: AtomicUsize::new(0),
        });
        let config = ProviderChainConfig { failure_threshold: 2, ..ProviderChainConfig::default() };
        let chain = ProviderChain::new(vec![provider], config, Box::new(NullEventSink));

        let _ = chain.chat(&[], &ChatOptions::default()).await;
        let _ = chain.chat(&[], &ChatOptions::default()).await;

        let health = chain.health_snapshot().await;
        assert_eq!(health["only"].consecutive_failures, 2);
        assert_eq!(health["only"].circuit_state(Utc::now()), CircuitState::Tripped);
    }
}
