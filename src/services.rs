//! Process-wide services with an explicit lifecycle.
//!
//! The bus, registry, and rate limiters are single-instance per process
//! but never global: they are constructed here and passed to components
//! by dependency injection, so tests can build a fresh set per case and
//! teardown releases everything on every exit path.

use std::sync::Arc;

use crate::bus::MessageBus;
use crate::config::SiftConfig;
use crate::limiter::{HostRateLimiter, LlmRateLimiter};
use crate::registry::AgentRegistry;

/// The shared service set.
#[derive(Clone)]
pub struct CoreServices {
    pub bus: MessageBus,
    pub registry: Arc<AgentRegistry>,
    pub llm_limiter: Arc<LlmRateLimiter>,
    pub http_limiter: Arc<HostRateLimiter>,
}

impl CoreServices {
    /// Build the service set from configuration.
    pub fn init(config: &SiftConfig) -> Self {
        Self {
            bus: MessageBus::new(),
            registry: Arc::new(AgentRegistry::new()),
            llm_limiter: Arc::new(LlmRateLimiter::new(config.llm.rpm, config.llm.tpm)),
            http_limiter: Arc::new(HostRateLimiter::new(
                config.crawler.default_rate_per_second,
                config.crawler.rate_per_second.clone(),
            )),
        }
    }

    /// Release bus subscriptions and stop their workers. Limiters and the
    /// registry hold no external resources.
    pub fn teardown(&self) {
        self.bus.teardown();
    }
}
