//! Endpoint that answers from a template.
//!
//! Used by the CLI for local runs and dry triage. `{agent}`, `{kind}` and
//! `{task}` in the template are replaced per request. Quality starts at
//! `base_quality` and grows by `step` on every optimization pass, which lets
//! the communication service's retry loop be exercised without a model.

use async_trait::async_trait;
use forge_application::ports::agent_endpoint::{
    AgentEndpoint, AgentStartHook, EndpointError, EndpointReply, StartError,
};
use forge_domain::{Agent, PromptRequest};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

pub struct StaticEndpoint {
    template: String,
    base_quality: f64,
    step: f64,
    /// Agents whose requests and restarts fail
    broken: Mutex<HashSet<String>>,
}

impl StaticEndpoint {
    pub const DEFAULT_TEMPLATE: &'static str = "[{agent}/{kind}] {task}";

    pub fn new() -> Self {
        Self::with_template(Self::DEFAULT_TEMPLATE)
    }

    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            base_quality: 1.0,
            step: 0.0,
            broken: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_quality(mut self, base_quality: f64, step: f64) -> Self {
        self.base_quality = base_quality;
        self.step = step;
        self
    }

    /// Make every request to `agent_id` fail until [`repair`](Self::repair).
    pub fn break_agent(&self, agent_id: &str) {
        self.lock().insert(agent_id.to_string());
    }

    pub fn repair(&self, agent_id: &str) {
        self.lock().remove(agent_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.broken.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn render(&self, agent: &Agent, request: &PromptRequest) -> String {
        self.template
            .replace("{agent}", agent.id.as_str())
            .replace("{kind}", agent.kind.as_str())
            .replace("{task}", &request.task)
    }
}

impl Default for StaticEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEndpoint for StaticEndpoint {
    async fn process(
        &self,
        agent: &Agent,
        request: &PromptRequest,
        attempt: u32,
    ) -> Result<EndpointReply, EndpointError> {
        if self.lock().contains(agent.id.as_str()) {
            return Err(EndpointError::Unreachable(format!("{} is broken", agent.id)));
        }

        let quality = self.base_quality + self.step * f64::from(attempt.saturating_sub(1));
        debug!(agent = %agent.id, attempt, quality, "Static endpoint reply");
        Ok(EndpointReply::new(self.render(agent, request), quality))
    }
}

#[async_trait]
impl AgentStartHook for StaticEndpoint {
    async fn start(&self, agent: &Agent) -> Result<(), StartError> {
        if self.lock().contains(agent.id.as_str()) {
            return Err(StartError(format!("{} is broken", agent.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_domain::AgentKind;

    fn agent() -> Agent {
        Agent::new("scraper-1", AgentKind::Scraper)
    }

    #[tokio::test]
    async fn test_template_rendering() {
        let endpoint = StaticEndpoint::new();
        let request = PromptRequest::new("cli", "scraper-1", "fetch page");

        let reply = endpoint.process(&agent(), &request, 1).await.unwrap();

        assert_eq!(reply.output, "[scraper-1/scraper] fetch page");
        assert_eq!(reply.quality_score, 1.0);
    }

    #[tokio::test]
    async fn test_quality_grows_per_attempt() {
        let endpoint = StaticEndpoint::new().with_quality(0.5, 0.25);
        let request = PromptRequest::new("cli", "scraper-1", "x");

        let first = endpoint.process(&agent(), &request, 1).await.unwrap();
        let third = endpoint.process(&agent(), &request, 3).await.unwrap();

        assert_eq!(first.quality_score, 0.5);
        assert_eq!(third.quality_score, 1.0);
    }

    #[tokio::test]
    async fn test_broken_agent_fails_until_repaired() {
        let endpoint = StaticEndpoint::new();
        let request = PromptRequest::new("cli", "scraper-1", "x");
        endpoint.break_agent("scraper-1");

        assert!(endpoint.process(&agent(), &request, 1).await.is_err());
        assert!(endpoint.start(&agent()).await.is_err());

        endpoint.repair("scraper-1");
        assert!(endpoint.start(&agent()).await.is_ok());
    }
}
