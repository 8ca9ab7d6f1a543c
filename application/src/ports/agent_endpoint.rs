//! Agent endpoint ports
//!
//! - [`AgentEndpoint`] - delivers a prompt to an agent and returns its reply
//! - [`AgentStartHook`] - the agent's own start routine, used for restarts
//!
//! Concrete endpoints (LLM providers, scrapers) live outside this crate.

use async_trait::async_trait;
use forge_domain::{Agent, PromptRequest};
use thiserror::Error;

/// Reply from an agent endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointReply {
    pub output: String,
    /// Self-assessed quality of the output (0.0 to 1.0)
    pub quality_score: f64,
}

impl EndpointReply {
    pub fn new(output: impl Into<String>, quality_score: f64) -> Self {
        Self {
            output: output.into(),
            quality_score: quality_score.clamp(0.0, 1.0),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum EndpointError {
    #[error("Agent unreachable: {0}")]
    Unreachable(String),

    #[error("Agent failed to process request: {0}")]
    Failed(String),
}

#[async_trait]
pub trait AgentEndpoint: Send + Sync {
    /// Process `request` on `agent`. `attempt` starts at 1 and grows with each
    /// optimization pass over the same request.
    async fn process(
        &self,
        agent: &Agent,
        request: &PromptRequest,
        attempt: u32,
    ) -> Result<EndpointReply, EndpointError>;
}

#[derive(Error, Debug, Clone)]
#[error("Start failed: {0}")]
pub struct StartError(pub String);

#[async_trait]
pub trait AgentStartHook: Send + Sync {
    async fn start(&self, agent: &Agent) -> Result<(), StartError>;
}
