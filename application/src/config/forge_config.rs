//! Configuration container.
//!
//! [`ForgeConfig`] groups the per-service parameter types. Services receive
//! only the slice they need; the runtime context holds the whole container.

use super::{CommunicationParams, PipelineParams, RegistryParams, TriageParams};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    pub registry: RegistryParams,
    pub communication: CommunicationParams,
    pub triage: TriageParams,
    pub pipeline: PipelineParams,
}

impl ForgeConfig {
    pub fn with_registry(mut self, registry: RegistryParams) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_communication(mut self, communication: CommunicationParams) -> Self {
        self.communication = communication;
        self
    }

    pub fn with_triage(mut self, triage: TriageParams) -> Self {
        self.triage = triage;
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineParams) -> Self {
        self.pipeline = pipeline;
        self
    }
}
