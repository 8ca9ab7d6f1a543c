//! Application layer for agent-forge
//!
//! This crate contains the orchestration services, port definitions for
//! external collaborators, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod services;

// Re-export commonly used types
pub use config::{
    BackoffPolicy, CommunicationParams, ForgeConfig, PipelineParams, RegistryParams,
    SelectionPolicy, TriageParams,
};
pub use ports::{
    agent_endpoint::{AgentEndpoint, AgentStartHook, EndpointError, EndpointReply, StartError},
    enhancement_applier::{ApplyError, EnhancementApplier},
    error_analyzer::{ErrorAnalyzer, NoAnalysis},
    persistent_store::{
        AuditTrail, NoStore, PersistentStore, RecordFilter, StoreError, StoredRecord, keys,
    },
    resolution_handler::{HandlerError, ResolutionHandler},
    strategy_selector::{FirstCandidate, StrategySelector},
    system_scanner::{NoScanner, ScanError, SystemScanner},
};
pub use services::{
    agent_registry::{AgentRegistry, HealthReport, RegistryError, RegistryMetrics},
    communication::{CommunicationError, CommunicationMetrics, CommunicationService, DrainReport},
    context::{ForgeContext, ForgeContextBuilder},
    enhancement_pipeline::{
        EnhancementError, EnhancementPipeline, PipelineStatus, ProcessingReport, ScanReport,
    },
    event_bus::{EventBus, EventHandler, SubscriptionId},
    handlers::{
        ARCHITECT_NAME, AgentResolutionHandler, CONTROLLER_NAME, ENHANCER_NAME,
        PipelineResolutionHandler,
    },
    triage_engine::{TierHandlers, TriageEngine, TriageError, TriageMetrics},
};
