//! Application-level configuration.
//!
//! Parameter types that control how the orchestration services behave:
//!
//! - [`RegistryParams`] - heartbeat monitoring and agent selection
//! - [`CommunicationParams`] - reply quality and optimization passes
//! - [`TriageParams`] - escalation back-off and context sizes
//! - [`PipelineParams`] - enhancement cycles and startup safety rules
//! - [`ForgeConfig`] - container for all of the above

pub mod communication_params;
pub mod forge_config;
pub mod pipeline_params;
pub mod registry_params;
pub mod triage_params;

pub use communication_params::CommunicationParams;
pub use forge_config::ForgeConfig;
pub use pipeline_params::PipelineParams;
pub use registry_params::{RegistryParams, SelectionPolicy};
pub use triage_params::{BackoffPolicy, TriageParams};
