//! Agent domain module
//!
//! Agents are the units tracked by the registry: each has an identity, a
//! kind, a status driven by an explicit state machine, and heartbeat-based
//! liveness.

pub mod entities;
pub mod value_objects;

pub use entities::{Agent, AgentMetrics, AgentStatus};
pub use value_objects::{AgentId, AgentKind};
