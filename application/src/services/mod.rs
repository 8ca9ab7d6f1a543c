//! Orchestration services
//!
//! Leaf-first: the event bus, the agent registry, inter-agent
//! communication, the enhancement pipeline and the triage engine, plus the
//! resolution handlers that connect triage to the other services and the
//! runtime context that wires everything together.

pub mod agent_registry;
pub mod communication;
pub mod context;
pub mod enhancement_pipeline;
pub mod event_bus;
pub mod handlers;
pub mod triage_engine;
