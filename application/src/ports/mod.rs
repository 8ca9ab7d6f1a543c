//! Port definitions (interfaces for external collaborators)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod agent_endpoint;
pub mod enhancement_applier;
pub mod error_analyzer;
pub mod persistent_store;
pub mod resolution_handler;
pub mod strategy_selector;
pub mod system_scanner;
