//! Infrastructure layer for agent-forge
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration file loading.

pub mod analysis;
pub mod config;
pub mod endpoint;
pub mod enhancement;
pub mod store;
pub mod strategy;

// Re-export commonly used types
pub use analysis::{KeywordAnalyzer, KeywordRule, RollbackScanner};
pub use config::{ConfigLoader, ConfigSource, ConfigValidationError, FileConfig, FileStoreConfig};
pub use endpoint::StaticEndpoint;
pub use enhancement::{JOURNAL_KEY, JournalApplier};
pub use store::{JsonlStore, MemoryStore};
pub use strategy::SuccessRateSelector;
