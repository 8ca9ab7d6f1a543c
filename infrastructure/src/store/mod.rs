//! Persistent store adapters.
//!
//! - [`JsonlStore`] - append-only JSONL file, one record per line
//! - [`MemoryStore`] - bounded in-memory store for tests and `--no-store` runs

mod jsonl_store;
mod memory_store;

pub use jsonl_store::JsonlStore;
pub use memory_store::MemoryStore;
