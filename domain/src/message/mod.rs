//! Inter-agent messaging

pub mod entities;

pub use entities::{MessageId, MessageMetadata, PromptRequest, PromptResponse};
