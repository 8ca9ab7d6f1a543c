//! Core domain concepts shared across all components

pub mod error;
pub mod severity;
