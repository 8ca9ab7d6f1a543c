//! Error analysis and system scanning adapters.

mod keyword_analyzer;
mod rollback_scanner;

pub use keyword_analyzer::{KeywordAnalyzer, KeywordRule};
pub use rollback_scanner::RollbackScanner;
