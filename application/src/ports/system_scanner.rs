//! System scanner port, used by the periodic safety scan.

use async_trait::async_trait;
use forge_domain::SystemIssue;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("System scan failed: {0}")]
pub struct ScanError(pub String);

#[async_trait]
pub trait SystemScanner: Send + Sync {
    async fn scan_system(&self) -> Result<Vec<SystemIssue>, ScanError>;
}

/// Scanner that never finds anything.
pub struct NoScanner;

#[async_trait]
impl SystemScanner for NoScanner {
    async fn scan_system(&self) -> Result<Vec<SystemIssue>, ScanError> {
        Ok(Vec::new())
    }
}
