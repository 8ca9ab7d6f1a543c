//! Enhancement pipeline
//!
//! Gatekeeper for automatic system changes. A proposed
//! [`EnhancementRequest`] must pass the safety check (no active rule matches
//! its source) and the duplication check (no pending item with the same type
//! and source) before it enters the pending map. Pending items are then
//! applied once by the applier registered for their type, validated, and
//! rolled back if validation fails.
//!
//! Two periodic jobs keep the rule set current: the safety scan turns
//! critical scanner findings into rules, and pattern learning marks
//! repeatedly successful (type, source) pairs as known safe.

use crate::config::PipelineParams;
use crate::ports::enhancement_applier::{ApplyError, EnhancementApplier};
use crate::ports::persistent_store::{AuditTrail, keys};
use crate::ports::system_scanner::{ScanError, SystemScanner};
use crate::services::event_bus::EventBus;
use chrono::{DateTime, Utc};
use forge_domain::{
    DomainError, EnhancementId, EnhancementKind, EnhancementRecord, EnhancementRequest,
    EnhancementState, ErrorKind, ForgeEvent, QueuedEnhancement, RejectionReason, SafePattern,
    SafetyCheck, SafetyRule, SafetyViolation, Severity,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone)]
pub enum EnhancementError {
    #[error("Safety check failed: {summary}")]
    SafetyViolation {
        summary: String,
        violations: Vec<SafetyViolation>,
    },

    #[error("Duplicate enhancement, already queued as {existing}")]
    Duplicate { existing: EnhancementId },

    #[error(transparent)]
    InvalidRule(#[from] DomainError),

    #[error("Enhancement not found: {0}")]
    NotFound(EnhancementId),

    #[error("Enhancement {0} is already being processed")]
    AlreadyProcessing(EnhancementId),

    #[error("Safety scan failed: {0}")]
    Scan(String),
}

impl EnhancementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnhancementError::SafetyViolation { .. } => ErrorKind::SafetyViolation,
            EnhancementError::Duplicate { .. } => ErrorKind::Duplicate,
            EnhancementError::InvalidRule(_) => ErrorKind::Validation,
            EnhancementError::NotFound(_) => ErrorKind::NotFound,
            EnhancementError::AlreadyProcessing(_) => ErrorKind::Duplicate,
            EnhancementError::Scan(_) => ErrorKind::Transient,
        }
    }
}

impl From<ScanError> for EnhancementError {
    fn from(e: ScanError) -> Self {
        EnhancementError::Scan(e.0)
    }
}

/// Snapshot returned by [`EnhancementPipeline::get_status`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub pending: usize,
    pub processing: usize,
    pub active_rules: usize,
    pub known_safe_patterns: usize,
    pub applied: u64,
    pub rolled_back: u64,
    pub failed: u64,
    pub last_scan: Option<DateTime<Utc>>,
}

/// Outcome of one [`EnhancementPipeline::process_pending`] pass.
#[derive(Debug, Clone, Default)]
pub struct ProcessingReport {
    pub records: Vec<EnhancementRecord>,
}

impl ProcessingReport {
    pub fn count(&self, state: EnhancementState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }
}

/// Outcome of one [`EnhancementPipeline::run_safety_scan`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub issues: usize,
    pub rules_added: Vec<String>,
}

struct CompiledRule {
    rule: SafetyRule,
    regex: Regex,
}

impl CompiledRule {
    fn compile(rule: SafetyRule) -> Result<Self, DomainError> {
        let regex = Regex::new(&rule.pattern).map_err(|e| DomainError::InvalidRulePattern {
            pattern: rule.pattern.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { rule, regex })
    }
}

#[derive(Default)]
struct PendingState {
    /// Pending items in queue order
    items: Vec<QueuedEnhancement>,
    processing: HashSet<EnhancementId>,
}

#[derive(Default)]
struct PipelineStats {
    applied: u64,
    rolled_back: u64,
    failed: u64,
    last_scan: Option<DateTime<Utc>>,
    scan_rules: usize,
}

pub struct EnhancementPipeline {
    params: PipelineParams,
    bus: Arc<EventBus>,
    audit: AuditTrail,
    scanner: Arc<dyn SystemScanner>,
    rules: Mutex<Vec<CompiledRule>>,
    pending: Mutex<PendingState>,
    appliers: Mutex<HashMap<EnhancementKind, Arc<dyn EnhancementApplier>>>,
    history: Mutex<VecDeque<EnhancementRecord>>,
    history_capacity: usize,
    /// Successful applications per (type, source), kept past history trimming
    successes: Mutex<HashMap<SafePattern, usize>>,
    safe_patterns: Mutex<BTreeSet<SafePattern>>,
    stats: Mutex<PipelineStats>,
}

impl EnhancementPipeline {
    pub const DEFAULT_HISTORY_CAPACITY: usize = 1_000;

    /// Build a pipeline, compiling the configured rules.
    pub fn new(
        params: PipelineParams,
        bus: Arc<EventBus>,
        audit: AuditTrail,
        scanner: Arc<dyn SystemScanner>,
    ) -> Result<Self, EnhancementError> {
        let rules = params
            .rules
            .iter()
            .cloned()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            params,
            bus,
            audit,
            scanner,
            rules: Mutex::new(rules),
            pending: Mutex::new(PendingState::default()),
            appliers: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_capacity: Self::DEFAULT_HISTORY_CAPACITY,
            successes: Mutex::new(HashMap::new()),
            safe_patterns: Mutex::new(BTreeSet::new()),
            stats: Mutex::new(PipelineStats::default()),
        })
    }

    /// Keep at most `capacity` finished records in [`history`](Self::history).
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    /// Register the applier for its enhancement kind, replacing any earlier one.
    pub fn register_applier(&self, applier: Arc<dyn EnhancementApplier>) {
        lock(&self.appliers).insert(applier.kind(), applier);
    }

    pub fn add_rule(&self, rule: SafetyRule) -> Result<(), EnhancementError> {
        let compiled = CompiledRule::compile(rule)?;
        debug!(rule = %compiled.rule.name, "Safety rule added");
        lock(&self.rules).push(compiled);
        Ok(())
    }

    pub fn rules(&self) -> Vec<SafetyRule> {
        lock(&self.rules).iter().map(|c| c.rule.clone()).collect()
    }

    /// Check `request.source` against every active rule scoped to its type.
    pub fn check_safety(&self, request: &EnhancementRequest) -> SafetyCheck {
        let violations = lock(&self.rules)
            .iter()
            .filter(|c| c.rule.is_in_scope(request.kind) && c.regex.is_match(&request.source))
            .map(|c| SafetyViolation {
                rule: c.rule.name.clone(),
                description: if c.rule.description.is_empty() {
                    format!("source matches /{}/", c.rule.pattern)
                } else {
                    c.rule.description.clone()
                },
                severity: c.rule.severity,
            })
            .collect();

        let mut check = SafetyCheck::from_violations(violations);
        check.known_safe = lock(&self.safe_patterns).contains(&SafePattern {
            kind: request.kind,
            source: request.source.clone(),
        });
        check
    }

    /// Gate and enqueue a proposed enhancement.
    ///
    /// Rejected requests leave the pending map untouched.
    pub async fn queue_enhancement(
        &self,
        request: EnhancementRequest,
    ) -> Result<EnhancementId, EnhancementError> {
        self.admit(request, false).await.map(|item| item.id)
    }

    /// Gate, enqueue and immediately process a proposed enhancement.
    ///
    /// The item is claimed as it enters the pending map, so a concurrent
    /// processing cycle never picks it up.
    pub async fn queue_and_apply(
        &self,
        request: EnhancementRequest,
    ) -> Result<EnhancementRecord, EnhancementError> {
        let item = self.admit(request, true).await?;
        Ok(self.run(item).await)
    }

    async fn admit(
        &self,
        request: EnhancementRequest,
        claim: bool,
    ) -> Result<QueuedEnhancement, EnhancementError> {
        let check = self.check_safety(&request);
        self.audit
            .record(
                keys::SAFETY_CHECK,
                json!({ "kind": request.kind, "source": request.source, "check": check }),
            )
            .await;

        if !check.passed {
            let summary = check.summary();
            warn!(kind = %request.kind, source = %request.source, %summary, "Enhancement rejected by safety check");
            self.reject(&request, RejectionReason::SafetyViolation, &summary)
                .await;
            return Err(EnhancementError::SafetyViolation {
                summary,
                violations: check.violations,
            });
        }

        let queued = {
            let mut pending = lock(&self.pending);
            let existing = pending
                .items
                .iter()
                .find(|item| item.request.duplicates(&request))
                .map(|item| item.id.clone());
            match existing {
                Some(existing) => Err(existing),
                None => {
                    let mut item = QueuedEnhancement::new(request.clone(), check);
                    if claim {
                        item.state = EnhancementState::Processing;
                        pending.processing.insert(item.id.clone());
                    }
                    pending.items.push(item.clone());
                    Ok(item)
                }
            }
        };

        let item = match queued {
            Ok(item) => item,
            Err(existing) => {
                info!(kind = %request.kind, source = %request.source, %existing, "Duplicate enhancement rejected");
                self.reject(&request, RejectionReason::Duplicate, existing.as_str())
                    .await;
                return Err(EnhancementError::Duplicate { existing });
            }
        };

        info!(id = %item.id, kind = %item.request.kind, source = %item.request.source, "Enhancement queued");
        self.audit
            .record(
                keys::ENHANCEMENT_QUEUED,
                json!({ "id": item.id, "request": item.request, "known_safe": item.safety_check.known_safe }),
            )
            .await;
        self.bus.emit(ForgeEvent::EnhancementQueued {
            id: item.id.clone(),
            kind: item.request.kind,
            source: item.request.source.clone(),
        });
        Ok(item)
    }

    /// Process every pending item that is not already being processed.
    pub async fn process_pending(&self) -> ProcessingReport {
        let ids: Vec<EnhancementId> = {
            let pending = lock(&self.pending);
            pending
                .items
                .iter()
                .filter(|item| !pending.processing.contains(&item.id))
                .map(|item| item.id.clone())
                .collect()
        };

        let mut report = ProcessingReport::default();
        for id in ids {
            match self.process_one(&id).await {
                Ok(record) => report.records.push(record),
                // Picked up concurrently by process_one
                Err(e) => debug!(%id, error = %e, "Skipping enhancement"),
            }
        }
        report
    }

    /// Apply, validate and, on failure, roll back a single pending item.
    ///
    /// The item leaves the pending map whatever the outcome; there is no retry.
    pub async fn process_one(&self, id: &EnhancementId) -> Result<EnhancementRecord, EnhancementError> {
        let item = {
            let mut pending = lock(&self.pending);
            if pending.processing.contains(id) {
                return Err(EnhancementError::AlreadyProcessing(id.clone()));
            }
            let item = pending
                .items
                .iter_mut()
                .find(|item| &item.id == id)
                .ok_or_else(|| EnhancementError::NotFound(id.clone()))?;
            item.state = EnhancementState::Processing;
            let item = item.clone();
            pending.processing.insert(id.clone());
            item
        };
        Ok(self.run(item).await)
    }

    /// Process an item already marked as processing.
    async fn run(&self, mut item: QueuedEnhancement) -> EnhancementRecord {
        let id = &item.id.clone();
        debug!(%id, kind = %item.request.kind, "Processing enhancement");
        let applier = lock(&self.appliers).get(&item.request.kind).cloned();
        let (state, error) = match applier {
            Some(applier) => self.apply(applier.as_ref(), &item).await,
            None => (
                EnhancementState::Failed,
                Some(format!("No applier registered for {}", item.request.kind)),
            ),
        };
        item.state = state;

        {
            let mut pending = lock(&self.pending);
            pending.items.retain(|i| &i.id != id);
            pending.processing.remove(id);
        }

        let record = EnhancementRecord::finished(&item, state, error.clone());
        {
            let mut history = lock(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
            }
            history.push_back(record.clone());
        }
        if record.succeeded() {
            *lock(&self.successes)
                .entry(SafePattern {
                    kind: record.kind,
                    source: record.source.clone(),
                })
                .or_default() += 1;
        }
        {
            let mut stats = lock(&self.stats);
            match state {
                EnhancementState::Succeeded => stats.applied += 1,
                EnhancementState::RolledBack => stats.rolled_back += 1,
                _ => stats.failed += 1,
            }
        }

        self.audit
            .record(keys::ENHANCEMENT_FINISHED, json!(record))
            .await;
        let event = match (state, error) {
            (EnhancementState::Succeeded, _) => {
                info!(%id, "Enhancement applied");
                ForgeEvent::EnhancementApplied { id: id.clone() }
            }
            (EnhancementState::RolledBack, reason) => {
                let reason = reason.unwrap_or_default();
                warn!(%id, %reason, "Enhancement rolled back");
                self.audit
                    .record(
                        keys::ENHANCEMENT_ROLLBACK,
                        json!({ "id": id, "reason": reason }),
                    )
                    .await;
                ForgeEvent::EnhancementRolledBack {
                    id: id.clone(),
                    reason,
                }
            }
            (_, error) => {
                let error = error.unwrap_or_default();
                warn!(%id, %error, "Enhancement failed");
                ForgeEvent::EnhancementFailed {
                    id: id.clone(),
                    error,
                }
            }
        };
        self.bus.emit(event);

        record
    }

    async fn apply(
        &self,
        applier: &dyn EnhancementApplier,
        item: &QueuedEnhancement,
    ) -> (EnhancementState, Option<String>) {
        let applied = match applier.apply(item).await {
            Ok(applied) => applied,
            Err(e) => return (EnhancementState::Failed, Some(e.to_string())),
        };

        let reason = match applier.validate(item, &applied).await {
            Ok(true) => return (EnhancementState::Succeeded, None),
            Ok(false) => "validation failed".to_string(),
            Err(e) => e.to_string(),
        };

        match applier.rollback(item).await {
            Ok(()) => (EnhancementState::RolledBack, Some(reason)),
            Err(e) => (
                EnhancementState::Failed,
                Some(format!("{}; {}", reason, ApplyError::Rollback(e.to_string()))),
            ),
        }
    }

    /// Ask the scanner for issues and turn critical ones with a pattern into rules.
    pub async fn run_safety_scan(&self) -> Result<ScanReport, EnhancementError> {
        let issues = match self.scanner.scan_system().await {
            Ok(issues) => issues,
            Err(e) => {
                warn!(error = %e, "Safety scan failed");
                return Err(e.into());
            }
        };

        let mut report = ScanReport {
            issues: issues.len(),
            ..Default::default()
        };

        for issue in issues.iter().filter(|i| i.severity == Severity::Critical) {
            let Some(pattern) = &issue.pattern else {
                continue;
            };
            if lock(&self.rules).iter().any(|c| &c.rule.pattern == pattern) {
                continue;
            }

            let n = {
                let mut stats = lock(&self.stats);
                stats.scan_rules += 1;
                stats.scan_rules
            };
            let rule = SafetyRule::new(format!("scan-{}", n), pattern.clone())
                .with_severity(Severity::Critical)
                .with_description(issue.description.clone());
            match self.add_rule(rule) {
                Ok(()) => report.rules_added.push(format!("scan-{}", n)),
                Err(e) => warn!(%pattern, error = %e, "Ignoring scanner pattern"),
            }
        }

        lock(&self.stats).last_scan = Some(Utc::now());
        info!(
            issues = report.issues,
            rules_added = report.rules_added.len(),
            "Safety scan completed"
        );
        self.audit
            .record(
                keys::SAFETY_SCAN,
                json!({ "issues": issues, "rules_added": report.rules_added }),
            )
            .await;
        self.bus.emit(ForgeEvent::SafetyScanCompleted {
            issues: report.issues,
            rules_added: report.rules_added.len(),
        });
        Ok(report)
    }

    /// Promote (type, source) pairs with enough successful applications to
    /// known-safe patterns. Returns the number of new patterns.
    pub fn learn_patterns(&self) -> usize {
        let proven: Vec<SafePattern> = lock(&self.successes)
            .iter()
            .filter(|(_, n)| **n >= self.params.min_successes_for_safe_pattern)
            .map(|(pattern, _)| pattern.clone())
            .collect();

        let (added, total) = {
            let mut known = lock(&self.safe_patterns);
            let added = proven
                .into_iter()
                .filter(|pattern| known.insert(pattern.clone()))
                .count();
            (added, known.len())
        };

        if added > 0 {
            info!(added, total, "Learned safe enhancement patterns");
        }
        self.bus
            .emit(ForgeEvent::SafetyPatternsLearned { total, added });
        added
    }

    pub fn known_safe_patterns(&self) -> Vec<SafePattern> {
        lock(&self.safe_patterns).iter().cloned().collect()
    }

    /// Most recent finished enhancements, oldest first.
    pub fn history(&self) -> Vec<EnhancementRecord> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn pending(&self) -> Vec<QueuedEnhancement> {
        lock(&self.pending).items.clone()
    }

    pub fn get_status(&self) -> PipelineStatus {
        let (pending, processing) = {
            let state = lock(&self.pending);
            (state.items.len(), state.processing.len())
        };
        let stats = lock(&self.stats);
        PipelineStatus {
            pending,
            processing,
            active_rules: lock(&self.rules).iter().filter(|c| c.rule.active).count(),
            known_safe_patterns: lock(&self.safe_patterns).len(),
            applied: stats.applied,
            rolled_back: stats.rolled_back,
            failed: stats.failed,
            last_scan: stats.last_scan,
        }
    }

    /// Start the three periodic jobs: processing, safety scan and pattern
    /// learning. All stop when `token` is cancelled.
    pub fn spawn_cycles(self: &Arc<Self>, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let process = {
            let pipeline = Arc::clone(self);
            let token = token.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(pipeline.params.process_interval);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            let report = pipeline.process_pending().await;
                            if !report.records.is_empty() {
                                debug!(processed = report.records.len(), "Processing cycle finished");
                            }
                        }
                    }
                }
            })
        };

        let scan = {
            let pipeline = Arc::clone(self);
            let token = token.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(pipeline.params.safety_scan_interval);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            // Failures are already logged
                            let _ = pipeline.run_safety_scan().await;
                        }
                    }
                }
            })
        };

        let learn = {
            let pipeline = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(pipeline.params.pattern_learning_interval);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            pipeline.learn_patterns();
                        }
                    }
                }
            })
        };

        vec![process, scan, learn]
    }

    async fn reject(&self, request: &EnhancementRequest, reason: RejectionReason, detail: &str) {
        self.audit
            .record(
                keys::ENHANCEMENT_REJECTED,
                json!({ "kind": request.kind, "source": request.source, "reason": reason, "detail": detail }),
            )
            .await;
        self.bus.emit(ForgeEvent::EnhancementRejected {
            kind: request.kind,
            source: request.source.clone(),
            reason,
            detail: detail.to_string(),
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
