//! Triage engine
//!
//! Routes a failure through three increasingly capable handler tiers:
//!
//! ```text
//! New -> Analyzing -> Attempting(0) enhancement
//!                  -> Attempting(1) autonomous control
//!                  -> Attempting(2) architecture analysis
//!                  -> Resolved | EscalatedToArchitect
//! ```
//!
//! Each failed attempt below the last tier waits for the back-off delay and
//! escalates the request (priority + 1, attempt + 1, pattern attached). After
//! the third failure the architect receives one final, priority-10 request
//! carrying the full error history, and its answer is returned as is.
//!
//! Every `handle_request` call owns its context; only metrics are shared.

use crate::config::TriageParams;
use crate::ports::error_analyzer::ErrorAnalyzer;
use crate::ports::persistent_store::{AuditTrail, RecordFilter, keys};
use crate::ports::resolution_handler::ResolutionHandler;
use crate::ports::strategy_selector::StrategySelector;
use crate::services::event_bus::EventBus;
use chrono::Utc;
use forge_domain::util::{running_average, truncate_for_log};
use forge_domain::{
    AttemptRecord, ErrorContext, ErrorKind, ErrorPattern, EscalationDossier, ForgeEvent,
    HandlerTier, LearningRecord, TriageRequest, TriageResult, TriageState,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

const LOG_ERROR_BYTES: usize = 200;

#[derive(Error, Debug, Clone)]
pub enum TriageError {
    #[error("Invalid triage request: {0}")]
    InvalidRequest(String),
}

impl TriageError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// The three tiers, in escalation order.
#[derive(Clone)]
pub struct TierHandlers {
    pub enhancement: Arc<dyn ResolutionHandler>,
    pub autonomous: Arc<dyn ResolutionHandler>,
    pub architect: Arc<dyn ResolutionHandler>,
}

impl TierHandlers {
    pub fn get(&self, tier: HandlerTier) -> &Arc<dyn ResolutionHandler> {
        match tier {
            HandlerTier::Enhancement => &self.enhancement,
            HandlerTier::Autonomous => &self.autonomous,
            HandlerTier::Architecture => &self.architect,
        }
    }

    fn all(&self) -> [&Arc<dyn ResolutionHandler>; 3] {
        [&self.enhancement, &self.autonomous, &self.architect]
    }

    fn names(&self) -> Vec<String> {
        self.all().iter().map(|h| h.name().to_string()).collect()
    }
}

/// Running triage statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriageMetrics {
    pub requests_handled: u64,
    pub resolved: u64,
    pub escalated_to_architect: u64,
    pub success_rate: f64,
    pub average_attempts: f64,
    pub average_duration_ms: f64,
}

pub struct TriageEngine {
    params: TriageParams,
    handlers: TierHandlers,
    analyzer: Arc<dyn ErrorAnalyzer>,
    strategy: Arc<dyn StrategySelector>,
    bus: Arc<EventBus>,
    audit: AuditTrail,
    metrics: Mutex<TriageMetrics>,
}

impl TriageEngine {
    pub fn new(
        params: TriageParams,
        handlers: TierHandlers,
        analyzer: Arc<dyn ErrorAnalyzer>,
        strategy: Arc<dyn StrategySelector>,
        bus: Arc<EventBus>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            params,
            handlers,
            analyzer,
            strategy,
            bus,
            audit,
            metrics: Mutex::new(TriageMetrics::default()),
        }
    }

    /// Resolve `request`, escalating through the tiers as needed.
    ///
    /// Handler failures never surface as errors; the returned result records
    /// every attempt and, when all three failed, the final architect call.
    pub async fn handle_request(&self, request: TriageRequest) -> Result<TriageResult, TriageError> {
        if request.source.trim().is_empty() {
            return Err(TriageError::InvalidRequest("source must not be empty".to_string()));
        }

        let started = Instant::now();
        info!(
            request_id = %request.id,
            kind = request.kind.as_str(),
            source = %request.source,
            error = %truncate_for_log(&request.error_text(), LOG_ERROR_BYTES),
            "Triage started"
        );

        let mut state = TriageState::Analyzing;
        debug!(request_id = %request.id, ?state, "Building error context");
        let mut context = self.build_context(&request).await;
        self.audit
            .record(
                keys::TRIAGE_ERROR,
                json!({
                    "request_id": request.id,
                    "component": context.component,
                    "error": context.error,
                    "source": request.source,
                    "kind": request.kind,
                }),
            )
            .await;

        let pattern = self.analyzer.classify(&context).await;
        context.recommended_strategy = self
            .strategy
            .recommend(&pattern, &self.handlers.names())
            .await;
        debug!(
            request_id = %request.id,
            pattern = %pattern.pattern_type,
            strategy = ?context.recommended_strategy,
            "Error classified"
        );

        let mut current = request.clone();
        let mut attempts = Vec::with_capacity(HandlerTier::ORDER.len());

        for (n, tier) in HandlerTier::ORDER.into_iter().enumerate() {
            state = TriageState::Attempting(n as u8);
            debug!(request_id = %request.id, ?state, "Attempting resolution");

            let handler = self.handlers.get(tier);
            let (record, resolution, raised) = self.attempt(handler.as_ref(), tier, &current).await;
            let success = record.success;
            if let Some(error) = raised {
                context.push_related(error);
            }
            attempts.push(record);

            if success {
                let result = TriageResult {
                    request_id: request.id.clone(),
                    success: true,
                    assigned_agent: handler.name().to_string(),
                    attempts,
                    escalated: n > 0,
                    final_escalation: None,
                    resolution,
                    pattern: Some(pattern.clone()),
                    recommended_strategy: context.recommended_strategy.clone(),
                    error: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                self.resolve(&pattern, &result).await;
                return Ok(result);
            }

            if n + 1 < HandlerTier::ORDER.len() {
                let delay = self.params.backoff.delay_for(n as u32);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                current = current.escalate(&pattern);
                info!(
                    request_id = %request.id,
                    attempt = current.attempt,
                    priority = current.priority,
                    "Escalating triage request"
                );
                self.bus.emit(ForgeEvent::TriageEscalated {
                    request_id: request.id.clone(),
                    attempt: current.attempt,
                    priority: current.priority,
                });
            }
        }

        state = TriageState::EscalatedToArchitect;
        debug!(request_id = %request.id, ?state, "All tiers failed");
        let result = self
            .escalate_to_architect(&current, &context, &pattern, attempts, started)
            .await;
        Ok(result)
    }

    pub fn metrics(&self) -> TriageMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Status of every tier, as included in error contexts.
    pub async fn handler_status(&self) -> Value {
        let mut status = serde_json::Map::new();
        for handler in self.handlers.all() {
            status.insert(handler.name().to_string(), handler.status().await);
        }
        Value::Object(status)
    }

    async fn build_context(&self, request: &TriageRequest) -> ErrorContext {
        let mut context = ErrorContext {
            error: request.error_text(),
            stack_trace: request.data.stack_trace.clone(),
            component: request.data.component.clone(),
            ..Default::default()
        };

        if let Some(component) = &context.component {
            let filter = RecordFilter::key(keys::TRIAGE_ERROR)
                .with_field("component", component.as_str())
                .with_limit(self.params.related_error_limit);
            let related: Vec<String> = self
                .audit
                .query(&filter)
                .await
                .iter()
                .filter_map(|r| r.field_str("error").map(str::to_string))
                .collect();
            for message in related {
                context.push_related(message);
            }
        }

        for handler in self.handlers.all() {
            context
                .system_state
                .insert(handler.name().to_string(), handler.status().await);
        }
        context
    }

    async fn attempt(
        &self,
        handler: &dyn ResolutionHandler,
        tier: HandlerTier,
        request: &TriageRequest,
    ) -> (AttemptRecord, Value, Option<String>) {
        let started = Instant::now();
        let outcome = handler.handle(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        // Only errors raised by the handler count as related errors
        let (success, error, resolution, raised) = match outcome {
            Ok(outcome) if outcome.success => (true, None, outcome.result, None),
            Ok(outcome) => (
                false,
                Some(format!("{} did not resolve the request: {}", handler.name(), outcome.result)),
                outcome.result,
                None,
            ),
            Err(e) => {
                warn!(request_id = %request.id, handler = handler.name(), error = %e, "Handler failed");
                (false, Some(e.to_string()), Value::Null, Some(e.to_string()))
            }
        };

        let record = AttemptRecord {
            attempt: request.attempt,
            tier,
            handler: handler.name().to_string(),
            priority: request.priority,
            success,
            error,
            duration_ms,
        };

        self.audit
            .record(
                keys::TRIAGE_OUTCOME,
                json!({ "request_id": request.id, "event": "attempt", "record": record }),
            )
            .await;
        self.bus.emit(ForgeEvent::TriageAttempted {
            request_id: request.id.clone(),
            attempt: record.attempt,
            tier,
            handler: record.handler.clone(),
            success,
        });
        (record, resolution, raised)
    }

    async fn resolve(&self, pattern: &ErrorPattern, result: &TriageResult) {
        info!(
            request_id = %result.request_id,
            handler = %result.assigned_agent,
            attempts = result.attempt_count(),
            "Triage resolved"
        );

        let learning = LearningRecord {
            pattern_type: pattern.pattern_type.clone(),
            strategy: result.assigned_agent.clone(),
            success_factors: learning_factors(pattern, result),
            attempts: result.attempt_count() as u32,
            recorded_at: Utc::now(),
        };
        for handler in self.handlers.all() {
            handler.learn(&learning).await;
        }
        for record in &result.attempts {
            self.strategy
                .record_outcome(&pattern.pattern_type, &record.handler, record.success)
                .await;
        }

        self.audit
            .record(
                keys::TRIAGE_OUTCOME,
                json!({ "request_id": result.request_id, "event": "resolved", "result": result, "learning": learning }),
            )
            .await;
        self.bus.emit(ForgeEvent::TriageResolved {
            request_id: result.request_id.clone(),
            handler: result.assigned_agent.clone(),
            attempts: result.attempt_count() as u32,
        });
        self.record_metrics(result);
    }

    async fn escalate_to_architect(
        &self,
        last: &TriageRequest,
        context: &ErrorContext,
        pattern: &ErrorPattern,
        attempts: Vec<AttemptRecord>,
        started: Instant,
    ) -> TriageResult {
        let mut request = last.clone();
        request.priority = self.params.terminal_priority;
        request.pattern = Some(pattern.clone());
        request.dossier = Some(EscalationDossier {
            error_history: context.error_history(),
            system_state: self.handler_status().await,
            recommended_actions: recommended_actions(pattern, &attempts),
        });

        warn!(
            request_id = %request.id,
            attempts = attempts.len(),
            "All resolution attempts failed, escalating to architect"
        );
        let architect = &self.handlers.architect;
        let (record, resolution, _) = self
            .attempt(architect.as_ref(), HandlerTier::Architecture, &request)
            .await;

        let result = TriageResult {
            request_id: request.id.clone(),
            success: record.success,
            assigned_agent: architect.name().to_string(),
            attempts,
            escalated: true,
            error: record.error.clone(),
            final_escalation: Some(record),
            resolution,
            pattern: Some(pattern.clone()),
            recommended_strategy: context.recommended_strategy.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        self.audit
            .record(
                keys::TRIAGE_OUTCOME,
                json!({ "request_id": result.request_id, "event": "architect_escalation", "result": result }),
            )
            .await;
        self.bus.emit(ForgeEvent::TriageArchitectEscalation {
            request_id: result.request_id.clone(),
            success: result.success,
        });
        self.record_metrics(&result);
        result
    }

    fn record_metrics(&self, result: &TriageResult) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        let n = metrics.requests_handled;
        let resolved = result.success && result.final_escalation.is_none();
        metrics.success_rate =
            running_average(metrics.success_rate, n, if result.success { 1.0 } else { 0.0 });
        metrics.average_attempts =
            running_average(metrics.average_attempts, n, result.attempt_count() as f64);
        metrics.average_duration_ms =
            running_average(metrics.average_duration_ms, n, result.duration_ms as f64);
        metrics.requests_handled = n + 1;
        if resolved {
            metrics.resolved += 1;
        }
        if result.final_escalation.is_some() {
            metrics.escalated_to_architect += 1;
        }
    }
}

fn learning_factors(pattern: &ErrorPattern, result: &TriageResult) -> Vec<String> {
    let mut factors = vec![format!("resolved by {}", result.assigned_agent)];
    if result.escalated {
        factors.push(format!("after {} attempts", result.attempt_count()));
    }
    if result.recommended_strategy.as_deref() == Some(result.assigned_agent.as_str()) {
        factors.push("matched recommended strategy".to_string());
    }
    factors.extend(pattern.suggested_fixes.iter().cloned());
    factors
}

fn recommended_actions(pattern: &ErrorPattern, attempts: &[AttemptRecord]) -> Vec<String> {
    let mut actions: Vec<String> = pattern.suggested_fixes.clone();
    actions.extend(
        pattern
            .related_files
            .iter()
            .map(|f| format!("review {}", f)),
    );
    let tried: Vec<&str> = attempts.iter().map(|a| a.handler.as_str()).collect();
    if !tried.is_empty() {
        actions.push(format!("avoid repeating: {}", tried.join(", ")));
    }
    if actions.is_empty() {
        actions.push(format!("investigate {} errors", pattern.pattern_type));
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffPolicy;
    use crate::ports::error_analyzer::NoAnalysis;
    use crate::ports::persistent_store::{NoStore, PersistentStore, StoreError, StoredRecord};
    use crate::ports::resolution_handler::HandlerError;
    use crate::ports::strategy_selector::FirstCandidate;
    use async_trait::async_trait;
    use forge_domain::{HandlerOutcome, Severity, Topic, TriageKind};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Handler returning scripted outcomes in order.
    struct ScriptedHandler {
        name: String,
        outcomes: Mutex<VecDeque<Result<HandlerOutcome, HandlerError>>>,
        seen: Mutex<Vec<TriageRequest>>,
        learned: Mutex<Vec<LearningRecord>>,
    }

    impl ScriptedHandler {
        fn new(name: &str, outcomes: Vec<Result<HandlerOutcome, HandlerError>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                outcomes: Mutex::new(outcomes.into()),
                seen: Mutex::new(Vec::new()),
                learned: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<TriageRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResolutionHandler for ScriptedHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, request: &TriageRequest) -> Result<HandlerOutcome, HandlerError> {
            self.seen.lock().unwrap().push(request.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HandlerOutcome::failure(json!("no script"))))
        }

        async fn learn(&self, record: &LearningRecord) {
            self.learned.lock().unwrap().push(record.clone());
        }
    }

    /// In-memory store so related-error lookups have something to find.
    #[derive(Default)]
    struct VecStore {
        records: Mutex<Vec<StoredRecord>>,
    }

    #[async_trait]
    impl PersistentStore for VecStore {
        async fn record(&self, key: &str, fields: Value) -> Result<(), StoreError> {
            self.records.lock().unwrap().push(StoredRecord::new(key, fields));
            Ok(())
        }

        async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
            Ok(filter.select(self.records.lock().unwrap().iter()))
        }
    }

    struct Tiers {
        enhancer: Arc<ScriptedHandler>,
        controller: Arc<ScriptedHandler>,
        architect: Arc<ScriptedHandler>,
    }

    impl Tiers {
        fn new(
            enhancer: Vec<Result<HandlerOutcome, HandlerError>>,
            controller: Vec<Result<HandlerOutcome, HandlerError>>,
            architect: Vec<Result<HandlerOutcome, HandlerError>>,
        ) -> Self {
            Self {
                enhancer: ScriptedHandler::new("auto_enhancer", enhancer),
                controller: ScriptedHandler::new("auto_controller", controller),
                architect: ScriptedHandler::new("auto_architect", architect),
            }
        }

        fn handlers(&self) -> TierHandlers {
            TierHandlers {
                enhancement: self.enhancer.clone(),
                autonomous: self.controller.clone(),
                architect: self.architect.clone(),
            }
        }
    }

    fn engine_with(tiers: &Tiers, store: Arc<dyn PersistentStore>, params: TriageParams) -> (TriageEngine, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let engine = TriageEngine::new(
            params,
            tiers.handlers(),
            Arc::new(NoAnalysis),
            Arc::new(FirstCandidate),
            Arc::clone(&bus),
            AuditTrail::new(store),
        );
        (engine, bus)
    }

    fn engine(tiers: &Tiers) -> TriageEngine {
        engine_with(
            tiers,
            Arc::new(NoStore),
            TriageParams::default().with_backoff(BackoffPolicy::none()),
        )
        .0
    }

    fn ok() -> Result<HandlerOutcome, HandlerError> {
        Ok(HandlerOutcome::success(json!({"fixed": true})))
    }

    fn fail() -> Result<HandlerOutcome, HandlerError> {
        Ok(HandlerOutcome::failure(json!("not fixed")))
    }

    fn error(message: &str) -> Result<HandlerOutcome, HandlerError> {
        Err(HandlerError::Failed(message.to_string()))
    }

    fn request() -> TriageRequest {
        TriageRequest::new(TriageKind::Failure, "scraper")
            .with_priority(2)
            .with_error("timeout while fetching")
            .with_component("scraper")
    }

    #[tokio::test]
    async fn test_first_tier_resolves() {
        let tiers = Tiers::new(vec![ok()], vec![], vec![]);
        let result = engine(&tiers).handle_request(request()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.assigned_agent, "auto_enhancer");
        assert_eq!(result.attempt_count(), 1);
        assert!(!result.escalated);
        assert!(tiers.controller.seen().is_empty());
    }

    #[tokio::test]
    async fn test_third_tier_resolves_after_two_failures() {
        let tiers = Tiers::new(vec![fail()], vec![error("controller crashed")], vec![ok()]);
        let result = engine(&tiers).handle_request(request()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.assigned_agent, "auto_architect");
        assert_eq!(result.attempt_count(), 3);
        assert!(result.escalated);
        assert!(result.final_escalation.is_none());

        let tiers_tried: Vec<_> = result.attempts.iter().map(|a| a.tier).collect();
        assert_eq!(tiers_tried, HandlerTier::ORDER.to_vec());
    }

    #[tokio::test]
    async fn test_escalation_bumps_priority_and_attempt() {
        let tiers = Tiers::new(vec![fail()], vec![fail()], vec![ok()]);
        engine(&tiers).handle_request(request()).await.unwrap();

        let to_controller = &tiers.controller.seen()[0];
        let to_architect = &tiers.architect.seen()[0];
        assert_eq!(to_controller.priority, 3);
        assert_eq!(to_controller.attempt, 1);
        assert!(to_controller.pattern.is_some());
        assert_eq!(to_architect.priority, 4);
        assert_eq!(to_architect.attempt, 2);
    }

    #[tokio::test]
    async fn test_never_more_than_three_attempts() {
        let tiers = Tiers::new(
            vec![error("a")],
            vec![error("b")],
            vec![error("c"), Ok(HandlerOutcome::success(json!("redesign")))],
        );
        let (engine, bus) = engine_with(
            &tiers,
            Arc::new(NoStore),
            TriageParams::default().with_backoff(BackoffPolicy::none()),
        );
        let attempted = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&attempted);
        bus.subscribe(Topic::TriageAttempted, move |_| *counter.lock().unwrap() += 1);

        let result = engine.handle_request(request()).await.unwrap();

        assert_eq!(result.attempt_count(), 3);
        assert!(result.escalated);
        // The terminal architect answer is returned unconditionally
        assert!(result.success);
        assert_eq!(result.resolution, json!("redesign"));
        let last = result.final_escalation.unwrap();
        assert_eq!(last.priority, 10);
        assert_eq!(*attempted.lock().unwrap(), 4);

        let terminal = &tiers.architect.seen()[1];
        let dossier = terminal.dossier.as_ref().unwrap();
        assert_eq!(
            dossier.error_history,
            vec![
                "timeout while fetching",
                "Handler failed: a",
                "Handler failed: b",
                "Handler failed: c"
            ]
        );
        assert!(dossier.system_state.get("auto_architect").is_some());
        assert!(!dossier.recommended_actions.is_empty());
    }

    #[tokio::test]
    async fn test_failed_architect_escalation_is_reported() {
        let tiers = Tiers::new(vec![fail()], vec![fail()], vec![fail(), fail()]);
        let engine = engine(&tiers);
        let result = engine.handle_request(request()).await.unwrap();

        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(!result.final_escalation.unwrap().success);

        let metrics = engine.metrics();
        assert_eq!(metrics.escalated_to_architect, 1);
        assert_eq!(metrics.resolved, 0);
    }

    #[tokio::test]
    async fn test_success_feeds_learning_to_every_handler() {
        let tiers = Tiers::new(vec![fail()], vec![ok()], vec![]);
        engine(&tiers).handle_request(request()).await.unwrap();

        for handler in [&tiers.enhancer, &tiers.controller, &tiers.architect] {
            let learned = handler.learned.lock().unwrap();
            assert_eq!(learned.len(), 1);
            assert_eq!(learned[0].strategy, "auto_controller");
            assert_eq!(learned[0].attempts, 2);
        }
    }

    #[tokio::test]
    async fn test_related_errors_come_from_the_same_component() {
        let store = Arc::new(VecStore::default());
        for (component, error) in [("scraper", "dns failure"), ("billing", "card declined")] {
            store
                .record(keys::TRIAGE_ERROR, json!({"component": component, "error": error}))
                .await
                .unwrap();
        }
        let tiers = Tiers::new(vec![fail()], vec![fail()], vec![fail(), fail()]);
        let (engine, _bus) = engine_with(
            &tiers,
            store,
            TriageParams::default().with_backoff(BackoffPolicy::none()),
        );

        engine.handle_request(request()).await.unwrap();

        let dossier = tiers.architect.seen()[1].dossier.clone().unwrap();
        assert!(dossier.error_history.contains(&"dns failure".to_string()));
        assert!(!dossier.error_history.contains(&"card declined".to_string()));
    }

    #[tokio::test]
    async fn test_only_raised_errors_join_related_errors() {
        let tiers = Tiers::new(
            vec![fail()],
            vec![error("controller crashed")],
            vec![fail(), fail()],
        );
        engine(&tiers).handle_request(request()).await.unwrap();

        let history = tiers.architect.seen()[1].dossier.clone().unwrap().error_history;
        assert!(history.iter().any(|e| e.contains("controller crashed")));
        assert!(!history.iter().any(|e| e.contains("did not resolve")));
    }

    #[tokio::test]
    async fn test_related_errors_are_capped() {
        let store = Arc::new(VecStore::default());
        for i in 0..8 {
            store
                .record(keys::TRIAGE_ERROR, json!({"component": "scraper", "error": format!("old {}", i)}))
                .await
                .unwrap();
        }
        let tiers = Tiers::new(vec![fail()], vec![fail()], vec![fail(), fail()]);
        let (engine, _bus) = engine_with(
            &tiers,
            store,
            TriageParams::default().with_backoff(BackoffPolicy::none()),
        );

        engine.handle_request(request()).await.unwrap();

        let history = tiers.architect.seen()[1].dossier.clone().unwrap().error_history;
        let old: Vec<_> = history.iter().filter(|e| e.starts_with("old")).collect();
        assert_eq!(old, vec!["old 7", "old 6", "old 5", "old 4", "old 3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let tiers = Tiers::new(vec![fail()], vec![fail()], vec![ok()]);
        let (engine, _bus) = engine_with(
            &tiers,
            Arc::new(NoStore),
            TriageParams::default().with_backoff(BackoffPolicy::Fixed {
                delay: Duration::from_secs(5),
            }),
        );

        let before = tokio::time::Instant::now();
        let result = engine.handle_request(request()).await.unwrap();

        assert!(result.success);
        assert!(before.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_metrics_are_running_averages() {
        let tiers = Tiers::new(vec![ok(), fail()], vec![fail()], vec![ok()]);
        let engine = engine(&tiers);

        engine.handle_request(request()).await.unwrap();
        engine.handle_request(request()).await.unwrap();

        let metrics = engine.metrics();
        assert_eq!(metrics.requests_handled, 2);
        assert_eq!(metrics.resolved, 2);
        assert_eq!(metrics.success_rate, 1.0);
        assert_eq!(metrics.average_attempts, 2.0);
    }

    #[tokio::test]
    async fn test_empty_source_is_rejected() {
        let tiers = Tiers::new(vec![], vec![], vec![]);
        let err = engine(&tiers)
            .handle_request(TriageRequest::new(TriageKind::Failure, " "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(tiers.enhancer.seen().is_empty());
    }

    #[test]
    fn test_recommended_actions_fallback() {
        let pattern = ErrorPattern::new("timeout", Severity::High);
        assert_eq!(
            recommended_actions(&pattern, &[]),
            vec!["investigate timeout errors"]
        );
    }
}
