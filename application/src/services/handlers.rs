//! Resolution handlers backed by the orchestration services.
//!
//! - [`PipelineResolutionHandler`] turns a triage request into an enhancement
//!   and processes it through the [`EnhancementPipeline`]
//! - [`AgentResolutionHandler`] forwards the request to an active agent of a
//!   given kind through the [`CommunicationService`]

use crate::ports::resolution_handler::{HandlerError, ResolutionHandler};
use crate::services::agent_registry::AgentRegistry;
use crate::services::communication::CommunicationService;
use crate::services::enhancement_pipeline::EnhancementPipeline;
use async_trait::async_trait;
use forge_domain::{
    AgentKind, EnhancementKind, EnhancementRequest, HandlerOutcome, LearningRecord, PromptRequest,
    TriageRequest,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub const ENHANCER_NAME: &str = "auto_enhancer";
pub const CONTROLLER_NAME: &str = "auto_controller";
pub const ARCHITECT_NAME: &str = "auto_architect";

/// First tier: fix the problem with an automatic enhancement.
///
/// The enhancement type comes from `data.extra.enhancement_type` and
/// defaults to `optimization`; the source is derived from the error pattern.
pub struct PipelineResolutionHandler {
    pipeline: Arc<EnhancementPipeline>,
    learned: AtomicU64,
}

impl PipelineResolutionHandler {
    pub fn new(pipeline: Arc<EnhancementPipeline>) -> Self {
        Self {
            pipeline,
            learned: AtomicU64::new(0),
        }
    }

    fn enhancement_for(request: &TriageRequest) -> EnhancementRequest {
        let kind = request
            .data
            .extra
            .get("enhancement_type")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<EnhancementKind>().ok())
            .unwrap_or(EnhancementKind::Optimization);
        let source = match &request.pattern {
            Some(pattern) => format!("triage:{}", pattern.pattern_type),
            None => format!("triage:{}", request.error_text()),
        };
        let target = request
            .data
            .component
            .clone()
            .unwrap_or_else(|| request.source.clone());

        EnhancementRequest::new(kind, source, target)
            .with_priority(request.priority)
            .with_metadata("triage_id", request.id.as_str())
            .with_metadata("attempt", request.attempt)
    }
}

#[async_trait]
impl ResolutionHandler for PipelineResolutionHandler {
    fn name(&self) -> &str {
        ENHANCER_NAME
    }

    async fn handle(&self, request: &TriageRequest) -> Result<HandlerOutcome, HandlerError> {
        let enhancement = Self::enhancement_for(request);
        let record = self
            .pipeline
            .queue_and_apply(enhancement)
            .await
            .map_err(|e| HandlerError::Rejected {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        let result = json!({ "enhancement": record });
        if record.succeeded() {
            Ok(HandlerOutcome::success(result))
        } else {
            Ok(HandlerOutcome::failure(result))
        }
    }

    async fn status(&self) -> Value {
        json!({
            "name": ENHANCER_NAME,
            "pipeline": self.pipeline.get_status(),
            "learned": self.learned.load(Ordering::Relaxed),
        })
    }

    async fn learn(&self, record: &LearningRecord) {
        self.learned.fetch_add(1, Ordering::Relaxed);
        debug!(pattern = %record.pattern_type, strategy = %record.strategy, "Enhancer received learning record");
    }
}

/// Tier that delegates to a registered agent of one kind.
pub struct AgentResolutionHandler {
    name: String,
    kind: AgentKind,
    registry: Arc<AgentRegistry>,
    communication: Arc<CommunicationService>,
    learned: AtomicU64,
}

impl AgentResolutionHandler {
    pub fn new(
        name: impl Into<String>,
        kind: AgentKind,
        registry: Arc<AgentRegistry>,
        communication: Arc<CommunicationService>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            registry,
            communication,
            learned: AtomicU64::new(0),
        }
    }

    /// The autonomous-control tier.
    pub fn controller(registry: Arc<AgentRegistry>, communication: Arc<CommunicationService>) -> Self {
        Self::new(CONTROLLER_NAME, AgentKind::Autonomous, registry, communication)
    }

    /// The architecture-analysis tier.
    pub fn architect(registry: Arc<AgentRegistry>, communication: Arc<CommunicationService>) -> Self {
        Self::new(ARCHITECT_NAME, AgentKind::Architect, registry, communication)
    }
}

#[async_trait]
impl ResolutionHandler for AgentResolutionHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, request: &TriageRequest) -> Result<HandlerOutcome, HandlerError> {
        let agent = self.registry.get_agent(self.kind).ok_or_else(|| {
            HandlerError::Unavailable(format!("no active {} agent", self.kind))
        })?;

        let task = serde_json::to_string(request).map_err(|e| HandlerError::Failed(e.to_string()))?;
        let prompt = PromptRequest::new(self.name.as_str(), agent.id.clone(), task)
            .with_priority(request.priority)
            .with_domain("triage");

        let response = self.communication.send_message(prompt).await;
        if response.queued {
            return Err(HandlerError::Unavailable(format!(
                "agent {} went inactive, request queued",
                agent.id
            )));
        }

        let result = json!({
            "agent_id": agent.id,
            "output": response.output,
            "quality_score": response.quality_score,
            "error": response.error,
        });
        if response.success {
            Ok(HandlerOutcome::success(result))
        } else {
            Ok(HandlerOutcome::failure(result))
        }
    }

    async fn status(&self) -> Value {
        let agent = self.registry.get_agent(self.kind);
        json!({
            "name": self.name,
            "kind": self.kind,
            "available": agent.is_some(),
            "agent_id": agent.as_ref().map(|a| a.id.clone()),
            "metrics": agent.map(|a| a.metrics),
            "learned": self.learned.load(Ordering::Relaxed),
        })
    }

    async fn learn(&self, record: &LearningRecord) {
        self.learned.fetch_add(1, Ordering::Relaxed);
        debug!(handler = %self.name, pattern = %record.pattern_type, "Agent handler received learning record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommunicationParams, PipelineParams, RegistryParams};
    use crate::ports::agent_endpoint::{AgentEndpoint, EndpointError, EndpointReply};
    use crate::ports::enhancement_applier::{ApplyError, EnhancementApplier};
    use crate::ports::persistent_store::{
        AuditTrail, NoStore, PersistentStore, RecordFilter, StoreError, StoredRecord, keys,
    };
    use crate::ports::system_scanner::NoScanner;
    use crate::services::event_bus::EventBus;
    use forge_domain::{Agent, AgentStatus, ErrorKind, QueuedEnhancement, SafetyRule, TriageKind};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{OnceLock, Weak};

    struct EchoEndpoint;

    #[async_trait]
    impl AgentEndpoint for EchoEndpoint {
        async fn process(
            &self,
            agent: &Agent,
            _request: &PromptRequest,
            _attempt: u32,
        ) -> Result<EndpointReply, EndpointError> {
            Ok(EndpointReply::new(format!("{} handled it", agent.id), 0.9))
        }
    }

    struct AlwaysApplies;

    #[async_trait]
    impl EnhancementApplier for AlwaysApplies {
        fn kind(&self) -> EnhancementKind {
            EnhancementKind::Optimization
        }

        async fn apply(&self, _item: &QueuedEnhancement) -> Result<Value, ApplyError> {
            Ok(json!({}))
        }

        async fn validate(&self, _item: &QueuedEnhancement, _applied: &Value) -> Result<bool, ApplyError> {
            Ok(true)
        }

        async fn rollback(&self, _item: &QueuedEnhancement) -> Result<(), ApplyError> {
            Ok(())
        }
    }

    /// Runs a processing cycle as soon as an enhancement is queued.
    #[derive(Default)]
    struct CycleOnQueue {
        pipeline: OnceLock<Weak<EnhancementPipeline>>,
        cycled: AtomicUsize,
    }

    #[async_trait]
    impl PersistentStore for CycleOnQueue {
        async fn record(&self, key: &str, _fields: Value) -> Result<(), StoreError> {
            if key == keys::ENHANCEMENT_QUEUED
                && let Some(pipeline) = self.pipeline.get().and_then(Weak::upgrade)
            {
                let report = pipeline.process_pending().await;
                self.cycled.fetch_add(report.records.len(), Ordering::SeqCst);
            }
            Ok(())
        }

        async fn query(&self, _filter: &RecordFilter) -> Result<Vec<StoredRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn services() -> (Arc<AgentRegistry>, Arc<CommunicationService>) {
        let bus = Arc::new(EventBus::new());
        let audit = AuditTrail::new(Arc::new(NoStore));
        let registry = Arc::new(AgentRegistry::new(
            RegistryParams::default(),
            Arc::clone(&bus),
            audit.clone(),
        ));
        let communication = Arc::new(CommunicationService::new(
            CommunicationParams::default(),
            Arc::clone(&registry),
            bus,
            audit,
            Arc::new(EchoEndpoint),
        ));
        (registry, communication)
    }

    fn pipeline(params: PipelineParams) -> Arc<EnhancementPipeline> {
        Arc::new(
            EnhancementPipeline::new(
                params,
                Arc::new(EventBus::new()),
                AuditTrail::new(Arc::new(NoStore)),
                Arc::new(NoScanner),
            )
            .unwrap(),
        )
    }

    fn triage() -> TriageRequest {
        TriageRequest::new(TriageKind::Failure, "scraper")
            .with_error("timeout")
            .with_component("fetcher")
    }

    #[tokio::test]
    async fn test_pipeline_handler_applies_enhancement() {
        let pipeline = pipeline(PipelineParams::default());
        pipeline.register_applier(Arc::new(AlwaysApplies));
        let handler = PipelineResolutionHandler::new(Arc::clone(&pipeline));

        let outcome = handler.handle(&triage()).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.result["enhancement"]["target"], "fetcher");
        assert_eq!(pipeline.get_status().applied, 1);
    }

    #[tokio::test]
    async fn test_pipeline_handler_owns_its_enhancement() {
        let store = Arc::new(CycleOnQueue::default());
        let pipeline = Arc::new(
            EnhancementPipeline::new(
                PipelineParams::default(),
                Arc::new(EventBus::new()),
                AuditTrail::new(store.clone()),
                Arc::new(NoScanner),
            )
            .unwrap(),
        );
        pipeline.register_applier(Arc::new(AlwaysApplies));
        store.pipeline.set(Arc::downgrade(&pipeline)).unwrap();
        let handler = PipelineResolutionHandler::new(Arc::clone(&pipeline));

        let outcome = handler.handle(&triage()).await.unwrap();

        assert!(outcome.success);
        assert_eq!(store.cycled.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.get_status().applied, 1);
        assert!(pipeline.pending().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_handler_without_applier_fails() {
        let handler = PipelineResolutionHandler::new(pipeline(PipelineParams::default()));
        let outcome = handler.handle(&triage()).await.unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_pipeline_handler_surfaces_safety_rejection() {
        let handler = PipelineResolutionHandler::new(pipeline(
            PipelineParams::default().with_rule(SafetyRule::new("no-triage", "^triage:")),
        ));

        let err = handler.handle(&triage()).await.unwrap_err();

        assert!(matches!(
            err,
            HandlerError::Rejected {
                kind: ErrorKind::SafetyViolation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_agent_handler_uses_active_agent() {
        let (registry, communication) = services();
        registry
            .register_agent(Agent::new("ctl-1", AgentKind::Autonomous))
            .await
            .unwrap();
        let handler = AgentResolutionHandler::controller(Arc::clone(&registry), communication);

        let outcome = handler.handle(&triage()).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.result["output"], "ctl-1 handled it");
        assert_eq!(handler.name(), CONTROLLER_NAME);
    }

    #[tokio::test]
    async fn test_agent_handler_without_agent_is_unavailable() {
        let (registry, communication) = services();
        registry
            .register_agent(Agent::new("arch-1", AgentKind::Architect))
            .await
            .unwrap();
        registry
            .update_status(&"arch-1".into(), AgentStatus::Inactive)
            .await
            .unwrap();
        let handler = AgentResolutionHandler::architect(registry, communication);

        let err = handler.handle(&triage()).await.unwrap_err();

        assert!(matches!(err, HandlerError::Unavailable(_)));
        assert_eq!(handler.status().await["available"], false);
    }
}
