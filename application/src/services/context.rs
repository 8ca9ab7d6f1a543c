//! Runtime context
//!
//! [`ForgeContext`] owns one instance of every orchestration service and is
//! passed explicitly to whoever needs them. [`ForgeContextBuilder`] takes the
//! external collaborators and wires the services together: the triage tiers
//! are backed by the pipeline and by agent delegation, and the communication
//! service is attached to the bus so queues drain on reactivation.

use crate::config::ForgeConfig;
use crate::ports::agent_endpoint::AgentEndpoint;
use crate::ports::error_analyzer::{ErrorAnalyzer, NoAnalysis};
use crate::ports::persistent_store::{AuditTrail, NoStore, PersistentStore};
use crate::ports::resolution_handler::ResolutionHandler;
use crate::ports::strategy_selector::{FirstCandidate, StrategySelector};
use crate::ports::system_scanner::{NoScanner, SystemScanner};
use crate::services::agent_registry::AgentRegistry;
use crate::services::communication::CommunicationService;
use crate::services::enhancement_pipeline::{EnhancementError, EnhancementPipeline};
use crate::services::event_bus::EventBus;
use crate::services::handlers::{AgentResolutionHandler, PipelineResolutionHandler};
use crate::services::triage_engine::{TierHandlers, TriageEngine};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct ForgeContext {
    pub config: ForgeConfig,
    pub bus: Arc<EventBus>,
    pub store: Arc<dyn PersistentStore>,
    pub registry: Arc<AgentRegistry>,
    pub communication: Arc<CommunicationService>,
    pub pipeline: Arc<EnhancementPipeline>,
    pub triage: Arc<TriageEngine>,
}

impl ForgeContext {
    pub fn builder(config: ForgeConfig, endpoint: Arc<dyn AgentEndpoint>) -> ForgeContextBuilder {
        ForgeContextBuilder::new(config, endpoint)
    }

    /// Start the periodic jobs: heartbeat scan, enhancement processing,
    /// safety scan and pattern learning. All stop when `token` is cancelled.
    pub fn spawn_background(&self, token: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = vec![self.registry.spawn_health_monitor(token.clone())];
        handles.extend(self.pipeline.spawn_cycles(token));
        info!(tasks = handles.len(), "Background tasks started");
        handles
    }
}

pub struct ForgeContextBuilder {
    config: ForgeConfig,
    endpoint: Arc<dyn AgentEndpoint>,
    store: Arc<dyn PersistentStore>,
    analyzer: Arc<dyn ErrorAnalyzer>,
    strategy: Arc<dyn StrategySelector>,
    scanner: Arc<dyn SystemScanner>,
    bus: Option<Arc<EventBus>>,
    enhancement_handler: Option<Arc<dyn ResolutionHandler>>,
    controller_handler: Option<Arc<dyn ResolutionHandler>>,
    architect_handler: Option<Arc<dyn ResolutionHandler>>,
}

impl ForgeContextBuilder {
    pub fn new(config: ForgeConfig, endpoint: Arc<dyn AgentEndpoint>) -> Self {
        Self {
            config,
            endpoint,
            store: Arc::new(NoStore),
            analyzer: Arc::new(NoAnalysis),
            strategy: Arc::new(FirstCandidate),
            scanner: Arc::new(NoScanner),
            bus: None,
            enhancement_handler: None,
            controller_handler: None,
            architect_handler: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn ErrorAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn StrategySelector>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn SystemScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replace the pipeline-backed first tier.
    pub fn with_enhancement_handler(mut self, handler: Arc<dyn ResolutionHandler>) -> Self {
        self.enhancement_handler = Some(handler);
        self
    }

    /// Replace the agent-backed autonomous-control tier.
    pub fn with_controller_handler(mut self, handler: Arc<dyn ResolutionHandler>) -> Self {
        self.controller_handler = Some(handler);
        self
    }

    /// Replace the agent-backed architecture tier.
    pub fn with_architect_handler(mut self, handler: Arc<dyn ResolutionHandler>) -> Self {
        self.architect_handler = Some(handler);
        self
    }

    /// Wire the services. Must be called inside a tokio runtime for queue
    /// draining to work.
    pub fn build(self) -> Result<ForgeContext, EnhancementError> {
        let bus = self.bus.unwrap_or_else(|| Arc::new(EventBus::new()));
        let audit = AuditTrail::new(Arc::clone(&self.store));

        let registry = Arc::new(AgentRegistry::new(
            self.config.registry.clone(),
            Arc::clone(&bus),
            audit.clone(),
        ));
        let communication = Arc::new(CommunicationService::new(
            self.config.communication.clone(),
            Arc::clone(&registry),
            Arc::clone(&bus),
            audit.clone(),
            self.endpoint,
        ));
        communication.attach();

        let pipeline = Arc::new(EnhancementPipeline::new(
            self.config.pipeline.clone(),
            Arc::clone(&bus),
            audit.clone(),
            self.scanner,
        )?);

        let handlers = TierHandlers {
            enhancement: self
                .enhancement_handler
                .unwrap_or_else(|| Arc::new(PipelineResolutionHandler::new(Arc::clone(&pipeline)))),
            autonomous: self.controller_handler.unwrap_or_else(|| {
                Arc::new(AgentResolutionHandler::controller(
                    Arc::clone(&registry),
                    Arc::clone(&communication),
                ))
            }),
            architect: self.architect_handler.unwrap_or_else(|| {
                Arc::new(AgentResolutionHandler::architect(
                    Arc::clone(&registry),
                    Arc::clone(&communication),
                ))
            }),
        };
        let triage = Arc::new(TriageEngine::new(
            self.config.triage.clone(),
            handlers,
            self.analyzer,
            self.strategy,
            Arc::clone(&bus),
            audit,
        ));

        Ok(ForgeContext {
            config: self.config,
            bus,
            store: self.store,
            registry,
            communication,
            pipeline,
            triage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::agent_endpoint::{EndpointError, EndpointReply};
    use crate::ports::enhancement_applier::{ApplyError, EnhancementApplier};
    use async_trait::async_trait;
    use forge_domain::{
        Agent, AgentId, AgentKind, AgentStatus, EnhancementKind, PromptRequest, QueuedEnhancement,
        TriageKind, TriageRequest,
    };
    use serde_json::{Value, json};
    use std::time::Duration;

    struct EchoEndpoint;

    #[async_trait]
    impl AgentEndpoint for EchoEndpoint {
        async fn process(
            &self,
            agent: &Agent,
            request: &PromptRequest,
            _attempt: u32,
        ) -> Result<EndpointReply, EndpointError> {
            Ok(EndpointReply::new(format!("{}: {}", agent.id, request.task), 1.0))
        }
    }

    struct RejectingApplier;

    #[async_trait]
    impl EnhancementApplier for RejectingApplier {
        fn kind(&self) -> EnhancementKind {
            EnhancementKind::Optimization
        }

        async fn apply(&self, _item: &QueuedEnhancement) -> Result<Value, ApplyError> {
            Ok(json!({}))
        }

        async fn validate(&self, _item: &QueuedEnhancement, _applied: &Value) -> Result<bool, ApplyError> {
            Ok(false)
        }

        async fn rollback(&self, _item: &QueuedEnhancement) -> Result<(), ApplyError> {
            Ok(())
        }
    }

    fn config() -> ForgeConfig {
        let mut config = ForgeConfig::default();
        config.triage = config
            .triage
            .with_backoff(crate::config::BackoffPolicy::none());
        config
    }

    #[tokio::test]
    async fn test_reactivation_drains_queue_through_bus() {
        let ctx = ForgeContext::builder(config(), Arc::new(EchoEndpoint))
            .build()
            .unwrap();
        let id = AgentId::new("a");
        ctx.registry
            .register_agent(Agent::new("a", AgentKind::Prompt))
            .await
            .unwrap();
        ctx.registry.deregister_agent(&id).await.unwrap();

        let response = ctx
            .communication
            .send_message(PromptRequest::new("caller", "a", "Y"))
            .await;
        assert!(response.queued);

        ctx.registry
            .update_status(&id, AgentStatus::Active)
            .await
            .unwrap();

        // The drain was spawned by the status event; wait for it to finish.
        for _ in 0..100 {
            if ctx.communication.queue_len(&id) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ctx.communication.queue_len(&id), 0);
        assert_eq!(ctx.communication.metrics().requests_handled, 1);
    }

    #[tokio::test]
    async fn test_triage_falls_through_to_agents() {
        let ctx = ForgeContext::builder(config(), Arc::new(EchoEndpoint))
            .build()
            .unwrap();
        ctx.pipeline.register_applier(Arc::new(RejectingApplier));
        ctx.registry
            .register_agent(Agent::new("ctl", AgentKind::Autonomous))
            .await
            .unwrap();

        let result = ctx
            .triage
            .handle_request(
                TriageRequest::new(TriageKind::Failure, "scraper").with_error("selector broke"),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.assigned_agent, "auto_controller");
        assert_eq!(result.attempt_count(), 2);
        assert_eq!(ctx.pipeline.get_status().rolled_back, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_tasks_stop_on_cancel() {
        let ctx = ForgeContext::builder(config(), Arc::new(EchoEndpoint))
            .build()
            .unwrap();
        let token = CancellationToken::new();

        let handles = ctx.spawn_background(token.clone());
        assert_eq!(handles.len(), 4);

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
