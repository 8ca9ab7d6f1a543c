//! Inter-agent communication
//!
//! [`CommunicationService`] delivers [`PromptRequest`]s to their target
//! agents. Requests for a known but unavailable target wait in a per-target
//! FIFO queue that is drained when the target becomes active again.
//!
//! Draining is single-flight: one shared drain future exists per target at a
//! time and concurrent callers await that same future.

use crate::config::CommunicationParams;
use crate::ports::agent_endpoint::{AgentEndpoint, EndpointError, EndpointReply};
use crate::ports::persistent_store::{AuditTrail, keys};
use crate::services::agent_registry::AgentRegistry;
use crate::services::event_bus::{EventBus, SubscriptionId};
use forge_domain::util::running_average;
use forge_domain::{
    AgentId, AgentStatus, ErrorKind, ForgeEvent, MessageId, PromptRequest, PromptResponse, Topic,
};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone)]
pub enum CommunicationError {
    #[error("Target agent not found")]
    TargetNotFound(AgentId),

    #[error("No endpoint registered for agent {0}")]
    NoEndpoint(AgentId),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl CommunicationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommunicationError::TargetNotFound(_) => ErrorKind::NotFound,
            CommunicationError::NoEndpoint(_) => ErrorKind::Validation,
            CommunicationError::Endpoint(_) => ErrorKind::Transient,
        }
    }
}

/// Service-wide delivery statistics, all running averages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunicationMetrics {
    pub requests_handled: u64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    /// Messages currently waiting across all targets
    pub queue_size: usize,
    /// Mean time a queued message waited before delivery
    pub average_wait_time_ms: f64,
    pub messages_waited: u64,
}

/// Result of one drain of a target queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub target: Option<AgentId>,
    pub delivered: Vec<MessageId>,
    pub failed: Vec<MessageId>,
    /// Messages left in the queue because the target went away mid-drain
    pub remaining: usize,
}

struct QueuedMessage {
    request: PromptRequest,
    enqueued_at: Instant,
}

type DrainFuture = Shared<BoxFuture<'static, DrainReport>>;

pub struct CommunicationService {
    params: CommunicationParams,
    registry: Arc<AgentRegistry>,
    bus: Arc<EventBus>,
    audit: AuditTrail,
    default_endpoint: Arc<dyn AgentEndpoint>,
    endpoints: Mutex<HashMap<AgentId, Arc<dyn AgentEndpoint>>>,
    queues: Mutex<HashMap<AgentId, VecDeque<QueuedMessage>>>,
    draining: Mutex<HashMap<AgentId, DrainFuture>>,
    /// Senders waiting for a message that went through the queue
    waiters: Mutex<HashMap<MessageId, oneshot::Sender<PromptResponse>>>,
    metrics: Mutex<CommunicationMetrics>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl CommunicationService {
    pub fn new(
        params: CommunicationParams,
        registry: Arc<AgentRegistry>,
        bus: Arc<EventBus>,
        audit: AuditTrail,
        default_endpoint: Arc<dyn AgentEndpoint>,
    ) -> Self {
        Self {
            params,
            registry,
            bus,
            audit,
            default_endpoint,
            endpoints: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            draining: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            metrics: Mutex::new(CommunicationMetrics::default()),
            subscription: Mutex::new(None),
        }
    }

    /// Route requests for `agent_id` to `endpoint` instead of the default.
    pub fn register_endpoint(&self, agent_id: AgentId, endpoint: Arc<dyn AgentEndpoint>) {
        lock(&self.endpoints).insert(agent_id, endpoint);
    }

    /// Drain a target's queue whenever it becomes active.
    ///
    /// The drain runs on the current tokio runtime. Calling this twice
    /// replaces the earlier subscription.
    pub fn attach(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let id = self.bus.subscribe(Topic::AgentStatusUpdated, move |event| {
            let ForgeEvent::AgentStatusUpdated { agent_id, to, .. } = event else {
                return;
            };
            if *to != AgentStatus::Active {
                return;
            }
            let Some(service) = weak.upgrade() else {
                return;
            };
            if service.queue_len(agent_id) == 0 {
                return;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let target = agent_id.clone();
                    handle.spawn(async move {
                        service.drain_queue(&target).await;
                    });
                }
                Err(_) => warn!(agent_id = %agent_id, "No runtime to drain queue on"),
            }
        });

        if let Some(previous) = lock(&self.subscription).replace(id) {
            self.bus.unsubscribe(previous);
        }
    }

    /// Send a request to its target agent.
    ///
    /// Unknown targets fail immediately without side effects. Known targets
    /// that are not active get the request appended to their queue and the
    /// response is marked `queued`. An active target with a backlog gets the
    /// request behind that backlog, and the caller waits for its turn.
    pub async fn send_message(self: &Arc<Self>, request: PromptRequest) -> PromptResponse {
        let target = request.target_agent_id.clone();

        if !self.registry.contains(&target) {
            let error = CommunicationError::TargetNotFound(target.clone());
            debug!(target = %target, "Rejecting message for unknown target");
            return PromptResponse::failed(request.id, error.to_string());
        }

        if !self.registry.is_active(&target) {
            return self.enqueue(request).await;
        }

        let message_id = request.id.clone();
        let request = match self.join_backlog(request) {
            Ok(receiver) => return self.await_turn(&target, message_id, receiver).await,
            Err(request) => request,
        };

        let response = self.process(&request).await;
        self.finish(&request, &response, false).await;
        response
    }

    /// Deliver every queued request for `target`, in order.
    ///
    /// Concurrent calls for the same target share one drain. Draining stops
    /// early when the target is no longer active; the rest stays queued.
    pub async fn drain_queue(self: &Arc<Self>, target: &AgentId) -> DrainReport {
        let drain = {
            let mut draining = lock(&self.draining);
            match draining.get(target) {
                Some(existing) => existing.clone(),
                None => {
                    let service = Arc::clone(self);
                    let key = target.clone();
                    let drain = async move {
                        let report = service.run_drain(&key).await;
                        lock(&service.draining).remove(&key);
                        report
                    }
                    .boxed()
                    .shared();
                    draining.insert(target.clone(), drain.clone());
                    drain
                }
            }
        };
        drain.await
    }

    /// Number of requests waiting for `target`.
    pub fn queue_len(&self, target: &AgentId) -> usize {
        lock(&self.queues).get(target).map_or(0, VecDeque::len)
    }

    /// Whether a queue was ever created for `target`.
    pub fn has_queue(&self, target: &AgentId) -> bool {
        lock(&self.queues).contains_key(target)
    }

    /// Waiting requests for `target`, oldest first.
    pub fn queued_requests(&self, target: &AgentId) -> Vec<PromptRequest> {
        lock(&self.queues)
            .get(target)
            .map(|q| q.iter().map(|m| m.request.clone()).collect())
            .unwrap_or_default()
    }

    pub fn metrics(&self) -> CommunicationMetrics {
        let mut metrics = lock(&self.metrics).clone();
        metrics.queue_size = lock(&self.queues).values().map(VecDeque::len).sum();
        metrics
    }

    /// Queue `request` behind older messages for its target, if there are any.
    ///
    /// Hands the request back when the queue is empty and no drain is running.
    fn join_backlog(
        &self,
        request: PromptRequest,
    ) -> Result<oneshot::Receiver<PromptResponse>, PromptRequest> {
        let target = request.target_agent_id.clone();
        let mut queues = lock(&self.queues);
        let waiting = queues.get(&target).is_some_and(|q| !q.is_empty());
        if !waiting && !lock(&self.draining).contains_key(&target) {
            return Err(request);
        }

        let (sender, receiver) = oneshot::channel();
        lock(&self.waiters).insert(request.id.clone(), sender);
        debug!(target = %target, message_id = %request.id, "Target has a backlog, queueing behind it");
        queues.entry(target).or_default().push_back(QueuedMessage {
            request,
            enqueued_at: Instant::now(),
        });
        Ok(receiver)
    }

    /// Drain until the message behind `receiver` has been delivered.
    ///
    /// If the target leaves the active state first, the message stays queued
    /// and the response says so.
    async fn await_turn(
        self: &Arc<Self>,
        target: &AgentId,
        message_id: MessageId,
        mut receiver: oneshot::Receiver<PromptResponse>,
    ) -> PromptResponse {
        loop {
            self.drain_queue(target).await;
            match receiver.try_recv() {
                Ok(response) => return response,
                Err(oneshot::error::TryRecvError::Closed) => {
                    return PromptResponse::failed(message_id, "Delivery abandoned");
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
            if !self.is_queued(target, &message_id) {
                // Popped by a drain that is still delivering it
                return receiver
                    .await
                    .unwrap_or_else(|_| PromptResponse::failed(message_id, "Delivery abandoned"));
            }
            if !self.registry.is_active(target) && self.stop_waiting(target, &message_id) {
                return PromptResponse::queued(message_id);
            }
        }
    }

    fn is_queued(&self, target: &AgentId, message_id: &MessageId) -> bool {
        lock(&self.queues)
            .get(target)
            .is_some_and(|q| q.iter().any(|m| &m.request.id == message_id))
    }

    /// Drop the waiter for a message that is still queued.
    fn stop_waiting(&self, target: &AgentId, message_id: &MessageId) -> bool {
        let queues = lock(&self.queues);
        let queued = queues
            .get(target)
            .is_some_and(|q| q.iter().any(|m| &m.request.id == message_id));
        if queued {
            lock(&self.waiters).remove(message_id);
        }
        queued
    }

    async fn enqueue(&self, request: PromptRequest) -> PromptResponse {
        let target = request.target_agent_id.clone();
        let message_id = request.id.clone();
        let queue_len = {
            let mut queues = lock(&self.queues);
            let queue = queues.entry(target.clone()).or_default();
            queue.push_back(QueuedMessage {
                request,
                enqueued_at: Instant::now(),
            });
            queue.len()
        };

        info!(target = %target, queue_len, "Target unavailable, message queued");
        self.audit
            .record(
                keys::MESSAGE,
                json!({ "message_id": message_id, "target": target, "event": "queued", "queue_len": queue_len }),
            )
            .await;
        self.bus.emit(ForgeEvent::MessageQueued {
            message_id: message_id.clone(),
            target,
            queue_len,
        });
        PromptResponse::queued(message_id)
    }

    async fn run_drain(&self, target: &AgentId) -> DrainReport {
        let mut report = DrainReport {
            target: Some(target.clone()),
            ..Default::default()
        };

        loop {
            if !self.registry.is_active(target) {
                break;
            }
            let next = lock(&self.queues).get_mut(target).and_then(VecDeque::pop_front);
            let Some(message) = next else {
                break;
            };

            let waited_ms = message.enqueued_at.elapsed().as_secs_f64() * 1000.0;
            {
                let mut metrics = lock(&self.metrics);
                metrics.average_wait_time_ms =
                    running_average(metrics.average_wait_time_ms, metrics.messages_waited, waited_ms);
                metrics.messages_waited += 1;
            }

            let response = self.process(&message.request).await;
            self.finish(&message.request, &response, true).await;
            if let Some(waiter) = lock(&self.waiters).remove(&message.request.id) {
                // The sender may have stopped waiting
                let _ = waiter.send(response.clone());
            }
            if response.success {
                report.delivered.push(message.request.id);
            } else {
                report.failed.push(message.request.id);
            }
        }

        report.remaining = self.queue_len(target);
        debug!(
            target = %target,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            remaining = report.remaining,
            "Queue drained"
        );
        report
    }

    /// Run the request against the target's endpoint, re-submitting while
    /// the reply quality stays below the threshold.
    async fn process(&self, request: &PromptRequest) -> PromptResponse {
        let started = Instant::now();
        let outcome = self.optimize(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((reply, attempts)) => PromptResponse::delivered(
                request.id.clone(),
                reply.output,
                elapsed_ms,
                attempts,
                reply.quality_score,
            ),
            Err((e, attempts)) => PromptResponse::failed(request.id.clone(), e.to_string())
                .with_processing_time(elapsed_ms)
                .with_optimization_attempts(attempts),
        }
    }

    async fn optimize(
        &self,
        request: &PromptRequest,
    ) -> Result<(EndpointReply, u32), (CommunicationError, u32)> {
        let target = &request.target_agent_id;
        let Some(agent) = self.registry.get(target) else {
            return Err((CommunicationError::TargetNotFound(target.clone()), 0));
        };
        let endpoint = lock(&self.endpoints)
            .get(target)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_endpoint));

        let max_attempts = self.params.max_optimization_attempts.max(1);
        let mut best: Option<EndpointReply> = None;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            match endpoint.process(&agent, request, attempts).await {
                Ok(reply) => {
                    let good_enough = reply.quality_score >= self.params.quality_threshold;
                    if best
                        .as_ref()
                        .is_none_or(|b| reply.quality_score > b.quality_score)
                    {
                        best = Some(reply);
                    }
                    if good_enough {
                        break;
                    }
                }
                Err(e) => {
                    warn!(target = %target, attempt = attempts, error = %e, "Endpoint call failed");
                    if best.is_none() {
                        return Err((e.into(), attempts));
                    }
                    break;
                }
            }
        }

        match best {
            Some(reply) => Ok((reply, attempts)),
            None => Err((CommunicationError::NoEndpoint(target.clone()), attempts)),
        }
    }

    async fn finish(&self, request: &PromptRequest, response: &PromptResponse, from_queue: bool) {
        let target = &request.target_agent_id;
        let elapsed_ms = response.processing_time_ms as f64;

        if let Err(e) = self
            .registry
            .record_request(target, response.success, elapsed_ms)
        {
            debug!(target = %target, error = %e, "Could not update agent metrics");
        }
        {
            let mut metrics = lock(&self.metrics);
            let n = metrics.requests_handled;
            let outcome = if response.success { 1.0 } else { 0.0 };
            metrics.success_rate = running_average(metrics.success_rate, n, outcome);
            metrics.average_response_time_ms =
                running_average(metrics.average_response_time_ms, n, elapsed_ms);
            metrics.requests_handled = n + 1;
        }

        self.audit
            .record(
                keys::MESSAGE,
                json!({
                    "message_id": request.id,
                    "source": request.source_agent_id,
                    "target": target,
                    "event": "delivered",
                    "success": response.success,
                    "from_queue": from_queue,
                    "processing_time_ms": response.processing_time_ms,
                    "optimization_attempts": response.optimization_attempts,
                    "quality_score": response.quality_score,
                    "error": response.error,
                }),
            )
            .await;
        self.bus.emit(ForgeEvent::MessageDelivered {
            message_id: request.id.clone(),
            target: target.clone(),
            success: response.success,
            from_queue,
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
