//! Agent registry
//!
//! Owns every [`Agent`] entry: identity, status, heartbeat and per-agent
//! metrics. Entries are never removed, only marked terminated. A periodic
//! health check moves agents with stale heartbeats to inactive and tries to
//! restart them through their registered [`AgentStartHook`].

use crate::config::{RegistryParams, SelectionPolicy};
use crate::ports::agent_endpoint::AgentStartHook;
use crate::ports::persistent_store::{AuditTrail, keys};
use crate::services::event_bus::EventBus;
use chrono::{DateTime, TimeDelta, Utc};
use forge_domain::{Agent, AgentId, AgentKind, AgentStatus, DomainError, ErrorKind, ForgeEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("Agent not found: {0}")]
    NotFound(AgentId),

    #[error(transparent)]
    InvalidTransition(#[from] DomainError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::InvalidTransition(e) => e.kind(),
        }
    }
}

/// Registry-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetrics {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub error: usize,
    pub terminated: usize,
    pub heartbeat_misses: u64,
    pub restarts: u64,
    pub restart_failures: u64,
}

/// What one health check did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthReport {
    pub missed: Vec<AgentId>,
    pub restarted: Vec<AgentId>,
    pub restart_failed: Vec<AgentId>,
}

#[derive(Default)]
struct RegistryState {
    agents: HashMap<AgentId, Agent>,
    /// Registration order, used for deterministic selection
    order: Vec<AgentId>,
    heartbeat_misses: u64,
    restarts: u64,
    restart_failures: u64,
}

pub struct AgentRegistry {
    params: RegistryParams,
    bus: Arc<EventBus>,
    audit: AuditTrail,
    state: Mutex<RegistryState>,
    start_hooks: Mutex<HashMap<AgentId, Arc<dyn AgentStartHook>>>,
}

impl AgentRegistry {
    pub fn new(params: RegistryParams, bus: Arc<EventBus>, audit: AuditTrail) -> Self {
        Self {
            params,
            bus,
            audit,
            state: Mutex::new(RegistryState::default()),
            start_hooks: Mutex::new(HashMap::new()),
        }
    }

    pub fn params(&self) -> &RegistryParams {
        &self.params
    }

    /// Register or refresh an agent.
    ///
    /// New ids are inserted as active. Known ids keep their metrics, take the
    /// new kind and name, move to active and get a fresh heartbeat. Agents in
    /// `error` or `terminated` cannot be re-registered.
    pub async fn register_agent(&self, agent: Agent) -> Result<Agent, RegistryError> {
        let now = Utc::now();
        let (snapshot, previous) = {
            let mut state = self.lock_state();
            let previous = match state.agents.get_mut(&agent.id) {
                Some(existing) => {
                    let previous = existing.transition_to(AgentStatus::Active)?;
                    existing.kind = agent.kind;
                    existing.name = agent.name.clone();
                    existing.touch(now);
                    Some(previous)
                }
                None => {
                    let fresh = agent
                        .clone()
                        .with_status(AgentStatus::Active)
                        .with_heartbeat(now);
                    state.order.push(fresh.id.clone());
                    state.agents.insert(fresh.id.clone(), fresh);
                    None
                }
            };
            (state.agents[&agent.id].clone(), previous)
        };

        info!(agent_id = %snapshot.id, kind = %snapshot.kind, "Agent registered");
        self.persist_snapshot(&snapshot, "registered").await;

        self.bus.emit(ForgeEvent::AgentRegistered {
            agent_id: snapshot.id.clone(),
            kind: snapshot.kind,
        });
        if let Some(from) = previous
            && from != AgentStatus::Active
        {
            self.bus.emit(ForgeEvent::AgentStatusUpdated {
                agent_id: snapshot.id.clone(),
                from,
                to: AgentStatus::Active,
            });
        }
        Ok(snapshot)
    }

    /// Take an active agent out of service.
    pub async fn deregister_agent(&self, id: &AgentId) -> Result<(), RegistryError> {
        let (snapshot, _) = self.transition(id, AgentStatus::Inactive)?;

        info!(agent_id = %id, "Agent deregistered");
        self.persist_snapshot(&snapshot, "deregistered").await;
        self.bus.emit(ForgeEvent::AgentDeregistered {
            agent_id: id.clone(),
        });
        Ok(())
    }

    /// An active agent of `kind`, chosen by the configured selection policy.
    pub fn get_agent(&self, kind: AgentKind) -> Option<Agent> {
        let state = self.lock_state();
        let mut candidates = state
            .order
            .iter()
            .filter_map(|id| state.agents.get(id))
            .filter(|a| a.kind == kind && a.is_active());

        match self.params.selection_policy {
            SelectionPolicy::FirstRegistered => candidates.next().cloned(),
            // min_by_key keeps the first of equal elements
            SelectionPolicy::LeastLoaded => candidates
                .min_by_key(|a| a.metrics.requests_handled)
                .cloned(),
        }
    }

    pub fn get(&self, id: &AgentId) -> Option<Agent> {
        self.lock_state().agents.get(id).cloned()
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.lock_state().agents.contains_key(id)
    }

    pub fn is_active(&self, id: &AgentId) -> bool {
        self.lock_state()
            .agents
            .get(id)
            .is_some_and(Agent::is_active)
    }

    /// All agents in registration order.
    pub fn list(&self) -> Vec<Agent> {
        let state = self.lock_state();
        state
            .order
            .iter()
            .filter_map(|id| state.agents.get(id).cloned())
            .collect()
    }

    /// Move an agent to `status`. Same-state updates are no-ops.
    ///
    /// Returns the previous status.
    pub async fn update_status(
        &self,
        id: &AgentId,
        status: AgentStatus,
    ) -> Result<AgentStatus, RegistryError> {
        let (snapshot, from) = self.transition(id, status)?;
        if from == status {
            return Ok(from);
        }
        self.announce_transition(&snapshot, from, "status_updated")
            .await;
        Ok(from)
    }

    /// Refresh an agent's heartbeat. Does not change its status.
    pub fn heartbeat(&self, id: &AgentId) -> Result<(), RegistryError> {
        let mut state = self.lock_state();
        let agent = state
            .agents
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        agent.touch(Utc::now());
        Ok(())
    }

    /// An agent reports its own failure: active -> error.
    pub async fn report_failure(&self, id: &AgentId, reason: &str) -> Result<(), RegistryError> {
        let (snapshot, from) = self.transition(id, AgentStatus::Error)?;
        if from == AgentStatus::Error {
            return Ok(());
        }
        warn!(agent_id = %id, reason, "Agent reported failure");
        self.audit
            .record(
                keys::AGENT_HEALTH,
                json!({ "agent_id": id, "event": "failure", "reason": reason }),
            )
            .await;
        self.announce_transition(&snapshot, from, "failed").await;
        Ok(())
    }

    /// Terminate an agent. Terminated agents stay in the registry.
    pub async fn terminate(&self, id: &AgentId) -> Result<(), RegistryError> {
        self.update_status(id, AgentStatus::Terminated).await?;
        self.start_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    /// Fold one handled request into the agent's running metrics.
    pub fn record_request(
        &self,
        id: &AgentId,
        success: bool,
        elapsed_ms: f64,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock_state();
        let agent = state
            .agents
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        agent.metrics.record(success, elapsed_ms);
        Ok(())
    }

    /// Install the routine used to restart `id` after a missed heartbeat.
    pub fn register_start_hook(&self, id: AgentId, hook: Arc<dyn AgentStartHook>) {
        self.start_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, hook);
    }

    pub fn get_metrics(&self) -> RegistryMetrics {
        let state = self.lock_state();
        let mut metrics = RegistryMetrics {
            total: state.agents.len(),
            heartbeat_misses: state.heartbeat_misses,
            restarts: state.restarts,
            restart_failures: state.restart_failures,
            ..Default::default()
        };
        for agent in state.agents.values() {
            match agent.status {
                AgentStatus::Active => metrics.active += 1,
                AgentStatus::Inactive => metrics.inactive += 1,
                AgentStatus::Error => metrics.error += 1,
                AgentStatus::Terminated => metrics.terminated += 1,
            }
        }
        metrics
    }

    /// Scan all agents once for stale heartbeats.
    ///
    /// Each stale active agent is marked inactive and, if it has a start
    /// hook, restarted. A failed restart is reported and not retried here.
    pub async fn check_health(&self, now: DateTime<Utc>) -> HealthReport {
        let timeout = TimeDelta::from_std(self.params.heartbeat_timeout).unwrap_or(TimeDelta::MAX);
        let mut report = HealthReport::default();

        let stale: Vec<(Agent, AgentStatus)> = {
            let mut state = self.lock_state();
            let mut stale = Vec::new();
            for id in state.order.clone() {
                let Some(agent) = state.agents.get_mut(&id) else {
                    continue;
                };
                if !agent.heartbeat_expired(now, timeout) {
                    continue;
                }
                if let Ok(from) = agent.transition_to(AgentStatus::Inactive) {
                    stale.push((agent.clone(), from));
                }
            }
            state.heartbeat_misses += stale.len() as u64;
            stale
        };

        for (agent, from) in stale {
            warn!(
                agent_id = %agent.id,
                last_heartbeat = %agent.last_heartbeat,
                "Heartbeat missed"
            );
            report.missed.push(agent.id.clone());
            self.announce_transition(&agent, from, "heartbeat_missed")
                .await;
            self.bus.emit(ForgeEvent::AgentHeartbeatMissed {
                agent_id: agent.id.clone(),
                last_heartbeat: agent.last_heartbeat,
            });

            if self.restart(&agent).await {
                report.restarted.push(agent.id.clone());
            } else if self.has_start_hook(&agent.id) {
                report.restart_failed.push(agent.id.clone());
            }
        }

        report
    }

    /// Run [`check_health`](Self::check_health) every health-check interval
    /// until `token` is cancelled.
    pub fn spawn_health_monitor(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.params.health_check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let report = registry.check_health(Utc::now()).await;
                        if !report.missed.is_empty() {
                            debug!(missed = report.missed.len(), "Health check finished");
                        }
                    }
                }
            }
            debug!("Health monitor stopped");
        })
    }

    async fn restart(&self, agent: &Agent) -> bool {
        let Some(hook) = self.start_hook(&agent.id) else {
            return false;
        };

        match hook.start(agent).await {
            Ok(()) => {
                let restarted = {
                    let mut state = self.lock_state();
                    state.agents.get_mut(&agent.id).and_then(|entry| {
                        let from = entry.transition_to(AgentStatus::Active).ok()?;
                        entry.touch(Utc::now());
                        Some((entry.clone(), from))
                    })
                };
                let Some((snapshot, from)) = restarted else {
                    return false;
                };
                self.lock_state().restarts += 1;
                info!(agent_id = %agent.id, "Agent restarted");
                self.announce_transition(&snapshot, from, "restarted").await;
                self.bus.emit(ForgeEvent::AgentRestarted {
                    agent_id: agent.id.clone(),
                });
                true
            }
            Err(e) => {
                self.lock_state().restart_failures += 1;
                warn!(agent_id = %agent.id, error = %e, "Agent restart failed");
                self.audit
                    .record(
                        keys::AGENT_HEALTH,
                        json!({ "agent_id": agent.id, "event": "restart_failed", "error": e.to_string() }),
                    )
                    .await;
                self.bus.emit(ForgeEvent::AgentRestartFailed {
                    agent_id: agent.id.clone(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    fn start_hook(&self, id: &AgentId) -> Option<Arc<dyn AgentStartHook>> {
        self.start_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn has_start_hook(&self, id: &AgentId) -> bool {
        self.start_hook(id).is_some()
    }

    /// Apply a status transition under the lock and return the new snapshot
    /// together with the previous status.
    fn transition(
        &self,
        id: &AgentId,
        status: AgentStatus,
    ) -> Result<(Agent, AgentStatus), RegistryError> {
        let mut state = self.lock_state();
        let agent = state
            .agents
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        let from = agent.transition_to(status)?;
        Ok((agent.clone(), from))
    }

    async fn announce_transition(&self, snapshot: &Agent, from: AgentStatus, reason: &str) {
        debug!(agent_id = %snapshot.id, %from, to = %snapshot.status, reason, "Agent status changed");
        self.persist_snapshot(snapshot, reason).await;
        self.bus.emit(ForgeEvent::AgentStatusUpdated {
            agent_id: snapshot.id.clone(),
            from,
            to: snapshot.status,
        });
    }

    async fn persist_snapshot(&self, agent: &Agent, reason: &str) {
        self.audit
            .record(
                keys::AGENT_SNAPSHOT,
                json!({ "agent_id": agent.id, "reason": reason, "agent": agent }),
            )
            .await;
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
