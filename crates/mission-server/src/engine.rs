//! The single writer for agent records and the activity log.
//!
//! [`Engine`] is plain synchronous state; [`spawn`] moves it into one tokio
//! task that drains observations and commands in arrival order. Everything
//! that reads or writes agent state goes through [`EngineHandle`], so a store
//! update and its log append are never observed apart.

use std::collections::{HashMap, HashSet};

use tokio::sync::{broadcast, mpsc, oneshot};

use mission_core::agent::{Agent, AgentPatch, AgentStatus, Roster, UpdateSource};
use mission_core::derive::{StatusWindows, derive_status};
use mission_core::events::{ActivityEvent, AgentUpdate, EventKind};
use mission_core::messages::StateSnapshot;
use mission_core::observation::{Channel, Observation};
use mission_core::smoothing::{DEFAULT_THINKING_PROMOTION, Smoother};
use mission_core::time::now_millis;

use crate::event_log::{DEFAULT_BROADCAST_CAPACITY, DEFAULT_MAX_STORED_EVENTS, EventLog};
use crate::store::{AgentStore, ApplyOutcome};

/// Tuning for the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub windows: StatusWindows,
    pub thinking_promotion: u32,
    /// How long an operator-set `blocked` or `done` shadows poll updates.
    /// Zero disables.
    pub manual_hold_ms: u64,
    pub max_stored_events: usize,
    pub broadcast_capacity: usize,
    /// Depth of the command and observation queues.
    pub queue_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            windows: StatusWindows::default(),
            thinking_promotion: DEFAULT_THINKING_PROMOTION,
            manual_hold_ms: 60_000,
            max_stored_events: DEFAULT_MAX_STORED_EVENTS,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            queue_depth: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideError {
    UnknownAgent,
}

impl std::fmt::Display for OverrideError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAgent => write!(f, "agent is not in the roster"),
        }
    }
}

impl std::error::Error for OverrideError {}

/// A snapshot plus a receiver for every event appended after it.
pub struct Subscription {
    pub snapshot: StateSnapshot,
    pub events: broadcast::Receiver<ActivityEvent>,
}

/// Counters for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct EngineStats {
    pub agents: usize,
    pub events: usize,
    pub subscribers: usize,
}

pub struct Engine {
    store: AgentStore,
    smoother: Smoother,
    log: EventLog,
    windows: StatusWindows,
    manual_hold_ms: u64,
    /// Agent → time (ms) until which poll updates are withheld.
    holds: HashMap<String, u64>,
    /// Agents mid-run on the event channel. Poll labels do not replace
    /// their task or model until the run ends.
    event_runs: HashSet<String>,
}

impl Engine {
    pub fn new(roster: &Roster, settings: &EngineSettings, now_ms: u64) -> Self {
        Self {
            store: AgentStore::new(roster, now_ms),
            smoother: Smoother::new(roster.names(), settings.thinking_promotion),
            log: EventLog::with_capacity(settings.max_stored_events, settings.broadcast_capacity),
            windows: settings.windows,
            manual_hold_ms: settings.manual_hold_ms,
            holds: HashMap::new(),
            event_runs: HashSet::new(),
        }
    }

    /// Derive, smooth and maybe publish one observation. Returns the event
    /// appended, if the agent's visible record changed.
    pub fn observe(&mut self, obs: Observation) -> Option<ActivityEvent> {
        let candidate = derive_status(&obs, &self.windows);
        let Some(stable) = self.smoother.step(&obs.agent_id, candidate, obs.channel) else {
            tracing::debug!(agent = %obs.agent_id, "Observation for agent outside roster dropped");
            return None;
        };

        if candidate == AgentStatus::Idle {
            self.event_runs.remove(&obs.agent_id);
        } else if obs.channel == Channel::Event {
            self.event_runs.insert(obs.agent_id.clone());
        }

        // Event signals end a hold early; poll readings wait it out.
        if let Some(&until) = self.holds.get(&obs.agent_id) {
            if obs.channel == Channel::Poll && obs.observed_at < until {
                return None;
            }
            self.holds.remove(&obs.agent_id);
        }

        let (task, model) = match obs.channel {
            Channel::Poll if self.event_runs.contains(&obs.agent_id) => (None, None),
            _ => (obs.task, obs.model),
        };
        let current = self.store.get(&obs.agent_id)?;
        let next = Agent {
            status: stable,
            task: task.unwrap_or_else(|| current.task.clone()),
            model: model.unwrap_or_else(|| current.model.clone()),
            updated_at: obs.observed_at,
            source: match obs.channel {
                Channel::Poll => UpdateSource::Poll,
                Channel::Event => UpdateSource::Events,
            },
        };
        let outcome = self.store.apply(&obs.agent_id, next);
        self.commit(&obs.agent_id, outcome, obs.observed_at)
    }

    /// Apply an operator patch immediately, bypassing smoothing.
    pub fn manual_override(
        &mut self,
        agent: &str,
        patch: &AgentPatch,
        now_ms: u64,
    ) -> Result<Agent, OverrideError> {
        let outcome = self.store.apply_manual_override(agent, patch, now_ms);
        if outcome == ApplyOutcome::UnknownAgent {
            return Err(OverrideError::UnknownAgent);
        }
        if self.commit(agent, outcome, now_ms).is_some() {
            tracing::info!(agent, ?patch, "Manual override applied");
        }
        let current = self
            .store
            .get(agent)
            .cloned()
            .ok_or(OverrideError::UnknownAgent)?;
        if self.manual_hold_ms > 0 && current.status.is_manual_only() {
            self.holds
                .insert(agent.to_string(), now_ms.saturating_add(self.manual_hold_ms));
        } else {
            self.holds.remove(agent);
        }
        Ok(current)
    }

    /// Append the change event for an accepted store write. This is the only
    /// place events are created.
    fn commit(&mut self, agent: &str, outcome: ApplyOutcome, at: u64) -> Option<ActivityEvent> {
        let ApplyOutcome::Changed { previous, current } = outcome else {
            return None;
        };
        tracing::debug!(
            agent,
            from = %previous.status,
            to = %current.status,
            source = ?current.source,
            "Agent updated"
        );
        let payload = AgentUpdate::new(agent, &previous, &current);
        Some(self.log.append(EventKind::AgentUpdated, at, payload))
    }

    pub fn agent(&self, name: &str) -> Option<Agent> {
        self.store.get(name).cloned()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            agents: self.store.get_all(),
            events: self.log.all(),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            snapshot: self.snapshot(),
            events: self.log.subscribe(),
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<ActivityEvent> {
        self.log.recent(limit)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            agents: self.store.len(),
            events: self.log.len(),
            subscribers: self.log.subscriber_count(),
        }
    }

    pub fn event_capacity(&self) -> usize {
        self.log.capacity()
    }
}

enum EngineCommand {
    ManualOverride {
        agent: String,
        patch: AgentPatch,
        reply: oneshot::Sender<Result<Agent, OverrideError>>,
    },
    Agent {
        name: String,
        reply: oneshot::Sender<Option<Agent>>,
    },
    Snapshot {
        reply: oneshot::Sender<StateSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
    Recent {
        limit: usize,
        reply: oneshot::Sender<Vec<ActivityEvent>>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
}

/// The engine task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineClosed;

impl std::fmt::Display for EngineClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine task is not running")
    }
}

impl std::error::Error for EngineClosed {}

/// Cloneable handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    observations: mpsc::Sender<Observation>,
    event_capacity: usize,
}

/// Move the engine onto its own task.
pub fn spawn(engine: Engine, queue_depth: usize) -> EngineHandle {
    let (commands, command_rx) = mpsc::channel(queue_depth.max(1));
    let (observations, observation_rx) = mpsc::channel(queue_depth.max(1));
    let event_capacity = engine.event_capacity();
    tokio::spawn(run(engine, command_rx, observation_rx));
    EngineHandle {
        commands,
        observations,
        event_capacity,
    }
}

async fn run(
    mut engine: Engine,
    mut commands: mpsc::Receiver<EngineCommand>,
    mut observations: mpsc::Receiver<Observation>,
) {
    let mut observations_open = true;
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(cmd) => handle_command(&mut engine, cmd),
                None => break,
            },
            obs = observations.recv(), if observations_open => match obs {
                Some(obs) => {
                    engine.observe(obs);
                },
                None => observations_open = false,
            },
        }
    }
    tracing::info!("Engine stopped");
}

fn handle_command(engine: &mut Engine, cmd: EngineCommand) {
    // A dropped reply receiver just means the caller went away.
    match cmd {
        EngineCommand::ManualOverride {
            agent,
            patch,
            reply,
        } => {
            let _ = reply.send(engine.manual_override(&agent, &patch, now_millis()));
        },
        EngineCommand::Agent { name, reply } => {
            let _ = reply.send(engine.agent(&name));
        },
        EngineCommand::Snapshot { reply } => {
            let _ = reply.send(engine.snapshot());
        },
        EngineCommand::Subscribe { reply } => {
            let _ = reply.send(engine.subscribe());
        },
        EngineCommand::Recent { limit, reply } => {
            let _ = reply.send(engine.recent(limit));
        },
        EngineCommand::Stats { reply } => {
            let _ = reply.send(engine.stats());
        },
    }
}

impl EngineHandle {
    /// Sender for signal sources. Per-sender order is preserved.
    pub fn observation_sender(&self) -> mpsc::Sender<Observation> {
        self.observations.clone()
    }

    pub async fn observe(&self, obs: Observation) -> Result<(), EngineClosed> {
        self.observations.send(obs).await.map_err(|_| EngineClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, EngineClosed> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| EngineClosed)?;
        rx.await.map_err(|_| EngineClosed)
    }

    pub async fn manual_override(
        &self,
        agent: String,
        patch: AgentPatch,
    ) -> Result<Result<Agent, OverrideError>, EngineClosed> {
        self.request(|reply| EngineCommand::ManualOverride {
            agent,
            patch,
            reply,
        })
        .await
    }

    pub async fn agent(&self, name: String) -> Result<Option<Agent>, EngineClosed> {
        self.request(|reply| EngineCommand::Agent { name, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<StateSnapshot, EngineClosed> {
        self.request(|reply| EngineCommand::Snapshot { reply }).await
    }

    pub async fn subscribe(&self) -> Result<Subscription, EngineClosed> {
        self.request(|reply| EngineCommand::Subscribe { reply })
            .await
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<ActivityEvent>, EngineClosed> {
        self.request(|reply| EngineCommand::Recent { limit, reply })
            .await
    }

    pub async fn stats(&self) -> Result<EngineStats, EngineClosed> {
        self.request(|reply| EngineCommand::Stats { reply }).await
    }

    /// Bound of the activity log.
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }
}
