use std::collections::HashMap;

use mission_core::agent::{Agent, AgentPatch, Roster};
use mission_core::messages::AgentMap;

/// Result of offering a new record to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    UnknownAgent,
    /// Status, task and model match the current record; nothing written.
    Unchanged,
    Changed { previous: Agent, current: Agent },
}

/// Authoritative agent records, one per roster member, in roster order.
pub struct AgentStore {
    agents: Vec<(String, Agent)>,
    index: HashMap<String, usize>,
}

impl AgentStore {
    pub fn new(roster: &Roster, now_ms: u64) -> Self {
        let agents: Vec<(String, Agent)> = roster
            .names()
            .iter()
            .map(|name| (name.clone(), Agent::bootstrap(now_ms)))
            .collect();
        let index = agents
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Self { agents, index }
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.index.get(name).map(|&i| &self.agents[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All records keyed by name, in roster order.
    pub fn get_all(&self) -> AgentMap {
        AgentMap(self.agents.clone())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Write `next` if its observable fields differ from the current record.
    pub fn apply(&mut self, name: &str, next: Agent) -> ApplyOutcome {
        let Some(&i) = self.index.get(name) else {
            return ApplyOutcome::UnknownAgent;
        };
        let slot = &mut self.agents[i].1;
        if !next.differs_from(slot) {
            return ApplyOutcome::Unchanged;
        }
        let previous = std::mem::replace(slot, next);
        ApplyOutcome::Changed {
            previous,
            current: slot.clone(),
        }
    }

    /// Operator patch, tagged `manual`, bypassing derivation and smoothing.
    pub fn apply_manual_override(&mut self, name: &str, patch: &AgentPatch, now_ms: u64) -> ApplyOutcome {
        let Some(current) = self.get(name) else {
            return ApplyOutcome::UnknownAgent;
        };
        let next = patch.apply_to(current, now_ms);
        self.apply(name, next)
    }
}
