use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentStatus, UpdateSource};

/// Recognized activity event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "agent.updated")]
    AgentUpdated,
}

/// Payload of an `agent.updated` event: the agent's new record plus its name
/// and the status it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub name: String,
    pub status: AgentStatus,
    pub previous_status: AgentStatus,
    pub task: String,
    pub model: String,
    pub updated_at: u64,
    pub source: UpdateSource,
}

impl AgentUpdate {
    pub fn new(name: &str, previous: &Agent, next: &Agent) -> Self {
        Self {
            name: name.to_string(),
            status: next.status,
            previous_status: previous.status,
            task: next.task.clone(),
            model: next.model.clone(),
            updated_at: next.updated_at,
            source: next.source,
        }
    }
}

/// An immutable entry in the bounded activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Monotonic within one process lifetime.
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "at")]
    pub occurred_at: u64,
    #[serde(rename = "data")]
    pub payload: AgentUpdate,
}
