use serde::{Deserialize, Serialize};

/// Which producer an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Poll,
    Event,
}

/// The raw reading carried by an observation, before derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawSignal {
    /// The most recent session was last touched `age_ms` ago.
    Session { age_ms: u64 },
    /// No session, command failure or timeout. Treated as maximal age.
    NoSession,
    RunStart,
    RunEnd,
    ToolCall,
}

impl RawSignal {
    /// Channel a signal naturally belongs to.
    pub fn channel(self) -> Channel {
        match self {
            Self::Session { .. } | Self::NoSession => Channel::Poll,
            Self::RunStart | Self::RunEnd | Self::ToolCall => Channel::Event,
        }
    }
}

/// One normalized reading about an agent. Transient: consumed by the engine
/// and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub agent_id: String,
    pub signal: RawSignal,
    pub task: Option<String>,
    pub model: Option<String>,
    pub observed_at: u64,
    pub channel: Channel,
}

impl Observation {
    pub fn poll(agent_id: impl Into<String>, signal: RawSignal, observed_at: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            signal,
            task: None,
            model: None,
            observed_at,
            channel: Channel::Poll,
        }
    }

    pub fn event(agent_id: impl Into<String>, signal: RawSignal, observed_at: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            signal,
            task: None,
            model: None,
            observed_at,
            channel: Channel::Event,
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.is_empty());
        self
    }
}
