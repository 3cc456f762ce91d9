use serde::Deserialize;

use crate::agent::AgentStatus;
use crate::observation::{Observation, RawSignal};

/// Recency thresholds for poll-channel derivation. `busy_window_ms` must be
/// strictly below `thinking_window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StatusWindows {
    pub busy_window_ms: u64,
    pub thinking_window_ms: u64,
}

impl Default for StatusWindows {
    fn default() -> Self {
        Self {
            busy_window_ms: 25_000,
            thinking_window_ms: 90_000,
        }
    }
}

impl StatusWindows {
    pub fn is_ordered(&self) -> bool {
        self.busy_window_ms < self.thinking_window_ms
    }

    /// Map a session age onto busy / thinking / idle.
    pub fn classify_age(&self, age_ms: u64) -> AgentStatus {
        if age_ms <= self.busy_window_ms {
            AgentStatus::Busy
        } else if age_ms <= self.thinking_window_ms {
            AgentStatus::Thinking
        } else {
            AgentStatus::Idle
        }
    }
}

/// Candidate status for a single observation, ignoring history.
pub fn derive_status(obs: &Observation, windows: &StatusWindows) -> AgentStatus {
    match obs.signal {
        RawSignal::RunStart => AgentStatus::Busy,
        RawSignal::ToolCall => AgentStatus::RunningTool,
        RawSignal::RunEnd | RawSignal::NoSession => AgentStatus::Idle,
        RawSignal::Session { age_ms } => windows.classify_age(age_ms),
    }
}
