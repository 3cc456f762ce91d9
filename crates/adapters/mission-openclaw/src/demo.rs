use std::time::Duration;

use rand::Rng;
use rand::seq::IndexedRandom;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mission_core::agent::Roster;
use mission_core::derive::StatusWindows;
use mission_core::observation::{Observation, RawSignal};
use mission_core::time::now_millis;

use crate::config::DemoConfig;

/// Development source: every tick, one random agent gets a random reading.
/// Readings go through the same derivation and smoothing as real ones.
pub struct DemoTicker {
    config: DemoConfig,
    agents: Vec<String>,
    windows: StatusWindows,
}

impl DemoTicker {
    pub fn new(config: DemoConfig, roster: &Roster, windows: StatusWindows) -> Self {
        Self {
            config,
            agents: roster.names().to_vec(),
            windows,
        }
    }

    pub async fn run(self, tx: mpsc::Sender<Observation>, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.interval_ms.max(1)));
        tracing::info!(interval_ms = self.config.interval_ms, "Demo ticker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }
            let next = {
                let mut rng = rand::rng();
                self.next_observation(&mut rng, now_millis())
            };
            let Some(obs) = next else { break };
            if tx.send(obs).await.is_err() {
                break;
            }
        }
        tracing::info!("Demo ticker stopped");
    }

    /// Pick an agent and a reading. `None` only for an empty agent list.
    pub fn next_observation<R: Rng>(&self, rng: &mut R, now_ms: u64) -> Option<Observation> {
        let agent = self.agents.choose(rng)?;
        let span = self
            .windows
            .thinking_window_ms
            .saturating_sub(self.windows.busy_window_ms);
        let thinking_age = self.windows.busy_window_ms + span / 2 + 1;
        let (signal, label) = match rng.random_range(0..4) {
            0 => (RawSignal::RunEnd, "idle"),
            1 => (RawSignal::RunStart, "busy"),
            2 => (
                RawSignal::Session {
                    age_ms: thinking_age,
                },
                "thinking",
            ),
            _ => (RawSignal::ToolCall, "running_tool"),
        };
        let obs = match signal {
            RawSignal::Session { .. } => Observation::poll(agent, signal, now_ms),
            _ => Observation::event(agent, signal, now_ms),
        };
        Some(obs.with_task(format!("Demo task: {label}")))
    }
}
