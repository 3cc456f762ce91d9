use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use mission_core::agent::Roster;
use mission_core::observation::{Observation, RawSignal};
use mission_core::time::now_millis;

use crate::config::OpenClawConfig;
use crate::error::SourceError;
use crate::session::{Session, latest_session, parse_sessions};

/// `sessionId → agent` mapping rebuilt on every poll tick.
pub type SessionIndex = HashMap<String, String>;

/// Poll channel: periodically lists each roster member's sessions and turns
/// the freshest one into an [`Observation`].
pub struct SessionPoller {
    config: OpenClawConfig,
    agents: Vec<String>,
    index_tx: watch::Sender<SessionIndex>,
}

impl SessionPoller {
    /// Create a poller plus a receiver for the session index it maintains.
    pub fn new(config: OpenClawConfig, roster: &Roster) -> (Self, watch::Receiver<SessionIndex>) {
        let (index_tx, index_rx) = watch::channel(SessionIndex::new());
        let poller = Self {
            config,
            agents: roster.names().to_vec(),
            index_tx,
        };
        (poller, index_rx)
    }

    /// Run the poll loop until cancelled or the receiver goes away.
    pub async fn run(self, tx: mpsc::Sender<Observation>, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            agents = self.agents.len(),
            interval_ms = self.config.poll_interval_ms,
            "Session poller started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }

            let (observations, index) = self.poll_once().await;
            self.index_tx.send_replace(index);

            for obs in observations {
                if tx.send(obs).await.is_err() {
                    tracing::info!("Observation receiver closed, stopping session poller");
                    return;
                }
            }
        }
        tracing::info!("Session poller stopped");
    }

    /// Poll every agent concurrently. Always yields one observation per agent.
    pub async fn poll_once(&self) -> (Vec<Observation>, SessionIndex) {
        let results =
            futures::future::join_all(self.agents.iter().map(|agent| self.list_sessions(agent)))
                .await;

        let now = now_millis();
        let mut index = SessionIndex::new();
        let mut observations = Vec::with_capacity(self.agents.len());

        for (agent, result) in self.agents.iter().zip(results) {
            let sessions = match result {
                Ok(sessions) => sessions,
                Err(e) => {
                    tracing::debug!(agent = %agent, error = %e, "Session listing failed");
                    Vec::new()
                },
            };
            for id in sessions.iter().filter_map(|s| s.session_id.as_ref()) {
                index.insert(id.clone(), agent.clone());
            }
            observations.push(observation_for(agent, &sessions, now));
        }

        (observations, index)
    }

    async fn list_sessions(&self, agent: &str) -> Result<Vec<Session>, SourceError> {
        let argv = self.config.sessions_argv(agent);
        let timeout = Duration::from_millis(self.config.poll_timeout_ms);
        let stdout = run_command(&argv, timeout).await?;
        parse_sessions(&stdout)
    }
}

/// Turn one agent's session list into a poll observation.
pub fn observation_for(agent: &str, sessions: &[Session], now_ms: u64) -> Observation {
    match latest_session(sessions, now_ms) {
        Some((session, age_ms)) => {
            let obs = Observation::poll(agent, RawSignal::Session { age_ms }, now_ms)
                .with_model(session.model.clone());
            match session.label() {
                Some(label) => obs.with_task(label),
                None => obs,
            }
        },
        None => Observation::poll(agent, RawSignal::NoSession, now_ms),
    }
}

/// Run a short-lived command and capture stdout. The child is killed if the
/// timeout elapses first.
async fn run_command(argv: &[String], timeout: Duration) -> Result<String, SourceError> {
    let (program, args) = argv.split_first().ok_or(SourceError::EmptyCommand)?;
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(SourceError::Spawn)?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| SourceError::Timeout(timeout))?
        .map_err(SourceError::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::ExitStatus {
            code: output.status.code(),
            stderr: stderr.trim().chars().take(200).collect(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
