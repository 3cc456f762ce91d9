use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use mission_core::agent::Roster;
use mission_core::observation::Observation;
use mission_core::time::now_millis;

use crate::config::OpenClawConfig;
use crate::error::SourceError;
use crate::log_line::{LineFields, LogSignal, classify_line};
use crate::poller::SessionIndex;

/// Event channel: follows the log stream subprocess and emits one
/// observation per recognized line. Restarts the subprocess forever.
pub struct LogTail {
    config: OpenClawConfig,
    roster: Roster,
    index: watch::Receiver<SessionIndex>,
}

enum TailEnd {
    Exited(ExitStatus),
    Cancelled,
    ReceiverClosed,
}

impl LogTail {
    pub fn new(config: OpenClawConfig, roster: Roster, index: watch::Receiver<SessionIndex>) -> Self {
        Self {
            config,
            roster,
            index,
        }
    }

    pub async fn run(self, tx: mpsc::Sender<Observation>, cancel: CancellationToken) {
        let backoff = Duration::from_millis(self.config.restart_backoff_ms);
        let mut restarts: u64 = 0;

        loop {
            match self.follow(&tx, &cancel).await {
                Ok(TailEnd::Cancelled) | Ok(TailEnd::ReceiverClosed) => break,
                Ok(TailEnd::Exited(status)) => {
                    tracing::warn!(%status, restarts, "Log tail exited, restarting");
                },
                Err(e) => {
                    tracing::warn!(error = %e, restarts, "Log tail failed, restarting");
                },
            }
            restarts += 1;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {},
            }
        }
        tracing::info!("Log tail stopped");
    }

    /// One subprocess lifetime.
    async fn follow(
        &self,
        tx: &mpsc::Sender<Observation>,
        cancel: &CancellationToken,
    ) -> Result<TailEnd, SourceError> {
        let (program, args) = self
            .config
            .logs_command
            .split_first()
            .ok_or(SourceError::EmptyCommand)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(SourceError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Io(std::io::Error::other("stdout not captured")))?;
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        tracing::debug!(program = %program, "Log tail started");

        loop {
            buf.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => return Ok(TailEnd::Cancelled),
                read = reader.read_until(b'\n', &mut buf) => read.map_err(SourceError::Io)?,
            };
            if read == 0 {
                break;
            }
            // Invalid UTF-8 becomes replacement characters and fails to classify.
            let line = String::from_utf8_lossy(&buf);
            let Some(obs) = self.observe_line(line.trim_end(), now_millis()) else {
                continue;
            };
            if tx.send(obs).await.is_err() {
                return Ok(TailEnd::ReceiverClosed);
            }
        }

        let status = child.wait().await.map_err(SourceError::Io)?;
        Ok(TailEnd::Exited(status))
    }

    /// Classify a line and attribute it to an agent. Malformed and
    /// unrecognized lines yield `None`.
    pub fn observe_line(&self, line: &str, now_ms: u64) -> Option<Observation> {
        let signal = classify_line(line)?;
        let raw = signal.raw_signal()?;
        let fields = signal.fields()?;
        let agent = self.resolve_agent(fields);

        let obs = Observation::event(agent, raw, now_ms).with_model(fields.model.clone());
        Some(match (&signal, &fields.tool) {
            (LogSignal::ToolCall(_), Some(tool)) => obs.with_task(format!("Running {tool}")),
            (LogSignal::ToolCall(_), None) => obs.with_task("Running tool"),
            (LogSignal::RunStart(_), _) => obs.with_task("Working"),
            _ => obs,
        })
    }

    /// Explicit tag, then session lookup, then the fallback agent.
    fn resolve_agent(&self, fields: &LineFields) -> String {
        if let Some(agent) = &fields.agent
            && self.roster.contains(agent)
        {
            return agent.clone();
        }
        if let Some(session_id) = &fields.session_id
            && let Some(agent) = self.index.borrow().get(session_id)
        {
            return agent.clone();
        }
        self.config.fallback_agent.clone()
    }
}
