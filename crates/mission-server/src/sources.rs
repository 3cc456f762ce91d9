use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mission_openclaw::{DemoTicker, LogTail, SessionPoller};

use crate::config::SourceKind;
use crate::state::AppState;

/// Start the configured signal sources. Every task stops when `cancel` fires
/// or the engine goes away.
pub fn spawn_sources(state: &AppState, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
    let source = &state.config.source;
    let tx = state.engine.observation_sender();

    match source.kind {
        SourceKind::OpenClaw => {
            let (poller, index) = SessionPoller::new(source.openclaw.clone(), &state.roster);
            let tail = LogTail::new(source.openclaw.clone(), (*state.roster).clone(), index);
            tracing::info!(
                agents = state.roster.len(),
                poll_interval_ms = source.openclaw.poll_interval_ms,
                "Starting OpenClaw sources"
            );
            vec![
                tokio::spawn(poller.run(tx.clone(), cancel.clone())),
                tokio::spawn(tail.run(tx, cancel.clone())),
            ]
        },
        SourceKind::Demo => {
            tracing::info!("Starting demo source");
            let ticker = DemoTicker::new(
                source.demo.clone(),
                &state.roster,
                state.config.status.windows(),
            );
            vec![tokio::spawn(ticker.run(tx, cancel.clone()))]
        },
        SourceKind::Disabled => {
            tracing::info!("Signal sources disabled; only manual overrides apply");
            Vec::new()
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ServerConfig;
    use mission_core::agent::AgentStatus;

    #[tokio::test]
    async fn disabled_spawns_nothing() {
        let mut config = ServerConfig::default();
        config.source.kind = SourceKind::Disabled;
        let state = AppState::new(config).unwrap();
        assert!(spawn_sources(&state, &CancellationToken::new()).is_empty());
    }

    #[tokio::test]
    async fn demo_source_drives_the_engine() {
        let mut config = ServerConfig {
            roster: vec!["solo".to_string()],
            ..ServerConfig::default()
        };
        config.source.kind = SourceKind::Demo;
        config.source.demo.interval_ms = 5;
        let state = AppState::new(config).unwrap();
        let cancel = CancellationToken::new();
        let handles = spawn_sources(&state, &cancel);
        assert_eq!(handles.len(), 1);

        // Every demo reading carries a task, so the first tick is visible.
        let mut changed = false;
        for _ in 0..200 {
            let agent = state.engine.agent("solo".to_string()).await.unwrap().unwrap();
            if agent.status != AgentStatus::Idle || agent.task != "Waiting" {
                changed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(changed);

        cancel.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn openclaw_sources_stop_on_cancel() {
        let mut config = ServerConfig::default();
        config.source.openclaw.sessions_command = vec!["true".to_string()];
        config.source.openclaw.logs_command = vec!["true".to_string()];
        config.source.openclaw.restart_backoff_ms = 10;
        let state = AppState::new(config).unwrap();
        let cancel = CancellationToken::new();
        let handles = spawn_sources(&state, &cancel);
        assert_eq!(handles.len(), 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
