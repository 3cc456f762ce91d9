use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mission_core::agent::Roster;
use mission_core::time::now_millis;

use crate::config::{ConfigError, ServerConfig};
use crate::engine::{self, Engine, EngineHandle};

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub roster: Arc<Roster>,
    pub config: Arc<ServerConfig>,
    pub ws_connection_count: Arc<AtomicUsize>,
    pub sse_subscriber_count: Arc<AtomicUsize>,
}

impl AppState {
    /// Build the roster and spawn the engine task. Must run inside a tokio
    /// runtime.
    pub fn new(config: ServerConfig) -> Result<Self, ConfigError> {
        let roster = config.roster()?;
        let settings = config.engine_settings();
        let engine = engine::spawn(
            Engine::new(&roster, &settings, now_millis()),
            settings.queue_depth,
        );
        Ok(Self {
            engine,
            roster: Arc::new(roster),
            config: Arc::new(config),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
            sse_subscriber_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

/// Holds one slot of a connection counter; releases it on drop.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    /// Take a slot unless `max` are already held.
    pub fn try_acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(Self {
            counter: Arc::clone(counter),
        })
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
