use std::collections::VecDeque;

use mission_core::events::{ActivityEvent, AgentUpdate, EventKind};
use tokio::sync::broadcast;

/// Default maximum number of events retained before oldest are evicted.
pub const DEFAULT_MAX_STORED_EVENTS: usize = 200;

/// Default broadcast channel capacity for event fan-out.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// In-memory, bounded activity log with broadcast fan-out.
pub struct EventLog {
    events: VecDeque<ActivityEvent>,
    broadcast_tx: broadcast::Sender<ActivityEvent>,
    max_stored_events: usize,
    next_id: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_STORED_EVENTS, DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create an EventLog with configurable capacity limits.
    pub fn with_capacity(max_stored_events: usize, broadcast_capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            events: VecDeque::with_capacity(max_stored_events),
            broadcast_tx,
            max_stored_events: max_stored_events.max(1),
            next_id: 1,
        }
    }

    /// Append a new event, evicting the oldest if at capacity, and broadcast
    /// it to all subscribers.
    pub fn append(&mut self, kind: EventKind, occurred_at: u64, payload: AgentUpdate) -> ActivityEvent {
        let event = ActivityEvent {
            id: self.next_id,
            kind,
            occurred_at,
            payload,
        };
        self.next_id += 1;

        self.events.push_back(event.clone());
        while self.events.len() > self.max_stored_events {
            self.events.pop_front();
        }
        // No receivers is not an error: nobody is connected yet.
        let _ = self.broadcast_tx.send(event.clone());
        event
    }

    /// The most recent `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEvent> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    /// Every retained event, newest first.
    pub fn all(&self) -> Vec<ActivityEvent> {
        self.recent(self.events.len())
    }

    /// Subscribe to events appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_stored_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mission_core::agent::Agent;

    fn append_n(log: &mut EventLog, n: usize) {
        let agent = Agent::bootstrap(0);
        for i in 0..n {
            log.append(
                EventKind::AgentUpdated,
                i as u64,
                AgentUpdate::new(&format!("agent-{i}"), &agent, &agent),
            );
        }
    }

    #[test]
    fn ids_are_monotonic() {
        let mut log = EventLog::new();
        append_n(&mut log, 3);
        let ids: Vec<u64> = log.all().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn bounded_eviction() {
        let mut log = EventLog::new();
        append_n(&mut log, DEFAULT_MAX_STORED_EVENTS + 1);
        assert_eq!(log.len(), DEFAULT_MAX_STORED_EVENTS);
        let all = log.all();
        // Oldest (id 1) evicted, newest present
        assert!(all.iter().all(|e| e.id != 1));
        assert_eq!(all[0].id, DEFAULT_MAX_STORED_EVENTS as u64 + 1);
        assert_eq!(all.last().unwrap().id, 2);
    }

    #[test]
    fn custom_capacity() {
        let mut log = EventLog::with_capacity(10, 16);
        append_n(&mut log, 20);
        assert_eq!(log.len(), 10);
        assert_eq!(log.capacity(), 10);
        assert_eq!(log.all().last().unwrap().id, 11);
    }

    #[test]
    fn recent_returns_newest_first() {
        let mut log = EventLog::new();
        append_n(&mut log, 3);
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payload.name, "agent-2");
        assert_eq!(recent[1].payload.name, "agent-1");
    }

    #[tokio::test]
    async fn broadcast_subscriber_receives_events() {
        let mut log = EventLog::new();
        let mut rx = log.subscribe();
        assert_eq!(log.subscriber_count(), 1);

        append_n(&mut log, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, 1);
    }

    #[test]
    fn events_before_subscribe_are_not_delivered() {
        let mut log = EventLog::new();
        append_n(&mut log, 2);
        let mut rx = log.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
