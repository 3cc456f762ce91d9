pub mod agent;
pub mod derive;
pub mod events;
pub mod messages;
pub mod observation;
pub mod smoothing;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::agent::Roster;
    use crate::observation::{Observation, RawSignal};

    /// Roster with the given names; panics on invalid input.
    pub fn roster(names: &[&str]) -> Roster {
        Roster::new(names.iter().copied()).expect("valid test roster")
    }

    /// Poll observation for a session last touched `age_ms` ago.
    pub fn poll_age(agent: &str, age_ms: u64, at: u64) -> Observation {
        Observation::poll(agent, RawSignal::Session { age_ms }, at)
    }

    /// Event-channel observation with the given signal.
    pub fn event(agent: &str, signal: RawSignal, at: u64) -> Observation {
        Observation::event(agent, signal, at)
    }
}
