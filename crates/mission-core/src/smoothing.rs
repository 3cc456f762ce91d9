//! Per-agent hysteresis filter between derived candidates and published status.
//!
//! Anything that signals certainty (busy, running_tool, idle, and the
//! manual-only statuses) is accepted on the spot. A `thinking` candidate from
//! the poll channel must repeat `promotion` times in a row before it becomes
//! stable, which absorbs single jittery readings between two idle polls.

use std::collections::HashMap;

use crate::agent::AgentStatus;
use crate::observation::Channel;

/// Hidden smoothing state for one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmoothingSlot {
    pub stable: AgentStatus,
    pub pending: Option<AgentStatus>,
    pub count: u32,
}

impl SmoothingSlot {
    fn accept(&mut self, status: AgentStatus) {
        self.stable = status;
        self.pending = None;
        self.count = 0;
    }

    /// Feed one candidate and return the resulting stable status.
    pub fn step(&mut self, candidate: AgentStatus, channel: Channel, promotion: u32) -> AgentStatus {
        match candidate {
            AgentStatus::Thinking if channel == Channel::Poll => {
                if self.stable == AgentStatus::Thinking {
                    self.pending = None;
                    self.count = 0;
                    return self.stable;
                }
                if self.pending == Some(AgentStatus::Thinking) {
                    self.count = self.count.saturating_add(1);
                } else {
                    self.pending = Some(AgentStatus::Thinking);
                    self.count = 1;
                }
                if self.count >= promotion {
                    self.accept(AgentStatus::Thinking);
                }
            },
            other => self.accept(other),
        }
        self.stable
    }
}

/// Default number of consecutive poll readings before `thinking` is shown.
pub const DEFAULT_THINKING_PROMOTION: u32 = 2;

/// Owns one [`SmoothingSlot`] per roster member.
#[derive(Debug, Clone)]
pub struct Smoother {
    slots: HashMap<String, SmoothingSlot>,
    promotion: u32,
}

impl Smoother {
    pub fn new<'a>(agents: impl IntoIterator<Item = &'a String>, promotion: u32) -> Self {
        let slots = agents
            .into_iter()
            .map(|name| (name.clone(), SmoothingSlot::default()))
            .collect();
        Self {
            slots,
            promotion: promotion.max(1),
        }
    }

    /// Step the agent's slot. Returns `None` for agents outside the roster.
    pub fn step(&mut self, agent: &str, candidate: AgentStatus, channel: Channel) -> Option<AgentStatus> {
        let promotion = self.promotion;
        self.slots
            .get_mut(agent)
            .map(|slot| slot.step(candidate, channel, promotion))
    }

    #[cfg(any(test, feature = "test-helpers"))]
    pub fn slot(&self, agent: &str) -> Option<&SmoothingSlot> {
        self.slots.get(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentStatus::*;

    fn poll_seq(slot: &mut SmoothingSlot, seq: &[AgentStatus]) -> Vec<AgentStatus> {
        seq.iter()
            .map(|s| slot.step(*s, Channel::Poll, DEFAULT_THINKING_PROMOTION))
            .collect()
    }

    #[test]
    fn isolated_thinking_is_suppressed() {
        let mut slot = SmoothingSlot::default();
        let out = poll_seq(&mut slot, &[Idle, Thinking, Idle]);
        assert_eq!(out, vec![Idle, Idle, Idle]);
        assert_eq!(slot.pending, None);
    }

    #[test]
    fn two_thinking_readings_promote() {
        let mut slot = SmoothingSlot::default();
        let out = poll_seq(&mut slot, &[Idle, Thinking, Thinking]);
        assert_eq!(out, vec![Idle, Idle, Thinking]);
        assert_eq!(slot.count, 0);
    }

    #[test]
    fn busy_ages_into_thinking_after_debounce() {
        let mut slot = SmoothingSlot::default();
        let out = poll_seq(&mut slot, &[Busy, Thinking, Thinking]);
        assert_eq!(out, vec![Busy, Busy, Thinking]);
    }

    #[test]
    fn busy_interrupts_thinking_streak() {
        let mut slot = SmoothingSlot::default();
        let out = poll_seq(&mut slot, &[Thinking, Busy, Thinking, Idle]);
        assert_eq!(out, vec![Idle, Busy, Busy, Idle]);
        assert_eq!(slot.pending, None);
    }

    #[test]
    fn thinking_stays_when_already_thinking() {
        let mut slot = SmoothingSlot {
            stable: Thinking,
            ..SmoothingSlot::default()
        };
        assert_eq!(slot.step(Thinking, Channel::Poll, 2), Thinking);
        assert_eq!(slot.pending, None);
    }

    #[test]
    fn event_channel_bypasses_streak() {
        let mut slot = SmoothingSlot::default();
        slot.step(Thinking, Channel::Poll, 3);
        assert_eq!(slot.step(RunningTool, Channel::Event, 3), RunningTool);
        assert_eq!(slot.pending, None);
        assert_eq!(slot.count, 0);
    }

    #[test]
    fn manual_statuses_are_immediate() {
        let mut slot = SmoothingSlot::default();
        assert_eq!(slot.step(Blocked, Channel::Poll, 2), Blocked);
        assert_eq!(slot.step(Done, Channel::Event, 2), Done);
    }

    #[test]
    fn promotion_of_one_is_immediate() {
        let mut slot = SmoothingSlot::default();
        assert_eq!(slot.step(Thinking, Channel::Poll, 1), Thinking);
    }

    #[test]
    fn smoother_ignores_unknown_agents() {
        let roster = vec!["a".to_string(), "b".to_string()];
        let mut smoother = Smoother::new(&roster, 2);
        assert_eq!(smoother.step("zzz", Busy, Channel::Poll), None);
        assert_eq!(smoother.step("a", Busy, Channel::Poll), Some(Busy));
        assert_eq!(smoother.slot("b").unwrap().stable, Idle);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn poll_candidate() -> impl Strategy<Value = AgentStatus> {
            prop_oneof![Just(Idle), Just(Busy), Just(Thinking), Just(RunningTool)]
        }

        proptest! {
            #[test]
            fn certain_candidates_always_win(
                history in proptest::collection::vec(poll_candidate(), 0..20),
                last in prop_oneof![Just(Idle), Just(Busy), Just(RunningTool)],
            ) {
                let mut slot = SmoothingSlot::default();
                for s in &history {
                    slot.step(*s, Channel::Poll, DEFAULT_THINKING_PROMOTION);
                }
                prop_assert_eq!(slot.step(last, Channel::Poll, DEFAULT_THINKING_PROMOTION), last);
                prop_assert_eq!(slot.pending, None);
            }

            #[test]
            fn thinking_needs_a_streak(
                history in proptest::collection::vec(poll_candidate(), 1..30),
            ) {
                let mut slot = SmoothingSlot::default();
                let mut prev = slot.stable;
                for (i, s) in history.iter().enumerate() {
                    let out = slot.step(*s, Channel::Poll, DEFAULT_THINKING_PROMOTION);
                    if out == Thinking && prev != Thinking {
                        // A fresh promotion needs this and the previous reading to be thinking.
                        prop_assert!(i >= 1);
                        prop_assert_eq!(history[i - 1], Thinking);
                        prop_assert_eq!(*s, Thinking);
                    }
                    prev = out;
                }
            }
        }
    }
}
