//! Drives a `Node` with wall-clock timers and the apply loop.
//!
//! The runtime owns the consensus core and the state machine; the caller
//! (the server event loop, or a test) feeds it events and performs the
//! `Send` effects it returns. Timer effects are absorbed here.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::effect::Effect;
use crate::message::Message;
use crate::node::{Node, Role, SubmitOutcome};
use crate::types::{LogIndex, NodeId};

/// State machines interpret committed commands in log order. `apply` must
/// be deterministic and idempotent with respect to replay from index 1.
pub trait StateMachine<C> {
    fn apply(&mut self, index: LogIndex, command: &C);
}

/// Events that drive the runtime.
pub enum Event<C> {
    ElectionTimeout,
    HeartbeatTimeout,
    Message { from: NodeId, message: Message<C> },
}

/// Timer tuning. The heartbeat interval must be strictly shorter than the
/// minimum election timeout or followers depose a healthy leader.
#[derive(Clone, Debug)]
pub struct TimerConfig {
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            heartbeat_interval: Duration::from_millis(50),
        }
    }
}

impl TimerConfig {
    /// Election timeouts are drawn uniformly from [min, max] so colliding
    /// candidates separate instead of splitting votes forever.
    fn random_election_timeout(&self) -> Duration {
        let min = self.election_timeout_min.as_millis() as u64;
        let max = self.election_timeout_max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// A consensus core plus its state machine and timer deadlines.
pub struct Runtime<C, S: StateMachine<C>> {
    node: Node<C>,
    state_machine: S,
    config: TimerConfig,
    election_deadline: Instant,
    heartbeat_deadline: Instant,
}

impl<C: Clone, S: StateMachine<C>> Runtime<C, S> {
    pub fn new(node: Node<C>, state_machine: S, config: TimerConfig) -> Self {
        let now = Instant::now();
        let mut rt = Self {
            node,
            state_machine,
            config,
            election_deadline: now,
            heartbeat_deadline: now,
        };
        rt.reset_election_timer();
        rt.reset_heartbeat_timer();
        rt
    }

    pub fn node(&self) -> &Node<C> {
        &self.node
    }

    pub fn state_machine(&self) -> &S {
        &self.state_machine
    }

    /// Process one event, absorb timer effects, run the apply loop, and
    /// return the `Send` effects the caller must dispatch.
    pub fn handle(&mut self, event: Event<C>) -> Vec<Effect<C>> {
        let rearm_election = matches!(event, Event::ElectionTimeout);

        let effects = match event {
            Event::ElectionTimeout => self.node.election_timeout(),
            Event::HeartbeatTimeout => self.node.heartbeat_timeout(),
            Event::Message { from, message } => self.handle_message(from, message),
        };

        self.process_timer_effects(&effects);
        // An expired election deadline must always re-arm, or a leader
        // (which ignores the timer) would see it fire on every poll.
        if rearm_election {
            self.reset_election_timer();
        }
        self.apply_committed();
        effects
    }

    /// Submit a client command; same post-processing as `handle`. On a
    /// single-node cluster the command commits and applies before this
    /// returns.
    pub fn submit(&mut self, command: C) -> (SubmitOutcome, Vec<Effect<C>>) {
        let (outcome, effects) = self.node.submit_command(command);
        self.process_timer_effects(&effects);
        self.apply_committed();
        (outcome, effects)
    }

    /// The next timer that has already expired, if any. Callers drain this
    /// before blocking so back-to-back expiries are not skipped.
    pub fn poll_timers(&self) -> Option<Event<C>> {
        let now = Instant::now();
        if now >= self.election_deadline {
            return Some(Event::ElectionTimeout);
        }
        if matches!(self.node.role, Role::Leader(_)) && now >= self.heartbeat_deadline {
            return Some(Event::HeartbeatTimeout);
        }
        None
    }

    /// Instant of the next relevant deadline.
    pub fn next_deadline(&self) -> Instant {
        if matches!(self.node.role, Role::Leader(_)) {
            self.election_deadline.min(self.heartbeat_deadline)
        } else {
            self.election_deadline
        }
    }

    fn handle_message(&mut self, from: NodeId, message: Message<C>) -> Vec<Effect<C>> {
        match message {
            Message::RequestVote(request) => self.node.handle_request_vote(request),
            Message::RequestVoteResponse(response) => {
                self.node.handle_request_vote_response(from, response)
            }
            Message::AppendEntries(request) => self.node.handle_append_entries(request),
            Message::AppendEntriesResponse(response) => {
                self.node.handle_append_entries_response(from, response)
            }
        }
    }

    fn process_timer_effects(&mut self, effects: &[Effect<C>]) {
        for effect in effects {
            match effect {
                Effect::ResetElectionTimer => self.reset_election_timer(),
                Effect::ResetHeartbeatTimer => self.reset_heartbeat_timer(),
                Effect::Send { .. } => {} // dispatched by the caller
            }
        }
    }

    fn reset_election_timer(&mut self) {
        self.election_deadline = Instant::now() + self.config.random_election_timeout();
    }

    fn reset_heartbeat_timer(&mut self) {
        self.heartbeat_deadline = Instant::now() + self.config.heartbeat_interval;
    }

    // Apply loop: hand every committed-but-unapplied entry to the state
    // machine, strictly in index order.
    fn apply_committed(&mut self) {
        while let Some((index, entry)) = self.node.take_entry_to_apply() {
            self.state_machine.apply(index, &entry.command);
        }
    }
}
