//! In-process simulated cluster.
//!
//! Runs real `Runtime`s connected by an in-memory message queue instead of
//! the TCP transport, with a partition mask for fault scenarios. Delivery
//! is deterministic: timers fire only when a test says so, and messages to
//! or from a partitioned node are silently dropped, exactly as the real
//! transport would experience it.

use std::collections::{HashSet, VecDeque};

use crate::effect::Effect;
use crate::message::Message;
use crate::node::{Node, Role, SubmitOutcome};
use crate::runtime::{Event, Runtime, StateMachine, TimerConfig};
use crate::types::NodeId;

/// A message in flight between nodes.
struct InFlight<C> {
    from: NodeId,
    to: NodeId,
    message: Message<C>,
}

/// Simulated cluster of `size` nodes named `node0..nodeN`.
pub struct Cluster<C, S: StateMachine<C>> {
    runtimes: Vec<Runtime<C, S>>,
    messages: VecDeque<InFlight<C>>,
    partitioned: HashSet<NodeId>,
}

impl<C: Clone, S: StateMachine<C> + Default> Cluster<C, S> {
    pub fn new(size: usize) -> Self {
        let ids: Vec<NodeId> = (0..size)
            .map(|i| NodeId::from(format!("node{i}")))
            .collect();

        let runtimes = ids
            .iter()
            .map(|id| {
                let peers: Vec<NodeId> = ids.iter().filter(|&p| p != id).cloned().collect();
                let node = Node::new(id.clone(), peers);
                Runtime::new(node, S::default(), TimerConfig::default())
            })
            .collect();

        Self {
            runtimes,
            messages: VecDeque::new(),
            partitioned: HashSet::new(),
        }
    }

    pub fn runtime(&self, index: usize) -> &Runtime<C, S> {
        &self.runtimes[index]
    }

    pub fn node(&self, index: usize) -> &Node<C> {
        self.runtimes[index].node()
    }

    pub fn state_machine(&self, index: usize) -> &S {
        self.runtimes[index].state_machine()
    }

    fn id(&self, index: usize) -> NodeId {
        self.runtimes[index].node().id.clone()
    }

    /// Cut a node off: everything it sends or should receive is dropped.
    pub fn partition(&mut self, index: usize) {
        let id = self.id(index);
        self.partitioned.insert(id);
    }

    pub fn heal(&mut self, index: usize) {
        let id = self.id(index);
        self.partitioned.remove(&id);
    }

    /// Fire the election timer on one node.
    pub fn election_timeout(&mut self, index: usize) {
        let effects = self.runtimes[index].handle(Event::ElectionTimeout);
        self.queue_effects(index, effects);
    }

    /// Fire the heartbeat timer on one node.
    pub fn heartbeat_timeout(&mut self, index: usize) {
        let effects = self.runtimes[index].handle(Event::HeartbeatTimeout);
        self.queue_effects(index, effects);
    }

    /// Submit a client command to one node, as the HTTP front would.
    pub fn submit(&mut self, index: usize, command: C) -> SubmitOutcome {
        let (outcome, effects) = self.runtimes[index].submit(command);
        self.queue_effects(index, effects);
        outcome
    }

    /// Deliver every pending message (and the messages those provoke)
    /// until the cluster quiesces.
    pub fn deliver_all(&mut self) {
        while let Some(in_flight) = self.messages.pop_front() {
            self.deliver(in_flight);
        }
    }

    fn deliver(&mut self, in_flight: InFlight<C>) {
        if self.partitioned.contains(&in_flight.from) || self.partitioned.contains(&in_flight.to) {
            return;
        }
        let Some(index) = self.node_index(&in_flight.to) else {
            return;
        };
        let effects = self.runtimes[index].handle(Event::Message {
            from: in_flight.from,
            message: in_flight.message,
        });
        self.queue_effects(index, effects);
    }

    fn queue_effects(&mut self, from_index: usize, effects: Vec<Effect<C>>) {
        let from = self.id(from_index);
        if self.partitioned.contains(&from) {
            return;
        }
        for effect in effects {
            if let Effect::Send { to, message } = effect {
                self.messages.push_back(InFlight {
                    from: from.clone(),
                    to,
                    message,
                });
            }
        }
    }

    fn node_index(&self, id: &NodeId) -> Option<usize> {
        self.runtimes.iter().position(|rt| rt.node().id == *id)
    }

    /// Index of the current leader, if exactly one node leads.
    pub fn leader(&self) -> Option<usize> {
        self.runtimes
            .iter()
            .position(|rt| matches!(rt.node().role, Role::Leader(_)))
    }

    /// (followers, candidates, leaders) across the cluster.
    pub fn role_counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for rt in &self.runtimes {
            match rt.node().role {
                Role::Follower(_) => counts.0 += 1,
                Role::Candidate(_) => counts.1 += 1,
                Role::Leader(_) => counts.2 += 1,
            }
        }
        counts
    }
}
