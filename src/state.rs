//! Per-role state payloads.

use std::collections::HashMap;

use crate::types::{LogIndex, NodeId};

/// Follower - passive, responds to RPCs and tracks the current leader.
#[derive(Debug)]
pub struct Follower {
    /// Last known leader for the current term, if any. Cleared on every
    /// term change; an election window is exactly the span where this is
    /// None on every reachable node.
    pub leader_id: Option<NodeId>,
}

/// Candidate - actively seeking votes.
#[derive(Debug)]
pub struct Candidate {
    /// Nodes that granted a vote this term, self included.
    pub votes_received: Vec<NodeId>,
}

/// Leader - drives replication.
#[derive(Debug)]
pub struct Leader {
    /// Next log index to send to each peer. Initialized to lastLogIndex+1
    /// on election win; backs up one step per consistency rejection.
    pub next_index: HashMap<NodeId, LogIndex>,
    /// Highest log index known replicated on each peer.
    pub match_index: HashMap<NodeId, LogIndex>,
}

impl Leader {
    pub fn new(peers: &[NodeId], last_log_index: LogIndex) -> Self {
        Leader {
            next_index: peers
                .iter()
                .map(|p| (p.clone(), last_log_index.next()))
                .collect(),
            match_index: peers.iter().map(|p| (p.clone(), LogIndex::ZERO)).collect(),
        }
    }
}
