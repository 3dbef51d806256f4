//! Raft wire messages.
//!
//! Every request carries the sender's current term and every reply carries
//! the responder's, so either side can detect that it is stale.

use serde::{Deserialize, Serialize};

use crate::log::Entry;
use crate::types::{LogIndex, NodeId, Term};

/// RequestVote RPC arguments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestVote {
    pub term: Term,
    pub candidate_id: NodeId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

/// RequestVote RPC response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

/// AppendEntries RPC arguments. An empty `entries` is a heartbeat.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntries<C> {
    pub term: Term,
    pub leader_id: NodeId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<Entry<C>>,
    pub leader_commit: LogIndex,
}

/// AppendEntries RPC response.
///
/// On success, `match_index` is the highest index this reply lets the
/// leader count toward a quorum: `prev_log_index + entries.len()`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
    pub match_index: LogIndex,
}

/// All Raft messages, as carried by the transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message<C> {
    RequestVote(RequestVote),
    RequestVoteResponse(RequestVoteResponse),
    AppendEntries(AppendEntries<C>),
    AppendEntriesResponse(AppendEntriesResponse),
}
