//! The consensus core: the follower/candidate/leader state machine.
//!
//! `Node` is sans-I/O. Every input (an RPC, a timer expiry, a client
//! command) mutates local state and returns the effects the driver must
//! perform: messages to send, timers to re-arm. This keeps the hard part
//! single-threaded and directly testable; see `cluster` for a whole-cluster
//! harness built on the same surface.

use tracing::{debug, info};

use crate::effect::Effect;
use crate::log::{Entry, Log};
use crate::message::{
    AppendEntries, AppendEntriesResponse, Message, RequestVote, RequestVoteResponse,
};
use crate::state::{Candidate, Follower, Leader};
use crate::types::{LogIndex, NodeId, Term};

/// Server role with associated state.
#[derive(Debug)]
pub enum Role {
    Follower(Follower),
    Candidate(Candidate),
    Leader(Leader),
}

/// Outcome of a client command handed to `submit_command`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Appended on this node (the leader) at `index`. Commitment is not
    /// awaited; clients observe it through subsequent reads.
    Accepted { index: LogIndex },
    /// This node is not the leader. `leader` is the best-known leader id,
    /// or None during an election window.
    NotLeader { leader: Option<NodeId> },
}

/// A Raft node.
pub struct Node<C> {
    pub id: NodeId,
    pub peers: Vec<NodeId>,
    pub current_term: Term,
    pub voted_for: Option<NodeId>,
    pub log: Log<C>,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub role: Role,
}

impl<C: Clone> Node<C> {
    /// Create a new node. Starts as follower at term 0 with an empty log
    /// and no known leader.
    pub fn new(id: NodeId, peers: Vec<NodeId>) -> Self {
        debug_assert!(!peers.contains(&id), "peer list must not include self");
        Self {
            id,
            peers,
            current_term: Term::ZERO,
            voted_for: None,
            log: Log::new(),
            commit_index: LogIndex::ZERO,
            last_applied: LogIndex::ZERO,
            role: Role::Follower(Follower { leader_id: None }),
        }
    }

    /// Full cluster size, self included.
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    fn is_quorum(&self, count: usize) -> bool {
        count * 2 > self.cluster_size()
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.role, Role::Leader(_))
    }

    /// Best-known leader for the current term: self when leading, the
    /// sender of the last valid AppendEntries when following, nothing
    /// while campaigning.
    pub fn leader_id(&self) -> Option<&NodeId> {
        match &self.role {
            Role::Leader(_) => Some(&self.id),
            Role::Follower(f) => f.leader_id.as_ref(),
            Role::Candidate(_) => None,
        }
    }

    // === timers ===

    /// Election timer fired: followers and candidates start a new election.
    pub fn election_timeout(&mut self) -> Vec<Effect<C>> {
        match self.role {
            Role::Leader(_) => Vec::new(),
            Role::Follower(_) | Role::Candidate(_) => self.start_election(),
        }
    }

    /// Heartbeat timer fired: a leader pings every peer with whatever
    /// entries each still needs. Rejected peers are retried here forever.
    pub fn heartbeat_timeout(&mut self) -> Vec<Effect<C>> {
        if !self.is_leader() {
            return Vec::new();
        }
        let mut effects = self.broadcast_append_entries();
        effects.push(Effect::ResetHeartbeatTimer);
        effects
    }

    fn start_election(&mut self) -> Vec<Effect<C>> {
        self.current_term = self.current_term.increment();
        self.voted_for = Some(self.id.clone());
        self.role = Role::Candidate(Candidate {
            votes_received: vec![self.id.clone()],
        });
        info!(node = %self.id, term = %self.current_term, "starting election");

        // A cluster of one elects itself on the spot.
        if self.is_quorum(1) {
            return self.become_leader();
        }

        let request = RequestVote {
            term: self.current_term,
            candidate_id: self.id.clone(),
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        };

        let mut effects: Vec<Effect<C>> = self
            .peers
            .iter()
            .map(|peer| Effect::Send {
                to: peer.clone(),
                message: Message::RequestVote(request.clone()),
            })
            .collect();
        effects.push(Effect::ResetElectionTimer);
        effects
    }

    fn become_leader(&mut self) -> Vec<Effect<C>> {
        self.role = Role::Leader(Leader::new(&self.peers, self.log.last_index()));
        info!(node = %self.id, term = %self.current_term, "won election, became leader");

        let mut effects = self.broadcast_append_entries();
        effects.push(Effect::ResetHeartbeatTimer);
        effects
    }

    /// Observed a higher term: adopt it and fall back to follower with no
    /// known leader.
    fn step_down(&mut self, term: Term) {
        info!(node = %self.id, term = %term, "observed higher term, stepping down");
        self.current_term = term;
        self.voted_for = None;
        self.role = Role::Follower(Follower { leader_id: None });
    }

    // === client commands ===

    /// Entry point for client writes. Leaders append locally, replicate at
    /// once, and report the new index; everyone else reports the best-known
    /// leader so the HTTP front can redirect.
    pub fn submit_command(&mut self, command: C) -> (SubmitOutcome, Vec<Effect<C>>) {
        if !self.is_leader() {
            return (
                SubmitOutcome::NotLeader {
                    leader: self.leader_id().cloned(),
                },
                Vec::new(),
            );
        }

        let index = self.log.append(Entry {
            term: self.current_term,
            command,
        });
        debug!(node = %self.id, index = %index, "appended client command");

        // A single-node cluster commits on append.
        self.maybe_advance_commit();

        let mut effects = self.broadcast_append_entries();
        if !effects.is_empty() {
            effects.push(Effect::ResetHeartbeatTimer);
        }
        (SubmitOutcome::Accepted { index }, effects)
    }

    // === RequestVote ===

    pub fn handle_request_vote(&mut self, request: RequestVote) -> Vec<Effect<C>> {
        if request.term > self.current_term {
            self.step_down(request.term);
        }

        let mut effects = Vec::new();
        let vote_granted = request.term == self.current_term && self.grant_vote_to(&request);

        if vote_granted {
            debug!(node = %self.id, candidate = %request.candidate_id, term = %self.current_term, "granting vote");
            self.voted_for = Some(request.candidate_id.clone());
            effects.push(Effect::ResetElectionTimer);
        } else {
            debug!(node = %self.id, candidate = %request.candidate_id, term = %request.term, "denying vote");
        }

        effects.push(Effect::Send {
            to: request.candidate_id,
            message: Message::RequestVoteResponse(RequestVoteResponse {
                term: self.current_term,
                vote_granted,
            }),
        });
        effects
    }

    fn grant_vote_to(&self, request: &RequestVote) -> bool {
        let vote_free = match &self.voted_for {
            None => true,
            Some(candidate) => *candidate == request.candidate_id,
        };
        // The candidate's log must be at least as up-to-date as ours:
        // higher last term wins, equal terms tie-break on index.
        let up_to_date = (request.last_log_term, request.last_log_index)
            >= (self.log.last_term(), self.log.last_index());
        vote_free && up_to_date
    }

    pub fn handle_request_vote_response(
        &mut self,
        from: NodeId,
        response: RequestVoteResponse,
    ) -> Vec<Effect<C>> {
        if response.term > self.current_term {
            self.step_down(response.term);
            return Vec::new();
        }
        if response.term < self.current_term || !response.vote_granted {
            return Vec::new();
        }

        let Role::Candidate(candidate) = &mut self.role else {
            return Vec::new();
        };
        if !candidate.votes_received.contains(&from) {
            candidate.votes_received.push(from);
        }
        let votes = candidate.votes_received.len();
        debug!(node = %self.id, votes, "vote granted");

        if self.is_quorum(votes) {
            return self.become_leader();
        }
        Vec::new()
    }

    // === AppendEntries ===

    pub fn handle_append_entries(&mut self, request: AppendEntries<C>) -> Vec<Effect<C>> {
        if request.term < self.current_term {
            debug!(
                node = %self.id,
                leader = %request.leader_id,
                term = %request.term,
                current = %self.current_term,
                "rejecting stale AppendEntries"
            );
            return vec![Effect::Send {
                to: request.leader_id,
                message: Message::AppendEntriesResponse(AppendEntriesResponse {
                    term: self.current_term,
                    success: false,
                    match_index: LogIndex::ZERO,
                }),
            }];
        }

        if request.term > self.current_term {
            self.current_term = request.term;
            self.voted_for = None;
        }
        // Any valid AppendEntries names the one leader of this term.
        self.role = Role::Follower(Follower {
            leader_id: Some(request.leader_id.clone()),
        });

        let mut effects = vec![Effect::ResetElectionTimer];

        // Consistency check: our log must hold the leader's previous entry.
        let consistent = request.prev_log_index == LogIndex::ZERO
            || self.log.term_at(request.prev_log_index) == Some(request.prev_log_term);
        if !consistent {
            debug!(
                node = %self.id,
                prev = %request.prev_log_index,
                last = %self.log.last_index(),
                "log mismatch, rejecting AppendEntries"
            );
            effects.push(Effect::Send {
                to: request.leader_id,
                message: Message::AppendEntriesResponse(AppendEntriesResponse {
                    term: self.current_term,
                    success: false,
                    match_index: LogIndex::ZERO,
                }),
            });
            return effects;
        }

        let last_new = request.prev_log_index.advance_by(request.entries.len());
        self.log.merge_from(request.prev_log_index, request.entries);

        if request.leader_commit > self.commit_index {
            self.commit_index = request.leader_commit.min(last_new);
            debug!(node = %self.id, commit = %self.commit_index, "follower commit advanced");
        }

        effects.push(Effect::Send {
            to: request.leader_id,
            message: Message::AppendEntriesResponse(AppendEntriesResponse {
                term: self.current_term,
                success: true,
                match_index: last_new,
            }),
        });
        effects
    }

    pub fn handle_append_entries_response(
        &mut self,
        from: NodeId,
        response: AppendEntriesResponse,
    ) -> Vec<Effect<C>> {
        if response.term > self.current_term {
            self.step_down(response.term);
            return Vec::new();
        }
        if response.term < self.current_term {
            return Vec::new();
        }
        let Role::Leader(leader) = &mut self.role else {
            return Vec::new();
        };

        if response.success {
            let matched = leader.match_index.entry(from.clone()).or_default();
            // Replies may arrive out of order; match only moves forward,
            // and next_index tracks it.
            if response.match_index > *matched {
                *matched = response.match_index;
            }
            let next = matched.next();
            leader.next_index.insert(from, next);
            self.maybe_advance_commit();
            return Vec::new();
        }

        // Consistency rejection: back up one step and retry immediately.
        let next = leader
            .next_index
            .entry(from.clone())
            .or_insert(LogIndex::from(1));
        *next = next.backtrack();
        debug!(node = %self.id, peer = %from, next = %*next, "backing up next_index");

        match self.append_entries_for(&from) {
            Some(message) => vec![Effect::Send { to: from, message }],
            None => Vec::new(),
        }
    }

    /// One AppendEntries per peer, each starting at that peer's next_index.
    fn broadcast_append_entries(&self) -> Vec<Effect<C>> {
        self.peers
            .iter()
            .filter_map(|peer| {
                self.append_entries_for(peer).map(|message| Effect::Send {
                    to: peer.clone(),
                    message,
                })
            })
            .collect()
    }

    fn append_entries_for(&self, peer: &NodeId) -> Option<Message<C>> {
        let Role::Leader(leader) = &self.role else {
            return None;
        };
        let next = leader.next_index.get(peer).copied()?;
        let prev_log_index = next.prev().unwrap_or(LogIndex::ZERO);
        let prev_log_term = self.log.term_at(prev_log_index).unwrap_or(Term::ZERO);
        Some(Message::AppendEntries(AppendEntries {
            term: self.current_term,
            leader_id: self.id.clone(),
            prev_log_index,
            prev_log_term,
            entries: self.log.entries_from(next).to_vec(),
            leader_commit: self.commit_index,
        }))
    }

    /// Leader-only commit rule: the largest N replicated on a majority
    /// (self included) whose entry is from the current term. Entries from
    /// earlier terms commit only indirectly, underneath such an N.
    fn maybe_advance_commit(&mut self) {
        let Role::Leader(leader) = &self.role else {
            return;
        };

        let mut n = self.log.last_index();
        while n > self.commit_index {
            let replicated = 1 + leader
                .match_index
                .values()
                .filter(|&&m| m >= n)
                .count();
            if self.is_quorum(replicated) && self.log.term_at(n) == Some(self.current_term) {
                debug!(node = %self.id, commit = %n, "advanced commit index");
                self.commit_index = n;
                return;
            }
            let Some(prev) = n.prev() else { return };
            n = prev;
        }
    }

    // === apply cursor ===

    /// Next committed-but-unapplied entry, advancing the cursor. The apply
    /// loop drains this until it returns None; ordering is strictly by
    /// index.
    pub fn take_entry_to_apply(&mut self) -> Option<(LogIndex, &Entry<C>)> {
        if self.last_applied >= self.commit_index {
            return None;
        }
        self.last_applied = self.last_applied.next();
        let index = self.last_applied;
        self.log.get(index).map(|entry| (index, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, peers: &[&str]) -> Node<String> {
        Node::new(
            NodeId::from(id),
            peers.iter().map(|&p| NodeId::from(p)).collect(),
        )
    }

    fn sends<C>(effects: &[Effect<C>]) -> Vec<(&NodeId, &Message<C>)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send { to, message } => Some((to, message)),
                _ => None,
            })
            .collect()
    }

    fn vote_request(term: u64, candidate: &str, last_index: u64, last_term: u64) -> RequestVote {
        RequestVote {
            term: Term::from(term),
            candidate_id: NodeId::from(candidate),
            last_log_index: LogIndex::from(last_index),
            last_log_term: Term::from(last_term),
        }
    }

    fn heartbeat(term: u64, leader: &str, commit: u64) -> AppendEntries<String> {
        AppendEntries {
            term: Term::from(term),
            leader_id: NodeId::from(leader),
            prev_log_index: LogIndex::ZERO,
            prev_log_term: Term::ZERO,
            entries: Vec::new(),
            leader_commit: LogIndex::from(commit),
        }
    }

    fn granted(effects: &[Effect<String>]) -> bool {
        sends(effects).iter().any(|(_, m)| {
            matches!(m, Message::RequestVoteResponse(r) if r.vote_granted)
        })
    }

    fn make_leader(n: &mut Node<String>) {
        n.election_timeout();
        for peer in n.peers.clone() {
            n.handle_request_vote_response(
                peer,
                RequestVoteResponse {
                    term: n.current_term,
                    vote_granted: true,
                },
            );
        }
        assert!(n.is_leader());
    }

    #[test]
    fn follower_grants_vote_and_resets_timer() {
        let mut n = node("node0", &["node1", "node2"]);

        let effects = n.handle_request_vote(vote_request(1, "node1", 0, 0));

        assert!(granted(&effects));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ResetElectionTimer)));
        assert_eq!(n.voted_for, Some(NodeId::from("node1")));
        assert_eq!(n.current_term, Term::from(1));
    }

    #[test]
    fn one_vote_per_term() {
        let mut n = node("node0", &["node1", "node2"]);

        assert!(granted(&n.handle_request_vote(vote_request(1, "node1", 0, 0))));
        assert!(!granted(&n.handle_request_vote(vote_request(1, "node2", 0, 0))));
        // Same candidate asking again is fine.
        assert!(granted(&n.handle_request_vote(vote_request(1, "node1", 0, 0))));
    }

    #[test]
    fn vote_denied_to_stale_log() {
        let mut n = node("node0", &["node1", "node2"]);
        n.log.append(Entry {
            term: Term::from(2),
            command: "x".to_string(),
        });
        n.current_term = Term::from(2);

        // Lower last term loses even with a longer log.
        assert!(!granted(&n.handle_request_vote(vote_request(3, "node1", 5, 1))));
        // Equal last term but shorter log loses too.
        assert!(!granted(&n.handle_request_vote(vote_request(4, "node2", 0, 2))));
    }

    #[test]
    fn higher_term_vote_request_resets_stale_vote() {
        let mut n = node("node0", &["node1", "node2"]);
        assert!(granted(&n.handle_request_vote(vote_request(1, "node1", 0, 0))));

        // New term: the old vote no longer binds.
        assert!(granted(&n.handle_request_vote(vote_request(2, "node2", 0, 0))));
        assert_eq!(n.current_term, Term::from(2));
    }

    #[test]
    fn election_timeout_starts_election() {
        let mut n = node("node0", &["node1", "node2"]);

        let effects = n.election_timeout();

        assert!(matches!(n.role, Role::Candidate(_)));
        assert_eq!(n.current_term, Term::from(1));
        assert_eq!(n.voted_for, Some(NodeId::from("node0")));
        assert_eq!(sends(&effects).len(), 2);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ResetElectionTimer)));
    }

    #[test]
    fn candidate_wins_with_majority() {
        let mut n = node("node0", &["node1", "node2"]);
        n.election_timeout();

        let effects = n.handle_request_vote_response(
            NodeId::from("node1"),
            RequestVoteResponse {
                term: Term::from(1),
                vote_granted: true,
            },
        );

        assert!(n.is_leader());
        // Immediate heartbeats to both peers.
        assert_eq!(sends(&effects).len(), 2);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ResetHeartbeatTimer)));
    }

    #[test]
    fn duplicate_votes_do_not_count_twice() {
        let mut n = node("node0", &["node1", "node2", "node3", "node4"]);
        n.election_timeout();

        let grant = RequestVoteResponse {
            term: Term::from(1),
            vote_granted: true,
        };
        n.handle_request_vote_response(NodeId::from("node1"), grant.clone());
        n.handle_request_vote_response(NodeId::from("node1"), grant);

        // 2 distinct votes of 5 is not a quorum.
        assert!(!n.is_leader());
    }

    #[test]
    fn candidate_steps_down_on_higher_term_response() {
        let mut n = node("node0", &["node1", "node2"]);
        n.election_timeout();

        n.handle_request_vote_response(
            NodeId::from("node1"),
            RequestVoteResponse {
                term: Term::from(7),
                vote_granted: false,
            },
        );

        assert!(matches!(n.role, Role::Follower(_)));
        assert_eq!(n.current_term, Term::from(7));
        assert_eq!(n.voted_for, None);
    }

    #[test]
    fn single_node_cluster_elects_and_commits_alone() {
        let mut n = node("node0", &[]);

        n.election_timeout();
        assert!(n.is_leader());

        let (outcome, _) = n.submit_command("hello".to_string());
        assert_eq!(
            outcome,
            SubmitOutcome::Accepted {
                index: LogIndex::from(1)
            }
        );
        assert_eq!(n.commit_index, LogIndex::from(1));
    }

    #[test]
    fn first_command_lands_at_index_one() {
        let mut n = node("node0", &["node1", "node2"]);
        make_leader(&mut n);

        let (outcome, effects) = n.submit_command("hi".to_string());

        assert_eq!(
            outcome,
            SubmitOutcome::Accepted {
                index: LogIndex::from(1)
            }
        );
        // Entry rides an immediate AppendEntries to every peer.
        let with_entries = sends(&effects)
            .iter()
            .filter(|(_, m)| matches!(m, Message::AppendEntries(ae) if ae.entries.len() == 1))
            .count();
        assert_eq!(with_entries, 2);
        // Not committed yet: no acknowledgements.
        assert_eq!(n.commit_index, LogIndex::ZERO);
    }

    #[test]
    fn follower_submit_reports_known_leader() {
        let mut n = node("node0", &["node1", "node2"]);
        n.handle_append_entries(heartbeat(1, "node2", 0));

        let (outcome, effects) = n.submit_command("hi".to_string());

        assert_eq!(
            outcome,
            SubmitOutcome::NotLeader {
                leader: Some(NodeId::from("node2"))
            }
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn candidate_submit_reports_no_leader() {
        let mut n = node("node0", &["node1", "node2"]);
        n.election_timeout();

        let (outcome, _) = n.submit_command("hi".to_string());

        assert_eq!(outcome, SubmitOutcome::NotLeader { leader: None });
    }

    #[test]
    fn append_entries_rejects_stale_term() {
        let mut n = node("node0", &["node1", "node2"]);
        n.current_term = Term::from(5);

        let effects = n.handle_append_entries(heartbeat(3, "node1", 0));

        let replies = sends(&effects);
        assert_eq!(replies.len(), 1);
        let Message::AppendEntriesResponse(resp) = replies[0].1 else {
            panic!("expected AppendEntriesResponse");
        };
        assert!(!resp.success);
        assert_eq!(resp.term, Term::from(5));
        // A stale leader must not reset our election timer.
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::ResetElectionTimer)));
    }

    #[test]
    fn append_entries_rejects_gap() {
        let mut n = node("node0", &["node1", "node2"]);

        let request = AppendEntries {
            term: Term::from(1),
            leader_id: NodeId::from("node1"),
            prev_log_index: LogIndex::from(3),
            prev_log_term: Term::from(1),
            entries: vec![Entry {
                term: Term::from(1),
                command: "x".to_string(),
            }],
            leader_commit: LogIndex::ZERO,
        };
        let effects = n.handle_append_entries(request);

        let replies = sends(&effects);
        let Message::AppendEntriesResponse(resp) = replies[0].1 else {
            panic!("expected AppendEntriesResponse");
        };
        assert!(!resp.success);
        // The valid leader still resets the election timer.
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ResetElectionTimer)));
    }

    #[test]
    fn append_entries_applies_and_reports_match() {
        let mut n = node("node0", &["node1", "node2"]);

        let request = AppendEntries {
            term: Term::from(1),
            leader_id: NodeId::from("node1"),
            prev_log_index: LogIndex::ZERO,
            prev_log_term: Term::ZERO,
            entries: vec![
                Entry {
                    term: Term::from(1),
                    command: "a".to_string(),
                },
                Entry {
                    term: Term::from(1),
                    command: "b".to_string(),
                },
            ],
            leader_commit: LogIndex::from(1),
        };
        let effects = n.handle_append_entries(request);

        assert_eq!(n.log.last_index(), LogIndex::from(2));
        assert_eq!(n.commit_index, LogIndex::from(1));
        let replies = sends(&effects);
        let Message::AppendEntriesResponse(resp) = replies[0].1 else {
            panic!("expected AppendEntriesResponse");
        };
        assert!(resp.success);
        assert_eq!(resp.match_index, LogIndex::from(2));
    }

    #[test]
    fn heartbeat_match_counts_only_confirmed_prefix() {
        let mut n = node("node0", &["node1", "node2"]);
        n.log.append(Entry {
            term: Term::from(1),
            command: "a".to_string(),
        });
        n.log.append(Entry {
            term: Term::from(1),
            command: "b".to_string(),
        });

        // Empty heartbeat with prev=1: only index 1 is confirmed by it.
        let request = AppendEntries {
            term: Term::from(1),
            leader_id: NodeId::from("node1"),
            prev_log_index: LogIndex::from(1),
            prev_log_term: Term::from(1),
            entries: Vec::new(),
            leader_commit: LogIndex::ZERO,
        };
        let effects = n.handle_append_entries(request);

        let replies = sends(&effects);
        let Message::AppendEntriesResponse(resp) = replies[0].1 else {
            panic!("expected AppendEntriesResponse");
        };
        assert_eq!(resp.match_index, LogIndex::from(1));
        // The uncounted tail is still intact.
        assert_eq!(n.log.last_index(), LogIndex::from(2));
    }

    #[test]
    fn follower_commit_clamped_to_received_entries() {
        let mut n = node("node0", &["node1", "node2"]);

        let request = AppendEntries {
            term: Term::from(1),
            leader_id: NodeId::from("node1"),
            prev_log_index: LogIndex::ZERO,
            prev_log_term: Term::ZERO,
            entries: vec![Entry {
                term: Term::from(1),
                command: "a".to_string(),
            }],
            leader_commit: LogIndex::from(9),
        };
        n.handle_append_entries(request);

        assert_eq!(n.commit_index, LogIndex::from(1));
    }

    #[test]
    fn heartbeat_converts_candidate_to_follower() {
        let mut n = node("node0", &["node1", "node2"]);
        n.election_timeout();
        assert!(matches!(n.role, Role::Candidate(_)));

        n.handle_append_entries(heartbeat(1, "node1", 0));

        assert!(matches!(n.role, Role::Follower(_)));
        assert_eq!(n.leader_id(), Some(&NodeId::from("node1")));
    }

    #[test]
    fn leader_steps_down_on_higher_term_append_response() {
        let mut n = node("node0", &["node1", "node2"]);
        make_leader(&mut n);

        n.handle_append_entries_response(
            NodeId::from("node1"),
            AppendEntriesResponse {
                term: Term::from(9),
                success: false,
                match_index: LogIndex::ZERO,
            },
        );

        assert!(!n.is_leader());
        assert_eq!(n.current_term, Term::from(9));
    }

    #[test]
    fn leader_commits_once_majority_matches() {
        let mut n = node("node0", &["node1", "node2"]);
        make_leader(&mut n);
        n.submit_command("hi".to_string());

        n.handle_append_entries_response(
            NodeId::from("node1"),
            AppendEntriesResponse {
                term: Term::from(1),
                success: true,
                match_index: LogIndex::from(1),
            },
        );

        // Leader + node1 is a majority of three.
        assert_eq!(n.commit_index, LogIndex::from(1));
    }

    #[test]
    fn commit_requires_own_term_entry() {
        let mut n = node("node0", &["node1", "node2"]);
        // An entry inherited from term 1 sits in the log while this node
        // leads term 2.
        n.log.append(Entry {
            term: Term::from(1),
            command: "old".to_string(),
        });
        n.current_term = Term::from(1);
        n.election_timeout();
        n.handle_request_vote_response(
            NodeId::from("node1"),
            RequestVoteResponse {
                term: Term::from(2),
                vote_granted: true,
            },
        );
        assert!(n.is_leader());

        // The old entry replicates to a majority but is not committable alone.
        n.handle_append_entries_response(
            NodeId::from("node1"),
            AppendEntriesResponse {
                term: Term::from(2),
                success: true,
                match_index: LogIndex::from(1),
            },
        );
        assert_eq!(n.commit_index, LogIndex::ZERO);

        // An own-term entry above it commits both at once.
        n.submit_command("new".to_string());
        n.handle_append_entries_response(
            NodeId::from("node1"),
            AppendEntriesResponse {
                term: Term::from(2),
                success: true,
                match_index: LogIndex::from(2),
            },
        );
        assert_eq!(n.commit_index, LogIndex::from(2));
    }

    #[test]
    fn rejection_backs_up_and_retries_immediately() {
        let mut n = node("node0", &["node1", "node2"]);
        make_leader(&mut n);
        n.submit_command("a".to_string());
        n.submit_command("b".to_string());
        // Pretend node1 was thought fully caught up before it rejected.
        {
            let Role::Leader(leader) = &mut n.role else { panic!() };
            leader.next_index.insert(NodeId::from("node1"), LogIndex::from(3));
        }

        let effects = n.handle_append_entries_response(
            NodeId::from("node1"),
            AppendEntriesResponse {
                term: Term::from(1),
                success: false,
                match_index: LogIndex::ZERO,
            },
        );

        let replies = sends(&effects);
        assert_eq!(replies.len(), 1);
        let Message::AppendEntries(ae) = replies[0].1 else {
            panic!("expected AppendEntries retry");
        };
        // Backed up from 3 to 2: prev is index 1, entry 2 onward resent.
        assert_eq!(ae.prev_log_index, LogIndex::from(1));
        assert_eq!(ae.entries.len(), 1);
    }

    #[test]
    fn stale_success_does_not_regress_match_index() {
        let mut n = node("node0", &["node1", "node2"]);
        make_leader(&mut n);
        n.submit_command("a".to_string());
        n.submit_command("b".to_string());

        n.handle_append_entries_response(
            NodeId::from("node1"),
            AppendEntriesResponse {
                term: Term::from(1),
                success: true,
                match_index: LogIndex::from(2),
            },
        );
        // A reordered, older acknowledgement arrives late.
        n.handle_append_entries_response(
            NodeId::from("node1"),
            AppendEntriesResponse {
                term: Term::from(1),
                success: true,
                match_index: LogIndex::from(1),
            },
        );

        assert_eq!(n.commit_index, LogIndex::from(2));
    }

    #[test]
    fn apply_cursor_walks_committed_prefix_in_order() {
        let mut n = node("node0", &[]);
        n.election_timeout();
        n.submit_command("a".to_string());
        n.submit_command("b".to_string());

        let (i1, e1) = n.take_entry_to_apply().expect("first entry");
        assert_eq!(i1, LogIndex::from(1));
        assert_eq!(e1.command, "a");
        let (i2, e2) = n.take_entry_to_apply().expect("second entry");
        assert_eq!(i2, LogIndex::from(2));
        assert_eq!(e2.command, "b");
        assert!(n.take_entry_to_apply().is_none());
    }
}
