//! Replicated chat over Raft consensus.
//!
//! A fixed-membership cluster of identical nodes totally orders chat
//! commands (messages, room creation and deletion) through leader-based
//! replication and serves the committed sequence over a small HTTP API.
//! Clients write to any node; non-leaders answer with a redirect to the
//! leader, or with a bare 302 while an election is in progress.
//!
//! The consensus protocol follows "In Search of an Understandable
//! Consensus Algorithm" (Ongaro & Ousterhout), minus durability and log
//! compaction: state is in memory and a restarted node rejoins empty,
//! catching up from the leader like any lagging follower.
//!
//! Layering, leaves first: [`types`] and [`log`] hold the vocabulary;
//! [`node`] is the sans-I/O consensus core, emitting [`effect::Effect`]s
//! instead of doing I/O; [`runtime`] adds timers and the apply loop;
//! [`transport`] and [`client_api`] are the TCP and HTTP edges; [`server`]
//! ties them into one event loop. [`cluster`] wires several runtimes
//! together in memory for whole-cluster tests.

pub mod chat;
pub mod client_api;
pub mod cluster;
pub mod config;
pub mod effect;
pub mod log;
pub mod message;
pub mod node;
pub mod runtime;
pub mod server;
pub mod state;
pub mod transport;
pub mod types;

pub use chat::ChatState;
pub use effect::Effect;
pub use log::{Entry, Log};
pub use message::{
    AppendEntries, AppendEntriesResponse, Message, RequestVote, RequestVoteResponse,
};
pub use node::{Node, Role, SubmitOutcome};
pub use runtime::{Event, Runtime, StateMachine, TimerConfig};
pub use types::{LogIndex, NodeId, Term};
