//! Effects the consensus core hands back to its driver.
//!
//! The core never performs I/O: each input produces a list of effects that
//! the runtime (or the simulated cluster in tests) carries out.

use crate::message::Message;
use crate::types::NodeId;

#[derive(Debug)]
pub enum Effect<C> {
    /// Send a message to a specific peer.
    Send { to: NodeId, message: Message<C> },
    /// Re-arm the randomized election timer.
    ResetElectionTimer,
    /// Re-arm the heartbeat timer (leader only).
    ResetHeartbeatTimer,
}
