//! Core identifier types shared by every layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonically increasing term number.
///
/// Terms act as logical clocks and are used to detect stale information:
/// any message carrying a higher term demotes the receiver to follower.
/// Term 0 is the initial state before any election.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Term(u64);

impl Term {
    pub const ZERO: Self = Self(0);

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn increment(self) -> Term {
        Term(self.0.saturating_add(1))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl From<u64> for Term {
    fn from(value: u64) -> Self {
        Term(value)
    }
}

/// 1-based index into the replicated log.
///
/// Index 0 is the sentinel "before the first entry"; it carries term 0 and
/// never holds a command. Valid entries start at index 1 and are dense.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LogIndex(u64);

impl LogIndex {
    pub const ZERO: Self = Self(0);

    /// Index of the last entry in a log of `len` entries (0 when empty).
    pub const fn from_length(len: usize) -> LogIndex {
        LogIndex(len as u64)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn next(self) -> LogIndex {
        LogIndex(self.0.saturating_add(1))
    }

    /// The index before this one; the sentinel has no predecessor.
    pub const fn prev(self) -> Option<LogIndex> {
        match self.0 {
            0 => None,
            n => Some(LogIndex(n - 1)),
        }
    }

    /// Step toward index 1 without reaching the sentinel. Used by leaders
    /// backing up `next_index` after a consistency rejection.
    pub const fn backtrack(self) -> LogIndex {
        if self.0 > 1 {
            LogIndex(self.0 - 1)
        } else {
            LogIndex(1)
        }
    }

    pub const fn advance_by(self, n: usize) -> LogIndex {
        LogIndex(self.0.saturating_add(n as u64))
    }

    /// Convert to a zero-based slot in the backing vector. None for the sentinel.
    pub const fn to_array_index(self) -> Option<usize> {
        match self.0 {
            0 => None,
            n => Some((n - 1) as usize),
        }
    }
}

impl fmt::Display for LogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

impl From<u64> for LogIndex {
    fn from(value: u64) -> Self {
        LogIndex(value)
    }
}

/// Unique node identifier, e.g. `node0`.
///
/// Serialized transparently so it appears as a plain JSON string both in
/// Raft envelopes and in client-facing payloads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId(value)
    }
}
