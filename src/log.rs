//! The replicated log: a dense, 1-based sequence of term-tagged entries.

use serde::{Deserialize, Serialize};

use crate::types::{LogIndex, Term};

/// A single entry in the replicated log.
///
/// The index is not stored: entries are dense, so a position in the log
/// determines it, and AppendEntries conveys the base via `prev_log_index`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry<C> {
    pub term: Term,
    pub command: C,
}

/// In-memory replicated log.
///
/// Indices are 1-based; index 0 is a synthetic sentinel at term 0. Committed
/// prefixes are never truncated: the consensus core only truncates above
/// its commit index, which the election restriction makes safe.
#[derive(Debug, Default)]
pub struct Log<C> {
    entries: Vec<Entry<C>>,
}

impl<C> Log<C> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last entry; the sentinel (0) when empty.
    pub fn last_index(&self) -> LogIndex {
        LogIndex::from_length(self.entries.len())
    }

    /// Term of the last entry; term 0 when empty.
    pub fn last_term(&self) -> Term {
        self.entries.last().map_or(Term::ZERO, |e| e.term)
    }

    /// Term at `index`. The sentinel reports term 0; out-of-range is None.
    pub fn term_at(&self, index: LogIndex) -> Option<Term> {
        match index.to_array_index() {
            None => Some(Term::ZERO),
            Some(i) => self.entries.get(i).map(|e| e.term),
        }
    }

    pub fn get(&self, index: LogIndex) -> Option<&Entry<C>> {
        self.entries.get(index.to_array_index()?)
    }

    /// All entries at `start` and after, in index order.
    pub fn entries_from(&self, start: LogIndex) -> &[Entry<C>] {
        match start.to_array_index() {
            None => &self.entries,
            Some(i) => self.entries.get(i..).unwrap_or(&[]),
        }
    }

    /// Append one entry; returns its index.
    pub fn append(&mut self, entry: Entry<C>) -> LogIndex {
        self.entries.push(entry);
        self.last_index()
    }

    /// Remove `index` and everything after it. Truncating at the sentinel
    /// clears the log.
    pub fn truncate_from(&mut self, index: LogIndex) {
        match index.to_array_index() {
            None => self.entries.clear(),
            Some(i) => self.entries.truncate(i),
        }
    }

    /// Merge `entries` in after `prev_log_index`: an existing entry whose
    /// term conflicts is dropped together with everything after it, then the
    /// incoming entries take its place. Replaying an identical batch leaves
    /// the log unchanged.
    pub fn merge_from(&mut self, prev_log_index: LogIndex, entries: Vec<Entry<C>>) {
        let mut at = prev_log_index.next();
        for entry in entries {
            match at.to_array_index() {
                Some(i) if i < self.entries.len() => {
                    if self.entries[i].term != entry.term {
                        self.entries.truncate(i);
                        self.entries.push(entry);
                    }
                }
                _ => self.entries.push(entry),
            }
            at = at.next();
        }
    }
}
