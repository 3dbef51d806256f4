//! The chat state machine: rooms and their committed message histories.
//!
//! Commands travel through the log as raw JSON so every field a client
//! attaches (ids, timestamps, fields we have never heard of) survives
//! replication byte-for-byte. Interpretation happens here, at apply time.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::runtime::StateMachine;
use crate::types::LogIndex;

/// The room every cluster starts with. It can never be deleted.
pub const DEFAULT_ROOM: &str = "general";

fn default_room() -> String {
    DEFAULT_ROOM.to_string()
}

/// Typed view of a committed payload. Parsing is lenient: extra fields are
/// ignored here (the raw payload is what gets served), and a payload that
/// does not parse at all is applied as a no-op so unknown command types can
/// roll through old servers.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatCommand {
    Chat {
        #[serde(default = "default_room")]
        room: String,
    },
    RoomAdd {
        room: String,
    },
    RoomDelete {
        room: String,
    },
}

/// Chat state, a pure function of the applied log prefix.
#[derive(Debug, PartialEq)]
pub struct ChatState {
    rooms: BTreeSet<String>,
    history: BTreeMap<String, Vec<Value>>,
    /// Every committed payload in commit order, served by `/messages`.
    messages: Vec<Value>,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatState {
    pub fn new() -> Self {
        let mut rooms = BTreeSet::new();
        rooms.insert(DEFAULT_ROOM.to_string());
        let mut history = BTreeMap::new();
        history.insert(DEFAULT_ROOM.to_string(), Vec::new());
        Self {
            rooms,
            history,
            messages: Vec::new(),
        }
    }

    /// Flat, commit-ordered view of every committed payload, unchanged.
    /// Clients filter by `room` and reconcile pending sends by `id`.
    pub fn snapshot_messages(&self) -> Vec<Value> {
        self.messages.clone()
    }

    pub fn rooms(&self) -> &BTreeSet<String> {
        &self.rooms
    }

    pub fn history(&self, room: &str) -> Option<&[Value]> {
        self.history.get(room).map(Vec::as_slice)
    }

    fn interpret(&mut self, index: LogIndex, payload: &Value) {
        let command = match ChatCommand::deserialize(payload) {
            Ok(command) => command,
            Err(_) => {
                debug!(index = %index, "unrecognized command type, applied as no-op");
                return;
            }
        };

        match command {
            ChatCommand::Chat { room } => match self.history.get_mut(&room) {
                Some(history) => history.push(payload.clone()),
                // Room was never created (or was deleted): the message stays
                // in the flat snapshot only.
                None => debug!(index = %index, room, "chat to nonexistent room"),
            },
            ChatCommand::RoomAdd { room } => {
                if self.rooms.insert(room.clone()) {
                    self.history.entry(room).or_default();
                }
            }
            ChatCommand::RoomDelete { room } => {
                if room == DEFAULT_ROOM {
                    debug!(index = %index, "refusing to delete the default room");
                    return;
                }
                self.rooms.remove(&room);
                self.history.remove(&room);
            }
        }
    }
}

impl StateMachine<Value> for ChatState {
    fn apply(&mut self, index: LogIndex, command: &Value) {
        self.messages.push(command.clone());
        self.interpret(index, command);
    }
}
