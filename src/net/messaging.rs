use std::sync::Mutex;

use tracing::trace;

use crate::entities::ids::{EntityId, RoomId};

/// Delivers narration. Lines to an entity without a session are dropped by
/// the implementation; the engine never needs to know.
pub trait Messenger: Send + Sync {
    fn send_to(&self, entity: EntityId, text: &str);
    fn broadcast_room(&self, room: RoomId, text: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Entity(EntityId, String),
    Room(RoomId, String),
}

/// Messenger that records every line. Used by tests and by the headless binary.
#[derive(Debug, Default)]
pub struct Outbox {
    lines: Mutex<Vec<Delivery>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Delivery> {
        match self.lines.lock() {
            Ok(mut lines) => std::mem::take(&mut *lines),
            Err(_) => Vec::new(),
        }
    }

    pub fn lines_for(&self, entity: EntityId) -> Vec<String> {
        self.filtered(|delivery| match delivery {
            Delivery::Entity(id, text) if *id == entity => Some(text.clone()),
            _ => None,
        })
    }

    pub fn room_lines(&self, room: RoomId) -> Vec<String> {
        self.filtered(|delivery| match delivery {
            Delivery::Room(id, text) if *id == room => Some(text.clone()),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn filtered(&self, pick: impl Fn(&Delivery) -> Option<String>) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.iter().filter_map(pick).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn push(&self, delivery: Delivery) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(delivery);
        }
    }
}

impl Messenger for Outbox {
    fn send_to(&self, entity: EntityId, text: &str) {
        if !entity.is_player() {
            return;
        }
        trace!(to = %entity, text, "message");
        self.push(Delivery::Entity(entity, text.to_string()));
    }

    fn broadcast_room(&self, room: RoomId, text: &str) {
        trace!(room = room.0, text, "room message");
        self.push(Delivery::Room(room, text.to_string()));
    }
}
