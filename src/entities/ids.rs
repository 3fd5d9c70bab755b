use std::fmt;

use serde::{Deserialize, Serialize};

/// Signed entity id shared by players and mobs: positive ids are player
/// characters, negative ids are mob instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Player(u32),
    Mob(u32),
}

impl EntityId {
    pub fn player(id: u32) -> Self {
        EntityId(i32::try_from(id).unwrap_or(i32::MAX))
    }

    pub fn mob(instance_id: u32) -> Self {
        let raw = i32::try_from(instance_id).unwrap_or(i32::MAX);
        EntityId(-raw)
    }

    /// Zero addresses nothing; it is neither a player nor a mob.
    pub fn kind(self) -> Option<EntityKind> {
        match self.0 {
            0 => None,
            id if id > 0 => Some(EntityKind::Player(id.unsigned_abs())),
            id => Some(EntityKind::Mob(id.unsigned_abs())),
        }
    }

    pub fn is_player(self) -> bool {
        self.0 > 0
    }

    pub fn is_mob(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(EntityKind::Player(id)) => write!(f, "player#{}", id),
            Some(EntityKind::Mob(id)) => write!(f, "mob#{}", id),
            None => write!(f, "nobody"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub u32);
