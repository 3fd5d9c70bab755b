use dashmap::DashMap;

use crate::entities::character::SharedCharacter;
use crate::entities::ids::{EntityId, RoomId};

/// Resolves ids to live combat participants. `None` means "not in combat";
/// callers then fall back to the persisted record.
pub trait CombatDirectory: Send + Sync {
    fn participant(&self, id: EntityId) -> Option<SharedCharacter>;
    fn combat_room(&self, id: EntityId) -> Option<RoomId>;
    /// Active, living members of `id`'s alliance in the same combat, excluding `id`.
    fn allies_of(&self, id: EntityId) -> Vec<EntityId>;
}

#[derive(Debug, Clone)]
struct Participant {
    character: SharedCharacter,
    alliance: u8,
    room: RoomId,
    active: bool,
}

/// In-memory [`CombatDirectory`] keyed by entity id.
#[derive(Debug, Default)]
pub struct CombatRoster {
    participants: DashMap<EntityId, Participant>,
}

impl CombatRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, character: SharedCharacter, alliance: u8, room: RoomId) -> Option<EntityId> {
        let id = character.lock().ok()?.id;
        self.participants.insert(
            id,
            Participant {
                character,
                alliance,
                room,
                active: true,
            },
        );
        Some(id)
    }

    pub fn leave(&self, id: EntityId) -> Option<SharedCharacter> {
        self.participants.remove(&id).map(|(_, p)| p.character)
    }

    pub fn set_active(&self, id: EntityId, active: bool) {
        if let Some(mut participant) = self.participants.get_mut(&id) {
            participant.active = active;
        }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

impl CombatDirectory for CombatRoster {
    fn participant(&self, id: EntityId) -> Option<SharedCharacter> {
        self.participants.get(&id).map(|p| p.character.clone())
    }

    fn combat_room(&self, id: EntityId) -> Option<RoomId> {
        self.participants.get(&id).map(|p| p.room)
    }

    fn allies_of(&self, id: EntityId) -> Vec<EntityId> {
        let Some((alliance, room)) = self.participants.get(&id).map(|p| (p.alliance, p.room)) else {
            return Vec::new();
        };
        let mut allies: Vec<EntityId> = self
            .participants
            .iter()
            .filter(|entry| *entry.key() != id)
            .filter(|entry| entry.active && entry.alliance == alliance && entry.room == room)
            .filter(|entry| {
                entry
                    .character
                    .lock()
                    .map(|c| c.vitals.is_alive())
                    .unwrap_or(false)
            })
            .map(|entry| *entry.key())
            .collect();
        allies.sort();
        allies
    }
}
