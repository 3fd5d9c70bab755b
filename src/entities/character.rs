use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::entities::ids::{EntityId, RoomId};
use crate::entities::modifiers::StatModifierStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vitals {
    pub hp: u32,
    pub hp_max: u32,
    pub mp: u32,
    pub mp_max: u32,
    pub mv: u32,
    pub mv_max: u32,
}

impl Vitals {
    pub fn full(hp: u32, mp: u32, mv: u32) -> Self {
        Self {
            hp,
            hp_max: hp,
            mp,
            mp_max: mp,
            mv,
            mv_max: mv,
        }
    }

    /// Returns the damage actually taken.
    pub fn apply_raw_damage(&mut self, amount: u32) -> u32 {
        let applied = amount.min(self.hp);
        self.hp = self.hp.saturating_sub(applied);
        applied
    }

    /// Like [`Vitals::apply_raw_damage`] but never drops below `floor`.
    pub fn apply_damage_floored(&mut self, amount: u32, floor: u32) -> u32 {
        let before = self.hp;
        self.hp = before.saturating_sub(amount).max(floor.min(before));
        before.saturating_sub(self.hp)
    }

    /// Returns the hit points actually restored.
    pub fn apply_heal(&mut self, amount: u32) -> u32 {
        if self.hp_max == 0 {
            return 0;
        }
        let before = self.hp;
        let new = before.saturating_add(amount).min(self.hp_max);
        self.hp = new;
        new.saturating_sub(before)
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}

/// A live character as the combat layer sees it.
#[derive(Debug, Clone)]
pub struct Character {
    pub id: EntityId,
    pub name: String,
    pub room: Option<RoomId>,
    pub vitals: Vitals,
    pub stats: StatModifierStore,
    pub undead: bool,
}

impl Character {
    pub fn new(id: EntityId, name: impl Into<String>, vitals: Vitals) -> Self {
        Self {
            id,
            name: name.into(),
            room: None,
            vitals,
            stats: StatModifierStore::new(),
            undead: false,
        }
    }

    pub fn in_room(mut self, room: RoomId) -> Self {
        self.room = Some(room);
        self
    }

    pub fn into_shared(self) -> SharedCharacter {
        Arc::new(Mutex::new(self))
    }
}

pub type SharedCharacter = Arc<Mutex<Character>>;
