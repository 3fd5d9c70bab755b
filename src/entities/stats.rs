use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::world::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stat {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
    HpMax,
    HpCurrent,
    MpMax,
    MpCurrent,
    MvMax,
    MvCurrent,
    Armor,
    Fortitude,
    Reflex,
    Will,
    AttackHitBonus,
    AttackDamageBonus,
    SpellHitBonus,
    SpellDamageBonus,
    MeleeDamageReduction,
    RangedDamageReduction,
    SpellDamageReduction,
    CriticalThresholdBonus,
}

impl Stat {
    pub const ALL: [Stat; 24] = [
        Stat::Strength,
        Stat::Dexterity,
        Stat::Constitution,
        Stat::Intelligence,
        Stat::Wisdom,
        Stat::Charisma,
        Stat::HpMax,
        Stat::HpCurrent,
        Stat::MpMax,
        Stat::MpCurrent,
        Stat::MvMax,
        Stat::MvCurrent,
        Stat::Armor,
        Stat::Fortitude,
        Stat::Reflex,
        Stat::Will,
        Stat::AttackHitBonus,
        Stat::AttackDamageBonus,
        Stat::SpellHitBonus,
        Stat::SpellDamageBonus,
        Stat::MeleeDamageReduction,
        Stat::RangedDamageReduction,
        Stat::SpellDamageReduction,
        Stat::CriticalThresholdBonus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stat::Strength => "STRENGTH",
            Stat::Dexterity => "DEXTERITY",
            Stat::Constitution => "CONSTITUTION",
            Stat::Intelligence => "INTELLIGENCE",
            Stat::Wisdom => "WISDOM",
            Stat::Charisma => "CHARISMA",
            Stat::HpMax => "HP_MAX",
            Stat::HpCurrent => "HP_CURRENT",
            Stat::MpMax => "MP_MAX",
            Stat::MpCurrent => "MP_CURRENT",
            Stat::MvMax => "MV_MAX",
            Stat::MvCurrent => "MV_CURRENT",
            Stat::Armor => "ARMOR",
            Stat::Fortitude => "FORTITUDE",
            Stat::Reflex => "REFLEX",
            Stat::Will => "WILL",
            Stat::AttackHitBonus => "ATTACK_HIT_BONUS",
            Stat::AttackDamageBonus => "ATTACK_DAMAGE_BONUS",
            Stat::SpellHitBonus => "SPELL_HIT_BONUS",
            Stat::SpellDamageBonus => "SPELL_DAMAGE_BONUS",
            Stat::MeleeDamageReduction => "MELEE_DAMAGE_REDUCTION",
            Stat::RangedDamageReduction => "RANGED_DAMAGE_REDUCTION",
            Stat::SpellDamageReduction => "SPELL_DAMAGE_REDUCTION",
            Stat::CriticalThresholdBonus => "CRITICAL_THRESHOLD_BONUS",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_uppercase();
        Stat::ALL
            .iter()
            .copied()
            .find(|stat| stat.name() == wanted)
            .ok_or_else(|| format!("unknown stat {}", value.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModifierOp {
    Add,
    Multiply,
    Override,
}

impl FromStr for ModifierOp {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADD" => Ok(ModifierOp::Add),
            "MULTIPLY" => Ok(ModifierOp::Multiply),
            "OVERRIDE" => Ok(ModifierOp::Override),
            other => Err(format!("unknown modifier op {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModifierId(pub Uuid);

impl ModifierId {
    pub fn random() -> Self {
        ModifierId(Uuid::new_v4())
    }
}

impl fmt::Display for ModifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One stat adjustment. `expires_at == None` means it lasts until removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub id: ModifierId,
    pub source: String,
    pub stat: Stat,
    pub op: ModifierOp,
    pub value: f64,
    pub expires_at: Option<Timestamp>,
    pub priority: i32,
}

impl Modifier {
    pub fn new(source: impl Into<String>, stat: Stat, op: ModifierOp, value: f64) -> Self {
        Self {
            id: ModifierId::random(),
            source: source.into(),
            stat,
            op,
            value,
            expires_at: None,
            priority: 0,
        }
    }

    pub fn with_id(mut self, id: ModifierId) -> Self {
        self.id = id;
        self
    }

    pub fn expiring_at(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}
