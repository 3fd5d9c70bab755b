use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::effects::dice::DiceSpec;
use crate::effects::scaling::{self, Proficiency};
use crate::entities::stats::{ModifierOp, Stat};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffectId(pub String);

impl EffectId {
    pub fn new(id: impl Into<String>) -> Self {
        EffectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EffectId {
    fn from(value: &str) -> Self {
        EffectId(value.to_string())
    }
}

impl Borrow<str> for EffectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Behaviour family of a definition. Decides the default handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectCategory {
    Modifier,
    Heal,
    Dot,
    Custom,
    InstantHeal,
    InstantDamage,
    WeaponInfusion,
    Debuff,
    BurningHands,
    CallLightning,
    CauseWounds,
    Undead,
    Slow,
    Confused,
    Paralyzed,
    Cursed,
    Flying,
}

impl EffectCategory {
    pub const ALL: [EffectCategory; 17] = [
        EffectCategory::Modifier,
        EffectCategory::Heal,
        EffectCategory::Dot,
        EffectCategory::Custom,
        EffectCategory::InstantHeal,
        EffectCategory::InstantDamage,
        EffectCategory::WeaponInfusion,
        EffectCategory::Debuff,
        EffectCategory::BurningHands,
        EffectCategory::CallLightning,
        EffectCategory::CauseWounds,
        EffectCategory::Undead,
        EffectCategory::Slow,
        EffectCategory::Confused,
        EffectCategory::Paralyzed,
        EffectCategory::Cursed,
        EffectCategory::Flying,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectCategory::Modifier => "MODIFIER",
            EffectCategory::Heal => "HEAL",
            EffectCategory::Dot => "DOT",
            EffectCategory::Custom => "CUSTOM",
            EffectCategory::InstantHeal => "INSTANT_HEAL",
            EffectCategory::InstantDamage => "INSTANT_DAMAGE",
            EffectCategory::WeaponInfusion => "WEAPON_INFUSION",
            EffectCategory::Debuff => "DEBUFF",
            EffectCategory::BurningHands => "BURNING_HANDS",
            EffectCategory::CallLightning => "CALL_LIGHTNING",
            EffectCategory::CauseWounds => "CAUSE_WOUNDS",
            EffectCategory::Undead => "UNDEAD",
            EffectCategory::Slow => "SLOW",
            EffectCategory::Confused => "CONFUSED",
            EffectCategory::Paralyzed => "PARALYZED",
            EffectCategory::Cursed => "CURSED",
            EffectCategory::Flying => "FLYING",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let wanted = value.trim().to_ascii_uppercase();
        EffectCategory::ALL
            .iter()
            .copied()
            .find(|category| category.name() == wanted)
    }

    /// Flag debuff carried by this category, if it is one.
    pub fn debuff_flag(self) -> Option<DebuffFlag> {
        match self {
            EffectCategory::Debuff => Some(DebuffFlag::Blind),
            EffectCategory::Slow => Some(DebuffFlag::Slow),
            EffectCategory::Confused => Some(DebuffFlag::Confused),
            EffectCategory::Paralyzed => Some(DebuffFlag::Paralyzed),
            EffectCategory::Cursed => Some(DebuffFlag::Cursed),
            _ => None,
        }
    }
}

impl fmt::Display for EffectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StackPolicy {
    Stack,
    #[default]
    Refresh,
    ReplaceHigherPriority,
    Unique,
}

impl StackPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "STACK" => Some(StackPolicy::Stack),
            "REFRESH" => Some(StackPolicy::Refresh),
            "REPLACE_HIGHER_PRIORITY" => Some(StackPolicy::ReplaceHigherPriority),
            "UNIQUE" => Some(StackPolicy::Unique),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProficiencyImpact {
    Duration,
    Cooldown,
    DiceMultiplier,
}

impl FromStr for ProficiencyImpact {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DURATION" => Ok(ProficiencyImpact::Duration),
            "COOLDOWN" => Ok(ProficiencyImpact::Cooldown),
            "DICE_MULTIPLIER" => Ok(ProficiencyImpact::DiceMultiplier),
            other => Err(format!("unknown proficiency impact {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebuffFlag {
    Blind,
    Slow,
    Confused,
    Paralyzed,
    Cursed,
}

impl DebuffFlag {
    pub fn name(self) -> &'static str {
        match self {
            DebuffFlag::Blind => "blind",
            DebuffFlag::Slow => "slow",
            DebuffFlag::Confused => "confused",
            DebuffFlag::Paralyzed => "paralyzed",
            DebuffFlag::Cursed => "cursed",
        }
    }

    pub fn default_min_duration_secs(self) -> f64 {
        match self {
            DebuffFlag::Blind | DebuffFlag::Paralyzed => 5.0,
            DebuffFlag::Slow | DebuffFlag::Confused | DebuffFlag::Cursed => 10.0,
        }
    }

    /// Slow always uses its default floor, whatever the data says.
    pub fn min_duration_configurable(self) -> bool {
        !matches!(self, DebuffFlag::Slow)
    }
}

pub const DEFAULT_TICK_INTERVAL_SECS: f64 = 3.0;
pub const DEFAULT_SPREAD_CHANCE: f64 = 0.25;
pub const BLIND_FALLBACK_MAX_SECS: f64 = 30.0;
pub const FLYING_MIN_DURATION_SECS: f64 = 60.0;
pub const CURSE_BASE_FAIL_PERCENT: f64 = 25.0;
pub const CURSE_MAX_FAIL_PERCENT: f64 = 75.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DotParams {
    pub tick_interval_ms: u64,
    pub damage_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlagParams {
    pub flag: DebuffFlag,
    pub min_duration_secs: f64,
    /// Fail chance bounds as fractions, curse only.
    pub fail_chance: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfusionParams {
    pub weapon_family: String,
    pub infusion_type: String,
    pub attack_stat: Stat,
    pub defense_stat: Stat,
    pub ranged: bool,
    pub aoe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Light,
    Serious,
    Critical,
    Other,
}

impl Severity {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Severity::Light,
            "serious" => Severity::Serious,
            "critical" => Severity::Critical,
            _ => Severity::Other,
        }
    }
}

/// Typed per-category configuration. Keys a category does not understand
/// stay in [`EffectDefinition::extra`].
#[derive(Debug, Clone, PartialEq)]
pub enum EffectParams {
    Modifier { stat: Stat, op: ModifierOp, value: f64 },
    Dot(DotParams),
    SpreadingDot { dot: DotParams, spread_chance: f64 },
    InstantDamage { bonus: i32 },
    InstantHeal { bonus: i32 },
    Wounds { severity: Severity },
    Flag(FlagParams),
    Flying { min_duration_secs: f64 },
    Infusion(InfusionParams),
    Marker,
}

impl EffectParams {
    /// Builds typed params for `category`, consuming recognised keys from `raw`.
    pub fn from_raw(
        category: EffectCategory,
        raw: &mut BTreeMap<String, String>,
    ) -> Result<EffectParams, String> {
        let params = match category {
            EffectCategory::Modifier => {
                let stat = raw
                    .remove("stat")
                    .ok_or_else(|| "modifier needs a stat".to_string())?
                    .parse::<Stat>()?;
                let op = match raw.remove("op") {
                    Some(op) => op.parse::<ModifierOp>()?,
                    None => ModifierOp::Add,
                };
                let value = raw
                    .remove("value")
                    .ok_or_else(|| "modifier needs a value".to_string())?;
                let value = value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("modifier value {} is not a number", value))?;
                EffectParams::Modifier { stat, op, value }
            }
            EffectCategory::Dot => EffectParams::Dot(take_dot(raw, "magical")),
            EffectCategory::BurningHands => EffectParams::SpreadingDot {
                dot: take_dot(raw, "fire"),
                spread_chance: take_f64(raw, "spread_chance", DEFAULT_SPREAD_CHANCE).clamp(0.0, 1.0),
            },
            EffectCategory::InstantDamage | EffectCategory::Custom | EffectCategory::CallLightning => {
                EffectParams::InstantDamage {
                    bonus: take_i32(raw, "bonus", 0),
                }
            }
            EffectCategory::InstantHeal => EffectParams::InstantHeal {
                bonus: take_i32(raw, "bonus", 0),
            },
            EffectCategory::CauseWounds => EffectParams::Wounds {
                severity: raw
                    .remove("severity")
                    .map(|value| Severity::parse(&value))
                    .unwrap_or(Severity::Light),
            },
            EffectCategory::Debuff
            | EffectCategory::Slow
            | EffectCategory::Confused
            | EffectCategory::Paralyzed
            | EffectCategory::Cursed => {
                let Some(flag) = category.debuff_flag() else {
                    return Err(format!("{} is not a flag debuff", category));
                };
                let default_min = flag.default_min_duration_secs();
                let min_duration_secs = if flag.min_duration_configurable() {
                    take_f64(raw, "min_duration", default_min)
                } else {
                    raw.remove("min_duration");
                    default_min
                };
                let fail_chance = (flag == DebuffFlag::Cursed).then(|| {
                    (
                        take_f64(raw, "base_fail_chance", CURSE_BASE_FAIL_PERCENT) / 100.0,
                        take_f64(raw, "max_fail_chance", CURSE_MAX_FAIL_PERCENT) / 100.0,
                    )
                });
                EffectParams::Flag(FlagParams {
                    flag,
                    min_duration_secs,
                    fail_chance,
                })
            }
            EffectCategory::Flying => EffectParams::Flying {
                min_duration_secs: take_f64(raw, "min_duration", FLYING_MIN_DURATION_SECS),
            },
            EffectCategory::WeaponInfusion => {
                let weapon_family = raw
                    .remove("weapon_family")
                    .map(|family| family.trim().to_ascii_uppercase())
                    .filter(|family| !family.is_empty())
                    .ok_or_else(|| "weapon infusion needs a weapon_family".to_string())?;
                let attack_stat = match raw.remove("attack_stat") {
                    Some(stat) => stat.parse::<Stat>()?,
                    None => Stat::Strength,
                };
                let defense_stat = match raw.remove("defense_stat") {
                    Some(stat) => stat.parse::<Stat>()?,
                    None => Stat::Armor,
                };
                EffectParams::Infusion(InfusionParams {
                    weapon_family,
                    infusion_type: raw
                        .remove("infusion_type")
                        .map(|kind| kind.trim().to_ascii_uppercase())
                        .unwrap_or_else(|| "ARCANE".to_string()),
                    attack_stat,
                    defense_stat,
                    ranged: take_bool(raw, "ranged"),
                    aoe: take_bool(raw, "aoe"),
                })
            }
            EffectCategory::Heal | EffectCategory::Undead => EffectParams::Marker,
        };
        Ok(params)
    }
}

fn take_dot(raw: &mut BTreeMap<String, String>, default_damage_type: &str) -> DotParams {
    let interval_secs = take_f64(raw, "tick_interval", DEFAULT_TICK_INTERVAL_SECS);
    let interval_secs = if interval_secs > 0.0 {
        interval_secs
    } else {
        DEFAULT_TICK_INTERVAL_SECS
    };
    DotParams {
        tick_interval_ms: scaling::secs_to_ms(interval_secs),
        damage_type: raw
            .remove("damage_type")
            .unwrap_or_else(|| default_damage_type.to_string()),
    }
}

fn take_f64(raw: &mut BTreeMap<String, String>, key: &str, default: f64) -> f64 {
    raw.remove(key)
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
}

fn take_i32(raw: &mut BTreeMap<String, String>, key: &str, default: i32) -> i32 {
    raw.remove(key)
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(default)
}

fn take_bool(raw: &mut BTreeMap<String, String>, key: &str) -> bool {
    raw.remove(key)
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Immutable template for one kind of effect.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectDefinition {
    pub id: EffectId,
    pub name: String,
    pub category: EffectCategory,
    pub params: EffectParams,
    pub extra: BTreeMap<String, String>,
    pub duration_secs: f64,
    pub cooldown_secs: f64,
    pub dice: Option<DiceSpec>,
    pub level_multiplier: i32,
    pub impacts: BTreeSet<ProficiencyImpact>,
    pub stack_policy: StackPolicy,
    pub persistent: bool,
    pub priority: i32,
}

impl EffectDefinition {
    /// Minimal definition; the catalog loader fills in the rest.
    pub fn new(id: impl Into<String>, category: EffectCategory, params: EffectParams) -> Self {
        let id = EffectId::new(id);
        Self {
            name: format!("effect_{}", id),
            id,
            category,
            params,
            extra: BTreeMap::new(),
            duration_secs: 0.0,
            cooldown_secs: 0.0,
            dice: None,
            level_multiplier: 0,
            impacts: BTreeSet::new(),
            stack_policy: StackPolicy::Refresh,
            persistent: true,
            priority: 0,
        }
    }

    pub fn has_impact(&self, impact: ProficiencyImpact) -> bool {
        self.impacts.contains(&impact)
    }

    pub fn base_duration_ms(&self) -> u64 {
        scaling::secs_to_ms(self.duration_secs)
    }

    /// Base duration, half-to-full scaled when duration depends on proficiency.
    pub fn scaled_duration_ms(&self, proficiency: Proficiency) -> u64 {
        let base = self.base_duration_ms();
        if self.has_impact(ProficiencyImpact::Duration) {
            scaling::half_to_full_duration_ms(base, proficiency)
        } else {
            base
        }
    }

    /// Dice to roll, with the count scaled when dice depend on proficiency.
    pub fn scaled_dice(&self, proficiency: Proficiency) -> Option<DiceSpec> {
        let dice = self.dice?;
        if self.has_impact(ProficiencyImpact::DiceMultiplier) {
            Some(dice.scaled(proficiency))
        } else {
            Some(dice)
        }
    }

    /// Cooldown in whole seconds for a caster of this proficiency.
    pub fn scaled_cooldown_secs(&self, proficiency: Proficiency) -> u64 {
        if self.has_impact(ProficiencyImpact::Cooldown) {
            scaling::scaled_cooldown_secs(self.cooldown_secs, proficiency)
        } else if self.cooldown_secs > 0.0 {
            self.cooldown_secs.round().max(1.0) as u64
        } else {
            0
        }
    }

    pub fn with_duration_secs(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_dice(mut self, dice: DiceSpec) -> Self {
        self.dice = Some(dice);
        self
    }

    pub fn with_impact(mut self, impact: ProficiencyImpact) -> Self {
        self.impacts.insert(impact);
        self
    }

    pub fn with_stack_policy(mut self, policy: StackPolicy) -> Self {
        self.stack_policy = policy;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_level_multiplier(mut self, multiplier: i32) -> Self {
        self.level_multiplier = multiplier;
        self
    }

    pub fn with_cooldown_secs(mut self, secs: f64) -> Self {
        self.cooldown_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn modifier_params_are_typed() {
        let mut map = raw(&[("stat", "armor"), ("op", "multiply"), ("value", "1.5"), ("note", "x")]);
        let params = EffectParams::from_raw(EffectCategory::Modifier, &mut map).expect("params");
        assert_eq!(
            params,
            EffectParams::Modifier {
                stat: Stat::Armor,
                op: ModifierOp::Multiply,
                value: 1.5
            }
        );
        assert_eq!(map.get("note").map(String::as_str), Some("x"));
    }

    #[test]
    fn modifier_without_stat_is_rejected() {
        let mut map = raw(&[("value", "2")]);
        assert!(EffectParams::from_raw(EffectCategory::Modifier, &mut map).is_err());
        let mut map = raw(&[("stat", "LUCK"), ("value", "2")]);
        assert!(EffectParams::from_raw(EffectCategory::Modifier, &mut map).is_err());
    }

    #[test]
    fn dot_defaults_interval_and_type() {
        let mut map = raw(&[("tick_interval", "nope")]);
        let params = EffectParams::from_raw(EffectCategory::Dot, &mut map).expect("params");
        assert_eq!(
            params,
            EffectParams::Dot(DotParams {
                tick_interval_ms: 3_000,
                damage_type: "magical".to_string()
            })
        );
        let mut map = raw(&[]);
        let EffectParams::SpreadingDot { dot, spread_chance } =
            EffectParams::from_raw(EffectCategory::BurningHands, &mut map).expect("params")
        else {
            panic!("expected spreading dot");
        };
        assert_eq!(dot.damage_type, "fire");
        assert_eq!(spread_chance, DEFAULT_SPREAD_CHANCE);
    }

    #[test]
    fn flag_defaults_follow_flag() {
        let mut map = raw(&[("min_duration", "99")]);
        let EffectParams::Flag(slow) =
            EffectParams::from_raw(EffectCategory::Slow, &mut map).expect("slow")
        else {
            panic!("expected flag");
        };
        assert_eq!(slow.min_duration_secs, 10.0);
        assert!(map.is_empty());

        let mut map = raw(&[("base_fail_chance", "10")]);
        let EffectParams::Flag(curse) =
            EffectParams::from_raw(EffectCategory::Cursed, &mut map).expect("curse")
        else {
            panic!("expected flag");
        };
        assert_eq!(curse.fail_chance, Some((0.10, 0.75)));
        assert_eq!(curse.min_duration_secs, 10.0);
    }

    #[test]
    fn infusion_requires_family() {
        let mut map = raw(&[("infusion_type", "frost")]);
        assert!(EffectParams::from_raw(EffectCategory::WeaponInfusion, &mut map).is_err());
        let mut map = raw(&[("weapon_family", "long_blades"), ("ranged", "TRUE")]);
        let EffectParams::Infusion(infusion) =
            EffectParams::from_raw(EffectCategory::WeaponInfusion, &mut map).expect("infusion")
        else {
            panic!("expected infusion");
        };
        assert_eq!(infusion.weapon_family, "LONG_BLADES");
        assert_eq!(infusion.infusion_type, "ARCANE");
        assert!(infusion.ranged);
        assert!(!infusion.aoe);
    }

    #[test]
    fn duration_and_dice_follow_impacts() {
        let def = EffectDefinition::new("acid", EffectCategory::Dot, EffectParams::Marker)
            .with_duration_secs(15.0)
            .with_dice(DiceSpec::new(3, 6));
        assert_eq!(def.scaled_duration_ms(Proficiency::new(50)), 15_000);
        assert_eq!(def.scaled_dice(Proficiency::new(50)), Some(DiceSpec::new(3, 6)));

        let def = def
            .with_impact(ProficiencyImpact::Duration)
            .with_impact(ProficiencyImpact::DiceMultiplier);
        assert_eq!(def.scaled_duration_ms(Proficiency::new(50)), 11_250);
        assert_eq!(def.scaled_dice(Proficiency::new(50)), Some(DiceSpec::new(1, 6)));
    }

    #[test]
    fn cooldown_scales_only_with_impact() {
        let def = EffectDefinition::new("x", EffectCategory::Modifier, EffectParams::Marker)
            .with_cooldown_secs(30.0);
        assert_eq!(def.scaled_cooldown_secs(Proficiency::MAX), 30);
        let def = def.with_impact(ProficiencyImpact::Cooldown);
        assert_eq!(def.scaled_cooldown_secs(Proficiency::MAX), 3);
    }

    #[test]
    fn category_names_round_trip() {
        for category in EffectCategory::ALL {
            assert_eq!(EffectCategory::parse(category.name()), Some(category));
        }
        assert_eq!(EffectCategory::parse("weird"), None);
        assert_eq!(StackPolicy::parse("unique"), Some(StackPolicy::Unique));
        assert_eq!(StackPolicy::default(), StackPolicy::Refresh);
    }
}
