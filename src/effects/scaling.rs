//! Proficiency scaling shared by every effect behaviour.
//!
//! Proficiency is a caster's mastery of an effect, an integer clamped to
//! `[1, 100]`. All duration, dice, fail-chance and cooldown scaling goes
//! through the functions here so balance stays identical across handlers.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Proficiency(u8);

impl Proficiency {
    pub const MIN: Proficiency = Proficiency(1);
    pub const MAX: Proficiency = Proficiency(100);

    pub fn new(value: i64) -> Self {
        Proficiency(value.clamp(1, 100) as u8)
    }

    /// Lenient parse for command-layer input: anything unparsable is 1.
    pub fn parse(raw: &str) -> Self {
        raw.trim()
            .parse::<i64>()
            .map(Proficiency::new)
            .unwrap_or(Proficiency::MIN)
    }

    pub fn value(self) -> u32 {
        u32::from(self.0)
    }

    pub fn fraction(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl Default for Proficiency {
    fn default() -> Self {
        Proficiency::MIN
    }
}

impl fmt::Display for Proficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// `min + (max - min) * p / 100`, in whatever unit the bounds use.
pub fn linear_duration(min: f64, max: f64, proficiency: Proficiency) -> f64 {
    min + (max - min) * proficiency.fraction()
}

/// `base * (0.5 + p / 100 * 0.5)`: 50% of base at the bottom, full base at p=100.
/// Fractional milliseconds are dropped.
pub fn half_to_full_duration_ms(base_ms: u64, proficiency: Proficiency) -> u64 {
    (base_ms as f64 * (0.5 + proficiency.fraction() * 0.5)) as u64
}

/// `base * p / 100`, truncated. Older infusion effects scale their whole duration this way.
pub fn proportional_duration_ms(base_ms: u64, proficiency: Proficiency) -> u64 {
    (base_ms as f64 * proficiency.fraction()) as u64
}

/// `max(1, floor(n * p / 100))`, computed in integers so boundaries are exact.
pub fn scaled_dice_count(count: u32, proficiency: Proficiency) -> u32 {
    let scaled = u64::from(count) * u64::from(proficiency.value()) / 100;
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// `base + p * (max - base) / 100`.
pub fn fail_chance(base: f64, max: f64, proficiency: Proficiency) -> f64 {
    base + f64::from(proficiency.value()) * (max - base) / 100.0
}

pub const COOLDOWN_FLOOR_SECS: f64 = 3.0;

/// Whole seconds of cooldown: the base cooldown at p=1 falling linearly to
/// [`COOLDOWN_FLOOR_SECS`] at p=100, never below one second. No base, no cooldown.
pub fn scaled_cooldown_secs(base_secs: f64, proficiency: Proficiency) -> u64 {
    if base_secs <= 0.0 {
        return 0;
    }
    let t = (f64::from(proficiency.value()) - 1.0) / 99.0;
    let t = t.clamp(0.0, 1.0);
    let scaled = base_secs * (1.0 - t) + COOLDOWN_FLOOR_SECS * t;
    scaled.round().max(1.0) as u64
}

/// Flat bonus for level-scaled effects: `round(level * (0.5 + p / 100))`.
pub fn level_bonus(caster_level: u32, proficiency: Proficiency) -> u32 {
    (f64::from(caster_level) * (0.5 + proficiency.fraction())).round() as u32
}

/// Whole milliseconds in `secs`, truncated toward zero.
pub fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_nan() || secs <= 0.0 {
        return 0;
    }
    (secs * 1000.0) as u64
}
