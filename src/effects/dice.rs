//! "NdM" damage dice.

use std::fmt;

use thiserror::Error;

use crate::effects::scaling::{self, Proficiency};
use crate::world::random::RandomSource;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    #[error("empty dice spec")]
    Empty,
    #[error("invalid dice spec {0}")]
    InvalidFormat(String),
    #[error("dice spec {0} needs at least one die with at least one face")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceSpec {
    pub count: u32,
    pub faces: u32,
}

impl DiceSpec {
    pub fn new(count: u32, faces: u32) -> Self {
        Self { count, faces }
    }

    /// Parses "NdM" (case-insensitive, surrounding whitespace ignored).
    pub fn parse(input: &str) -> Result<Self, DiceParseError> {
        let input = input.trim().to_ascii_lowercase();
        if input.is_empty() {
            return Err(DiceParseError::Empty);
        }
        let Some((count, faces)) = input.split_once('d') else {
            return Err(DiceParseError::InvalidFormat(input));
        };
        if count.is_empty() {
            return Err(DiceParseError::InvalidFormat(input));
        }
        let (Ok(count), Ok(faces)) = (count.trim().parse::<u32>(), faces.trim().parse::<u32>()) else {
            return Err(DiceParseError::InvalidFormat(input));
        };
        if count == 0 || faces == 0 {
            return Err(DiceParseError::OutOfRange(input));
        }
        Ok(Self { count, faces })
    }

    /// Same spec with the dice count scaled by proficiency.
    pub fn scaled(self, proficiency: Proficiency) -> Self {
        Self {
            count: scaling::scaled_dice_count(self.count, proficiency),
            faces: self.faces,
        }
    }

    pub fn roll(&self, random: &dyn RandomSource) -> u32 {
        (0..self.count).fold(0u32, |total, _| total.saturating_add(random.roll_die(self.faces)))
    }

    pub fn min_total(&self) -> u32 {
        self.count
    }

    pub fn max_total(&self) -> u32 {
        self.count.saturating_mul(self.faces)
    }
}

impl fmt::Display for DiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::random::{FixedRandom, ThreadRandom};

    #[test]
    fn parses_plain_specs() {
        assert_eq!(DiceSpec::parse("3d6"), Ok(DiceSpec::new(3, 6)));
        assert_eq!(DiceSpec::parse(" 10D8 "), Ok(DiceSpec::new(10, 8)));
    }

    #[test]
    fn rejects_malformed_specs() {
        assert_eq!(DiceSpec::parse(""), Err(DiceParseError::Empty));
        assert!(matches!(DiceSpec::parse("d6"), Err(DiceParseError::InvalidFormat(_))));
        assert!(matches!(DiceSpec::parse("3x6"), Err(DiceParseError::InvalidFormat(_))));
        assert!(matches!(DiceSpec::parse("ad6"), Err(DiceParseError::InvalidFormat(_))));
        assert!(matches!(DiceSpec::parse("0d6"), Err(DiceParseError::OutOfRange(_))));
    }

    #[test]
    fn rolls_stay_in_range() {
        let dice = DiceSpec::new(3, 6);
        for _ in 0..100 {
            let total = dice.roll(&ThreadRandom);
            assert!((dice.min_total()..=dice.max_total()).contains(&total));
        }
        assert_eq!(dice.roll(&FixedRandom::new(4, false)), 12);
    }

    #[test]
    fn scaling_keeps_faces() {
        let dice = DiceSpec::new(3, 6).scaled(Proficiency::new(50));
        assert_eq!(dice, DiceSpec::new(1, 6));
        assert_eq!(DiceSpec::new(3, 6).scaled(Proficiency::MAX).count, 3);
    }
}
