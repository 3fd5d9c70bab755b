use rand::Rng;

/// Source of game randomness. Handlers never touch `rand` directly so that
/// tests can script outcomes.
pub trait RandomSource: Send + Sync {
    /// Uniform roll in `1..=faces`. A zero-faced die rolls 0.
    fn roll_die(&self, faces: u32) -> u32;
    /// True with probability `chance` (clamped to [0, 1]).
    fn chance(&self, chance: f64) -> bool;
    /// Uniform index in `0..len`; `len` must be non-zero.
    fn pick(&self, len: usize) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn roll_die(&self, faces: u32) -> u32 {
        if faces == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(1..=faces)
    }

    fn chance(&self, chance: f64) -> bool {
        if chance <= 0.0 || chance.is_nan() {
            return false;
        }
        if chance >= 1.0 {
            return true;
        }
        rand::thread_rng().gen_bool(chance)
    }

    fn pick(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..len)
    }
}

/// Deterministic source: every die shows `face` (capped at the die size),
/// chance rolls return `hit`, picks return the first index.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom {
    pub face: u32,
    pub hit: bool,
}

impl FixedRandom {
    pub fn new(face: u32, hit: bool) -> Self {
        Self { face, hit }
    }
}

impl RandomSource for FixedRandom {
    fn roll_die(&self, faces: u32) -> u32 {
        self.face.clamp(1, faces.max(1)).min(faces)
    }

    fn chance(&self, _chance: f64) -> bool {
        self.hit
    }

    fn pick(&self, _len: usize) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_random_stays_on_the_die() {
        let random = ThreadRandom;
        for _ in 0..200 {
            let roll = random.roll_die(6);
            assert!((1..=6).contains(&roll));
        }
        assert_eq!(random.roll_die(0), 0);
    }

    #[test]
    fn thread_random_chance_extremes() {
        let random = ThreadRandom;
        assert!(!random.chance(0.0));
        assert!(random.chance(1.0));
        assert!(!random.chance(f64::NAN));
    }

    #[test]
    fn fixed_random_caps_face() {
        let random = FixedRandom::new(9, true);
        assert_eq!(random.roll_die(6), 6);
        assert_eq!(random.roll_die(20), 9);
        assert_eq!(random.roll_die(0), 0);
        assert!(random.chance(0.01));
    }
}
