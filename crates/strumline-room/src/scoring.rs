//! Shared vitality bar.
//!
//! Both lanes pull one health value between 0 and 2. Good play on the
//! owner's side pushes it up, good play on the other side pushes it down.

use crate::BASELINE_HEALTH;

pub const HIT_DELTA: f64 = 0.023;
pub const MISS_DELTA: f64 = 0.0475;

pub const MIN_HEALTH: f64 = 0.0;
pub const MAX_HEALTH: f64 = 2.0;

/// A note event that moves vitality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    Hit,
    Miss,
}

/// Whether a sender plays the owner's lane.
///
/// In party mode the lane is the sender's strum; otherwise it is the owner
/// flipped by the side-swap flag.
pub fn on_owner_side(is_owner: bool, swap_sides: bool, party_mode: bool, strum: u8) -> bool {
    if party_mode {
        strum == 0
    } else {
        is_owner != swap_sides
    }
}

/// Applies one note event and clamps the result.
pub fn apply(health: f64, event: NoteEvent, owner_side: bool) -> f64 {
    let delta = match event {
        NoteEvent::Hit => -HIT_DELTA,
        NoteEvent::Miss => MISS_DELTA,
    };
    let signed = if owner_side { -delta } else { delta };
    clamp(health + signed)
}

pub fn clamp(health: f64) -> f64 {
    if health.is_nan() {
        return BASELINE_HEALTH;
    }
    health.clamp(MIN_HEALTH, MAX_HEALTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_apply_owner_miss_decreases() {
        assert!(approx(apply(1.0, NoteEvent::Miss, true), 1.0 - MISS_DELTA));
    }

    #[test]
    fn test_apply_owner_hit_increases() {
        assert!(approx(apply(1.0, NoteEvent::Hit, true), 1.0 + HIT_DELTA));
    }

    #[test]
    fn test_apply_opponent_signs_flipped() {
        assert!(approx(apply(1.0, NoteEvent::Miss, false), 1.0 + MISS_DELTA));
        assert!(approx(apply(1.0, NoteEvent::Hit, false), 1.0 - HIT_DELTA));
    }

    #[test]
    fn test_apply_clamps_at_bounds() {
        assert_eq!(apply(0.01, NoteEvent::Miss, true), 0.0);
        assert_eq!(apply(1.99, NoteEvent::Miss, false), 2.0);
    }

    #[test]
    fn test_on_owner_side_normal_and_swapped() {
        assert!(on_owner_side(true, false, false, 1));
        assert!(!on_owner_side(false, false, false, 0));
        assert!(!on_owner_side(true, true, false, 0));
        assert!(on_owner_side(false, true, false, 0));
    }

    #[test]
    fn test_on_owner_side_party_uses_strum() {
        assert!(on_owner_side(false, false, true, 0));
        assert!(!on_owner_side(true, false, true, 1));
    }

    #[test]
    fn test_random_sequences_stay_in_bounds() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let mut health = BASELINE_HEALTH;
            for _ in 0..500 {
                let event = if rng.random_bool(0.5) {
                    NoteEvent::Hit
                } else {
                    NoteEvent::Miss
                };
                health = apply(health, event, rng.random_bool(0.5));
                assert!((MIN_HEALTH..=MAX_HEALTH).contains(&health));
            }
        }
    }
}
