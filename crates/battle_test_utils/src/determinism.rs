//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a battle produces identical
//! results given an identical roster and seed.
//!
//! # Testing Strategy
//!
//! Battles must replay bit-for-bit from a seed. Sources of
//! non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`battle_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Units are visited in board order and conflicts in `BTreeMap` order.
//!
//! - **Shared randomness**: Every battle owns its own seeded RNG, so
//!   battles running side by side cannot disturb each other.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual phase determinism (targeting, conflicts)
//! 2. **Property tests**: Random rosters must still replay exactly
//! 3. **Integration tests**: Full battles are reproducible
//! 4. **Parallel tests**: Running N battles on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use battle_core::simulation::Battle;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of frames simulated.
    pub frames: u32,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic battle).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the battle was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Frames: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.frames,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `frames` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one frame
/// * `hash` - Function to compute the state hash
///
/// # Example
///
/// ```
/// use battle_test_utils::determinism::verify_determinism;
/// use battle_test_utils::fixtures::duel_battle;
///
/// let result = verify_determinism(
///     3,
///     60,
///     || duel_battle(5),
///     |battle| {
///         battle.step();
///     },
///     |battle| battle.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    frames: u32,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..frames {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        frames,
    }
}

/// Result of parallel battle runs.
#[derive(Debug, Clone)]
pub struct ParallelBattleResult {
    /// Event log hash from each battle.
    pub log_hashes: Vec<u64>,
    /// Frames each battle ran before finishing.
    pub frames: Vec<u32>,
}

impl ParallelBattleResult {
    /// Check if all battles produced identical logs.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.log_hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all battles matched.
    ///
    /// # Panics
    ///
    /// Panics if battles produced different logs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.log_hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel battles diverged!\n\
                 Battles: {}\n\
                 Frames: {:?}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.log_hashes.len(),
                self.frames,
                unique.len(),
                self.log_hashes
            );
        }
    }
}

/// Run N battles to completion on scoped threads and collect their log hashes.
///
/// Catches non-determinism that only shows up under thread scheduling
/// variations or shared state.
///
/// # Panics
///
/// Panics if a battle thread panics.
pub fn run_parallel_battles<F>(setup_fn: F, num_battles: usize) -> ParallelBattleResult
where
    F: Fn() -> Battle + Sync,
{
    let results: Vec<(u64, u32)> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_battles)
            .map(|_| {
                s.spawn(|| {
                    let mut battle = setup_fn();
                    battle.run();
                    (battle.battlefield().log().hash(), battle.frame())
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelBattleResult {
        log_hashes: results.iter().map(|(hash, _)| *hash).collect(),
        frames: results.iter().map(|(_, frames)| *frames).collect(),
    }
}

/// Step two battles side by side, finding the first frame where they differ.
///
/// # Returns
///
/// `None` if the battles stay identical, `Some(frame)` at the first
/// divergence.
pub fn find_first_divergence<F>(setup_fn: F, max_frames: u32) -> Option<u32>
where
    F: Fn() -> Battle,
{
    let mut a = setup_fn();
    let mut b = setup_fn();

    if a.state_hash() != b.state_hash() {
        return Some(0);
    }

    for frame in 1..=max_frames {
        let done_a = a.step().is_some();
        let done_b = b.step().is_some();

        if done_a != done_b || a.state_hash() != b.state_hash() {
            return Some(frame);
        }
        if done_a {
            break;
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for battle inputs.
pub mod strategies {
    use battle_core::combat::DamageType;
    use battle_core::data::Archetype;
    use battle_core::grid::{GridPos, Topology};
    use battle_core::math::Fixed;
    use proptest::prelude::*;

    /// Any topology.
    pub fn arb_topology() -> impl Strategy<Value = Topology> {
        prop_oneof![Just(Topology::Square), Just(Topology::HexOddR)]
    }

    /// Any archetype.
    pub fn arb_archetype() -> impl Strategy<Value = Archetype> {
        prop::sample::select(Archetype::ALL.to_vec())
    }

    /// Any damage type.
    pub fn arb_damage_type() -> impl Strategy<Value = DamageType> {
        prop_oneof![
            Just(DamageType::Physical),
            Just(DamageType::Magical),
            Just(DamageType::True),
        ]
    }

    /// A position on a `width` x `height` board.
    pub fn arb_grid_pos(width: i32, height: i32) -> impl Strategy<Value = GridPos> {
        (0..width, 0..height).prop_map(|(x, y)| GridPos::new(x, y))
    }

    /// A fixed-point amount between 0 and `max` with a fractional part.
    pub fn arb_amount(max: i32) -> impl Strategy<Value = Fixed> {
        (0..=max, 0u32..100).prop_map(|(whole, hundredths)| {
            Fixed::from_num(whole) + Fixed::from_num(hundredths) / Fixed::from_num(100)
        })
    }

    /// Up to `max_units` distinct cells in team one's half of a 7x8 board
    /// (rows 0..4).
    pub fn arb_team_one_cells(max_units: usize) -> impl Strategy<Value = Vec<GridPos>> {
        prop::collection::btree_set(arb_grid_pos(7, 4), 1..=max_units)
            .prop_map(|cells| cells.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel_battle, skirmish_battle};

    #[test]
    fn test_duel_is_deterministic() {
        verify_determinism(
            3,
            120,
            || duel_battle(17),
            |battle| {
                battle.step();
            },
            Battle::state_hash,
        )
        .assert_deterministic();
    }

    #[test]
    fn test_parallel_skirmishes_match() {
        let result = run_parallel_battles(|| skirmish_battle(99), 4);
        result.assert_deterministic();
        assert_eq!(result.log_hashes.len(), 4);
    }

    #[test]
    fn test_no_divergence() {
        assert_eq!(find_first_divergence(|| skirmish_battle(3), 500), None);
    }

    #[test]
    fn test_unique_hashes() {
        let result = verify_determinism(
            2,
            0,
            || (),
            |()| {},
            |()| 0,
        );
        assert!(result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 1);

        let mismatch = DeterminismResult {
            is_deterministic: false,
            hashes: vec![1, 2, 1],
            frames: 10,
        };
        assert_eq!(mismatch.unique_hashes(), vec![1, 2]);
    }
}
