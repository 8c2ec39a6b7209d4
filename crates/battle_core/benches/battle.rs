//! Battle and pathfinding benchmarks for battle_core.
//!
//! Run with: `cargo bench -p battle_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use battle_core::prelude::*;
use battle_test_utils::fixtures::{duel_battle, fixed, pos, skirmish_battle};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

/// Full battles from deployment to outcome.
pub fn battle_benchmark(c: &mut Criterion) {
    c.bench_function("duel_to_outcome", |b| {
        b.iter_batched(
            || duel_battle(7),
            |mut battle| black_box(battle.run()),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("hex_skirmish_to_outcome", |b| {
        b.iter_batched(
            || skirmish_battle(7),
            |mut battle| black_box(battle.run()),
            BatchSize::SmallInput,
        )
    });
}

/// Path queries on a cluttered board.
pub fn pathfinding_benchmark(c: &mut Criterion) {
    let mut grid = Grid::new(7, 8, Topology::HexOddR);
    for x in 1..6 {
        grid.set_obstacle(pos(x, 4)).expect("wall inside the board");
    }

    c.bench_function("guided_path_hex", |b| {
        b.iter(|| guided_path(black_box(&grid), pos(3, 0), pos(3, 7)))
    });

    c.bench_function("path_to_range_hex", |b| {
        b.iter(|| path_to_range(black_box(&grid), pos(0, 0), pos(6, 7), fixed(3)))
    });
}

criterion_group!(benches, battle_benchmark, pathfinding_benchmark);
criterion_main!(benches);
