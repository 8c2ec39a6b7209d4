//! Target selection.
//!
//! A unit keeps its current target while that target is alive, hostile
//! and nearly reachable. Otherwise it picks the living enemy it can
//! reach in the fewest steps, using straight-line distance as a
//! tie-break and a seeded coin for exact ties.

use rand::Rng;

use crate::battlefield::Battlefield;
use crate::grid::GridPos;
use crate::math::Fixed;
use crate::pathfinding::distance_to_range;
use crate::unit::{Unit, UnitId};

fn hop_distance(field: &Battlefield, from: GridPos, unit: &Unit, to: GridPos) -> Option<u32> {
    distance_to_range(field.grid(), from, to, unit.weapon_range())
}

/// Choose a target for `unit_id` among `candidates` (in scan order).
///
/// `retarget_tolerance` is the step distance within which the current
/// target is kept. Exact ties on `(steps, squared distance)` are broken
/// uniformly with `rng`. Returns `None` if the unit is off the board or
/// no living enemy can be reached.
pub fn find_target<R: Rng>(
    field: &Battlefield,
    unit_id: UnitId,
    candidates: &[UnitId],
    retarget_tolerance: Fixed,
    rng: &mut R,
) -> Option<UnitId> {
    let unit = field.unit(unit_id)?;
    let origin = unit.position()?;

    if let Some(current) = unit.current_target() {
        let kept = field
            .unit(current)
            .filter(|target| target.is_alive() && target.team() == unit.team().opponent())
            .and_then(Unit::position)
            .and_then(|pos| hop_distance(field, origin, unit, pos))
            .is_some_and(|steps| Fixed::from_num(steps) <= retarget_tolerance);
        if kept {
            return Some(current);
        }
    }

    let mut best: Option<(u32, Fixed, UnitId)> = None;
    let mut tied = 0u32;

    for &candidate_id in candidates {
        let Some(candidate) = field.unit(candidate_id) else {
            continue;
        };
        if !candidate.is_alive() || candidate.team() != unit.team().opponent() {
            continue;
        }
        let Some(pos) = candidate.position() else {
            continue;
        };
        let Some(steps) = hop_distance(field, origin, unit, pos) else {
            continue;
        };
        let spread = field.grid().l2_distance_squared(origin, pos);

        match best {
            Some((best_steps, best_spread, _)) if (steps, spread) > (best_steps, best_spread) => {}
            Some((best_steps, best_spread, _)) if (steps, spread) == (best_steps, best_spread) => {
                // Reservoir sampling: the k-th tied candidate wins with chance 1/k.
                tied += 1;
                if rng.gen_range(0..tied) == 0 {
                    best = Some((steps, spread, candidate_id));
                }
            }
            _ => {
                best = Some((steps, spread, candidate_id));
                tied = 1;
            }
        }
    }

    best.map(|(_, _, id)| id)
}
