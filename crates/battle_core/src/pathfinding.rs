//! Grid pathfinding using the A* algorithm.
//!
//! Step cost is one hop on both topologies and the heuristic is the
//! topology's step distance, so every search returns a path with the
//! minimum number of hops.
//!
//! # Guided search
//!
//! [`guided_path`] adds a secondary cost that rewards steps closing the
//! straight-line distance to the goal and, slightly less, horizontal
//! steps. Costs compare hops first, so guidance only picks *which*
//! shortest path is returned.
//!
//! # Blocking
//!
//! Occupied and obstacle cells block traversal. Reserved cells do not.
//! The goal cell is always enterable so that the distance to a unit
//! standing on it can be measured.
//!
//! # Determinism
//!
//! Ties in the open set break on insertion order; no result depends on
//! hash iteration order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::grid::{Grid, GridPos, Metric};
use crate::math::{percent, Fixed};

/// Lexicographic path cost: hop count first, guidance bias second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
struct PathCost {
    hops: u32,
    bias: Fixed,
}

impl PathCost {
    fn step(self, bias: Fixed) -> Self {
        Self {
            hops: self.hops + 1,
            bias: self.bias + bias,
        }
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    pos: GridPos,
    g_score: PathCost,
    /// f_score = g_score + heuristic
    f_score: PathCost,
    /// Insertion order, for deterministic tie-breaking.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so we reverse the comparison for min-heap behavior.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Largest reward a single guided step can earn: 1/100 for closing at
/// most one cell of distance plus 2/100 for moving horizontally.
fn max_step_reward() -> Fixed {
    percent(3)
}

fn heuristic(grid: &Grid, pos: GridPos, goal: GridPos, guided: bool) -> PathCost {
    let hops = grid.l1_distance(pos, goal);
    let bias = if guided {
        -(max_step_reward() * Fixed::from_num(hops))
    } else {
        Fixed::ZERO
    };
    PathCost { hops, bias }
}

fn guidance_bias(grid: &Grid, from: GridPos, to: GridPos, goal: GridPos) -> Fixed {
    let closing = grid.l2_distance(from, goal) - grid.l2_distance(to, goal);
    let mut bias = -(closing.max(Fixed::ZERO) / Fixed::from_num(100));
    if from.y == to.y {
        bias -= percent(2);
    }
    bias
}

fn assert_on_board(grid: &Grid, pos: GridPos, what: &str) {
    assert!(
        grid.is_valid(pos),
        "Pathfinding {what} {pos} is outside the {}x{} board",
        grid.width(),
        grid.height()
    );
}

fn passable(grid: &Grid, pos: GridPos, goal: GridPos) -> bool {
    pos == goal || grid.cell(pos).is_some_and(|cell| !cell.blocks_movement())
}

/// Shortest path from `start` to `goal`, both ends included.
///
/// Returns `None` if the goal cannot be reached.
///
/// # Panics
///
/// Panics if `start` or `goal` is outside the board.
#[must_use]
pub fn shortest_path(grid: &Grid, start: GridPos, goal: GridPos) -> Option<Vec<GridPos>> {
    search(grid, start, goal, false)
}

/// Shortest path from `start` to `goal` with guided tie-breaking.
///
/// Always has the same length as [`shortest_path`].
///
/// # Panics
///
/// Panics if `start` or `goal` is outside the board.
#[must_use]
pub fn guided_path(grid: &Grid, start: GridPos, goal: GridPos) -> Option<Vec<GridPos>> {
    search(grid, start, goal, true)
}

/// Internal A* implementation.
fn search(grid: &Grid, start: GridPos, goal: GridPos, guided: bool) -> Option<Vec<GridPos>> {
    assert_on_board(grid, start, "start");
    assert_on_board(grid, goal, "goal");

    if start == goal {
        return Some(vec![start]);
    }

    let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
    let mut came_from: HashMap<GridPos, GridPos> = HashMap::new();
    let mut g_score: HashMap<GridPos, PathCost> = HashMap::new();
    let mut sequence = 0u64;

    g_score.insert(start, PathCost::default());
    open_set.push(AStarNode {
        pos: start,
        g_score: PathCost::default(),
        f_score: heuristic(grid, start, goal, guided),
        tie_breaker: sequence,
    });

    while let Some(current) = open_set.pop() {
        if current.pos == goal {
            return Some(reconstruct_path(&came_from, goal));
        }

        // Skip stale queue entries
        if g_score
            .get(&current.pos)
            .is_some_and(|&best| current.g_score > best)
        {
            continue;
        }

        for neighbor in grid.neighbors(current.pos) {
            if !passable(grid, neighbor, goal) {
                continue;
            }

            let bias = if guided {
                guidance_bias(grid, current.pos, neighbor, goal)
            } else {
                Fixed::ZERO
            };
            let tentative_g = current.g_score.step(bias);

            let better = g_score
                .get(&neighbor)
                .map_or(true, |&existing| tentative_g < existing);
            if better {
                came_from.insert(neighbor, current.pos);
                g_score.insert(neighbor, tentative_g);

                let h = heuristic(grid, neighbor, goal, guided);
                sequence += 1;
                open_set.push(AStarNode {
                    pos: neighbor,
                    g_score: tentative_g,
                    f_score: PathCost {
                        hops: tentative_g.hops + h.hops,
                        bias: tentative_g.bias + h.bias,
                    },
                    tie_breaker: sequence,
                });
            }
        }
    }

    None
}

/// Reconstruct path from came_from map.
fn reconstruct_path(came_from: &HashMap<GridPos, GridPos>, goal: GridPos) -> Vec<GridPos> {
    let mut path = vec![goal];
    let mut current = goal;

    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }

    path.reverse();
    path
}

/// Cells within Euclidean `range` of `goal` that a unit at `start` could
/// stand on: empty cells, plus `start` itself.
fn range_candidates(grid: &Grid, start: GridPos, goal: GridPos, range: Fixed) -> Vec<GridPos> {
    grid.cells_within(goal, range, Metric::Euclidean)
        .into_iter()
        .filter(|&pos| pos == start || grid.cell(pos).is_some_and(|cell| cell.is_empty()))
        .collect()
}

/// Breadth-first hop counts from `start` over non-blocking cells.
fn hop_distances(grid: &Grid, start: GridPos) -> HashMap<GridPos, u32> {
    let mut distances = HashMap::new();
    let mut queue = VecDeque::new();
    distances.insert(start, 0);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        let next = distances[&current] + 1;
        for neighbor in grid.neighbors(current) {
            if distances.contains_key(&neighbor)
                || grid.cell(neighbor).map_or(true, |cell| cell.blocks_movement())
            {
                continue;
            }
            distances.insert(neighbor, next);
            queue.push_back(neighbor);
        }
    }

    distances
}

/// Hop count of the cheapest path from `start` to a cell within
/// Euclidean `range` of `goal`. `None` means no such cell is reachable.
///
/// # Panics
///
/// Panics if `start` or `goal` is outside the board.
#[must_use]
pub fn distance_to_range(grid: &Grid, start: GridPos, goal: GridPos, range: Fixed) -> Option<u32> {
    assert_on_board(grid, start, "start");
    assert_on_board(grid, goal, "goal");

    let candidates: HashSet<GridPos> = range_candidates(grid, start, goal, range)
        .into_iter()
        .collect();
    if candidates.is_empty() {
        return None;
    }
    if candidates.contains(&start) {
        return Some(0);
    }

    // BFS pops in distance order, so the first candidate reached is the nearest.
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start);
    queue.push_back((start, 0u32));

    while let Some((current, hops)) = queue.pop_front() {
        for neighbor in grid.neighbors(current) {
            if candidates.contains(&neighbor) {
                return Some(hops + 1);
            }
            if seen.contains(&neighbor)
                || grid.cell(neighbor).map_or(true, |cell| cell.blocks_movement())
            {
                continue;
            }
            seen.insert(neighbor);
            queue.push_back((neighbor, hops + 1));
        }
    }

    None
}

/// Guided path from `start` to the nearest cell within Euclidean `range`
/// of `goal` that is empty or is `start` itself.
///
/// Among equally near cells the first in column-major order wins.
/// Returns `None` if no such cell is reachable.
///
/// # Panics
///
/// Panics if `start` or `goal` is outside the board.
#[must_use]
pub fn path_to_range(
    grid: &Grid,
    start: GridPos,
    goal: GridPos,
    range: Fixed,
) -> Option<Vec<GridPos>> {
    assert_on_board(grid, start, "start");
    assert_on_board(grid, goal, "goal");

    let candidates = range_candidates(grid, start, goal, range);
    let distances = hop_distances(grid, start);

    let nearest = candidates
        .iter()
        .filter_map(|pos| distances.get(pos).copied())
        .min()?;

    candidates
        .into_iter()
        .filter(|pos| distances.get(pos) == Some(&nearest))
        .find_map(|pos| guided_path(grid, start, pos))
}
