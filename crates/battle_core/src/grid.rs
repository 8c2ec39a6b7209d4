//! Battle board: topology, distance metrics and per-cell occupancy.
//!
//! Two topologies share one interface:
//! - [`Topology::Square`]: orthogonal 4-neighbour grid.
//! - [`Topology::HexOddR`]: pointy-top hexes in "odd-r" offset layout,
//!   where odd rows are shoved half a cell to the right. Distances go
//!   through axial coordinates.
//!
//! # Occupancy
//!
//! Each cell is [`CellState::Empty`], [`CellState::Reserved`] (claimed
//! by a unit that is still elsewhere), [`CellState::Occupied`] (the
//! unit's stored position is this cell) or [`CellState::Obstacle`].
//! The low-level mutators panic on misuse; validated placement lives
//! in [`crate::simulation::Battle::deploy`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::math::Fixed;
use crate::unit::{Team, UnitId};

/// Integer cell coordinate. Ordering is column-major (`x`, then `y`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct GridPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridPos {
    /// Create a new grid position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for GridPos {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Board connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Topology {
    /// Orthogonal grid, 4 neighbours.
    #[default]
    Square,
    /// Hex grid in odd-r offset coordinates, 6 neighbours.
    HexOddR,
}

/// Distance metric for range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Step count: Manhattan on square boards, hex distance on hex boards.
    Steps,
    /// Straight-line distance between cell centres.
    Euclidean,
}

/// Occupancy tag of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellState {
    /// Free.
    #[default]
    Empty,
    /// Claimed as the destination of a pending move.
    Reserved,
    /// Holds a unit standing on it.
    Occupied,
    /// Impassable terrain.
    Obstacle,
}

/// A single board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cell {
    state: CellState,
    unit: Option<UnitId>,
}

impl Cell {
    /// Occupancy tag.
    #[must_use]
    pub const fn state(&self) -> CellState {
        self.state
    }

    /// Unit standing on or reserving this cell.
    #[must_use]
    pub const fn unit(&self) -> Option<UnitId> {
        self.unit
    }

    /// True if nothing stands on, claims or blocks this cell.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.state, CellState::Empty)
    }

    /// True if a unit is standing here (reservations excluded).
    #[must_use]
    pub const fn is_occupied(&self) -> bool {
        matches!(self.state, CellState::Occupied)
    }

    /// True if pathfinding may not step through this cell.
    #[must_use]
    pub const fn blocks_movement(&self) -> bool {
        matches!(self.state, CellState::Occupied | CellState::Obstacle)
    }
}

const SQUARE_OFFSETS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

const HEX_ODD_ROW_OFFSETS: [(i32, i32); 6] = [(0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 0)];

const HEX_EVEN_ROW_OFFSETS: [(i32, i32); 6] =
    [(-1, -1), (0, -1), (1, 0), (0, 1), (-1, 1), (-1, 0)];

/// Convert an odd-r offset position to axial `(q, r)`.
#[must_use]
pub const fn to_axial(pos: GridPos) -> (i32, i32) {
    let q = pos.x - (pos.y - (pos.y & 1)) / 2;
    (q, pos.y)
}

/// Convert axial `(q, r)` back to an odd-r offset position.
#[must_use]
pub const fn from_axial(q: i32, r: i32) -> GridPos {
    GridPos::new(q + (r - (r & 1)) / 2, r)
}

/// The battle board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grid {
    width: i32,
    height: i32,
    topology: Topology,
    /// Cell data stored in column-major order.
    cells: Vec<Cell>,
}

impl Grid {
    /// Create an empty board.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is not positive.
    #[must_use]
    pub fn new(width: i32, height: i32, topology: Topology) -> Self {
        assert!(width > 0, "Grid width must be positive");
        assert!(height > 0, "Grid height must be positive");

        Self {
            width,
            height,
            topology,
            cells: vec![Cell::default(); (width as usize) * (height as usize)],
        }
    }

    /// Board width in cells.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Board height in cells.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Board topology.
    #[must_use]
    pub const fn topology(&self) -> Topology {
        self.topology
    }

    #[inline]
    fn index(&self, pos: GridPos) -> Option<usize> {
        self.is_valid(pos)
            .then(|| (pos.x as usize) * (self.height as usize) + (pos.y as usize))
    }

    fn index_or_panic(&self, pos: GridPos) -> usize {
        match self.index(pos) {
            Some(index) => index,
            None => panic!(
                "Position {pos} is outside the {}x{} board",
                self.width, self.height
            ),
        }
    }

    /// Check if a position is within bounds.
    #[must_use]
    pub const fn is_valid(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    /// Get a cell. Returns `None` if out of bounds.
    #[must_use]
    pub fn cell(&self, pos: GridPos) -> Option<&Cell> {
        self.index(pos).map(|i| &self.cells[i])
    }

    /// Occupancy tag of a cell. Returns `None` if out of bounds.
    #[must_use]
    pub fn state(&self, pos: GridPos) -> Option<CellState> {
        self.cell(pos).map(Cell::state)
    }

    /// Unit standing on a cell (reservations excluded).
    #[must_use]
    pub fn occupant(&self, pos: GridPos) -> Option<UnitId> {
        self.cell(pos)
            .filter(|cell| cell.is_occupied())
            .and_then(Cell::unit)
    }

    /// All positions in column-major order.
    pub fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        (0..self.width).flat_map(move |x| (0..self.height).map(move |y| GridPos::new(x, y)))
    }

    /// Positions currently tagged [`CellState::Occupied`].
    #[must_use]
    pub fn occupied_positions(&self) -> Vec<GridPos> {
        self.positions()
            .filter(|&pos| self.state(pos) == Some(CellState::Occupied))
            .collect()
    }

    /// In-bounds neighbours of a position, in topology order.
    #[must_use]
    pub fn neighbors(&self, pos: GridPos) -> Vec<GridPos> {
        let offsets: &[(i32, i32)] = match self.topology {
            Topology::Square => &SQUARE_OFFSETS,
            Topology::HexOddR if pos.y & 1 == 1 => &HEX_ODD_ROW_OFFSETS,
            Topology::HexOddR => &HEX_EVEN_ROW_OFFSETS,
        };

        offsets
            .iter()
            .map(|&(dx, dy)| GridPos::new(pos.x + dx, pos.y + dy))
            .filter(|&p| self.is_valid(p))
            .collect()
    }

    /// Step distance: Manhattan on square boards, hex distance on hex boards.
    #[must_use]
    pub fn l1_distance(&self, a: GridPos, b: GridPos) -> u32 {
        match self.topology {
            Topology::Square => a.x.abs_diff(b.x) + a.y.abs_diff(b.y),
            Topology::HexOddR => {
                let (aq, ar) = to_axial(a);
                let (bq, br) = to_axial(b);
                let dq = aq - bq;
                let dr = ar - br;
                (dq.unsigned_abs() + (dq + dr).unsigned_abs() + dr.unsigned_abs()) / 2
            }
        }
    }

    /// Squared straight-line distance between cell centres.
    ///
    /// Exact on both topologies: hex centres sit at
    /// `(q + r/2, r * sqrt(3)/2)`, which squares to `dq² + dq·dr + dr²`.
    #[must_use]
    pub fn l2_distance_squared(&self, a: GridPos, b: GridPos) -> Fixed {
        let squared = match self.topology {
            Topology::Square => {
                let dx = i64::from(a.x - b.x);
                let dy = i64::from(a.y - b.y);
                dx * dx + dy * dy
            }
            Topology::HexOddR => {
                let (aq, ar) = to_axial(a);
                let (bq, br) = to_axial(b);
                let dq = i64::from(aq - bq);
                let dr = i64::from(ar - br);
                dq * dq + dq * dr + dr * dr
            }
        };
        Fixed::from_num(squared)
    }

    /// Straight-line distance between cell centres.
    #[must_use]
    pub fn l2_distance(&self, a: GridPos, b: GridPos) -> Fixed {
        crate::math::fixed_sqrt(self.l2_distance_squared(a, b))
    }

    /// True if `b` lies within `radius` of `a` under `metric`.
    #[must_use]
    pub fn within(&self, a: GridPos, b: GridPos, radius: Fixed, metric: Metric) -> bool {
        if radius < Fixed::ZERO {
            return false;
        }
        match metric {
            Metric::Steps => Fixed::from_num(self.l1_distance(a, b)) <= radius,
            Metric::Euclidean => self.l2_distance_squared(a, b) <= radius.saturating_mul(radius),
        }
    }

    /// In-bounds positions within `radius` of `center` (inclusive, centre included),
    /// in column-major order.
    #[must_use]
    pub fn cells_within(&self, center: GridPos, radius: Fixed, metric: Metric) -> Vec<GridPos> {
        if radius < Fixed::ZERO {
            return Vec::new();
        }

        let reach = radius.ceil().to_num::<i32>();
        let span = match metric {
            Metric::Steps => reach,
            // Hex rows are only sqrt(3)/2 apart.
            Metric::Euclidean => reach * 2 + 1,
        };

        let min_x = (center.x - span).max(0);
        let max_x = (center.x + span).min(self.width - 1);
        let min_y = (center.y - span).max(0);
        let max_y = (center.y + span).min(self.height - 1);

        let mut result = Vec::new();
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                let pos = GridPos::new(x, y);
                if self.within(center, pos, radius, metric) {
                    result.push(pos);
                }
            }
        }
        result
    }

    /// True if `pos` lies in the starting half of `team`.
    ///
    /// The board is split across its long axis; team one gets the low half.
    #[must_use]
    pub const fn in_starting_half(&self, pos: GridPos, team: Team) -> bool {
        let (coord, len) = if self.height >= self.width {
            (pos.y, self.height)
        } else {
            (pos.x, self.width)
        };
        let low_half = coord < len / 2;
        match team {
            Team::One => low_half,
            Team::Two => !low_half,
        }
    }

    /// Positions available for a team's initial placement.
    #[must_use]
    pub fn initial_positions(&self, team: Team) -> Vec<GridPos> {
        self.positions()
            .filter(|&pos| self.in_starting_half(pos, team))
            .collect()
    }

    /// Mark a cell as impassable terrain.
    pub fn set_obstacle(&mut self, pos: GridPos) -> Result<()> {
        let index = self.index(pos).ok_or(BattleError::OutOfBounds {
            pos,
            width: self.width,
            height: self.height,
        })?;
        if !self.cells[index].is_empty() {
            return Err(BattleError::CellNotEmpty(pos));
        }
        self.cells[index].state = CellState::Obstacle;
        Ok(())
    }

    /// Put a unit on an empty cell.
    ///
    /// # Panics
    ///
    /// Panics if the position is out of bounds or the cell is not empty.
    pub fn place(&mut self, pos: GridPos, unit: UnitId) {
        let index = self.index_or_panic(pos);
        let cell = &mut self.cells[index];
        assert!(
            cell.is_empty(),
            "Cannot place unit {unit} on {pos}: cell is {:?}",
            cell.state
        );
        cell.state = CellState::Occupied;
        cell.unit = Some(unit);
    }

    /// Take the unit off an occupied cell, returning its id.
    ///
    /// # Panics
    ///
    /// Panics if the position is out of bounds or nobody stands there.
    pub fn remove(&mut self, pos: GridPos) -> UnitId {
        let index = self.index_or_panic(pos);
        let cell = &mut self.cells[index];
        let unit = match (cell.state, cell.unit) {
            (CellState::Occupied, Some(unit)) => unit,
            _ => panic!("Cannot remove unit from {pos}: cell is {:?}", cell.state),
        };
        *cell = Cell::default();
        unit
    }

    /// Claim an empty cell as a unit's move destination.
    ///
    /// # Panics
    ///
    /// Panics if the position is out of bounds or the cell is not empty.
    pub fn reserve(&mut self, pos: GridPos, unit: UnitId) {
        let index = self.index_or_panic(pos);
        let cell = &mut self.cells[index];
        assert!(
            cell.is_empty(),
            "Cannot reserve {pos} for unit {unit}: cell is {:?}",
            cell.state
        );
        cell.state = CellState::Reserved;
        cell.unit = Some(unit);
    }

    /// Drop a reservation held by `unit`. Returns false if `unit` held none there.
    pub fn release(&mut self, pos: GridPos, unit: UnitId) -> bool {
        let Some(index) = self.index(pos) else {
            return false;
        };
        let cell = &mut self.cells[index];
        if cell.state == CellState::Reserved && cell.unit == Some(unit) {
            *cell = Cell::default();
            true
        } else {
            false
        }
    }

    /// Move the unit standing on `from` to `to`.
    ///
    /// Succeeds if `to` is empty or reserved by the same unit. Returns
    /// false (and changes nothing) if `to` is occupied, blocked or
    /// reserved by someone else.
    ///
    /// # Panics
    ///
    /// Panics if either position is out of bounds or nobody stands on `from`.
    pub fn relocate(&mut self, from: GridPos, to: GridPos) -> bool {
        let from_index = self.index_or_panic(from);
        let to_index = self.index_or_panic(to);

        let from_cell = self.cells[from_index];
        let unit = match (from_cell.state, from_cell.unit) {
            (CellState::Occupied, Some(unit)) => unit,
            _ => panic!("Cannot move from {from}: cell is {:?}", from_cell.state),
        };

        if from == to {
            return true;
        }

        let to_cell = self.cells[to_index];
        let claimable = match to_cell.state {
            CellState::Empty => true,
            CellState::Reserved => to_cell.unit == Some(unit),
            CellState::Occupied | CellState::Obstacle => false,
        };
        if !claimable {
            return false;
        }

        self.cells[from_index] = Cell::default();
        self.cells[to_index] = Cell {
            state: CellState::Occupied,
            unit: Some(unit),
        };
        true
    }
}

impl Default for Grid {
    /// A 7x8 square board.
    fn default() -> Self {
        Self::new(7, 8, Topology::Square)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: i32, y: i32) -> GridPos {
        GridPos::new(x, y)
    }

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_square_neighbors() {
        let grid = Grid::new(7, 8, Topology::Square);
        assert_eq!(
            grid.neighbors(pos(3, 3)),
            vec![pos(4, 3), pos(2, 3), pos(3, 4), pos(3, 2)]
        );
        // Corners lose out-of-bounds neighbours
        assert_eq!(grid.neighbors(pos(0, 0)), vec![pos(1, 0), pos(0, 1)]);
        assert_eq!(grid.neighbors(pos(6, 7)), vec![pos(5, 7), pos(6, 6)]);
    }

    #[test]
    fn test_hex_neighbors_by_row_parity() {
        let grid = Grid::new(7, 8, Topology::HexOddR);
        assert_eq!(
            grid.neighbors(pos(2, 3)),
            vec![pos(2, 2), pos(3, 2), pos(3, 3), pos(3, 4), pos(2, 4), pos(1, 3)]
        );
        assert_eq!(
            grid.neighbors(pos(2, 2)),
            vec![pos(1, 1), pos(2, 1), pos(3, 2), pos(2, 3), pos(1, 3), pos(1, 2)]
        );
    }

    #[test]
    fn test_hex_neighbors_are_one_step_and_one_unit_apart() {
        let grid = Grid::new(9, 9, Topology::HexOddR);
        for center in [pos(4, 4), pos(4, 5), pos(3, 2), pos(5, 7)] {
            let neighbors = grid.neighbors(center);
            assert_eq!(neighbors.len(), 6);
            for n in neighbors {
                assert_eq!(grid.l1_distance(center, n), 1, "{center} -> {n}");
                assert_eq!(grid.l2_distance_squared(center, n), Fixed::ONE);
            }
        }
    }

    #[test]
    fn test_axial_round_trip() {
        for y in -5..6 {
            for x in -5..6 {
                let p = pos(x, y);
                let (q, r) = to_axial(p);
                assert_eq!(from_axial(q, r), p);
            }
        }
    }

    #[test]
    fn test_square_distances() {
        let grid = Grid::new(7, 8, Topology::Square);
        assert_eq!(grid.l1_distance(pos(0, 0), pos(3, 4)), 7);
        assert_eq!(grid.l2_distance_squared(pos(0, 0), pos(3, 4)), fixed(25));
        assert_eq!(grid.l2_distance(pos(0, 0), pos(3, 4)), fixed(5));
    }

    #[test]
    fn test_hex_distance() {
        let grid = Grid::new(7, 8, Topology::HexOddR);
        assert_eq!(grid.l1_distance(pos(0, 0), pos(0, 0)), 0);
        assert_eq!(grid.l1_distance(pos(0, 0), pos(3, 0)), 3);
        // Moving down-right along odd rows costs one step per row
        assert_eq!(grid.l1_distance(pos(0, 0), pos(1, 2)), 2);
        assert_eq!(grid.l1_distance(pos(0, 0), pos(0, 4)), 4);
    }

    #[test]
    fn test_cells_within_square_steps() {
        let grid = Grid::new(7, 8, Topology::Square);
        let cells = grid.cells_within(pos(3, 3), fixed(1), Metric::Steps);
        assert_eq!(
            cells,
            vec![pos(2, 3), pos(3, 2), pos(3, 3), pos(3, 4), pos(4, 3)]
        );
        assert_eq!(
            grid.cells_within(pos(3, 3), fixed(2), Metric::Steps).len(),
            13
        );
    }

    #[test]
    fn test_cells_within_euclidean() {
        let grid = Grid::new(7, 8, Topology::Square);
        // Radius sqrt(2) picks up the diagonals
        let radius = crate::math::fixed_sqrt(fixed(2)) + Fixed::ONE / fixed(1000);
        assert_eq!(
            grid.cells_within(pos(3, 3), radius, Metric::Euclidean).len(),
            9
        );
        // Clamped at the corner
        assert_eq!(
            grid.cells_within(pos(0, 0), fixed(1), Metric::Euclidean),
            vec![pos(0, 0), pos(0, 1), pos(1, 0)]
        );
    }

    #[test]
    fn test_cells_within_hex_steps_matches_ring_sizes() {
        let grid = Grid::new(11, 11, Topology::HexOddR);
        // 1 + 6 + 12 cells within two steps
        assert_eq!(
            grid.cells_within(pos(5, 5), fixed(2), Metric::Steps).len(),
            19
        );
        // Hex neighbours are all at Euclidean distance 1
        assert_eq!(
            grid.cells_within(pos(5, 5), fixed(1), Metric::Euclidean).len(),
            7
        );
    }

    #[test]
    fn test_initial_positions_split_long_axis() {
        let grid = Grid::new(7, 8, Topology::Square);
        let team_one = grid.initial_positions(Team::One);
        let team_two = grid.initial_positions(Team::Two);
        assert_eq!(team_one.len(), 28);
        assert_eq!(team_two.len(), 28);
        assert!(team_one.iter().all(|p| p.y < 4));
        assert!(team_two.iter().all(|p| p.y >= 4));

        let wide = Grid::new(8, 4, Topology::Square);
        assert!(wide.initial_positions(Team::One).iter().all(|p| p.x < 4));
    }

    #[test]
    fn test_place_reserve_relocate() {
        let mut grid = Grid::default();
        let unit = UnitId(1);

        grid.place(pos(1, 1), unit);
        assert_eq!(grid.occupant(pos(1, 1)), Some(unit));

        grid.reserve(pos(1, 2), unit);
        assert_eq!(grid.state(pos(1, 2)), Some(CellState::Reserved));
        assert_eq!(grid.occupant(pos(1, 2)), None);

        assert!(grid.relocate(pos(1, 1), pos(1, 2)));
        assert_eq!(grid.state(pos(1, 1)), Some(CellState::Empty));
        assert_eq!(grid.occupant(pos(1, 2)), Some(unit));
        assert_eq!(grid.occupied_positions(), vec![pos(1, 2)]);

        assert_eq!(grid.remove(pos(1, 2)), unit);
        assert!(grid.occupied_positions().is_empty());
    }

    #[test]
    fn test_relocate_rejects_foreign_reservation() {
        let mut grid = Grid::default();
        grid.place(pos(0, 0), UnitId(1));
        grid.reserve(pos(0, 1), UnitId(2));

        assert!(!grid.relocate(pos(0, 0), pos(0, 1)));
        assert_eq!(grid.occupant(pos(0, 0)), Some(UnitId(1)));

        assert!(grid.release(pos(0, 1), UnitId(2)));
        assert!(grid.relocate(pos(0, 0), pos(0, 1)));
    }

    #[test]
    fn test_set_obstacle() {
        let mut grid = Grid::default();
        grid.set_obstacle(pos(2, 2)).unwrap();
        assert_eq!(grid.state(pos(2, 2)), Some(CellState::Obstacle));
        assert!(grid.set_obstacle(pos(2, 2)).is_err());
        assert!(grid.set_obstacle(pos(-1, 2)).is_err());
    }

    #[test]
    #[should_panic(expected = "cell is Occupied")]
    fn test_place_on_occupied_panics() {
        let mut grid = Grid::default();
        grid.place(pos(0, 0), UnitId(1));
        grid.place(pos(0, 0), UnitId(2));
    }

    #[test]
    #[should_panic(expected = "Cannot remove unit")]
    fn test_remove_from_empty_panics() {
        let mut grid = Grid::default();
        grid.remove(pos(3, 3));
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_place_out_of_bounds_panics() {
        let mut grid = Grid::default();
        grid.place(pos(7, 0), UnitId(1));
    }
}
