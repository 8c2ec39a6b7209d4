//! Error types for battle setup and data loading.
//!
//! Only recoverable setup problems are reported here. Broken invariants
//! inside a running battle (double occupancy, heal/damage tag mismatch)
//! are caller bugs and panic instead.

use thiserror::Error;

use crate::grid::GridPos;
use crate::unit::{Team, UnitId};

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Top-level error type for the combat core.
#[derive(Debug, Error)]
pub enum BattleError {
    /// Position lies outside the board.
    #[error("Position {pos} is outside the {width}x{height} board")]
    OutOfBounds {
        /// Rejected position.
        pos: GridPos,
        /// Board width.
        width: i32,
        /// Board height.
        height: i32,
    },

    /// Cell already holds a unit, a reservation or an obstacle.
    #[error("Cell {0} is not empty")]
    CellNotEmpty(GridPos),

    /// Initial placement outside the team's half of the board.
    #[error("Position {pos} is outside the starting half of {team}")]
    WrongTeamHalf {
        /// Rejected position.
        pos: GridPos,
        /// Team being deployed.
        team: Team,
    },

    /// Unit was handed to a battle without a position.
    #[error("Unit {0} has no position")]
    Unplaced(UnitId),

    /// Unit id already used in the battle.
    #[error("Duplicate unit ID: {0}")]
    DuplicateUnit(UnitId),

    /// Team number other than 1 or 2.
    #[error("Invalid team number: {0}")]
    InvalidTeam(u8),

    /// Star level below 1.
    #[error("Invalid unit level: {0} (must be at least 1)")]
    InvalidLevel(u32),

    /// Units cannot be deployed once the first frame has run.
    #[error("Battle already started at frame {0}")]
    AlreadyStarted(u32),

    /// Configuration values are inconsistent.
    #[error("Invalid combat configuration: {0}")]
    InvalidConfig(String),

    /// Data file parsing error.
    #[error("Failed to parse data '{source_name}': {message}")]
    DataParseError {
        /// Name or path of the data that failed to parse.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Snapshot encoding failed.
    #[error("Failed to encode battle snapshot: {0}")]
    Snapshot(String),
}
