//! Scheduled unit actions and their timings.
//!
//! An action is planned in one frame and resolves a fixed number of
//! frames later. Each living unit holds at most one pending action.

use serde::{Deserialize, Serialize};

use crate::grid::GridPos;
use crate::unit::UnitId;

/// What a unit does with its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    /// Step one cell.
    Move,
    /// Basic attack.
    Attack,
    /// Cast the unit's spell.
    CastSpell,
    /// Idle until the resolution frame.
    Wait,
}

/// Frame delays per action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionTiming {
    /// Attack delay before attack speed is applied.
    pub attack_delay: u32,
    /// Frames per one-cell move.
    pub move_delay: u32,
    /// Cast time for spells that do not set their own.
    pub spell_delay: u32,
    /// Frames spent idling.
    pub wait_delay: u32,
}

impl Default for ActionTiming {
    fn default() -> Self {
        Self {
            attack_delay: 10,
            move_delay: 4,
            spell_delay: 10,
            wait_delay: 2,
        }
    }
}

impl ActionTiming {
    /// Base delay for an action kind.
    #[must_use]
    pub const fn delay_for(&self, kind: ActionKind) -> u32 {
        match kind {
            ActionKind::Move => self.move_delay,
            ActionKind::Attack => self.attack_delay,
            ActionKind::CastSpell => self.spell_delay,
            ActionKind::Wait => self.wait_delay,
        }
    }
}

/// A committed action waiting for its resolution frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlannedAction {
    /// Acting unit.
    pub unit: UnitId,
    /// Action kind.
    pub kind: ActionKind,
    /// Unit being attacked or targeted by a spell.
    pub target_unit: Option<UnitId>,
    /// Move destination.
    pub target_cell: Option<GridPos>,
    /// Frame the action was planned in.
    pub planned_frame: u32,
    /// Frame the action resolves in.
    pub resolution_frame: u32,
    /// Where the unit stood when planning.
    pub start_position: Option<GridPos>,
    /// Spell name for casts.
    pub spell: Option<String>,
}

impl PlannedAction {
    fn new(unit: UnitId, kind: ActionKind, frame: u32, delay: u32) -> Self {
        Self {
            unit,
            kind,
            target_unit: None,
            target_cell: None,
            planned_frame: frame,
            resolution_frame: frame + delay,
            start_position: None,
            spell: None,
        }
    }

    /// Step to `cell`.
    #[must_use]
    pub fn movement(unit: UnitId, cell: GridPos, frame: u32, delay: u32) -> Self {
        Self {
            target_cell: Some(cell),
            ..Self::new(unit, ActionKind::Move, frame, delay)
        }
    }

    /// Basic attack on `target`.
    #[must_use]
    pub fn attack(unit: UnitId, target: UnitId, frame: u32, delay: u32) -> Self {
        Self {
            target_unit: Some(target),
            ..Self::new(unit, ActionKind::Attack, frame, delay)
        }
    }

    /// Cast the spell named `spell`.
    #[must_use]
    pub fn cast(
        unit: UnitId,
        target: Option<UnitId>,
        spell: &str,
        frame: u32,
        delay: u32,
    ) -> Self {
        Self {
            target_unit: target,
            spell: Some(spell.to_string()),
            ..Self::new(unit, ActionKind::CastSpell, frame, delay)
        }
    }

    /// Record where the unit stood when planning.
    #[must_use]
    pub fn from_position(mut self, position: Option<GridPos>) -> Self {
        self.start_position = position;
        self
    }

    /// True once `frame` reaches the resolution frame.
    #[must_use]
    pub const fn is_due(&self, frame: u32) -> bool {
        self.resolution_frame <= frame
    }

    /// Turn this action into a wait resolving at `resolution_frame`.
    pub fn convert_to_wait(&mut self, resolution_frame: u32) {
        self.kind = ActionKind::Wait;
        self.target_unit = None;
        self.target_cell = None;
        self.spell = None;
        self.resolution_frame = resolution_frame;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let timing = ActionTiming::default();
        assert_eq!(timing.delay_for(ActionKind::Attack), 10);
        assert_eq!(timing.delay_for(ActionKind::Move), 4);
        assert_eq!(timing.delay_for(ActionKind::CastSpell), 10);
        assert_eq!(timing.delay_for(ActionKind::Wait), 2);
    }

    #[test]
    fn test_constructors_set_frames() {
        let action = PlannedAction::movement(UnitId(3), GridPos::new(1, 2), 7, 4)
            .from_position(Some(GridPos::new(1, 1)));
        assert_eq!(action.kind, ActionKind::Move);
        assert_eq!(action.planned_frame, 7);
        assert_eq!(action.resolution_frame, 11);
        assert_eq!(action.target_cell, Some(GridPos::new(1, 2)));
        assert_eq!(action.start_position, Some(GridPos::new(1, 1)));
        assert!(!action.is_due(10));
        assert!(action.is_due(11));

        let cast = PlannedAction::cast(UnitId(1), Some(UnitId(2)), "Fireball", 1, 2);
        assert_eq!(cast.spell.as_deref(), Some("Fireball"));
        assert_eq!(cast.target_unit, Some(UnitId(2)));
    }

    #[test]
    fn test_convert_to_wait_clears_targets() {
        let mut action = PlannedAction::attack(UnitId(1), UnitId(2), 0, 10);
        action.convert_to_wait(4);
        assert_eq!(action.kind, ActionKind::Wait);
        assert_eq!(action.target_unit, None);
        assert_eq!(action.resolution_frame, 4);
        assert_eq!(action.planned_frame, 0);
    }
}
