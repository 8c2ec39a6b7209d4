//! Append-only battle event log.
//!
//! Every state change during a battle is recorded as a [`CombatEvent`].
//! Two runs with the same seed and roster produce identical logs, so the
//! log hash doubles as a replay checksum.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::grid::GridPos;
use crate::math::{fixed_serde, Fixed};
use crate::unit::UnitId;

/// Event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CombatEventKind {
    /// First frame is about to run.
    BattleStarted,
    /// A unit committed to an action.
    ActionPlanned,
    /// Several units claimed one cell; one of them won.
    ConflictResolved,
    /// Damage landed.
    DamageDealt,
    /// Health restored.
    Healed,
    /// Attack whose target died before it resolved.
    FailedAttack,
    /// Spell finished executing.
    SpellExecuted,
    /// Unit stepped to a new cell.
    MoveExecuted,
    /// Unit could not enter its destination.
    FailedMove,
    /// Unit reached zero health and left the board.
    UnitDied,
    /// Outcome decided.
    BattleEnded,
}

/// One log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatEvent {
    /// Frame the event happened in.
    pub frame: u32,
    /// Event category.
    pub kind: CombatEventKind,
    /// Acting unit.
    pub source: Option<UnitId>,
    /// Affected unit.
    pub target: Option<UnitId>,
    /// Spell or [`crate::combat::BASIC_ATTACK`].
    pub spell: Option<String>,
    /// Damage or healing amount; zero when not applicable.
    #[serde(with = "fixed_serde")]
    pub amount: Fixed,
    /// Whether a crit roll succeeded.
    pub crit: bool,
    /// Cell involved, if any.
    pub position: Option<GridPos>,
    /// Human-readable summary.
    pub description: String,
}

impl CombatEvent {
    /// Create an event with no participants.
    #[must_use]
    pub fn new(frame: u32, kind: CombatEventKind, description: impl Into<String>) -> Self {
        Self {
            frame,
            kind,
            source: None,
            target: None,
            spell: None,
            amount: Fixed::ZERO,
            crit: false,
            position: None,
            description: description.into(),
        }
    }

    /// Set the acting unit.
    #[must_use]
    pub fn with_source(mut self, source: UnitId) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the affected unit.
    #[must_use]
    pub fn with_target(mut self, target: UnitId) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the spell name.
    #[must_use]
    pub fn with_spell(mut self, spell: impl Into<String>) -> Self {
        self.spell = Some(spell.into());
        self
    }

    /// Set the amount.
    #[must_use]
    pub fn with_amount(mut self, amount: Fixed) -> Self {
        self.amount = amount;
        self
    }

    /// Set the crit flag.
    #[must_use]
    pub fn with_crit(mut self, crit: bool) -> Self {
        self.crit = crit;
        self
    }

    /// Set the cell.
    #[must_use]
    pub fn at(mut self, position: GridPos) -> Self {
        self.position = Some(position);
        self
    }
}

/// Ordered list of events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatLog {
    events: Vec<CombatEvent>,
}

impl CombatLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&mut self, event: CombatEvent) {
        tracing::trace!(
            frame = event.frame,
            kind = ?event.kind,
            "{}",
            event.description
        );
        self.events.push(event);
    }

    /// All events in order.
    #[must_use]
    pub fn events(&self) -> &[CombatEvent] {
        &self.events
    }

    /// Events of one kind, in order.
    pub fn of_kind(&self, kind: CombatEventKind) -> impl Iterator<Item = &CombatEvent> + '_ {
        self.events.iter().filter(move |event| event.kind == kind)
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if nothing has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consume the log.
    #[must_use]
    pub fn into_events(self) -> Vec<CombatEvent> {
        self.events
    }

    /// Checksum of the whole log.
    #[must_use]
    pub fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.events.hash(&mut hasher);
        hasher.finish()
    }
}
