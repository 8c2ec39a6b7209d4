//! Damage packets and defense-based mitigation.
//!
//! Physical damage is reduced by defense, magical damage by
//! resistance, and true damage ignores both:
//!
//! ```text
//! mitigated = max(1, raw * 100 / (100 + defense_or_resistance))
//! ```

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed};
use crate::unit::UnitId;

/// Damage type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    /// Reduced by defense.
    Physical,
    /// Reduced by resistance.
    Magical,
    /// Never reduced.
    True,
}

/// Name recorded for basic attacks in damage provenance and events.
pub const BASIC_ATTACK: &str = "BasicAttack";

/// Raw, unmitigated damage or healing plus its provenance.
///
/// A packet is either typed damage (`damage_type` set, `is_heal` false)
/// or a heal (`is_heal` true). [`crate::unit::Unit::take_damage`] and
/// [`crate::unit::Unit::heal`] panic on the wrong kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Damage {
    /// Unmitigated amount.
    #[serde(with = "fixed_serde")]
    pub amount: Fixed,
    /// Damage type; `None` only for heals.
    pub damage_type: Option<DamageType>,
    /// True for healing packets.
    pub is_heal: bool,
    /// Dealing unit.
    pub source: Option<UnitId>,
    /// Receiving unit.
    pub target: Option<UnitId>,
    /// Frame the packet was produced in.
    pub frame: u32,
    /// Spell name, or [`BASIC_ATTACK`].
    pub spell: Option<String>,
    /// Whether a critical roll succeeded.
    pub crit: bool,
}

impl Damage {
    /// Typed damage packet.
    #[must_use]
    pub fn new(amount: Fixed, damage_type: DamageType, frame: u32) -> Self {
        Self {
            amount,
            damage_type: Some(damage_type),
            is_heal: false,
            source: None,
            target: None,
            frame,
            spell: None,
            crit: false,
        }
    }

    /// Healing packet.
    #[must_use]
    pub fn heal(amount: Fixed, frame: u32) -> Self {
        Self {
            amount,
            damage_type: None,
            is_heal: true,
            source: None,
            target: None,
            frame,
            spell: None,
            crit: false,
        }
    }

    /// Set the dealing unit.
    #[must_use]
    pub fn from_source(mut self, source: UnitId) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the receiving unit.
    #[must_use]
    pub fn to_target(mut self, target: UnitId) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the spell name.
    #[must_use]
    pub fn with_spell(mut self, spell: &str) -> Self {
        self.spell = Some(spell.to_string());
        self
    }

    /// Set the crit flag.
    #[must_use]
    pub fn with_crit(mut self, crit: bool) -> Self {
        self.crit = crit;
        self
    }
}

/// Apply defense or resistance to a raw amount.
///
/// Physical and magical damage never drop below 1.
#[must_use]
pub fn mitigate(raw: Fixed, damage_type: DamageType, defense: Fixed, resistance: Fixed) -> Fixed {
    let hundred = Fixed::from_num(100);
    let reduced = |armor: Fixed| (raw * hundred / (hundred + armor)).max(Fixed::ONE);

    match damage_type {
        DamageType::Physical => reduced(defense),
        DamageType::Magical => reduced(resistance),
        DamageType::True => raw,
    }
}
