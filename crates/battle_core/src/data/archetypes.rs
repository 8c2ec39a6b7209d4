//! Archetype stat templates and the archetype -> spell mapping.
//!
//! Templates are authored with integers and percentages so RON files
//! stay readable; they are converted to fixed-point [`UnitStats`] once.
//!
//! # Example RON
//!
//! ```ron
//! ArchetypeTable(
//!     entries: {
//!         Warrior: ArchetypeData(
//!             health: 120,
//!             attack: 15,
//!             defense: 8,
//!             resistance: 8,
//!             range: 1,
//!         ),
//!     },
//! )
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{BattleError, Result};
use crate::math::{percent, Fixed};
use crate::spells::{AssassinBlink, AttackSpeedBuff, Fireball, SelfHeal, Spell, SpinSlash};
use crate::unit::UnitStats;

/// Unit archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Archetype {
    /// Melee bruiser, casts Spin Slash.
    Warrior,
    /// Long-range attacker, casts Attack Speed Buff.
    Archer,
    /// Long-range caster, casts Fireball.
    Mage,
    /// Durable melee unit, casts Heal.
    Tank,
    /// Melee diver, casts Assassin Blink.
    Assassin,
    /// Long-range sustain, casts Heal.
    Support,
}

impl Archetype {
    /// Every archetype, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Warrior,
        Self::Archer,
        Self::Mage,
        Self::Tank,
        Self::Assassin,
        Self::Support,
    ];

    /// Lowercase display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Warrior => "warrior",
            Self::Archer => "archer",
            Self::Mage => "mage",
            Self::Tank => "tank",
            Self::Assassin => "assassin",
            Self::Support => "support",
        }
    }

    /// One-letter board symbol.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Warrior => 'W',
            Self::Archer => 'A',
            Self::Mage => 'M',
            Self::Tank => 'T',
            Self::Assassin => 'S',
            Self::Support => 'H',
        }
    }

    /// Shop rarity tier (1-5).
    #[must_use]
    pub const fn rarity(self) -> u32 {
        match self {
            Self::Warrior | Self::Archer => 1,
            Self::Tank | Self::Support => 2,
            Self::Mage | Self::Assassin => 3,
        }
    }

    /// Built-in template.
    #[must_use]
    pub const fn data(self) -> ArchetypeData {
        let base = ArchetypeData::DEFAULT;
        match self {
            Self::Warrior => ArchetypeData {
                health: 100,
                attack: 15,
                defense: 8,
                resistance: 8,
                range: 1,
                ..base
            },
            Self::Archer => ArchetypeData {
                health: 70,
                attack: 12,
                defense: 3,
                resistance: 3,
                range: 4,
                ..base
            },
            Self::Mage => ArchetypeData {
                health: 60,
                attack: 20,
                defense: 2,
                resistance: 2,
                range: 4,
                max_mana: 50,
                ..base
            },
            Self::Tank => ArchetypeData {
                health: 150,
                attack: 8,
                defense: 12,
                resistance: 12,
                range: 1,
                ..base
            },
            Self::Assassin => ArchetypeData {
                health: 80,
                attack: 12,
                defense: 4,
                resistance: 4,
                range: 1,
                crit_rate_pct: 50,
                ..base
            },
            Self::Support => ArchetypeData {
                health: 90,
                attack: 5,
                defense: 6,
                resistance: 6,
                range: 4,
                max_mana: 80,
                ..base
            },
        }
    }

    /// Built-in base stats.
    #[must_use]
    pub fn base_stats(self) -> UnitStats {
        self.data().to_stats()
    }

    /// A fresh spell instance for this archetype.
    #[must_use]
    pub fn spell(self) -> Box<dyn Spell> {
        match self {
            Self::Warrior => Box::new(SpinSlash::new()),
            Self::Archer => Box::new(AttackSpeedBuff::new()),
            Self::Mage => Box::new(Fireball::new()),
            Self::Tank | Self::Support => Box::new(SelfHeal::new()),
            Self::Assassin => Box::new(AssassinBlink::new()),
        }
    }
}

/// Human-authored stat template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchetypeData {
    /// Max health at level 1.
    pub health: u32,
    /// Attack at level 1.
    pub attack: u32,
    /// Defense at level 1.
    pub defense: u32,
    /// Resistance at level 1.
    pub resistance: u32,
    /// Weapon range in cells.
    pub range: u32,
    /// Crit chance in percent.
    pub crit_rate_pct: u32,
    /// Crit multiplier in percent.
    pub crit_damage_pct: u32,
    /// Mana pool.
    pub max_mana: u32,
    /// Move speed in percent.
    pub move_speed_pct: u32,
    /// Attack speed in percent.
    pub attack_speed_pct: u32,
    /// Spell power in percent.
    pub spell_power_pct: u32,
    /// Mana per basic attack.
    pub basic_attack_mana: u32,
}

impl ArchetypeData {
    /// Template defaults for fields a RON entry leaves out.
    pub const DEFAULT: Self = Self {
        health: 100,
        attack: 10,
        defense: 5,
        resistance: 5,
        range: 1,
        crit_rate_pct: 25,
        crit_damage_pct: 150,
        max_mana: 100,
        move_speed_pct: 100,
        attack_speed_pct: 100,
        spell_power_pct: 100,
        basic_attack_mana: 10,
    };

    /// Convert to fixed-point stats.
    #[must_use]
    pub fn to_stats(&self) -> UnitStats {
        let pct = |value: u32| percent(i32::try_from(value).unwrap_or(i32::MAX));
        UnitStats {
            max_health: Fixed::from_num(self.health),
            attack: Fixed::from_num(self.attack),
            defense: Fixed::from_num(self.defense),
            resistance: Fixed::from_num(self.resistance),
            weapon_range: Fixed::from_num(self.range),
            crit_rate: pct(self.crit_rate_pct),
            crit_damage: pct(self.crit_damage_pct),
            max_mana: Fixed::from_num(self.max_mana),
            move_speed: pct(self.move_speed_pct),
            attack_speed: pct(self.attack_speed_pct),
            spell_power: pct(self.spell_power_pct),
            basic_attack_mana: Fixed::from_num(self.basic_attack_mana),
        }
    }
}

impl Default for ArchetypeData {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Archetype stat overrides, falling back to the built-in templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeTable {
    /// Overridden templates.
    #[serde(default)]
    pub entries: BTreeMap<Archetype, ArchetypeData>,
}

impl ArchetypeTable {
    /// Parse a table from RON text.
    ///
    /// `source_name` is only used in error messages.
    pub fn from_ron_str(ron_text: &str, source_name: &str) -> Result<Self> {
        ron::from_str(ron_text).map_err(|e| BattleError::DataParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })
    }

    /// Template for an archetype.
    #[must_use]
    pub fn data(&self, archetype: Archetype) -> ArchetypeData {
        self.entries
            .get(&archetype)
            .copied()
            .unwrap_or_else(|| archetype.data())
    }

    /// Base stats for an archetype.
    #[must_use]
    pub fn stats(&self, archetype: Archetype) -> UnitStats {
        self.data(archetype).to_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates() {
        let mage = Archetype::Mage.base_stats();
        assert_eq!(mage.max_health, Fixed::from_num(60));
        assert_eq!(mage.max_mana, Fixed::from_num(50));
        assert_eq!(mage.weapon_range, Fixed::from_num(4));

        let assassin = Archetype::Assassin.base_stats();
        assert_eq!(assassin.crit_rate, percent(50));
        assert_eq!(assassin.crit_damage, percent(150));
    }

    #[test]
    fn test_each_archetype_gets_its_own_spell() {
        let names: Vec<_> = Archetype::ALL.iter().map(|a| a.spell().name()).collect();
        assert_eq!(
            names,
            vec![
                "Spin Slash",
                "Attack Speed Buff",
                "Fireball",
                "Heal",
                "Assassin Blink",
                "Heal"
            ]
        );
    }

    #[test]
    fn test_table_from_ron_overrides_and_falls_back() {
        let table = ArchetypeTable::from_ron_str(
            "(entries: { Warrior: (health: 120, attack: 20) })",
            "inline",
        )
        .unwrap();

        let warrior = table.stats(Archetype::Warrior);
        assert_eq!(warrior.max_health, Fixed::from_num(120));
        assert_eq!(warrior.attack, Fixed::from_num(20));
        // Omitted fields use template defaults
        assert_eq!(warrior.max_mana, Fixed::from_num(100));

        assert_eq!(table.stats(Archetype::Tank), Archetype::Tank.base_stats());
    }

    #[test]
    fn test_table_parse_error() {
        let err = ArchetypeTable::from_ron_str("(entries: { Dragon: () })", "bad.ron").unwrap_err();
        assert!(matches!(err, BattleError::DataParseError { .. }));
        assert!(err.to_string().contains("bad.ron"));
    }
}
