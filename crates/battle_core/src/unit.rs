//! Combatants: identity, stats, health/mana state and damage entry points.
//!
//! Effective stats are the archetype's base stats scaled by level and
//! multiplied by named buffs:
//!
//! | stat                  | level scaling            |
//! |-----------------------|--------------------------|
//! | max health            | `1 + 0.5 * (level - 1)`  |
//! | attack                | `1 + 0.3 * (level - 1)`  |
//! | defense, resistance   | `1 + 0.2 * (level - 1)`  |
//!
//! # Mana
//!
//! Basic attacks add a flat amount that may overflow the pool. Every hit
//! taken adds 1% of the raw damage and 7% of the damage actually applied,
//! each capped at the pool size.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::combat::{mitigate, Damage};
use crate::data::Archetype;
use crate::grid::GridPos;
use crate::math::{ceil_frames, fixed_serde, percent, Fixed};
use crate::spells::Spell;

/// Stable unit identifier, allocated by a [`UnitRegistry`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Battle side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Team {
    /// Team 1, deployed on the low half of the board.
    #[default]
    One,
    /// Team 2, deployed on the high half of the board.
    Two,
}

impl Team {
    /// Numeric team code (1 or 2).
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    /// Team from its numeric code.
    #[must_use]
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    /// The other side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team {}", self.number())
    }
}

/// Named multiplicative stat modifier. Absent buffs count as `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Buff {
    /// Multiplies attack speed.
    AttackSpeed,
    /// Multiplies attack.
    Attack,
    /// Multiplies defense.
    Defense,
    /// Multiplies resistance.
    Resistance,
    /// Multiplies spell power.
    SpellPower,
}

/// Base statistics of a combatant before level scaling and buffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitStats {
    /// Health at level 1.
    #[serde(with = "fixed_serde")]
    pub max_health: Fixed,
    /// Basic attack damage at level 1.
    #[serde(with = "fixed_serde")]
    pub attack: Fixed,
    /// Physical mitigation.
    #[serde(with = "fixed_serde")]
    pub defense: Fixed,
    /// Magical mitigation.
    #[serde(with = "fixed_serde")]
    pub resistance: Fixed,
    /// Basic attack reach (Euclidean, in cells).
    #[serde(with = "fixed_serde")]
    pub weapon_range: Fixed,
    /// Probability in `[0, 1]` that a basic attack crits.
    #[serde(with = "fixed_serde")]
    pub crit_rate: Fixed,
    /// Damage multiplier on crit.
    #[serde(with = "fixed_serde")]
    pub crit_damage: Fixed,
    /// Mana needed to cast.
    #[serde(with = "fixed_serde")]
    pub max_mana: Fixed,
    /// Movement speed. Moves currently take a fixed configured delay.
    #[serde(with = "fixed_serde")]
    pub move_speed: Fixed,
    /// Attacks per attack delay.
    #[serde(with = "fixed_serde")]
    pub attack_speed: Fixed,
    /// Spell effect multiplier.
    #[serde(with = "fixed_serde")]
    pub spell_power: Fixed,
    /// Mana granted per basic attack.
    #[serde(with = "fixed_serde")]
    pub basic_attack_mana: Fixed,
}

impl Default for UnitStats {
    fn default() -> Self {
        Self {
            max_health: Fixed::from_num(100),
            attack: Fixed::from_num(10),
            defense: Fixed::from_num(5),
            resistance: Fixed::from_num(5),
            weapon_range: Fixed::ONE,
            crit_rate: percent(25),
            crit_damage: percent(150),
            max_mana: Fixed::from_num(100),
            move_speed: Fixed::ONE,
            attack_speed: Fixed::ONE,
            spell_power: Fixed::ONE,
            basic_attack_mana: Fixed::from_num(10),
        }
    }
}

/// A combatant.
#[derive(Debug, Clone)]
pub struct Unit {
    pub(crate) id: UnitId,
    pub(crate) team: Team,
    pub(crate) archetype: Archetype,
    pub(crate) level: u32,
    pub(crate) stats: UnitStats,
    pub(crate) health: Fixed,
    pub(crate) mana: Fixed,
    pub(crate) position: Option<GridPos>,
    pub(crate) planned_position: Option<GridPos>,
    pub(crate) current_target: Option<UnitId>,
    pub(crate) buffs: BTreeMap<Buff, Fixed>,
    pub(crate) attack_overflow: Fixed,
    pub(crate) spell_crit: bool,
    pub(crate) spell: Option<Box<dyn Spell>>,
}

fn level_factor(level: u32, per_level: Fixed) -> Fixed {
    Fixed::ONE + Fixed::from_num(level.saturating_sub(1)) * per_level
}

impl Unit {
    /// Create a unit with explicit base stats and spell.
    ///
    /// The unit starts at full (level-scaled) health with no mana and no
    /// position.
    ///
    /// # Panics
    ///
    /// Panics if `level` is zero.
    #[must_use]
    pub fn new(
        id: UnitId,
        team: Team,
        archetype: Archetype,
        level: u32,
        stats: UnitStats,
        spell: Option<Box<dyn Spell>>,
    ) -> Self {
        assert!(level >= 1, "Unit level must be at least 1");

        let mut unit = Self {
            id,
            team,
            archetype,
            level,
            stats,
            health: Fixed::ZERO,
            mana: Fixed::ZERO,
            position: None,
            planned_position: None,
            current_target: None,
            buffs: BTreeMap::new(),
            attack_overflow: Fixed::ZERO,
            spell_crit: false,
            spell,
        };
        unit.health = unit.max_health();
        unit
    }

    /// Set the unit's position before deployment.
    #[must_use]
    pub fn at(mut self, pos: GridPos) -> Self {
        self.position = Some(pos);
        self
    }

    /// Allow the unit's spell damage to crit.
    #[must_use]
    pub fn with_spell_crit(mut self, spell_crit: bool) -> Self {
        self.spell_crit = spell_crit;
        self
    }

    /// Replace the unit's spell.
    #[must_use]
    pub fn with_spell(mut self, spell: Option<Box<dyn Spell>>) -> Self {
        self.spell = spell;
        self
    }

    /// Start with a given amount of mana.
    #[must_use]
    pub fn with_mana(mut self, mana: Fixed) -> Self {
        self.mana = mana;
        self
    }

    /// Unit id.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Team.
    #[must_use]
    pub const fn team(&self) -> Team {
        self.team
    }

    /// Archetype label.
    #[must_use]
    pub const fn archetype(&self) -> Archetype {
        self.archetype
    }

    /// Star level (1 = base).
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Base stats.
    #[must_use]
    pub const fn base_stats(&self) -> &UnitStats {
        &self.stats
    }

    /// Current health.
    #[must_use]
    pub const fn health(&self) -> Fixed {
        self.health
    }

    /// Current mana.
    #[must_use]
    pub const fn mana(&self) -> Fixed {
        self.mana
    }

    /// Cell the unit stands on.
    #[must_use]
    pub const fn position(&self) -> Option<GridPos> {
        self.position
    }

    /// Cell reserved by the unit's pending move.
    #[must_use]
    pub const fn planned_position(&self) -> Option<GridPos> {
        self.planned_position
    }

    /// Cached target from the last targeting pass.
    #[must_use]
    pub const fn current_target(&self) -> Option<UnitId> {
        self.current_target
    }

    /// Fractional attack initiative carried to the next attack.
    #[must_use]
    pub const fn attack_overflow(&self) -> Fixed {
        self.attack_overflow
    }

    /// Whether spell damage can crit.
    #[must_use]
    pub const fn spell_crit(&self) -> bool {
        self.spell_crit
    }

    /// The unit's spell, if it has one and is not mid-cast.
    #[must_use]
    pub fn spell(&self) -> Option<&dyn Spell> {
        self.spell.as_deref()
    }

    /// Multiplier for a buff (`1.0` if absent).
    #[must_use]
    pub fn buff(&self, buff: Buff) -> Fixed {
        self.buffs.get(&buff).copied().unwrap_or(Fixed::ONE)
    }

    /// Add to a buff multiplier, starting from `1.0`.
    pub fn add_buff(&mut self, buff: Buff, amount: Fixed) {
        let entry = self.buffs.entry(buff).or_insert(Fixed::ONE);
        *entry += amount;
    }

    /// Level-scaled maximum health.
    #[must_use]
    pub fn max_health(&self) -> Fixed {
        self.stats.max_health * level_factor(self.level, percent(50))
    }

    /// Level-scaled, buffed attack.
    #[must_use]
    pub fn attack(&self) -> Fixed {
        self.stats.attack * level_factor(self.level, percent(30)) * self.buff(Buff::Attack)
    }

    /// Level-scaled, buffed defense.
    #[must_use]
    pub fn defense(&self) -> Fixed {
        self.stats.defense * level_factor(self.level, percent(20)) * self.buff(Buff::Defense)
    }

    /// Level-scaled, buffed resistance.
    #[must_use]
    pub fn resistance(&self) -> Fixed {
        self.stats.resistance * level_factor(self.level, percent(20)) * self.buff(Buff::Resistance)
    }

    /// Buffed attack speed.
    #[must_use]
    pub fn attack_speed(&self) -> Fixed {
        self.stats.attack_speed * self.buff(Buff::AttackSpeed)
    }

    /// Buffed spell power.
    #[must_use]
    pub fn spell_power(&self) -> Fixed {
        self.stats.spell_power * self.buff(Buff::SpellPower)
    }

    /// Basic attack reach.
    #[must_use]
    pub const fn weapon_range(&self) -> Fixed {
        self.stats.weapon_range
    }

    /// Crit chance.
    #[must_use]
    pub const fn crit_rate(&self) -> Fixed {
        self.stats.crit_rate
    }

    /// Crit multiplier.
    #[must_use]
    pub const fn crit_damage(&self) -> Fixed {
        self.stats.crit_damage
    }

    /// Mana pool size.
    #[must_use]
    pub const fn max_mana(&self) -> Fixed {
        self.stats.max_mana
    }

    /// True while health is above zero.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.health > Fixed::ZERO
    }

    /// True once mana reaches the pool size.
    #[must_use]
    pub fn has_full_mana(&self) -> bool {
        self.mana >= self.stats.max_mana
    }

    /// Shop cost: `rarity * 3^(level - 1)`.
    #[must_use]
    pub fn cost(&self) -> u32 {
        self.archetype
            .rarity()
            .saturating_mul(3u32.saturating_pow(self.level - 1))
    }

    /// Apply a damage packet and return the health actually removed.
    ///
    /// Mana is gained from both the raw and the applied amount.
    ///
    /// # Panics
    ///
    /// Panics if the packet is tagged as a heal or carries no damage type.
    pub fn take_damage(&mut self, damage: &Damage) -> Fixed {
        assert!(
            !damage.is_heal,
            "take_damage called with a heal packet for unit {}",
            self.id
        );
        let Some(damage_type) = damage.damage_type else {
            panic!("take_damage called with untyped damage for unit {}", self.id);
        };

        self.gain_capped_mana(damage.amount * percent(1));

        let mitigated = mitigate(damage.amount, damage_type, self.defense(), self.resistance());
        let applied = mitigated.min(self.health).max(Fixed::ZERO);
        self.health -= applied;

        self.gain_capped_mana(applied * percent(7));
        applied
    }

    /// Apply a healing packet and return the health actually restored.
    ///
    /// Health never exceeds [`Unit::max_health`].
    ///
    /// # Panics
    ///
    /// Panics if the packet is not tagged as a heal.
    pub fn heal(&mut self, heal: &Damage) -> Fixed {
        assert!(
            heal.is_heal,
            "heal called with a damage packet for unit {}",
            self.id
        );
        let before = self.health;
        self.health = (self.health + heal.amount.max(Fixed::ZERO)).min(self.max_health());
        (self.health - before).max(Fixed::ZERO)
    }

    /// Damage-taken mana never pushes past the pool and never lowers
    /// mana already overflowed by basic attacks.
    fn gain_capped_mana(&mut self, amount: Fixed) {
        if self.mana < self.stats.max_mana {
            self.mana = (self.mana + amount).min(self.stats.max_mana);
        }
    }

    /// Flat mana from landing a basic attack (may overflow the pool).
    pub fn add_basic_attack_mana(&mut self) {
        self.mana += self.stats.basic_attack_mana;
    }

    /// Pay for a cast.
    pub fn spend_mana(&mut self) {
        self.mana -= self.stats.max_mana;
    }

    /// Raw basic attack damage for a crit roll in `[0, 1)`.
    ///
    /// Crit damage is truncated to a whole number.
    #[must_use]
    pub fn basic_attack_damage(&self, crit_roll: Fixed) -> (Fixed, bool) {
        let base = self.attack();
        if crit_roll < self.stats.crit_rate {
            ((base * self.stats.crit_damage).floor(), true)
        } else {
            (base, false)
        }
    }

    /// Convert an attack delay into whole frames through attack speed.
    ///
    /// The fractional remainder is carried in the attack overflow so a
    /// non-integral attack speed does not drift over many attacks. Always
    /// at least one frame.
    pub fn schedule_attack(&mut self, attack_delay: Fixed) -> u32 {
        let speed = self.attack_speed().max(Fixed::DELTA);
        let needed = attack_delay - self.attack_overflow;
        let frames = ceil_frames(needed / speed).max(1);
        self.attack_overflow = Fixed::from_num(frames) * speed - needed;
        frames
    }

    pub(crate) fn take_spell(&mut self) -> Option<Box<dyn Spell>> {
        self.spell.take()
    }

    pub(crate) fn restore_spell(&mut self, spell: Box<dyn Spell>) {
        self.spell = Some(spell);
    }
}

/// Allocates unit ids for one battle or roster.
///
/// Ids start at 1 and only increase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRegistry {
    next_id: u32,
}

impl UnitRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocate the next id.
    pub fn allocate(&mut self) -> UnitId {
        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = UnitId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a unit from its archetype template.
    pub fn spawn(&mut self, archetype: Archetype, team: Team, level: u32) -> Unit {
        let id = self.allocate();
        Unit::new(
            id,
            team,
            archetype,
            level,
            archetype.base_stats(),
            Some(archetype.spell()),
        )
    }

    /// Create a unit with custom base stats and the archetype's spell.
    pub fn spawn_with_stats(
        &mut self,
        archetype: Archetype,
        team: Team,
        level: u32,
        stats: UnitStats,
    ) -> Unit {
        let id = self.allocate();
        Unit::new(id, team, archetype, level, stats, Some(archetype.spell()))
    }
}
