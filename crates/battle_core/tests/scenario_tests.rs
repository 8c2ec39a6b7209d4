//! Scripted battle scenarios.

use battle_core::prelude::*;
use battle_test_utils::fixtures::{fixed, pos, RosterBuilder};

fn no_spell_stats(attack: i32) -> UnitStats {
    UnitStats {
        max_health: fixed(100),
        attack: fixed(attack),
        defense: fixed(10),
        resistance: fixed(10),
        crit_rate: Fixed::ZERO,
        ..UnitStats::default()
    }
}

fn melee(registry: &mut UnitRegistry, team: Team, attack: i32, at: GridPos) -> Unit {
    registry
        .spawn_with_stats(Archetype::Warrior, team, 1, no_spell_stats(attack))
        .with_spell(None)
        .at(at)
}

#[test]
fn test_duel_stronger_hitter_wins() {
    let mut registry = UnitRegistry::new();
    let strong = melee(&mut registry, Team::One, 22, pos(3, 3));
    let weak = melee(&mut registry, Team::Two, 11, pos(3, 4));
    let (strong_id, weak_id) = (strong.id(), weak.id());

    let report = simulate(&CombatConfig::default(), vec![strong], vec![weak], Some(1)).unwrap();
    assert_eq!(report.outcome, BattleOutcome::Victory(Team::One));

    // Both attack on the same cadence: planned at frame 1, every 10 frames
    let hits: Vec<&CombatEvent> = report
        .events
        .iter()
        .filter(|e| e.kind == CombatEventKind::DamageDealt)
        .collect();
    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.frame % 10, 1, "attack resolved off cadence: {hit:?}");
        assert_eq!(hit.spell.as_deref(), Some(BASIC_ATTACK));
    }

    // Damage totals match the mitigation formula
    let expected_per_hit = mitigate(fixed(22), DamageType::Physical, fixed(10), fixed(10));
    let dealt_to_weak: Fixed = hits
        .iter()
        .filter(|e| e.target == Some(weak_id))
        .map(|e| e.amount)
        .sum();
    assert_eq!(dealt_to_weak, fixed(100));
    let full_hits = hits
        .iter()
        .filter(|e| e.target == Some(weak_id) && e.amount == expected_per_hit)
        .count();
    // 22 * 100 / 110 = 20 per hit: five hits
    assert_eq!(full_hits, 5);

    let dealt_to_strong: Fixed = hits
        .iter()
        .filter(|e| e.target == Some(strong_id))
        .map(|e| e.amount)
        .sum();
    assert_eq!(
        dealt_to_strong,
        mitigate(fixed(11), DamageType::Physical, fixed(10), fixed(10)) * fixed(5)
    );
}

fn hits_on(events: &[CombatEvent], target: UnitId) -> Vec<&CombatEvent> {
    events
        .iter()
        .filter(|e| e.kind == CombatEventKind::DamageDealt && e.target == Some(target))
        .collect()
}

#[test]
fn test_ranged_unit_shoots_first() {
    let mut registry = UnitRegistry::new();
    let mut battle = Battle::new(CombatConfig::default(), Some(8)).unwrap();
    // Sturdy enough to walk all the way in and swing
    let sturdy = UnitStats {
        max_health: fixed(1000),
        ..Archetype::Warrior.base_stats()
    };
    let warrior = battle
        .deploy(
            registry
                .spawn_with_stats(Archetype::Warrior, Team::One, 1, sturdy)
                .with_spell(None),
            pos(3, 1),
        )
        .unwrap();
    let archer = battle
        .deploy(registry.spawn(Archetype::Archer, Team::Two, 1), pos(3, 6))
        .unwrap();
    battle.run();

    let events = battle.events();
    let first_hit_on = |target: UnitId| {
        events
            .iter()
            .find(|e| e.kind == CombatEventKind::DamageDealt && e.target == Some(target))
            .map(|e| e.frame)
    };
    let archer_first_shot = first_hit_on(warrior).expect("archer lands a shot");
    let warrior_first_hit = first_hit_on(archer).expect("warrior reaches the archer");
    assert!(archer_first_shot < warrior_first_hit);
    assert!(hits_on(events, archer)
        .iter()
        .all(|hit| hit.source == Some(warrior)));

    // Replay positions: the warrior only ever hits while adjacent
    let mut positions = [(warrior, pos(3, 1)), (archer, pos(3, 6))];
    for event in events {
        if event.kind == CombatEventKind::MoveExecuted {
            for entry in &mut positions {
                if Some(entry.0) == event.source {
                    entry.1 = event.position.unwrap();
                }
            }
        }
        if event.kind == CombatEventKind::DamageDealt
            && event.source == Some(warrior)
            && event.spell.as_deref() == Some(BASIC_ATTACK)
        {
            let grid = battle.grid();
            assert!(grid.l2_distance_squared(positions[0].1, positions[1].1) <= fixed(2));
        }
    }
}

#[test]
fn test_attacker_killed_mid_phase_still_swings() {
    let mut registry = UnitRegistry::new();
    let strong = melee(&mut registry, Team::One, 250, pos(3, 3));
    let weak = melee(&mut registry, Team::Two, 11, pos(3, 4));
    let (strong_id, weak_id) = (strong.id(), weak.id());

    let report = simulate(&CombatConfig::default(), vec![strong], vec![weak], Some(4)).unwrap();
    assert_eq!(report.outcome, BattleOutcome::Victory(Team::One));

    // One exchange at frame 11 decides it, and both blows land
    let on_weak = hits_on(&report.events, weak_id);
    let on_strong = hits_on(&report.events, strong_id);
    assert_eq!(on_weak.len(), 1);
    assert_eq!(on_strong.len(), 1);
    assert_eq!(on_weak[0].frame, 11);
    assert_eq!(on_strong[0].frame, 11);
    assert_eq!(
        on_strong[0].amount,
        mitigate(fixed(11), DamageType::Physical, fixed(10), fixed(10))
    );
    assert!(report
        .events
        .iter()
        .all(|e| e.kind != CombatEventKind::FailedAttack));
}

#[test]
fn test_caster_killed_mid_phase_still_casts() {
    let mut registry = UnitRegistry::new();
    let slasher = |registry: &mut UnitRegistry, team: Team, health: i32, at: GridPos| {
        let stats = UnitStats {
            max_health: fixed(health),
            ..Archetype::Warrior.base_stats()
        };
        let mana = stats.max_mana;
        registry
            .spawn_with_stats(Archetype::Warrior, team, 1, stats)
            .with_mana(mana)
            .at(at)
    };
    let tough = slasher(&mut registry, Team::One, 1000, pos(3, 3));
    let frail = slasher(&mut registry, Team::Two, 5, pos(3, 4));
    let (tough_id, frail_id) = (tough.id(), frail.id());

    let report = simulate(&CombatConfig::default(), vec![tough], vec![frail], Some(6)).unwrap();
    assert_eq!(report.outcome, BattleOutcome::Victory(Team::One));

    let slashes: Vec<&CombatEvent> = report
        .events
        .iter()
        .filter(|e| e.kind == CombatEventKind::SpellExecuted)
        .collect();
    assert_eq!(slashes.len(), 2);
    assert!(slashes.iter().all(|e| e.frame == slashes[0].frame));

    let on_tough = hits_on(&report.events, tough_id);
    assert_eq!(on_tough.len(), 1);
    assert_eq!(on_tough[0].source, Some(frail_id));
    assert_eq!(on_tough[0].spell.as_deref(), Some("Spin Slash"));
}

#[test]
fn test_mover_dead_at_phase_start_stays_put() {
    let config = CombatConfig {
        timing: ActionTiming {
            attack_delay: 4,
            ..ActionTiming::default()
        },
        ..CombatConfig::default()
    };
    let mut registry = UnitRegistry::new();
    let mut battle = Battle::new(config, Some(3)).unwrap();
    let sniper_stats = UnitStats {
        attack: fixed(500),
        ..Archetype::Archer.base_stats()
    };
    battle
        .deploy(
            registry
                .spawn_with_stats(Archetype::Archer, Team::One, 1, sniper_stats)
                .with_spell(None),
            pos(3, 3),
        )
        .unwrap();
    let runner = battle
        .deploy(melee(&mut registry, Team::Two, 11, pos(3, 6)), pos(3, 6))
        .unwrap();

    assert_eq!(battle.step(), None);
    let planned = battle
        .pending_actions()
        .iter()
        .find(|a| a.unit == runner)
        .cloned()
        .unwrap();
    assert_eq!(planned.kind, ActionKind::Move);
    assert_eq!(planned.resolution_frame, 5);
    let dest = planned.target_cell.unwrap();

    // The shot and the step both resolve at frame 5; the shot goes first
    assert_eq!(battle.run(), BattleOutcome::Victory(Team::One));
    assert!(battle.events().iter().all(|e| {
        e.source != Some(runner)
            || !matches!(
                e.kind,
                CombatEventKind::MoveExecuted | CombatEventKind::FailedMove
            )
    }));
    assert_eq!(battle.grid().state(dest), Some(CellState::Empty));
    assert_eq!(battle.unit(runner).unwrap().position(), None);
}

#[test]
fn test_contested_cell_goes_to_one_claimant() {
    let mut won_by_left = 0;
    let runs = 200;

    for seed in 0..runs {
        let mut battle = RosterBuilder::new()
            .with(Archetype::Warrior, Team::One, pos(0, 3))
            .with(Archetype::Warrior, Team::One, pos(2, 3))
            .with(Archetype::Warrior, Team::Two, pos(1, 7))
            .battle(CombatConfig::with_board(3, 8, Topology::Square), seed);
        for y in 4..7 {
            battle.add_obstacle(pos(0, y)).unwrap();
            battle.add_obstacle(pos(2, y)).unwrap();
        }

        assert_eq!(battle.step(), None);

        let claims: Vec<&PlannedAction> = battle
            .pending_actions()
            .iter()
            .filter(|a| a.unit == UnitId(1) || a.unit == UnitId(2))
            .collect();
        assert_eq!(claims.len(), 2);

        let winner = claims
            .iter()
            .find(|a| a.kind == ActionKind::Move)
            .expect("one claimant moves");
        let loser = claims
            .iter()
            .find(|a| a.kind == ActionKind::Wait)
            .expect("one claimant waits");
        assert_eq!(winner.target_cell, Some(pos(1, 3)));
        assert_eq!(loser.resolution_frame, 1 + battle.config().timing.move_delay);
        assert_eq!(battle.grid().state(pos(1, 3)), Some(CellState::Reserved));
        assert_eq!(
            battle
                .events()
                .iter()
                .filter(|e| e.kind == CombatEventKind::ConflictResolved)
                .count(),
            2
        );

        if winner.unit == UnitId(1) {
            won_by_left += 1;
        }
    }

    assert!(
        (70..=130).contains(&won_by_left),
        "left claimant won {won_by_left} of {runs}"
    );
}

#[test]
fn test_dead_units_leave_the_board() {
    let mut battle = RosterBuilder::new()
        .with_level(Archetype::Tank, Team::One, 3, pos(3, 3))
        .with(Archetype::Archer, Team::Two, pos(3, 4))
        .battle(CombatConfig::default(), 21);
    let outcome = battle.run();
    assert_eq!(outcome, BattleOutcome::Victory(Team::One));

    let archer = battle.unit(UnitId(2)).unwrap();
    assert!(!archer.is_alive());
    assert_eq!(archer.position(), None);
    assert_eq!(battle.grid().occupied_positions().len(), 1);
    assert!(battle
        .pending_actions()
        .iter()
        .all(|action| action.unit != UnitId(2)));
    assert_eq!(
        battle
            .events()
            .iter()
            .filter(|e| e.kind == CombatEventKind::UnitDied)
            .count(),
        1
    );
}

#[test]
fn test_hex_skirmish_terminates() {
    let mut registry = UnitRegistry::new();
    let team_a = vec![
        registry.spawn(Archetype::Warrior, Team::One, 1).at(pos(2, 3)),
        // Starts with a full pool and the assassin inside fireball range
        registry
            .spawn(Archetype::Mage, Team::One, 1)
            .with_mana(fixed(50))
            .at(pos(4, 0)),
    ];
    let team_b = vec![
        registry.spawn(Archetype::Assassin, Team::Two, 1).at(pos(2, 5)),
        registry.spawn(Archetype::Support, Team::Two, 1).at(pos(4, 7)),
    ];
    let config = CombatConfig::with_board(7, 8, Topology::HexOddR);
    let report = simulate(&config, team_a, team_b, Some(5)).unwrap();

    assert!(report.frames <= config.max_frames);
    assert_eq!(
        report.events.last().map(|e| e.kind),
        Some(CombatEventKind::BattleEnded)
    );
    assert!(report
        .events
        .iter()
        .any(|e| e.kind == CombatEventKind::SpellExecuted && e.spell.as_deref() == Some("Fireball")));
}
