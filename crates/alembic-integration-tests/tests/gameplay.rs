//! Integration tests: player-facing flows across the engine and a session.

use alembic_core::machine::{CurrencyUnlocks, Placement};
use alembic_core::resource::{ResourceType, Stack};
use alembic_core::test_utils::*;
use alembic_core::town::HOME;
use alembic_core::upgrade::{PurchaseError, purchase};
use alembic_save::config::SessionConfig;
use alembic_save::session::Session;
use alembic_save::storage::{MemoryStorage, Storage};

// ---------------------------------------------------------------------------
// Test 1: every upgrade refuses a purchase at its cap and charges nothing
// ---------------------------------------------------------------------------
#[test]
fn every_upgrade_refuses_at_max() {
    let reg = registry();
    let all_unlocked: CurrencyUnlocks = ResourceType::ALL.iter().map(|&r| (r, true)).collect();
    let mut checked = 0;
    for kind in reg.iter() {
        let def = kind.definition();
        for upgrade in &def.upgrades {
            let mut machine = def.instantiate(false);
            set_level(&mut machine, upgrade.name, upgrade.max);
            let before = machine.clone();
            let mut holding = Stack::of(upgrade.currency_at(upgrade.max), 1e12);

            let err = purchase(def, &mut machine, upgrade.name, &mut holding, &all_unlocked)
                .unwrap_err();
            assert_eq!(
                err,
                PurchaseError::AtMax {
                    name: upgrade.name.to_string(),
                    max: upgrade.max,
                },
                "{}.{}",
                def.name,
                upgrade.name
            );
            assert_eq!(machine, before);
            assert_eq!(holding.amount, 1e12);
            checked += 1;
        }
    }
    assert!(checked >= 10);
}

// ---------------------------------------------------------------------------
// Test 2: buying through the player walks a cost curve to its cap
// ---------------------------------------------------------------------------
#[test]
fn buy_quarry_velocity_to_cap() {
    let engine = engine();
    let mut player = player(&engine);
    let def = engine.registry().get("quarry").unwrap().definition();
    let velocity = def.upgrade("velocity").unwrap();
    let total: f64 = (0..velocity.max).map(|l| velocity.cost_at(l)).sum();
    player.holding = Stack::of(velocity.currency_at(0), total + 1.0);

    for level in 0..velocity.max {
        let receipt = player.purchase_upgrade(&engine, HOME, 1, "velocity").unwrap();
        assert_eq!(receipt.new_level, level + 1);
    }
    assert_close(player.holding.amount, 1.0);
    assert!(matches!(
        player.purchase_upgrade(&engine, HOME, 1, "velocity"),
        Err(PurchaseError::AtMax { .. })
    ));
    assert_close(player.holding.amount, 1.0);
}

// ---------------------------------------------------------------------------
// Test 3: time away drains in bounded slices across updates
// ---------------------------------------------------------------------------
#[test]
fn offline_time_drains_in_slices() {
    let mut first = Session::open(SessionConfig::default(), MemoryStorage::new(), 0).unwrap();
    first.save_player().unwrap();
    let storage = first.storage().clone();
    assert!(storage.get(&SessionConfig::default().storage_key).unwrap().is_some());

    let mut session = Session::open(SessionConfig::default(), storage, 60_000).unwrap();
    assert_eq!(session.player().fast_time, 60.0);

    let limits = session.config().sim.clone();
    let mut calls = 0;
    while session.player().fast_time > 0.0 {
        let result = session.update(0.0, 60_000);
        assert!(result.steps_run <= limits.max_steps_per_advance);
        assert!(result.simulated_secs <= limits.max_fast_drain_secs + 1e-9);
        calls += 1;
        assert!(calls <= 12, "fast time never drained");
    }
    assert_eq!(calls, 12);

    // A minute of well output, capped by its buffer.
    let well = &session.player().towns[HOME].machines[&0];
    assert_eq!(well.outputs[0].resource, Some(ResourceType::Water));
    assert_close(well.outputs[0].amount, 10.0);
}

// ---------------------------------------------------------------------------
// Test 4: placed machines and pipes can be removed again
// ---------------------------------------------------------------------------
#[test]
fn place_pipe_remove() {
    let engine = engine();
    let mut player = player(&engine);
    let town = player.towns.get_mut(HOME).unwrap();
    let furnace = town
        .place_machine(engine.registry(), "arcFurnace", Placement::default())
        .unwrap();
    assert_eq!(furnace, 2);
    town.connect(engine.registry(), 0, 0, furnace, 0).unwrap();

    // The well's water reaches the furnace before anything is removed.
    for _ in 0..10 {
        engine.step(&mut player, 0.1);
    }
    let town = &player.towns[HOME];
    assert_eq!(
        town.machines[&furnace].inputs[0].resource,
        Some(ResourceType::Water)
    );

    let town = player.towns.get_mut(HOME).unwrap();
    assert!(town.remove_machine(0).is_err());
    town.remove_machine(furnace).unwrap();
    assert!(town.machines[&0].pipes[0].is_empty());
}
