//! Load pipeline: defaults, merge, migrate, repair, catch up the clock.
//!
//! # Stages
//!
//! 1. **Defaults** -- [`PlayerState::default_start`] with the migration
//!    counter at the current version.
//! 2. **Merge** -- the persisted object is merged onto the defaults
//!    (see [`crate::merge`]).
//! 3. **Marker** -- the merged state must carry the current marker. A save
//!    without a `vitalMarker` key keeps the default one and passes.
//! 4. **Migrate** -- remaining migrations run in order.
//! 5. **Repair** -- every machine is brought in line with its definition and
//!    each town's default machines are restored.
//! 6. **Clock** -- time since the last update becomes fast time.

use crate::merge::MergeFrom;
use crate::migration::MigrationList;
use alembic_core::engine::Engine;
use alembic_core::player::{PlayerState, VITAL_MARKER};
use alembic_core::town::HOME;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("save data is not an object")]
    NotAnObject,
    #[error("save marker mismatch: found {found:?}")]
    MarkerMismatch { found: Option<String> },
}

/// Reject anything that is not an object carrying the current marker.
/// Used on imported text, where the marker must be present explicitly.
pub fn check_marker(save: &Value) -> Result<(), LoadError> {
    let object = save.as_object().ok_or(LoadError::NotAnObject)?;
    match object.get("vitalMarker").and_then(Value::as_str) {
        Some(VITAL_MARKER) => Ok(()),
        found => Err(LoadError::MarkerMismatch {
            found: found.map(str::to_string),
        }),
    }
}

/// Build the player state for a session from an optional persisted object.
///
/// `None` starts a new game. On error nothing is returned; callers fall
/// back to a new game themselves.
pub fn load_player(
    engine: &Engine,
    migrations: &MigrationList,
    save: Option<&Value>,
    now_ms: u64,
) -> Result<PlayerState, LoadError> {
    let mut player = PlayerState::default_start(engine, now_ms, migrations.version());
    if let Some(save) = save {
        if !save.is_object() {
            return Err(LoadError::NotAnObject);
        }
        player.merge_from(save, "");
        if !player.has_valid_marker() {
            return Err(LoadError::MarkerMismatch {
                found: Some(player.vital_marker),
            });
        }
        migrations.apply(&mut player);
    }
    fix_machines(engine, &mut player);
    catch_up_clock(&mut player, now_ms);
    Ok(player)
}

/// Repair every machine and restore missing default machines.
pub fn fix_machines(engine: &Engine, player: &mut PlayerState) {
    let unlocked = &player.unlocked_currencies;
    for (town_id, town) in player.towns.iter_mut() {
        for (slot, machine) in town.machines.iter_mut() {
            match engine.registry().get(&machine.machine_type) {
                Some(kind) => machine.repair(kind.definition(), unlocked),
                None => tracing::warn!(
                    town = town_id.as_str(),
                    slot,
                    machine_type = machine.machine_type.as_str(),
                    "unregistered machine type, leaving it untouched"
                ),
            }
        }
        if let Some(definition) = engine.towns().get(town_id) {
            town.ensure_default_machines(definition, engine.registry());
        }
    }
    if !player.towns.contains_key(&player.currently_in) {
        tracing::warn!(
            town = player.currently_in.as_str(),
            "current town does not exist, moving home"
        );
        player.currently_in = HOME.to_string();
    }
}

/// Turn wall time since the last update into fast time.
fn catch_up_clock(player: &mut PlayerState, now_ms: u64) {
    let away_ms = now_ms.saturating_sub(player.last_update_time);
    player.fast_time += away_ms as f64 / 1000.0;
    player.last_update_time = now_ms;
}
