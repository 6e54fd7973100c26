//! Schema-aware merge of persisted JSON onto a default state.
//!
//! Every persisted type declares which keys it reads. Absent keys keep the
//! value already in place; keys the type does not declare are ignored and
//! so pruned on the next save. A value of the wrong shape keeps the default
//! and logs a warning, so one damaged field never costs the whole save.
//!
//! Two places replace instead of merging: lists, and a town's machine table.
//! Machines are merged one by one onto a blank [`MachineInstance`] and the
//! repair pass fills in the rest.

use alembic_core::machine::{
    FurnaceMeta, MachineInstance, MachineMeta, Pipe, Placement, PurifierMeta,
};
use alembic_core::player::{Options, PlayerState};
use alembic_core::resource::{ResourceType, Stack};
use alembic_core::town::{Offset, SlotId, Town, TownDisplay};
use alembic_core::upgrade::UpgradeLevel;
use serde_json::Value;
use std::collections::BTreeMap;

/// Overwrite `self` with whatever `value` provides that fits its shape.
pub trait MergeFrom {
    fn merge_from(&mut self, value: &Value, path: &str);
}

/// Map keys as they appear in persisted objects.
pub trait MergeKey: Sized {
    fn parse_key(key: &str) -> Option<Self>;
}

// ===========================================================================
// Helpers
// ===========================================================================

fn child(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(path: &str, expected: &'static str, value: &Value) {
    tracing::warn!(
        path,
        expected,
        found = shape(value),
        "save field has the wrong shape, keeping default"
    );
}

/// Merge each declared key present in `value` into the matching field.
macro_rules! merge_fields {
    ($target:expr, $value:expr, $path:expr, { $($key:literal => $field:ident),* $(,)? }) => {{
        let Some(object) = $value.as_object() else {
            mismatch($path, "object", $value);
            return;
        };
        $(
            if let Some(v) = object.get($key) {
                $target.$field.merge_from(v, &child($path, $key));
            }
        )*
    }};
}

/// Build a fresh list from a JSON array, dropping entries `make` rejects.
fn merge_list<T>(
    target: &mut Vec<T>,
    value: &Value,
    path: &str,
    make: impl Fn(&Value, &str) -> Option<T>,
) {
    let Some(items) = value.as_array() else {
        mismatch(path, "array", value);
        return;
    };
    *target = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| make(item, &format!("{path}[{i}]")))
        .collect();
}

fn merged<T: MergeFrom + Default>(value: &Value, path: &str) -> T {
    let mut fresh = T::default();
    fresh.merge_from(value, path);
    fresh
}

// ===========================================================================
// Leaves
// ===========================================================================

impl MergeFrom for f64 {
    fn merge_from(&mut self, value: &Value, path: &str) {
        match value.as_f64() {
            Some(n) if n.is_finite() => *self = n,
            _ => mismatch(path, "finite number", value),
        }
    }
}

impl MergeFrom for u32 {
    fn merge_from(&mut self, value: &Value, path: &str) {
        match value.as_f64() {
            Some(n) if n.is_finite() && n >= 0.0 && n <= f64::from(u32::MAX) => {
                *self = n as u32;
            }
            _ => mismatch(path, "non-negative integer", value),
        }
    }
}

impl MergeFrom for u64 {
    fn merge_from(&mut self, value: &Value, path: &str) {
        if let Some(n) = value.as_u64() {
            *self = n;
            return;
        }
        // Timestamps written by a float clock.
        match value.as_f64() {
            Some(n) if n.is_finite() && n >= 0.0 => *self = n as u64,
            _ => mismatch(path, "non-negative integer", value),
        }
    }
}

impl MergeFrom for bool {
    fn merge_from(&mut self, value: &Value, path: &str) {
        match value {
            Value::Bool(b) => *self = *b,
            // Older saves store flags as 0 / 1.
            Value::Number(n) => *self = n.as_f64().is_some_and(|n| n != 0.0),
            _ => mismatch(path, "bool", value),
        }
    }
}

impl MergeFrom for String {
    fn merge_from(&mut self, value: &Value, path: &str) {
        match value.as_str() {
            Some(s) => *self = s.to_string(),
            None => mismatch(path, "string", value),
        }
    }
}

impl MergeFrom for Option<ResourceType> {
    fn merge_from(&mut self, value: &Value, path: &str) {
        match value {
            Value::Null => *self = None,
            // Unknown names degrade to an empty slot.
            Value::String(name) => *self = ResourceType::from_name(name),
            _ => mismatch(path, "resource name", value),
        }
    }
}

// ===========================================================================
// Collections
// ===========================================================================

impl MergeKey for String {
    fn parse_key(key: &str) -> Option<Self> {
        Some(key.to_string())
    }
}

impl MergeKey for u32 {
    fn parse_key(key: &str) -> Option<Self> {
        key.parse().ok()
    }
}

impl MergeKey for ResourceType {
    fn parse_key(key: &str) -> Option<Self> {
        ResourceType::from_name(key)
    }
}

impl<K: MergeKey + Ord, V: MergeFrom + Default> MergeFrom for BTreeMap<K, V> {
    fn merge_from(&mut self, value: &Value, path: &str) {
        let Some(object) = value.as_object() else {
            mismatch(path, "object", value);
            return;
        };
        for (key, entry) in object {
            let Some(parsed) = K::parse_key(key) else {
                tracing::warn!(path, key = key.as_str(), "dropping unrecognised key");
                continue;
            };
            self.entry(parsed)
                .or_default()
                .merge_from(entry, &child(path, key));
        }
    }
}

impl MergeFrom for Vec<f64> {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_list(self, value, path, |item, path| {
            let n = item.as_f64().filter(|n| n.is_finite());
            if n.is_none() {
                mismatch(path, "finite number", item);
            }
            n
        });
    }
}

impl MergeFrom for Vec<Stack> {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_list(self, value, path, |item, path| Some(merged(item, path)));
    }
}

impl MergeFrom for Vec<Vec<Pipe>> {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_list(self, value, path, |item, path| {
            let mut pipes = Vec::new();
            merge_list(&mut pipes, item, path, pipe_from);
            Some(pipes)
        });
    }
}

/// A pipe is only meaningful with both ends, so partial entries are dropped.
fn pipe_from(value: &Value, path: &str) -> Option<Pipe> {
    let slot = value.get("slot").and_then(Value::as_u64);
    let input = value.get("input").and_then(Value::as_u64);
    match (slot, input) {
        (Some(slot), Some(input)) => Some(Pipe {
            slot: u32::try_from(slot).ok()?,
            input: usize::try_from(input).ok()?,
        }),
        _ => {
            mismatch(path, "pipe", value);
            None
        }
    }
}

// ===========================================================================
// Persisted types
// ===========================================================================

impl MergeFrom for Stack {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, {
            "resource" => resource,
            "amount" => amount,
        });
        self.normalize();
    }
}

impl MergeFrom for UpgradeLevel {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, { "count" => count });
    }
}

impl MergeFrom for Placement {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, { "x" => x, "y" => y });
    }
}

impl MergeFrom for Offset {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, { "x" => x, "y" => y });
    }
}

impl MergeFrom for TownDisplay {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, { "offset" => offset, "zoom" => zoom });
    }
}

impl MergeFrom for Options {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, {
            "autosave" => autosave,
            "exportCount" => export_count,
            "showGridlines" => show_gridlines,
            "snapToGrid" => snap_to_grid,
            "minimap" => minimap,
        });
    }
}

impl MergeFrom for FurnaceMeta {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, {
            "inputResource" => input_resource,
            "catalystActive" => catalyst_active,
        });
    }
}

impl MergeFrom for PurifierMeta {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, { "inputResource" => input_resource });
    }
}

impl MergeFrom for MachineMeta {
    /// A `kind` tag switches the variant first. Without one the fields merge
    /// into whichever variant is in place.
    fn merge_from(&mut self, value: &Value, path: &str) {
        if !value.is_object() {
            mismatch(path, "object", value);
            return;
        }
        if let Some(kind) = value.get("kind") {
            let fresh = match kind.as_str() {
                Some("none") => MachineMeta::None,
                Some("furnace") => MachineMeta::Furnace(FurnaceMeta::default()),
                Some("purifier") => MachineMeta::Purifier(PurifierMeta::default()),
                _ => {
                    mismatch(&child(path, "kind"), "meta kind", kind);
                    return;
                }
            };
            if !self.same_kind(&fresh) {
                *self = fresh;
            }
        }
        match self {
            MachineMeta::None => {}
            MachineMeta::Furnace(meta) => meta.merge_from(value, path),
            MachineMeta::Purifier(meta) => meta.merge_from(value, path),
        }
    }
}

impl MergeFrom for MachineInstance {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, {
            "type" => machine_type,
            "isDefault" => is_default,
            "meta" => meta,
            "upgrades" => upgrades,
            "inputs" => inputs,
            "outputs" => outputs,
            "outputDiffs" => output_diffs,
            "pipes" => pipes,
            "position" => position,
        });
    }
}

impl MergeFrom for Town {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, {
            "upgrades" => upgrades,
            "machinesPrepay" => machines_prepay,
            "upgradesPrepay" => upgrades_prepay,
            "display" => display,
        });
        if let Some(machines) = value.get("machines") {
            merge_machines(&mut self.machines, machines, &child(path, "machines"));
        }
    }
}

/// Replace the machine table. Accepts an object keyed by slot or an array
/// indexed by slot with `null` holes.
fn merge_machines(target: &mut BTreeMap<SlotId, MachineInstance>, value: &Value, path: &str) {
    let entries: Vec<(SlotId, &Value)> = match value {
        Value::Object(object) => object
            .iter()
            .filter_map(|(key, entry)| match SlotId::parse_key(key) {
                Some(slot) => Some((slot, entry)),
                None => {
                    tracing::warn!(path, key = key.as_str(), "dropping machine with bad slot");
                    None
                }
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| Some((SlotId::try_from(i).ok()?, entry)))
            .collect(),
        _ => {
            mismatch(path, "object", value);
            return;
        }
    };
    target.clear();
    for (slot, entry) in entries {
        if entry.is_null() {
            continue;
        }
        let machine: MachineInstance = merged(entry, &child(path, &slot.to_string()));
        if machine.machine_type.is_empty() {
            tracing::warn!(path, slot, "dropping machine without a type");
            continue;
        }
        target.insert(slot, machine);
    }
}

impl MergeFrom for PlayerState {
    fn merge_from(&mut self, value: &Value, path: &str) {
        merge_fields!(self, value, path, {
            "money" => money,
            "towns" => towns,
            "currentlyIn" => currently_in,
            "holding" => holding,
            "unlockedCurrencies" => unlocked_currencies,
            "fastTime" => fast_time,
            "lastUpdateTime" => last_update_time,
            "migrations" => migrations,
            "producedElixir" => produced_elixir,
            "finishedEndCutscene" => finished_end_cutscene,
            "vitalMarker" => vital_marker,
            "options" => options,
        });
    }
}
