use serde::{Deserialize, Serialize};
use std::fmt;

/// Amounts at or below this are treated as an empty buffer.
pub const EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Resource vocabulary
// ---------------------------------------------------------------------------

/// Every substance that can flow between machines. The set is closed: saves
/// and machine definitions may only name these.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Earth,
    Water,
    Clay,
    Wood,
    Bricks,
    Stone,
    Coal,
    Steam,
    Energy,
    Fire,
    Essence,
    Sand,
    Glass,
    Lava,
    StoneDust,
    Vitriol,
    Iron,
    Lead,
    Copper,
    Silver,
    Gold,
    Quicksilver,
    Purity,
    Elixir,
}

impl ResourceType {
    /// All resources in declaration order.
    pub const ALL: [ResourceType; 24] = [
        ResourceType::Earth,
        ResourceType::Water,
        ResourceType::Clay,
        ResourceType::Wood,
        ResourceType::Bricks,
        ResourceType::Stone,
        ResourceType::Coal,
        ResourceType::Steam,
        ResourceType::Energy,
        ResourceType::Fire,
        ResourceType::Essence,
        ResourceType::Sand,
        ResourceType::Glass,
        ResourceType::Lava,
        ResourceType::StoneDust,
        ResourceType::Vitriol,
        ResourceType::Iron,
        ResourceType::Lead,
        ResourceType::Copper,
        ResourceType::Silver,
        ResourceType::Gold,
        ResourceType::Quicksilver,
        ResourceType::Purity,
        ResourceType::Elixir,
    ];

    /// The metal chain, cheapest first.
    pub const METALS: [ResourceType; 6] = [
        ResourceType::Iron,
        ResourceType::Lead,
        ResourceType::Copper,
        ResourceType::Silver,
        ResourceType::Gold,
        ResourceType::Quicksilver,
    ];

    /// The persisted (camelCase) name.
    pub fn name(self) -> &'static str {
        match self {
            ResourceType::Earth => "earth",
            ResourceType::Water => "water",
            ResourceType::Clay => "clay",
            ResourceType::Wood => "wood",
            ResourceType::Bricks => "bricks",
            ResourceType::Stone => "stone",
            ResourceType::Coal => "coal",
            ResourceType::Steam => "steam",
            ResourceType::Energy => "energy",
            ResourceType::Fire => "fire",
            ResourceType::Essence => "essence",
            ResourceType::Sand => "sand",
            ResourceType::Glass => "glass",
            ResourceType::Lava => "lava",
            ResourceType::StoneDust => "stoneDust",
            ResourceType::Vitriol => "vitriol",
            ResourceType::Iron => "iron",
            ResourceType::Lead => "lead",
            ResourceType::Copper => "copper",
            ResourceType::Silver => "silver",
            ResourceType::Gold => "gold",
            ResourceType::Quicksilver => "quicksilver",
            ResourceType::Purity => "purity",
            ResourceType::Elixir => "elixir",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.name() == name)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serde adapter for `Option<ResourceType>`, written as `"none"` when absent.
///
/// Unknown names read back as `None` so that a stale resource name in an
/// old save degrades to an idle port instead of failing the whole load.
pub mod maybe_resource {
    use super::ResourceType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const NONE: &str = "none";

    pub fn serialize<S: Serializer>(
        value: &Option<ResourceType>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.map_or(NONE, ResourceType::name))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ResourceType>, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(ResourceType::from_name(&name))
    }
}

// ---------------------------------------------------------------------------
// Resource amounts
// ---------------------------------------------------------------------------

/// A definite quantity of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceAmount {
    pub resource: ResourceType,
    pub amount: f64,
}

/// A single-type buffer: port contents, or the player's holding slot.
///
/// The stack forgets its resource once drained so that a different
/// resource may be admitted afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    #[serde(with = "maybe_resource")]
    pub resource: Option<ResourceType>,
    pub amount: f64,
}

impl Stack {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(resource: ResourceType, amount: f64) -> Self {
        let mut stack = Self {
            resource: Some(resource),
            amount,
        };
        stack.normalize();
        stack
    }

    pub fn is_empty(&self) -> bool {
        self.resource.is_none() || self.amount <= EPSILON
    }

    /// Amount held of `resource`; zero for any other resource.
    pub fn amount_of(&self, resource: Option<ResourceType>) -> f64 {
        match (self.resource, resource) {
            (Some(held), Some(wanted)) if held == wanted => self.amount,
            _ => 0.0,
        }
    }

    /// Whether the stack is occupied by something other than `resource`.
    pub fn holds_other(&self, resource: ResourceType) -> bool {
        !self.is_empty() && self.resource != Some(resource)
    }

    /// Add `amount` of `resource`, clamped so the stack never exceeds
    /// `capacity`. Returns the amount actually added.
    pub fn add(&mut self, resource: ResourceType, amount: f64, capacity: f64) -> f64 {
        if self.holds_other(resource) || !(amount > 0.0) {
            return 0.0;
        }
        if self.is_empty() {
            self.resource = Some(resource);
            self.amount = 0.0;
        }
        let added = amount.min((capacity - self.amount).max(0.0));
        self.amount += added;
        self.normalize();
        added
    }

    /// Remove up to `amount`. Returns the amount actually removed.
    pub fn remove(&mut self, amount: f64) -> f64 {
        if self.is_empty() || !(amount > 0.0) {
            return 0.0;
        }
        let removed = amount.min(self.amount);
        self.amount -= removed;
        self.normalize();
        removed
    }

    /// Clear residue and non-finite amounts.
    pub fn normalize(&mut self) {
        if !self.amount.is_finite() || self.amount <= EPSILON || self.resource.is_none() {
            self.resource = None;
            self.amount = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for r in ResourceType::ALL {
            assert_eq!(ResourceType::from_name(r.name()), Some(r));
        }
        assert_eq!(ResourceType::from_name("none"), None);
        assert_eq!(ResourceType::from_name("unobtainium"), None);
    }

    #[test]
    fn serde_names_match_persisted_names() {
        let json = serde_json::to_string(&ResourceType::StoneDust).unwrap();
        assert_eq!(json, "\"stoneDust\"");
    }

    #[test]
    fn empty_stack_serializes_as_none() {
        let json = serde_json::to_value(Stack::empty()).unwrap();
        assert_eq!(json["resource"], "none");
        let back: Stack = serde_json::from_value(json).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn add_respects_capacity_and_type() {
        let mut s = Stack::empty();
        assert_eq!(s.add(ResourceType::Stone, 30.0, 40.0), 30.0);
        assert_eq!(s.add(ResourceType::Stone, 30.0, 40.0), 10.0);
        assert_eq!(s.amount, 40.0);
        assert_eq!(s.add(ResourceType::Clay, 1.0, 40.0), 0.0);
        assert_eq!(s.resource, Some(ResourceType::Stone));
    }

    #[test]
    fn draining_forgets_resource() {
        let mut s = Stack::of(ResourceType::Water, 2.0);
        assert_eq!(s.remove(5.0), 2.0);
        assert!(s.is_empty());
        assert_eq!(s.resource, None);
        assert_eq!(s.add(ResourceType::Clay, 1.0, 10.0), 1.0);
    }

    #[test]
    fn amount_of_other_resource_is_zero() {
        let s = Stack::of(ResourceType::Water, 2.0);
        assert_eq!(s.amount_of(Some(ResourceType::Water)), 2.0);
        assert_eq!(s.amount_of(Some(ResourceType::Clay)), 0.0);
        assert_eq!(s.amount_of(None), 0.0);
    }
}
