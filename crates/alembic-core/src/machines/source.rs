use crate::formula::{Effect, Formula, LevelFormula};
use crate::machine::{MachineDefinition, MachineKind, MachineMeta, MachineView};
use crate::port::{OutputPortDef, Production, no_requirements};
use crate::resource::ResourceType::{self, *};
use crate::upgrade::{UpgradeDef, exponential_cost};

/// A machine with no inputs that extracts a raw resource at a steady rate.
/// Every town starts with one of each.
#[derive(Debug)]
pub struct Source {
    definition: MachineDefinition,
}

impl Source {
    /// Draws water from the ground.
    pub fn well() -> Self {
        Self::build(
            "well",
            "Draws Water from deep underground.",
            |view| extract(view, Water, 0.5),
            Stone,
            Water,
        )
    }

    /// Breaks stone out of the hillside.
    pub fn quarry() -> Self {
        Self::build(
            "quarry",
            "Breaks Stone out of the hillside.",
            |view| extract(view, Stone, 0.3),
            Water,
            Stone,
        )
    }

    fn build(
        name: &'static str,
        description: &'static str,
        produces: fn(&MachineView<'_>) -> Production,
        velocity_currency: ResourceType,
        capacity_currency: ResourceType,
    ) -> Self {
        Self {
            definition: MachineDefinition {
                name,
                description,
                meta: || MachineMeta::None,
                recipes: None,
                inputs: Vec::new(),
                outputs: vec![OutputPortDef::new(
                    "main",
                    Formula::Computed(|view| 10.0 * view.effect_f64("capacity")),
                    produces,
                    no_requirements,
                )],
                upgrades: vec![
                    UpgradeDef {
                        name: "velocity",
                        title: "Velocity",
                        description: "Extract faster",
                        cost: LevelFormula::PerLevel(|count| exponential_cost(10.0, 1.8, count)),
                        currency: LevelFormula::Const(velocity_currency),
                        max: 10,
                        effect: |count| Effect::Scalar(1.25f64.powi(count as i32)),
                        format_effect: None,
                        is_unlocked: None,
                    },
                    UpgradeDef {
                        name: "capacity",
                        title: "Capacity",
                        description: "Increase capacity",
                        cost: LevelFormula::PerLevel(|count| exponential_cost(15.0, 2.2, count)),
                        currency: LevelFormula::Const(capacity_currency),
                        max: 5,
                        effect: |count| Effect::Scalar(2f64.powi(count as i32)),
                        format_effect: None,
                        is_unlocked: None,
                    },
                ],
            },
        }
    }
}

impl MachineKind for Source {
    fn definition(&self) -> &MachineDefinition {
        &self.definition
    }
}

fn extract(view: &MachineView<'_>, resource: ResourceType, rate: f64) -> Production {
    Production {
        resource: Some(resource),
        amount: rate * view.effect_f64("velocity"),
    }
}
