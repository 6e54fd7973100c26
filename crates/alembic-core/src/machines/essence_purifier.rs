use crate::formula::{Effect, Formula, LevelFormula};
use crate::machine::{
    MachineDefinition, MachineInstance, MachineKind, MachineMeta, MachineView, PurifierMeta,
};
use crate::port::{Consumption, InputPortDef, OutputPortDef, Production, Requirement};
use crate::recipe::{Recipe, RecipeBook, RecipeError};
use crate::resource::ResourceType::{self, *};
use crate::upgrade::{UpgradeDef, exponential_cost};

const BASE_CAPACITY: f64 = 5.0;

/// Extracts basic essences from raw materials. Dormant until its power
/// supply (the `unlock` upgrade) is bought.
#[derive(Debug)]
pub struct EssencePurifier {
    definition: MachineDefinition,
}

impl EssencePurifier {
    pub fn new() -> Result<Self, RecipeError> {
        let recipes = RecipeBook::new(vec![
            Recipe::new(Some(Coal), 0.05, Fire, 0.2).energy(0.3),
            Recipe::new(Some(Energy), 0.15, Essence, 0.5).energy(0.05),
            Recipe::new(Some(Lava), 0.2, Vitriol, 0.08)
                .energy(0.5)
                .unlocked_when(|view| view.count("power") > 0),
            Recipe::new(Some(Glass), 1.0, Purity, 0.01)
                .energy(0.5)
                .unlocked_when(|view| view.count("power") > 1),
            Recipe::idle().energy(0.0),
        ])?;

        let definition = MachineDefinition {
            name: "essencePurifier",
            description: "Extracts Basic Essences from raw materials.",
            meta: || MachineMeta::Purifier(PurifierMeta::default()),
            recipes: Some(recipes),
            inputs: vec![
                InputPortDef::new(
                    Formula::Computed(accepted_inputs),
                    Formula::Computed(capacity),
                    |view| {
                        let rate = consumption(view);
                        Consumption::throttled(rate, view.output_diff("main") * rate)
                    },
                )
                .unlocked_when(powered),
                InputPortDef::new(
                    Formula::Const(vec![Energy]),
                    Formula::Computed(capacity),
                    |view| {
                        let rate = energy_usage(view);
                        Consumption::throttled(rate, view.output_diff("main") * rate)
                    },
                )
                .unlocked_when(powered),
            ],
            outputs: vec![
                OutputPortDef::new("main", Formula::Computed(capacity), production, |view| {
                    vec![
                        Requirement {
                            resource: view.meta().input_resource(),
                            amount: consumption(view),
                            input_id: 0,
                        },
                        Requirement {
                            resource: Some(Energy),
                            amount: energy_usage(view),
                            input_id: 1,
                        },
                    ]
                })
                .unlocked_when(powered),
            ],
            upgrades: vec![
                UpgradeDef {
                    name: "unlock",
                    title: "Power",
                    description: "Supply Power to the EssencePurifier.",
                    cost: LevelFormula::Const(150.0),
                    currency: LevelFormula::Const(Energy),
                    max: 1,
                    effect: |count| Effect::Flag(count > 0),
                    format_effect: Some(|_| String::new()),
                    is_unlocked: Some(|view| !powered(view)),
                },
                UpgradeDef {
                    name: "velocity",
                    title: "Efficiency",
                    description: "Increase operation speed without increasing energy usage in Input 2",
                    cost: LevelFormula::PerLevel(|count| exponential_cost(30.0, 2.5, count)),
                    currency: LevelFormula::Const(Lava),
                    max: 4,
                    effect: |count| Effect::Scalar(1.5f64.powi(count as i32) + count as f64 * 0.2),
                    format_effect: None,
                    is_unlocked: Some(powered),
                },
                UpgradeDef {
                    name: "power",
                    title: "Very Fine",
                    description: "Gain the ability extract essence from 1 more type of raw material",
                    cost: LevelFormula::PerLevel(|count| exponential_cost(40.0, 2.0, count)),
                    currency: LevelFormula::Const(Essence),
                    max: 2,
                    effect: |count| Effect::Scalar(count as f64),
                    format_effect: Some(|_| String::new()),
                    is_unlocked: Some(powered),
                },
                UpgradeDef {
                    name: "capacity",
                    title: "Capacity",
                    description: "Increase capacity",
                    cost: LevelFormula::PerLevel(|count| exponential_cost(20.0, 4.0, count)),
                    currency: LevelFormula::Const(Vitriol),
                    max: 2,
                    effect: |count| {
                        Effect::Scalar(2f64.powi(count as i32 - 1) + count as f64 + 0.5)
                    },
                    format_effect: None,
                    is_unlocked: Some(|view| {
                        powered(view)
                            && (view.count("power") > 0 || view.currency_unlocked(Vitriol))
                    }),
                },
            ],
        };
        Ok(Self { definition })
    }
}

impl MachineKind for EssencePurifier {
    fn definition(&self) -> &MachineDefinition {
        &self.definition
    }

    fn update_meta(&self, machine: &mut MachineInstance) {
        let input_resource = machine.input_item(0).and_then(|s| s.resource);
        machine.meta = MachineMeta::Purifier(PurifierMeta { input_resource });
    }
}

fn powered(view: &MachineView<'_>) -> bool {
    view.effect_flag("unlock")
}

fn capacity(view: &MachineView<'_>) -> f64 {
    BASE_CAPACITY * view.effect_f64("capacity")
}

fn accepted_inputs(view: &MachineView<'_>) -> Vec<ResourceType> {
    view.recipes().map_or_else(Vec::new, |book| book.accepted(view))
}

fn consumption(view: &MachineView<'_>) -> f64 {
    view.active_recipe().map_or(0.0, |r| r.input.amount) * view.effect_f64("velocity")
}

// Energy draw does not scale with velocity.
fn energy_usage(view: &MachineView<'_>) -> f64 {
    view.active_recipe().map_or(0.0, |r| r.usage_of(Energy))
}

fn production(view: &MachineView<'_>) -> Production {
    match view.active_recipe() {
        Some(recipe) => Production {
            resource: Some(recipe.output.resource),
            amount: recipe.output.amount * view.effect_f64("velocity"),
        },
        None => Production::NONE,
    }
}
