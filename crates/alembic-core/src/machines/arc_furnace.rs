use crate::formula::{Effect, Formula, LevelFormula};
use crate::machine::{
    FurnaceMeta, MachineDefinition, MachineInstance, MachineKind, MachineMeta, MachineView,
};
use crate::port::{Consumption, InputPortDef, OutputPortDef, Production, Requirement};
use crate::recipe::{Recipe, RecipeBook, RecipeError};
use crate::resource::ResourceType::{self, *};
use crate::upgrade::UpgradeDef;

const CAPACITY: f64 = 40.0;
const CATALYST_BOOST: f64 = 1.6;
const CATALYST_THRESHOLD: f64 = 5.0;

/// Electric furnace. Smelts one of its recipe inputs per tick and can be
/// boosted with a Fire catalyst once Catalysis is bought.
#[derive(Debug)]
pub struct ArcFurnace {
    definition: MachineDefinition,
}

impl ArcFurnace {
    pub fn new() -> Result<Self, RecipeError> {
        let recipes = RecipeBook::new(vec![
            Recipe::new(Some(Clay), 0.1, Bricks, 1.0).energy(0.02),
            Recipe::new(Some(Water), 0.15, Steam, 1.5).energy(0.04),
            Recipe::new(Some(Sand), 0.1, Glass, 0.7).energy(0.06),
            Recipe::new(Some(Stone), 0.25, Lava, 2.0).energy(0.15),
            Recipe::idle().energy(0.0),
        ])?;

        let definition = MachineDefinition {
            name: "arcFurnace",
            description: "The Arc Furnace is more powerful than the Basic Furnace. \
                          Takes Energy to use.",
            meta: || MachineMeta::Furnace(FurnaceMeta::default()),
            recipes: Some(recipes),
            inputs: vec![
                InputPortDef::new(
                    Formula::Computed(accepted_inputs),
                    Formula::Const(CAPACITY),
                    |view| {
                        let rate = consumption(view);
                        Consumption::throttled(rate, view.output_diff("main") * rate)
                    },
                ),
                InputPortDef::new(
                    Formula::Const(vec![Energy]),
                    Formula::Const(CAPACITY),
                    |view| {
                        let rate = energy_usage(view);
                        Consumption::throttled(rate, view.output_diff("main") * rate)
                    },
                ),
                InputPortDef::new(
                    Formula::Const(vec![Fire]),
                    Formula::Const(CAPACITY),
                    |_| Consumption::fixed(0.01),
                )
                .with_label("Catalyst\n(5 Fire)")
                .unlocked_when(|view| view.effect_flag("cat")),
            ],
            outputs: vec![OutputPortDef::new(
                "main",
                Formula::Const(CAPACITY),
                production,
                |view| {
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
                },
            )],
            upgrades: vec![
                UpgradeDef {
                    name: "cat",
                    title: "Catalysis",
                    description: "Allows insertion of Fire for increased efficiency.",
                    cost: LevelFormula::Const(25.0),
                    currency: LevelFormula::Const(Lava),
                    max: 1,
                    effect: |count| Effect::Flag(count > 0),
                    format_effect: Some(|_| String::new()),
                    is_unlocked: None,
                },
                UpgradeDef {
                    name: "velocity",
                    title: "Plater",
                    description: "Increase operation speed but only increases Energy usage at sqrt the rate",
                    cost: LevelFormula::Const(4.0),
                    currency: LevelFormula::PerLevel(metal_for_level),
                    max: 5,
                    effect: |count| Effect::Scalar(1.3f64.powi(count as i32)),
                    format_effect: None,
                    is_unlocked: None,
                },
                UpgradeDef {
                    name: "powah",
                    title: "Powah",
                    description: "Increase operation speed",
                    cost: LevelFormula::Const(60.0),
                    currency: LevelFormula::Const(Energy),
                    max: 40,
                    effect: |count| {
                        let c = count as f64;
                        Effect::Pair(1.5f64.powf(c) + c * 0.5, 1.1f64.powf(c) + c * 0.2)
                    },
                    format_effect: Some(|_| String::new()),
                    is_unlocked: None,
                },
            ],
        };
        Ok(Self { definition })
    }
}

impl MachineKind for ArcFurnace {
    fn definition(&self) -> &MachineDefinition {
        &self.definition
    }

    fn update_meta(&self, machine: &mut MachineInstance) {
        let input_resource = machine.input_item(0).and_then(|s| s.resource);
        let catalyst_active = machine
            .input_item(2)
            .is_some_and(|s| s.amount >= CATALYST_THRESHOLD);
        machine.meta = MachineMeta::Furnace(FurnaceMeta {
            input_resource,
            catalyst_active,
        });
    }
}

fn metal_for_level(level: u32) -> ResourceType {
    let metals = ResourceType::METALS;
    metals[(level as usize).min(metals.len() - 1)]
}

fn accepted_inputs(view: &MachineView<'_>) -> Vec<ResourceType> {
    view.recipes().map_or_else(Vec::new, |book| book.accepted(view))
}

fn boost(view: &MachineView<'_>) -> f64 {
    match view.meta() {
        MachineMeta::Furnace(meta) if meta.catalyst_active => CATALYST_BOOST,
        _ => 1.0,
    }
}

fn consumption(view: &MachineView<'_>) -> f64 {
    view.active_recipe().map_or(0.0, |r| r.input.amount)
        * boost(view)
        * view.effect_f64("velocity")
}

fn energy_usage(view: &MachineView<'_>) -> f64 {
    let usage = view.active_recipe().map_or(0.0, |r| r.usage_of(Energy));
    usage * view.effect_f64("velocity").sqrt()
}

fn production(view: &MachineView<'_>) -> Production {
    match view.active_recipe() {
        Some(recipe) => Production {
            resource: Some(recipe.output.resource),
            amount: recipe.output.amount * boost(view) * view.effect_f64("velocity"),
        },
        None => Production::NONE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Stack;
    use crate::test_utils::*;

    // -----------------------------------------------------------------------
    // Test 1: stone to lava at velocity 2
    // -----------------------------------------------------------------------
    #[test]
    fn stone_to_lava_at_velocity_two() {
        let furnace = ArcFurnace::new().unwrap();
        let def = furnace.definition();
        let mut machine = def.instantiate(false);
        set_level(&mut machine, "velocity", 2);
        machine.inputs[0] = Stack::of(Stone, 40.0);
        machine.inputs[1] = Stack::of(Energy, 40.0);

        let outcome = furnace.tick(&mut machine, &no_unlocks(), 1.0);

        assert!(!outcome.skipped);
        assert_close(40.0 - machine.inputs[0].amount, 0.4225);
        assert_close(40.0 - machine.inputs[1].amount, 0.195);
        assert_eq!(machine.outputs[0].resource, Some(Lava));
        assert_close(machine.outputs[0].amount, 3.38);
        assert_close(machine.output_diffs["main"], 1.0);
    }

    // -----------------------------------------------------------------------
    // Test 2: catalyst boosts throughput and burns fire
    // -----------------------------------------------------------------------
    #[test]
    fn catalyst_boosts_when_five_fire_loaded() {
        let furnace = ArcFurnace::new().unwrap();
        let def = furnace.definition();
        let mut machine = def.instantiate(false);
        set_level(&mut machine, "cat", 1);
        machine.inputs[0] = Stack::of(Stone, 40.0);
        machine.inputs[1] = Stack::of(Energy, 40.0);
        machine.inputs[2] = Stack::of(Fire, 6.0);

        furnace.tick(&mut machine, &no_unlocks(), 1.0);

        assert_close(40.0 - machine.inputs[0].amount, 0.25 * 1.6);
        assert_close(machine.outputs[0].amount, 2.0 * 1.6);
        assert_close(machine.inputs[2].amount, 5.99);
    }

    // -----------------------------------------------------------------------
    // Test 3: catalyst below threshold has no effect
    // -----------------------------------------------------------------------
    #[test]
    fn catalyst_below_threshold_inactive() {
        let furnace = ArcFurnace::new().unwrap();
        let def = furnace.definition();
        let mut machine = def.instantiate(false);
        set_level(&mut machine, "cat", 1);
        machine.inputs[0] = Stack::of(Stone, 40.0);
        machine.inputs[1] = Stack::of(Energy, 40.0);
        machine.inputs[2] = Stack::of(Fire, 4.0);

        furnace.tick(&mut machine, &no_unlocks(), 1.0);

        assert_close(machine.outputs[0].amount, 2.0);
        match &machine.meta {
            MachineMeta::Furnace(meta) => assert!(!meta.catalyst_active),
            other => panic!("unexpected meta {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Test 4: no energy, no production
    // -----------------------------------------------------------------------
    #[test]
    fn energy_starved_furnace_stalls() {
        let furnace = ArcFurnace::new().unwrap();
        let def = furnace.definition();
        let mut machine = def.instantiate(false);
        machine.inputs[0] = Stack::of(Clay, 10.0);

        furnace.tick(&mut machine, &no_unlocks(), 1.0);

        assert_eq!(machine.inputs[0].amount, 10.0);
        assert!(machine.outputs[0].is_empty());
        assert_eq!(machine.output_diffs["main"], 0.0);
    }

    // -----------------------------------------------------------------------
    // Test 5: velocity currency walks the metal chain
    // -----------------------------------------------------------------------
    #[test]
    fn velocity_currency_walks_metals() {
        let furnace = ArcFurnace::new().unwrap();
        let velocity = furnace.definition().upgrade("velocity").unwrap();
        let chain: Vec<_> = (0..=5).map(|l| velocity.currency_at(l)).collect();
        assert_eq!(chain, ResourceType::METALS.to_vec());
    }

    #[test]
    fn accepts_every_recipe_input() {
        let furnace = ArcFurnace::new().unwrap();
        let def = furnace.definition();
        let machine = def.instantiate(false);
        let unlocks = no_unlocks();
        let view = MachineView::new(def, &machine, &unlocks);
        assert_eq!(accepted_inputs(&view), vec![Clay, Water, Sand, Stone]);
    }
}
