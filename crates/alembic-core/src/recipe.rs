use crate::formula::Predicate;
use crate::machine::MachineView;
use crate::resource::ResourceType;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Recipe types
// ---------------------------------------------------------------------------

/// What a recipe consumes per second. `None` marks the idle recipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecipeInput {
    pub resource: Option<ResourceType>,
    pub amount: f64,
}

/// What a recipe produces per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecipeOutput {
    pub resource: ResourceType,
    pub amount: f64,
}

/// A fixed input -> output conversion with optional side costs.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub input: RecipeInput,
    pub output: RecipeOutput,
    pub energy_usage: Option<f64>,
    pub fuel_usage: Option<f64>,
    pub vitriol_usage: Option<f64>,
    pub water_usage: Option<f64>,
    pub is_unlocked: Option<Predicate>,
}

impl Recipe {
    pub fn new(
        input: Option<ResourceType>,
        input_amount: f64,
        output: ResourceType,
        output_amount: f64,
    ) -> Self {
        Self {
            input: RecipeInput {
                resource: input,
                amount: input_amount,
            },
            output: RecipeOutput {
                resource: output,
                amount: output_amount,
            },
            energy_usage: None,
            fuel_usage: None,
            vitriol_usage: None,
            water_usage: None,
            is_unlocked: None,
        }
    }

    /// The idle recipe: consumes nothing, produces nothing.
    pub fn idle() -> Self {
        Self::new(None, 0.0, ResourceType::Earth, 0.0)
    }

    pub fn energy(mut self, usage: f64) -> Self {
        self.energy_usage = Some(usage);
        self
    }

    pub fn fuel(mut self, usage: f64) -> Self {
        self.fuel_usage = Some(usage);
        self
    }

    pub fn vitriol(mut self, usage: f64) -> Self {
        self.vitriol_usage = Some(usage);
        self
    }

    pub fn water(mut self, usage: f64) -> Self {
        self.water_usage = Some(usage);
        self
    }

    /// Per-second side cost drawn from a port holding `resource`. Fuel is
    /// burned as vitriol, so both usages add up there.
    pub fn usage_of(&self, resource: ResourceType) -> f64 {
        let usage = match resource {
            ResourceType::Energy => self.energy_usage,
            ResourceType::Vitriol => match (self.fuel_usage, self.vitriol_usage) {
                (None, None) => None,
                (fuel, vitriol) => Some(fuel.unwrap_or(0.0) + vitriol.unwrap_or(0.0)),
            },
            ResourceType::Water => self.water_usage,
            _ => None,
        };
        usage.unwrap_or(0.0)
    }

    pub fn unlocked_when(mut self, predicate: Predicate) -> Self {
        self.is_unlocked = Some(predicate);
        self
    }

    pub fn is_available(&self, view: &MachineView<'_>) -> bool {
        self.is_unlocked.is_none_or(|p| p(view))
    }
}

// ---------------------------------------------------------------------------
// Recipe book
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("recipe list has no idle (\"none\" input) recipe")]
    MissingFallback,
    #[error("two recipes consume {0}")]
    DuplicateInput(String),
}

/// A machine's recipes keyed by input resource.
///
/// Lookups are total: any input without a recipe resolves to the idle
/// recipe, so a miss yields zero production instead of an error.
#[derive(Debug, Clone)]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
    by_input: BTreeMap<Option<ResourceType>, usize>,
    fallback: usize,
}

impl RecipeBook {
    pub fn new(recipes: Vec<Recipe>) -> Result<Self, RecipeError> {
        let mut by_input = BTreeMap::new();
        for (index, recipe) in recipes.iter().enumerate() {
            let key = recipe.input.resource;
            if by_input.insert(key, index).is_some() {
                let name = key.map_or("none", ResourceType::name);
                return Err(RecipeError::DuplicateInput(name.to_string()));
            }
        }
        let fallback = *by_input.get(&None).ok_or(RecipeError::MissingFallback)?;
        Ok(Self {
            recipes,
            by_input,
            fallback,
        })
    }

    pub fn get(&self, input: Option<ResourceType>) -> &Recipe {
        let index = self.by_input.get(&input).copied().unwrap_or(self.fallback);
        &self.recipes[index]
    }

    pub fn fallback(&self) -> &Recipe {
        &self.recipes[self.fallback]
    }

    /// Inputs of every recipe currently unlocked for this machine, in
    /// declaration order, excluding the idle recipe.
    pub fn accepted(&self, view: &MachineView<'_>) -> Vec<ResourceType> {
        self.recipes
            .iter()
            .filter(|r| r.is_available(view))
            .filter_map(|r| r.input.resource)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType::*;

    fn furnace_recipes() -> Vec<Recipe> {
        vec![
            Recipe::new(Some(Clay), 0.1, Bricks, 1.0).energy(0.02),
            Recipe::new(Some(Stone), 0.25, Lava, 2.0).energy(0.15),
            Recipe::idle(),
        ]
    }

    #[test]
    fn lookup_by_input() {
        let book = RecipeBook::new(furnace_recipes()).unwrap();
        assert_eq!(book.get(Some(Stone)).output.resource, Lava);
        assert_eq!(book.get(Some(Stone)).energy_usage, Some(0.15));
    }

    #[test]
    fn unknown_input_falls_back_to_idle() {
        let book = RecipeBook::new(furnace_recipes()).unwrap();
        let r = book.get(Some(Elixir));
        assert_eq!(r.input.resource, None);
        assert_eq!(r.output.amount, 0.0);
        assert_eq!(book.get(None).output.amount, 0.0);
    }

    #[test]
    fn side_costs_by_resource() {
        let recipe = Recipe::new(Some(Coal), 0.2, Steam, 1.0)
            .energy(0.1)
            .fuel(0.05)
            .vitriol(0.02)
            .water(0.3);
        assert_eq!(recipe.usage_of(Energy), 0.1);
        assert!((recipe.usage_of(Vitriol) - 0.07).abs() < 1e-12);
        assert_eq!(recipe.usage_of(Water), 0.3);
        assert_eq!(recipe.usage_of(Clay), 0.0);

        let idle = Recipe::idle();
        assert_eq!(idle.usage_of(Energy), 0.0);
        assert_eq!(idle.usage_of(Vitriol), 0.0);
    }

    #[test]
    fn missing_fallback_rejected() {
        let err = RecipeBook::new(vec![Recipe::new(Some(Clay), 0.1, Bricks, 1.0)]).unwrap_err();
        assert!(matches!(err, RecipeError::MissingFallback));
    }

    #[test]
    fn duplicate_input_rejected() {
        let err = RecipeBook::new(vec![
            Recipe::new(Some(Clay), 0.1, Bricks, 1.0),
            Recipe::new(Some(Clay), 0.2, Glass, 1.0),
            Recipe::idle(),
        ])
        .unwrap_err();
        match err {
            RecipeError::DuplicateInput(name) => assert_eq!(name, "clay"),
            other => panic!("expected DuplicateInput, got {other:?}"),
        }
    }
}
