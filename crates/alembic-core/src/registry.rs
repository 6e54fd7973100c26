use crate::machine::{MachineKind, MachineView};
use crate::machines::standard_kinds;
use crate::recipe::RecipeError;
use std::collections::HashMap;

/// Builder for constructing an immutable [`MachineRegistry`].
/// Two-phase lifecycle: registration -> finalization.
#[derive(Debug, Default)]
pub struct MachineRegistryBuilder {
    kinds: Vec<Box<dyn MachineKind>>,
}

impl MachineRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: Register a machine kind.
    pub fn register(&mut self, kind: Box<dyn MachineKind>) -> &mut Self {
        self.kinds.push(kind);
        self
    }

    /// Phase 2: Validate and freeze.
    pub fn build(self) -> Result<MachineRegistry, RegistryError> {
        let mut by_name = HashMap::new();
        for (index, kind) in self.kinds.iter().enumerate() {
            let def = kind.definition();
            if by_name.insert(def.name.to_string(), index).is_some() {
                return Err(RegistryError::DuplicateType(def.name.to_string()));
            }

            let mut seen = Vec::new();
            for output in &def.outputs {
                if seen.contains(&output.id) {
                    return Err(RegistryError::DuplicateOutput {
                        machine: def.name.to_string(),
                        output: output.id.to_string(),
                    });
                }
                seen.push(output.id);
            }

            // Requirement lists are formulas; evaluate them on a blank
            // instance to catch references to missing inputs.
            let blank = def.instantiate(false);
            let unlocked = Default::default();
            let view = MachineView::new(def, &blank, &unlocked);
            for output in &def.outputs {
                for requirement in (output.requires)(&view) {
                    if requirement.input_id >= def.inputs.len() {
                        return Err(RegistryError::InvalidInputRef {
                            machine: def.name.to_string(),
                            output: output.id.to_string(),
                            input: requirement.input_id,
                        });
                    }
                }
            }
        }

        Ok(MachineRegistry {
            kinds: self.kinds,
            by_name,
        })
    }
}

/// Immutable registry of machine kinds, keyed by type name. Frozen after
/// build().
#[derive(Debug)]
pub struct MachineRegistry {
    kinds: Vec<Box<dyn MachineKind>>,
    by_name: HashMap<String, usize>,
}

impl MachineRegistry {
    /// Registry holding every built-in machine kind.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut builder = MachineRegistryBuilder::new();
        for kind in standard_kinds()? {
            builder.register(kind);
        }
        builder.build()
    }

    pub fn get(&self, name: &str) -> Option<&dyn MachineKind> {
        self.by_name.get(name).map(|&i| self.kinds[i].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Kinds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn MachineKind> {
        self.kinds.iter().map(|k| k.as_ref())
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("machine type registered twice: {0}")]
    DuplicateType(String),
    #[error("machine {machine} declares output {output} twice")]
    DuplicateOutput { machine: String, output: String },
    #[error("output {output} of {machine} requires missing input {input}")]
    InvalidInputRef {
        machine: String,
        output: String,
        input: usize,
    },
    #[error(transparent)]
    Recipe(#[from] RecipeError),
}
