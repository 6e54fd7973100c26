//! Built-in machine types.

pub mod arc_furnace;
pub mod essence_purifier;
pub mod source;

pub use arc_furnace::ArcFurnace;
pub use essence_purifier::EssencePurifier;
pub use source::Source;

use crate::machine::MachineKind;
use crate::recipe::RecipeError;

/// Every built-in machine kind, in registration order.
pub fn standard_kinds() -> Result<Vec<Box<dyn MachineKind>>, RecipeError> {
    Ok(vec![
        Box::new(Source::well()),
        Box::new(Source::quarry()),
        Box::new(ArcFurnace::new()?),
        Box::new(EssencePurifier::new()?),
    ])
}
