//! Domain models for the animal-dx system.

mod group;
mod prediction;
mod sample;
mod species;
mod syndrome;

pub use group::*;
pub use prediction::*;
pub use sample::*;
pub use species::*;
pub use syndrome::*;
