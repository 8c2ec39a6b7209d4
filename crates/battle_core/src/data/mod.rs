//! Data-driven unit definitions.
//!
//! Built-in archetype templates plus RON loading for overriding them.

pub mod archetypes;

pub use archetypes::{Archetype, ArchetypeData, ArchetypeTable};
