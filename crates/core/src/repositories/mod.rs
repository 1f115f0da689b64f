//! Repository layer: root-record persistence and whole-aggregate composition.

pub mod encounter;

pub use encounter::{DraftScope, EncounterRepository, NewEncounter};
