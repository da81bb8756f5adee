//! Bot controllers
//!
//! One `AiController` per bot player. Controllers read the simulation state
//! and produce synthetic input that goes through the same character tick as
//! human input.

pub mod archetype;
pub mod controller;
pub mod emotions;

pub use archetype::{Archetype, ArchetypeParams, SpawnLoadout};
pub use controller::{shoot_range, AiController, EnemySighting};
pub use emotions::Emotions;
