pub mod ai;
pub mod arena;
pub mod catalog;
pub mod constants;
pub mod events;
pub mod game_loop;
pub mod input;
pub mod performance;
pub mod snapshot;
pub mod spatial;
pub mod state;
pub mod systems;
pub mod waypoints;
pub mod world;
