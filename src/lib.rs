//! Arena Shooter Simulation Server Library
//!
//! Server-authoritative character simulation for a 2D multiplayer arena
//! shooter: the weapon state machine, damage and death, bot controllers and
//! waypoint navigation, driven by a fixed 50 Hz tick.
//!
//! # Features
//!
//! - `parallel_nav` - Build waypoint graph edges with rayon (enabled by default)
//! - `metrics_endpoint` - Serve counters over HTTP from the headless binary (enabled by default)
//! - `minimal` - Build without optional features for testing/debugging

pub mod config;
pub mod game;
pub mod metrics;
pub mod util;
