//! The cinder game server: a fixed-rate simulation tick applying client
//! traffic to the entity layer, chat commands, and respawn handling.

pub mod catalog;
pub mod commands;
pub mod respawn;
pub mod simulation;
pub mod tick_clock;

pub use commands::{CommandError, CommandSource};
pub use respawn::WorldInfo;
pub use simulation::{Simulation, SimulationSettings, TickReport};
pub use tick_clock::TickClock;
