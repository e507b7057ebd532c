pub mod config;
pub mod cost;
pub mod controller;
pub mod error;
pub mod integrators;
pub mod plant;
pub mod pso;
pub mod rng;
pub mod safety;
pub mod simulation;

#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use controller::Controller;
pub use error::EngineError;
pub use plant::Plant;
pub use simulation::{ExitReason, RolloutResult, Simulation};
