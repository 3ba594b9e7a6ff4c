//! # Infection Sim
//!
//! A simulation of an infection spreading through a population laid out on a
//! grid. The population is a flat list reshaped into rows of a width supplied
//! by whoever displays it; the last row may be short.
//!
//! ## Features
//!
//! * Moore-neighbourhood lookup on a grid with an irregular last row
//! * Randomised, bounded propagation committed atomically per step
//! * Manual infection that wakes an idle scheduler
//! * Background statistics and channel-based change notifications
//!
//! Infection is permanent: nothing in this crate turns an infected person
//! back into a healthy one.

pub mod config;
pub mod error;
pub mod events;
pub mod grid;
pub mod population;
pub mod propagation;
mod scheduler;
pub mod simulation;
pub mod stats;

pub use config::SimulationConfig;
pub use error::{Error, Result};
pub use events::SimulationEvent;
pub use grid::{neighbors, GridLayout};
pub use population::{Person, PersonId, Population};
pub use propagation::Propagator;
pub use simulation::Simulator;
pub use stats::Stats;
