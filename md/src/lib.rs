//! Lennard-Jones particle simulation: molecular dynamics with Euler,
//! Euler-Cromer and velocity Verlet integrators, and single-particle Monte
//! Carlo with Metropolis or umbrella acceptance and a Stillinger cluster
//! criterion.
//!
//! The dimension is a const generic `D` over [`state::Vector`]; 2 and 3 are
//! the intended values.

pub mod bias;
pub mod boundary;
pub mod config;
pub mod error;
pub mod init;
pub mod lj_pot;
pub mod moves;
pub mod output;
pub mod run_md;
pub mod sampler;
pub mod simulation;
pub mod state;

pub use boundary::Boundary;
pub use config::RunConfig;
pub use error::{Result, SimError};
pub use lj_pot::{ForceProvider, LennardJones};
pub use moves::{Move, MoveSet};
pub use run_md::{Integrator, Scheme};
pub use sampler::{Sampler, Trial};
pub use simulation::{Simulation, TrialOutcome};
pub use state::{SimulationState, Vector};
