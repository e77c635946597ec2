use crate::error::{Result, SimError};
use nalgebra::SVector;

/// Position, velocity or acceleration of one particle in `D` dimensions
pub type Vector<const D: usize> = SVector<f64, D>;

/// Positions, velocities and accelerations of every particle together with
/// the potential energy belonging to `positions`.
///
/// All three arrays are index-aligned. Integrators consume one `Phase` and
/// return the next one; the caller swaps it into the simulation state.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase<const D: usize> {
    pub positions: Vec<Vector<D>>,
    pub velocities: Vec<Vector<D>>,
    pub accelerations: Vec<Vector<D>>,
    pub potential_energy: f64,
}

impl<const D: usize> Phase<D> {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Kinetic energy in reduced units (unit mass)
    pub fn kinetic_energy(&self) -> f64 {
        self.velocities.iter().map(|v| 0.5 * v.norm_squared()).sum()
    }
}

/// Step and acceptance bookkeeping read by output collaborators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Steps or trials completed since the simulation was created
    pub step: u64,
    /// Monte Carlo trials attempted in the current run
    pub trials: u64,
    /// Monte Carlo trials accepted in the current run
    pub accepted: u64,
}

impl RunCounters {
    /// Accepted trials over trials so far in the current run
    pub fn acceptance_ratio(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.accepted as f64 / self.trials as f64
        }
    }

    pub(crate) fn reset_trials(&mut self) {
        self.trials = 0;
        self.accepted = 0;
    }
}

/// Everything the integrators and the sampler mutate during a run
#[derive(Debug, Clone)]
pub struct SimulationState<const D: usize> {
    pub phase: Phase<D>,
    pub counters: RunCounters,
    /// Simulated time accumulated by molecular dynamics steps
    pub time: f64,
}

impl<const D: usize> SimulationState<D> {
    /// Build a state from initializer output. Accelerations and energy are
    /// filled in by the owner once a force field is bound.
    pub fn new(positions: Vec<Vector<D>>, velocities: Vec<Vector<D>>) -> Result<Self> {
        if velocities.len() != positions.len() {
            return Err(SimError::Shape {
                what: "velocities",
                expected: positions.len(),
                found: velocities.len(),
            });
        }
        let accelerations = vec![Vector::<D>::zeros(); positions.len()];
        Ok(Self {
            phase: Phase {
                positions,
                velocities,
                accelerations,
                potential_energy: 0.0,
            },
            counters: RunCounters::default(),
            time: 0.0,
        })
    }

    pub fn n_particles(&self) -> usize {
        self.phase.len()
    }

    pub fn dimension(&self) -> usize {
        D
    }

    pub fn positions(&self) -> &[Vector<D>] {
        &self.phase.positions
    }

    pub fn velocities(&self) -> &[Vector<D>] {
        &self.phase.velocities
    }

    pub fn accelerations(&self) -> &[Vector<D>] {
        &self.phase.accelerations
    }

    pub fn potential_energy(&self) -> f64 {
        self.phase.potential_energy
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.phase.kinetic_energy()
    }

    pub fn total_energy(&self) -> f64 {
        self.phase.potential_energy + self.phase.kinetic_energy()
    }

    /// Drop particle `index` from every index-aligned array, keeping the
    /// order of the remaining particles.
    pub(crate) fn remove_particle(&mut self, index: usize) {
        self.phase.positions.remove(index);
        self.phase.velocities.remove(index);
        self.phase.accelerations.remove(index);
    }
}
