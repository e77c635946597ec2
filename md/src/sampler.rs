//! Monte Carlo trial protocol
//!
//! A trial picks a particle, displaces it in a scratch position, checks the
//! cluster criterion and, if the particle stays in the cluster, records the
//! local energy and acceleration change. [`Sampler::decide`] then turns the
//! record into an accept/reject decision. Nothing is written back to the
//! configuration here; the owner commits accepted moves.

use crate::bias::Bias;
use crate::error::{ensure_positive, Result, SimError};
use crate::lj_pot::ForceProvider;
use crate::moves::Move;
use crate::state::Vector;
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Distribution the acceptance probability is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceDraw {
    /// Accept iff `u < p` with `u ~ U[0, 1)`
    #[default]
    Uniform,
    /// Accept iff `z < p` with `z ~ N(0, 1)`. Does not sample the Boltzmann
    /// distribution; kept to reproduce legacy runs.
    StandardNormal,
}

/// Stillinger cluster criterion: a particle whose nearest neighbour is
/// farther than `radius` has left the cluster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterCriterion {
    radius: f64,
}

impl ClusterCriterion {
    pub fn new(radius: f64) -> Result<Self> {
        ensure_positive("cluster radius", radius)?;
        Ok(Self { radius })
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Distance from `at` to the nearest particle other than `index`;
    /// `None` when there is no other particle
    pub fn nearest_distance<const D: usize, F: ForceProvider<D>>(
        forcefield: &F,
        positions: &[Vector<D>],
        index: usize,
        at: &Vector<D>,
    ) -> Option<f64> {
        positions
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != index)
            .map(|(_, other)| forcefield.separation(at, other).norm_squared())
            .min_by(|a, b| a.total_cmp(b))
            .map(f64::sqrt)
    }

    pub fn escapes<const D: usize, F: ForceProvider<D>>(
        &self,
        forcefield: &F,
        positions: &[Vector<D>],
        index: usize,
        at: &Vector<D>,
    ) -> bool {
        matches!(
            Self::nearest_distance(forcefield, positions, index, at),
            Some(d) if d > self.radius
        )
    }
}

/// Umbrella bias applied to the moved particle's distance from the
/// configuration centroid, divided by `scale`
#[derive(Debug)]
pub struct Umbrella {
    bias: Box<dyn Bias>,
    window: usize,
    scale: f64,
}

impl Umbrella {
    pub fn new(bias: Box<dyn Bias>, window: usize, scale: f64) -> Result<Self> {
        ensure_positive("umbrella scale", scale)?;
        if window >= bias.windows() {
            return Err(SimError::Config(format!(
                "umbrella window {window} out of range for {} windows",
                bias.windows()
            )));
        }
        Ok(Self {
            bias,
            window,
            scale,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn bias(&self) -> &dyn Bias {
        self.bias.as_ref()
    }

    /// Normalized coordinate of particle `index` placed at `at`
    pub fn coordinate<const D: usize, F: ForceProvider<D>>(
        &self,
        forcefield: &F,
        positions: &[Vector<D>],
        index: usize,
        at: &Vector<D>,
    ) -> f64 {
        let n = positions.len() as f64;
        let sum: Vector<D> = positions.iter().sum();
        let centroid = (sum - positions[index] + at) / n;
        forcefield.separation(at, &centroid).norm() / self.scale
    }

    fn weight_ratio<const D: usize, F: ForceProvider<D>>(
        &self,
        forcefield: &F,
        positions: &[Vector<D>],
        index: usize,
        candidate: &Vector<D>,
    ) -> f64 {
        let before = self.coordinate(forcefield, positions, index, &positions[index]);
        let after = self.coordinate(forcefield, positions, index, candidate);
        let w_old = self.bias.weight(before, self.window);
        let w_new = self.bias.weight(after, self.window);
        if w_old > 0.0 {
            w_new / w_old
        } else if w_new > 0.0 {
            f64::INFINITY
        } else {
            1.0
        }
    }
}

/// Rule turning a trial record into an acceptance probability
#[derive(Debug)]
pub enum Acceptance {
    Metropolis,
    Umbrella(Umbrella),
}

/// Scratch data of one feasible trial; never outlives the trial
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord<const D: usize> {
    pub index: usize,
    pub displacement: Vector<D>,
    /// Proposed position of the particle
    pub candidate: Vector<D>,
    /// Local acceleration at the proposed position
    pub acceleration: Vector<D>,
    pub acceleration_delta: Vector<D>,
    pub energy_delta: f64,
    /// Bias weight after over before the move; 1 without a bias
    pub bias_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trial<const D: usize> {
    /// The particle left the cluster and is dropped without an acceptance
    /// test. `released_energy` is its contribution before the move.
    Ejected { index: usize, released_energy: f64 },
    Move(MoveRecord<D>),
}

#[derive(Debug)]
pub struct Sampler {
    acceptance: Acceptance,
    temperature: f64,
    cluster: Option<ClusterCriterion>,
    draw: ReferenceDraw,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::metropolis()
    }
}

impl Sampler {
    pub fn metropolis() -> Self {
        Self {
            acceptance: Acceptance::Metropolis,
            temperature: 1.0,
            cluster: None,
            draw: ReferenceDraw::Uniform,
        }
    }

    pub fn umbrella(umbrella: Umbrella) -> Self {
        Self {
            acceptance: Acceptance::Umbrella(umbrella),
            ..Self::metropolis()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Result<Self> {
        ensure_positive("temperature", temperature)?;
        self.temperature = temperature;
        Ok(self)
    }

    pub fn with_cluster_criterion(mut self, criterion: ClusterCriterion) -> Self {
        self.cluster = Some(criterion);
        self
    }

    pub fn with_reference_draw(mut self, draw: ReferenceDraw) -> Self {
        self.draw = draw;
        self
    }

    pub fn acceptance(&self) -> &Acceptance {
        &self.acceptance
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn cluster_criterion(&self) -> Option<&ClusterCriterion> {
        self.cluster.as_ref()
    }

    /// Pick a particle, displace it with `mv` and evaluate the consequences.
    /// `None` for an empty configuration.
    pub fn propose_trial<const D: usize, F, R>(
        &self,
        forcefield: &F,
        positions: &[Vector<D>],
        mv: &Move,
        rng: &mut R,
    ) -> Option<Trial<D>>
    where
        F: ForceProvider<D>,
        R: Rng + ?Sized,
    {
        if positions.is_empty() {
            return None;
        }

        let index = rng.gen_range(0..positions.len());
        let old = positions[index];
        let (acc_old, e_old) = forcefield.particle_evaluate(positions, index, &old);

        let displacement = mv.propose(&acc_old, rng);
        let candidate = old + displacement;

        if let Some(cluster) = &self.cluster {
            if cluster.escapes(forcefield, positions, index, &candidate) {
                return Some(Trial::Ejected {
                    index,
                    released_energy: e_old,
                });
            }
        }

        let (acc_new, e_new) = forcefield.particle_evaluate(positions, index, &candidate);
        let bias_ratio = match &self.acceptance {
            Acceptance::Metropolis => 1.0,
            Acceptance::Umbrella(umbrella) => {
                umbrella.weight_ratio(forcefield, positions, index, &candidate)
            }
        };

        Some(Trial::Move(MoveRecord {
            index,
            displacement,
            candidate,
            acceleration: acc_new,
            acceleration_delta: acc_new - acc_old,
            energy_delta: e_new - e_old,
            bias_ratio,
        }))
    }

    /// Probability of accepting `record`; may exceed 1
    pub fn acceptance_probability<const D: usize>(&self, mv: &Move, record: &MoveRecord<D>) -> f64 {
        let correction = mv.correction_factor(&record.displacement, &record.acceleration_delta);
        let boltzmann = (-record.energy_delta / self.temperature).exp();
        correction * boltzmann * record.bias_ratio
    }

    pub fn decide<const D: usize, R: Rng + ?Sized>(
        &self,
        mv: &Move,
        record: &MoveRecord<D>,
        rng: &mut R,
    ) -> bool {
        let p = self.acceptance_probability(mv, record);
        let reference = match self.draw {
            ReferenceDraw::Uniform => rng.gen::<f64>(),
            ReferenceDraw::StandardNormal => rng.sample::<f64, _>(StandardNormal),
        };
        reference < p
    }
}
