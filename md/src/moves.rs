//! Single-particle trial displacements for Monte Carlo sampling
//!
//! Every move kind can propose a displacement from the particle's local
//! acceleration and report the ratio of reverse to forward proposal
//! densities, which the sampler folds into the acceptance probability.

use crate::error::{ensure_positive, Result, SimError};
use crate::state::Vector;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Tolerance on the sum of registered move weights
const WEIGHT_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Move {
    /// Uniform displacement in `[-dx/2, dx/2)` along each axis; symmetric
    Translation { dx: f64 },
    /// Drift along the local acceleration plus Gaussian noise of scale `dx`
    ForceBiased {
        dx: f64,
        /// Diffusion coefficient times time step
        diffusion: f64,
    },
}

impl Move {
    pub fn translation(dx: f64) -> Result<Self> {
        let mv = Move::Translation { dx };
        mv.validate()?;
        Ok(mv)
    }

    pub fn force_biased(dx: f64, diffusion: f64) -> Result<Self> {
        let mv = Move::ForceBiased { dx, diffusion };
        mv.validate()?;
        Ok(mv)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Move::Translation { dx } => ensure_positive("displacement scale", dx),
            Move::ForceBiased { dx, diffusion } => {
                ensure_positive("displacement scale", dx)?;
                ensure_positive("diffusion coefficient", diffusion)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Move::Translation { .. } => "translation",
            Move::ForceBiased { .. } => "force_biased",
        }
    }

    /// Draw a displacement for a particle feeling `acceleration`
    pub fn propose<const D: usize, R: Rng + ?Sized>(
        &self,
        acceleration: &Vector<D>,
        rng: &mut R,
    ) -> Vector<D> {
        match *self {
            Move::Translation { dx } => {
                Vector::<D>::from_fn(|_, _| (rng.gen::<f64>() - 0.5) * dx)
            }
            Move::ForceBiased { dx, diffusion } => {
                let noise = Vector::<D>::from_fn(|_, _| rng.sample::<f64, _>(StandardNormal));
                *acceleration * diffusion + noise * dx
            }
        }
    }

    /// Reverse over forward proposal density for a move that displaced the
    /// particle by `displacement` and changed its acceleration by
    /// `acceleration_delta`
    pub fn correction_factor<const D: usize>(
        &self,
        displacement: &Vector<D>,
        acceleration_delta: &Vector<D>,
    ) -> f64 {
        match self {
            Move::Translation { .. } => 1.0,
            Move::ForceBiased { .. } => (0.5 * acceleration_delta.dot(displacement)).exp() + 1.0,
        }
    }
}

/// Move kinds registered with relative selection probabilities
#[derive(Debug, Clone, Default)]
pub struct MoveSet {
    moves: Vec<Move>,
    weights: Vec<f64>,
}

impl MoveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a move kind. Each weight must lie in `(0, 1]` and the
    /// running total may not exceed 1.
    pub fn add(&mut self, mv: Move, weight: f64) -> Result<()> {
        mv.validate()?;
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(SimError::InvalidParameter {
                name: "move weight",
                value: weight,
            });
        }
        let total = self.total_weight() + weight;
        if total > 1.0 + WEIGHT_TOLERANCE {
            return Err(SimError::Config(format!(
                "move weights sum to {total}, which exceeds 1"
            )));
        }
        self.moves.push(mv);
        self.weights.push(weight);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Move, f64)> {
        self.moves.iter().zip(self.weights.iter().copied())
    }

    /// Check the registered weights form a probability distribution
    pub fn validate(&self) -> Result<()> {
        if self.moves.is_empty() {
            return Err(SimError::Config("no Monte Carlo moves registered".into()));
        }
        let total = self.total_weight();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(SimError::Config(format!(
                "move weights must sum to 1, got {total}"
            )));
        }
        Ok(())
    }

    /// Sampling table for [`MoveSet::choose`], built once per run
    pub fn distribution(&self) -> Result<WeightedIndex<f64>> {
        self.validate()?;
        WeightedIndex::new(&self.weights).map_err(|e| SimError::Config(e.to_string()))
    }

    pub fn choose<R: Rng + ?Sized>(&self, table: &WeightedIndex<f64>, rng: &mut R) -> &Move {
        &self.moves[table.sample(rng)]
    }
}
