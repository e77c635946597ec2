use crate::boundary::Boundary;
use crate::error::{ensure_positive, Result, SimError};
use crate::state::Vector;

/// Energy and acceleration evaluation over a configuration.
///
/// Implementations are pure: nothing here may mutate the provider, so the
/// same instance can be lent to the integrator and the sampler for a run.
pub trait ForceProvider<const D: usize> {
    /// Total potential energy of the configuration
    fn potential_energy(&self, positions: &[Vector<D>]) -> f64;

    /// Per-particle accelerations
    fn accelerations(&self, positions: &[Vector<D>]) -> Vec<Vector<D>>;

    /// Accelerations and total potential energy in a single pass
    fn evaluate(&self, positions: &[Vector<D>]) -> (Vec<Vector<D>>, f64);

    /// Acceleration of and energy felt by particle `index` if it sat at `at`,
    /// interacting with every other particle of `positions`
    fn particle_evaluate(
        &self,
        positions: &[Vector<D>],
        index: usize,
        at: &Vector<D>,
    ) -> (Vector<D>, f64);

    /// Acceleration a particle at `at` receives from a single particle at
    /// `other`
    fn pair_acceleration(&self, at: &Vector<D>, other: &Vector<D>) -> Vector<D>;

    /// Separation vector `a - b` as the provider measures it
    fn separation(&self, a: &Vector<D>, b: &Vector<D>) -> Vector<D>;

    /// Map a position into the provider's primary cell
    fn wrap(&self, pos: Vector<D>) -> Vector<D> {
        pos
    }
}

/// Truncated and shifted 12-6 Lennard-Jones pair potential
#[derive(Debug, Clone, PartialEq)]
pub struct LennardJones<const D: usize> {
    sigma: f64,
    epsilon: f64,
    cutoff: f64,
    cutoff2: f64,
    sigma2: f64,
    /// Potential value at the cutoff, subtracted from every retained pair
    shift: f64,
    boundary: Boundary<D>,
}

impl<const D: usize> LennardJones<D> {
    pub fn new(sigma: f64, epsilon: f64, cutoff: f64) -> Result<Self> {
        ensure_positive("sigma", sigma)?;
        ensure_positive("epsilon", epsilon)?;
        ensure_positive("cutoff", cutoff)?;

        let mut lj = LennardJones {
            sigma,
            epsilon,
            cutoff,
            cutoff2: cutoff * cutoff,
            sigma2: sigma * sigma,
            shift: 0.0,
            boundary: Boundary::Open,
        };
        lj.shift = lj.pair_potential(cutoff);
        Ok(lj)
    }

    /// Place the potential in `boundary`. A periodic cell must be at least
    /// twice the cutoff along every axis, otherwise pairs would interact
    /// through more than one image.
    pub fn with_boundary(mut self, boundary: Boundary<D>) -> Result<Self> {
        if let Some(limit) = boundary.max_cutoff() {
            if self.cutoff > limit {
                return Err(SimError::Config(format!(
                    "cutoff {} exceeds half the shortest periodic box edge ({})",
                    self.cutoff, limit
                )));
            }
        }
        self.boundary = boundary;
        Ok(self)
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Energy correction that makes the truncated potential vanish at the cutoff
    pub fn shift(&self) -> f64 {
        self.shift
    }

    pub fn boundary(&self) -> &Boundary<D> {
        &self.boundary
    }

    /// Unshifted pair potential `4ε[(σ/r)^12 - (σ/r)^6]`
    pub fn pair_potential(&self, r: f64) -> f64 {
        let inv_r2 = self.sigma2 / (r * r);
        let inv_r6 = inv_r2 * inv_r2 * inv_r2;
        4.0 * self.epsilon * (inv_r6 * inv_r6 - inv_r6)
    }

    /// Shifted energy and radial force factor `F/r` of a pair at squared
    /// distance `r2`. `None` when the pair is pruned by the cutoff or when a
    /// coincident pair makes the inverse powers diverge.
    #[inline]
    fn pair(&self, r2: f64) -> Option<(f64, f64)> {
        if r2 >= self.cutoff2 {
            return None;
        }
        let inv_r2 = self.sigma2 / r2;
        let inv_r6 = inv_r2 * inv_r2 * inv_r2;
        let inv_r12 = inv_r6 * inv_r6;
        let energy = 4.0 * self.epsilon * (inv_r12 - inv_r6) - self.shift;
        let f_over_r = 24.0 * self.epsilon * (2.0 * inv_r12 - inv_r6) / r2;
        if energy.is_finite() && f_over_r.is_finite() {
            Some((energy, f_over_r))
        } else {
            None
        }
    }
}

impl<const D: usize> ForceProvider<D> for LennardJones<D> {
    fn potential_energy(&self, positions: &[Vector<D>]) -> f64 {
        let n = positions.len();
        let mut energy = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let r2 = self.separation(&positions[i], &positions[j]).norm_squared();
                if let Some((e, _)) = self.pair(r2) {
                    energy += e;
                }
            }
        }
        energy
    }

    fn accelerations(&self, positions: &[Vector<D>]) -> Vec<Vector<D>> {
        self.evaluate(positions).0
    }

    fn evaluate(&self, positions: &[Vector<D>]) -> (Vec<Vector<D>>, f64) {
        let n = positions.len();
        let mut acc = vec![Vector::<D>::zeros(); n];
        let mut energy = 0.0;

        for i in 0..n {
            for j in (i + 1)..n {
                let rij = self.separation(&positions[i], &positions[j]);
                if let Some((e, f_over_r)) = self.pair(rij.norm_squared()) {
                    let fij = rij * f_over_r;
                    acc[i] += fij;
                    acc[j] -= fij;
                    energy += e;
                }
            }
        }

        (acc, energy)
    }

    fn particle_evaluate(
        &self,
        positions: &[Vector<D>],
        index: usize,
        at: &Vector<D>,
    ) -> (Vector<D>, f64) {
        let mut acc = Vector::<D>::zeros();
        let mut energy = 0.0;

        for (j, other) in positions.iter().enumerate() {
            if j == index {
                continue;
            }
            let rij = self.separation(at, other);
            if let Some((e, f_over_r)) = self.pair(rij.norm_squared()) {
                acc += rij * f_over_r;
                energy += e;
            }
        }

        (acc, energy)
    }

    fn pair_acceleration(&self, at: &Vector<D>, other: &Vector<D>) -> Vector<D> {
        let rij = self.separation(at, other);
        match self.pair(rij.norm_squared()) {
            Some((_, f_over_r)) => rij * f_over_r,
            None => Vector::<D>::zeros(),
        }
    }

    #[inline]
    fn separation(&self, a: &Vector<D>, b: &Vector<D>) -> Vector<D> {
        self.boundary.separation(a, b)
    }

    fn wrap(&self, pos: Vector<D>) -> Vector<D> {
        self.boundary.wrap(pos)
    }
}
