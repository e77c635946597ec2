use crate::error::{ensure_positive, Result};
use crate::lj_pot::ForceProvider;
use crate::state::Phase;
use itertools::izip;
use serde::{Deserialize, Serialize};

/// Finite-difference scheme used to advance a phase by one time step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// Forward Euler: positions and velocities both from the old state
    Euler,
    /// Semi-implicit Euler: velocity first, then position with the new velocity
    EulerCromer,
    /// Time-reversible velocity Verlet
    #[default]
    VelocityVerlet,
}

/// Fixed-step integrator. Holds no state besides the scheme and `dt`; the
/// force provider is lent for each call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    scheme: Scheme,
    dt: f64,
}

impl Integrator {
    pub fn new(scheme: Scheme, dt: f64) -> Result<Self> {
        ensure_positive("time step", dt)?;
        Ok(Self { scheme, dt })
    }

    pub fn velocity_verlet(dt: f64) -> Result<Self> {
        Self::new(Scheme::VelocityVerlet, dt)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Advance `phase` by `dt`, evaluating the force provider exactly once
    /// at the new positions
    pub fn advance<const D: usize, F: ForceProvider<D>>(
        &self,
        forcefield: &F,
        phase: &Phase<D>,
    ) -> Phase<D> {
        let dt = self.dt;
        let mut positions = phase.positions.clone();
        let mut velocities = phase.velocities.clone();

        match self.scheme {
            Scheme::Euler => {
                for (r, v, &a) in izip!(&mut positions, &mut velocities, &phase.accelerations) {
                    *r += *v * dt;
                    *v += a * dt;
                }
            }
            Scheme::EulerCromer => {
                for (r, v, &a) in izip!(&mut positions, &mut velocities, &phase.accelerations) {
                    *v += a * dt;
                    *r += *v * dt;
                }
            }
            Scheme::VelocityVerlet => {
                let half_dt2 = 0.5 * dt * dt;
                for (r, &v, &a) in izip!(&mut positions, &velocities, &phase.accelerations) {
                    *r += v * dt + a * half_dt2;
                }
            }
        }

        let (accelerations, potential_energy) = forcefield.evaluate(&positions);

        if self.scheme == Scheme::VelocityVerlet {
            let half_dt = 0.5 * dt;
            for (v, &a_old, &a_new) in izip!(&mut velocities, &phase.accelerations, &accelerations)
            {
                *v += (a_old + a_new) * half_dt;
            }
        }

        Phase {
            positions,
            velocities,
            accelerations,
            potential_energy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lj_pot::LennardJones;
    use crate::state::Vector;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// Uniform acceleration field, lets the update formulas be checked exactly
    struct ConstantField(Vector3<f64>);

    impl ForceProvider<3> for ConstantField {
        fn potential_energy(&self, positions: &[Vector<3>]) -> f64 {
            -positions.iter().map(|r| r.dot(&self.0)).sum::<f64>()
        }

        fn accelerations(&self, positions: &[Vector<3>]) -> Vec<Vector<3>> {
            vec![self.0; positions.len()]
        }

        fn evaluate(&self, positions: &[Vector<3>]) -> (Vec<Vector<3>>, f64) {
            (self.accelerations(positions), self.potential_energy(positions))
        }

        fn particle_evaluate(&self, _: &[Vector<3>], _: usize, at: &Vector<3>) -> (Vector<3>, f64) {
            (self.0, -at.dot(&self.0))
        }

        fn pair_acceleration(&self, _: &Vector<3>, _: &Vector<3>) -> Vector<3> {
            Vector3::zeros()
        }

        fn separation(&self, a: &Vector<3>, b: &Vector<3>) -> Vector<3> {
            a - b
        }
    }

    fn single(a: Vector3<f64>) -> Phase<3> {
        Phase {
            positions: vec![Vector3::zeros()],
            velocities: vec![Vector3::new(1.0, 0.0, 0.0)],
            accelerations: vec![a],
            potential_energy: 0.0,
        }
    }

    #[test]
    fn test_euler_uses_old_velocity() {
        let g = Vector3::new(0.0, -2.0, 0.0);
        let next = Integrator::new(Scheme::Euler, 0.1)
            .unwrap()
            .advance(&ConstantField(g), &single(g));
        assert_relative_eq!(next.positions[0].x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(next.positions[0].y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(next.velocities[0].y, -0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_euler_cromer_uses_new_velocity() {
        let g = Vector3::new(0.0, -2.0, 0.0);
        let next = Integrator::new(Scheme::EulerCromer, 0.1)
            .unwrap()
            .advance(&ConstantField(g), &single(g));
        assert_relative_eq!(next.positions[0].y, -0.02, epsilon = 1e-12);
        assert_relative_eq!(next.velocities[0].y, -0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_verlet_is_exact_for_constant_field() {
        let g = Vector3::new(0.0, -2.0, 0.0);
        let field = ConstantField(g);
        let integrator = Integrator::velocity_verlet(0.1).unwrap();
        let mut phase = single(g);
        for _ in 0..10 {
            phase = integrator.advance(&field, &phase);
        }
        // t = 1: y = -t^2, vy = -2t
        assert_relative_eq!(phase.positions[0].y, -1.0, epsilon = 1e-12);
        assert_relative_eq!(phase.velocities[0].y, -2.0, epsilon = 1e-12);
        assert_relative_eq!(phase.positions[0].x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(phase.potential_energy, 2.0 * -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_verlet_conserves_energy() {
        let lj = LennardJones::<3>::new(1.0, 1.0, 3.0).unwrap();
        let positions = vec![Vector3::new(-0.6, 0.0, 0.0), Vector3::new(0.6, 0.0, 0.0)];
        let (accelerations, potential_energy) = lj.evaluate(&positions);
        let mut phase = Phase {
            positions,
            velocities: vec![Vector3::zeros(); 2],
            accelerations,
            potential_energy,
        };
        let e0 = phase.potential_energy + phase.kinetic_energy();

        let integrator = Integrator::velocity_verlet(0.001).unwrap();
        let mut max_drift: f64 = 0.0;
        for _ in 0..5000 {
            phase = integrator.advance(&lj, &phase);
            let e = phase.potential_energy + phase.kinetic_energy();
            max_drift = max_drift.max((e - e0).abs());
        }
        assert!(max_drift < 1e-3 * e0.abs().max(1.0), "drift {max_drift}");

        // symmetric start stays symmetric
        assert_relative_eq!(phase.positions[0].x, -phase.positions[1].x, epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_non_positive_time_step() {
        assert!(Integrator::new(Scheme::Euler, 0.0).is_err());
        assert!(Integrator::new(Scheme::VelocityVerlet, -0.01).is_err());
    }
}
