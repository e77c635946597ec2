use crate::error::Result;
use crate::lj_pot::ForceProvider;
use crate::moves::{Move, MoveSet};
use crate::output::{write_snapshot, Observer};
use crate::run_md::Integrator;
use crate::sampler::{Acceptance, Sampler, Trial};
use crate::state::{SimulationState, Vector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tracing::{debug, info};

/// Result of a single Monte Carlo trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    /// No particles left to move
    Empty,
    Accepted { index: usize },
    Rejected { index: usize },
    /// The particle left the cluster; `remaining` particles are still tracked
    Ejected { index: usize, remaining: usize },
}

/// Owns the simulation state and the force field, and drives molecular
/// dynamics and Monte Carlo runs over it
pub struct Simulation<const D: usize, F: ForceProvider<D>> {
    state: SimulationState<D>,
    forcefield: F,
    sampler: Sampler,
    moves: MoveSet,
    observers: Vec<Box<dyn Observer<D>>>,
    rng: StdRng,
}

impl<const D: usize, F: ForceProvider<D>> Simulation<D, F> {
    /// Bind a force field to an initial configuration and compute its
    /// accelerations and potential energy
    pub fn new(forcefield: F, positions: Vec<Vector<D>>, velocities: Vec<Vector<D>>) -> Result<Self> {
        let mut state = SimulationState::new(positions, velocities)?;
        let (accelerations, potential_energy) = forcefield.evaluate(state.positions());
        state.phase.accelerations = accelerations;
        state.phase.potential_energy = potential_energy;

        info!(
            "Initialized {} particles in {}D, potential energy {:.8}",
            state.n_particles(),
            D,
            potential_energy
        );

        Ok(Self {
            state,
            forcefield,
            sampler: Sampler::default(),
            moves: MoveSet::new(),
            observers: Vec::new(),
            rng: StdRng::from_entropy(),
        })
    }

    /// Reseed the random number generator for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> &SimulationState<D> {
        &self.state
    }

    pub fn forcefield(&self) -> &F {
        &self.forcefield
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn moves(&self) -> &MoveSet {
        &self.moves
    }

    pub fn set_sampler(&mut self, sampler: Sampler) {
        self.sampler = sampler;
    }

    /// Register a Monte Carlo move with its selection probability
    pub fn add_move(&mut self, mv: Move, weight: f64) -> Result<()> {
        self.moves.add(mv, weight)?;
        debug!("Registered {} move with weight {}", mv.name(), weight);
        Ok(())
    }

    /// Drop every registered move, e.g. before a stage with its own move set
    pub fn clear_moves(&mut self) {
        self.moves = MoveSet::new();
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer<D>>) {
        self.observers.push(observer);
    }

    /// Write the current positions, and optionally velocities, to `path`
    pub fn snapshot<P: AsRef<Path>>(&self, path: P, with_velocities: bool) -> Result<()> {
        write_snapshot(path.as_ref(), &self.state, with_velocities)?;
        info!("Snapshot saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Integrate the equations of motion for `steps` steps
    pub fn run_md(&mut self, integrator: &Integrator, steps: usize) -> Result<()> {
        info!(
            "Running {} MD steps with {:?}, dt = {}",
            steps,
            integrator.scheme(),
            integrator.dt()
        );

        for _ in 0..steps {
            let mut next = integrator.advance(&self.forcefield, &self.state.phase);
            for r in &mut next.positions {
                *r = self.forcefield.wrap(*r);
            }
            self.state.phase = next;
            self.state.time += integrator.dt();
            self.state.counters.step += 1;
            self.notify()?;
        }
        self.finish_observers()?;

        info!(
            "MD finished: potential {:.8}, kinetic {:.8}, total {:.8}",
            self.state.potential_energy(),
            self.state.kinetic_energy(),
            self.state.total_energy()
        );
        Ok(())
    }

    /// Perform `steps` Monte Carlo trials, each with a move kind drawn from
    /// the registered weights
    pub fn run_mc(&mut self, steps: usize) -> Result<()> {
        let table = self.moves.distribution()?;
        self.state.counters.reset_trials();
        info!(
            "Running {} MC trials over {} move kinds at T = {}",
            steps,
            self.moves.len(),
            self.sampler.temperature()
        );
        if let Acceptance::Umbrella(umbrella) = self.sampler.acceptance() {
            let (k, bias) = (umbrella.window(), umbrella.bias());
            let below = k.checked_sub(1).map(|m| bias.overlap(k, m));
            let above = (k + 1 < bias.windows()).then(|| bias.overlap(k, k + 1));
            info!(
                "Umbrella window {} of {}, overlap below {:?}, above {:?}",
                k,
                bias.windows(),
                below,
                above
            );
        }

        for _ in 0..steps {
            let mv = *self.moves.choose(&table, &mut self.rng);
            self.trial(&mv)?;
        }

        // Resync with a full evaluation to drop accumulated rounding error
        let (accelerations, potential_energy) = self.forcefield.evaluate(self.state.positions());
        debug!(
            "MC energy bookkeeping drift: {:.3e}",
            potential_energy - self.state.phase.potential_energy
        );
        self.state.phase.accelerations = accelerations;
        self.state.phase.potential_energy = potential_energy;
        self.finish_observers()?;

        info!(
            "MC finished: {} particles, potential {:.8}, acceptance ratio {:.4}",
            self.state.n_particles(),
            self.state.potential_energy(),
            self.state.counters.acceptance_ratio()
        );
        Ok(())
    }

    /// Run one Monte Carlo trial with `mv` and commit its outcome
    pub fn trial(&mut self, mv: &Move) -> Result<TrialOutcome> {
        let proposed =
            self.sampler
                .propose_trial(&self.forcefield, self.state.positions(), mv, &mut self.rng);

        let outcome = match proposed {
            None => TrialOutcome::Empty,
            Some(Trial::Ejected {
                index,
                released_energy,
            }) => {
                let leaving = self.state.phase.positions[index];
                self.shift_neighbour_accelerations(index, Some(leaving), None);
                self.state.remove_particle(index);
                self.state.phase.potential_energy -= released_energy;
                let remaining = self.state.n_particles();
                info!("Particle {} left the cluster, {} remaining", index, remaining);
                TrialOutcome::Ejected { index, remaining }
            }
            Some(Trial::Move(record)) => {
                if self.sampler.decide(mv, &record, &mut self.rng) {
                    let i = record.index;
                    let old = self.state.phase.positions[i];
                    let new = self.forcefield.wrap(record.candidate);
                    self.shift_neighbour_accelerations(i, Some(old), Some(new));
                    self.state.phase.positions[i] = new;
                    self.state.phase.accelerations[i] = record.acceleration;
                    self.state.phase.potential_energy += record.energy_delta;
                    self.state.counters.accepted += 1;
                    TrialOutcome::Accepted { index: i }
                } else {
                    TrialOutcome::Rejected {
                        index: record.index,
                    }
                }
            }
        };

        if outcome != TrialOutcome::Empty {
            self.state.counters.trials += 1;
        }
        self.state.counters.step += 1;
        self.notify()?;
        Ok(outcome)
    }

    /// Replace particle `i`'s pull on every other particle, sitting at `from`
    /// before and at `to` after. `None` means no particle there.
    fn shift_neighbour_accelerations(
        &mut self,
        i: usize,
        from: Option<Vector<D>>,
        to: Option<Vector<D>>,
    ) {
        let forcefield = &self.forcefield;
        let phase = &mut self.state.phase;
        for (j, (r_j, a_j)) in phase
            .positions
            .iter()
            .zip(phase.accelerations.iter_mut())
            .enumerate()
        {
            if j == i {
                continue;
            }
            if let Some(from) = &from {
                *a_j -= forcefield.pair_acceleration(r_j, from);
            }
            if let Some(to) = &to {
                *a_j += forcefield.pair_acceleration(r_j, to);
            }
        }
    }

    fn notify(&mut self) -> Result<()> {
        for observer in &mut self.observers {
            observer.observe(&self.state)?;
        }
        Ok(())
    }

    fn finish_observers(&mut self) -> Result<()> {
        for observer in &mut self.observers {
            observer.finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lj_pot::LennardJones;
    use crate::output::Thermo;
    use crate::output::ThermoField;
    use crate::sampler::ClusterCriterion;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn cluster() -> Simulation<3, LennardJones<3>> {
        let positions = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.12, 0.0, 0.0),
            Vector3::new(0.56, 0.97, 0.0),
            Vector3::new(0.56, 0.32, 0.91),
        ];
        let velocities = vec![Vector3::zeros(); 4];
        let lj = LennardJones::new(1.0, 1.0, 3.0).unwrap();
        Simulation::new(lj, positions, velocities).unwrap().with_seed(21)
    }

    #[test]
    fn test_construction_evaluates_forcefield() {
        let sim = cluster();
        let expected = sim.forcefield().potential_energy(sim.state().positions());
        assert_relative_eq!(sim.state().potential_energy(), expected);
        assert!(sim.state().potential_energy() < 0.0);
    }

    #[test]
    fn test_mc_requires_valid_moves() {
        let mut sim = cluster();
        assert!(sim.run_mc(10).is_err());
        sim.add_move(Move::translation(0.05).unwrap(), 0.4).unwrap();
        assert!(sim.run_mc(10).is_err());
        assert_eq!(sim.state().counters.step, 0);
    }

    #[test]
    fn test_mc_energy_bookkeeping_stays_consistent() {
        let mut sim = cluster();
        sim.add_move(Move::translation(0.1).unwrap(), 0.5).unwrap();
        sim.add_move(Move::force_biased(0.05, 0.001).unwrap(), 0.5).unwrap();

        let mv = Move::translation(0.1).unwrap();
        for _ in 0..200 {
            sim.trial(&mv).unwrap();
        }
        let tracked = sim.state().potential_energy();
        let actual = sim.forcefield().potential_energy(sim.state().positions());
        assert_relative_eq!(tracked, actual, epsilon = 1e-9);
        assert_eq!(sim.state().counters.trials, 200);
        assert!(sim.state().counters.accepted > 0);

        sim.run_mc(100).unwrap();
        assert_eq!(sim.state().counters.trials, 100);
        assert_eq!(sim.state().counters.step, 300);
        let acc = sim.forcefield().accelerations(sim.state().positions());
        assert_eq!(sim.state().accelerations(), acc.as_slice());
    }

    fn assert_accelerations_current(sim: &Simulation<3, LennardJones<3>>) {
        let fresh = sim.forcefield().accelerations(sim.state().positions());
        for (stored, expected) in sim.state().accelerations().iter().zip(&fresh) {
            let scale = 1.0 + expected.norm();
            assert!((stored - expected).norm() < 1e-9 * scale);
        }
    }

    #[test]
    fn test_accelerations_stay_current_after_every_trial() {
        let mut sim = cluster();
        let mv = Move::translation(0.3).unwrap();
        let mut accepted = 0;
        for _ in 0..50 {
            if let TrialOutcome::Accepted { .. } = sim.trial(&mv).unwrap() {
                accepted += 1;
            }
            assert_accelerations_current(&sim);
        }
        assert!(accepted > 0);
    }

    #[test]
    fn test_rejected_trial_leaves_configuration_unchanged() {
        let mut sim = cluster();
        sim.set_sampler(Sampler::metropolis().with_temperature(1e-12).unwrap());
        let mv = Move::translation(0.5).unwrap();

        let mut rejected = 0;
        for _ in 0..50 {
            let before = sim.state().positions().to_vec();
            let energy = sim.state().potential_energy();
            if let TrialOutcome::Rejected { .. } = sim.trial(&mv).unwrap() {
                assert_eq!(sim.state().positions(), before.as_slice());
                assert_eq!(sim.state().potential_energy(), energy);
                rejected += 1;
            }
        }
        assert!(rejected > 0);
    }

    #[test]
    fn test_ejection_shrinks_every_array() {
        let positions = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.1, 0.0, 0.0),
            Vector3::new(1.1 + 2.5, 0.0, 0.0),
        ];
        let velocities = vec![Vector3::zeros(); 3];
        let lj = LennardJones::new(1.0, 1.0, 3.0).unwrap();
        let mut sim = Simulation::new(lj, positions, velocities).unwrap().with_seed(8);
        sim.set_sampler(
            Sampler::metropolis().with_cluster_criterion(ClusterCriterion::new(2.0).unwrap()),
        );

        let mv = Move::translation(0.01).unwrap();
        let mut outcome = TrialOutcome::Empty;
        for _ in 0..100 {
            outcome = sim.trial(&mv).unwrap();
            if matches!(outcome, TrialOutcome::Ejected { .. }) {
                break;
            }
        }

        assert_eq!(outcome, TrialOutcome::Ejected { index: 2, remaining: 2 });
        assert_eq!(sim.state().n_particles(), 2);
        assert_eq!(sim.state().velocities().len(), 2);
        assert_eq!(sim.state().accelerations().len(), 2);
        assert_accelerations_current(&sim);
        let actual = sim.forcefield().potential_energy(sim.state().positions());
        assert_relative_eq!(sim.state().potential_energy(), actual, epsilon = 1e-9);
    }

    #[test]
    fn test_md_advances_time_and_notifies() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let buffer = Shared::default();
        let thermo = Thermo::new(buffer.clone(), 5, vec![ThermoField::Step, ThermoField::Time]).unwrap();

        let mut sim = cluster();
        sim.add_observer(Box::new(thermo));
        sim.run_md(&Integrator::velocity_verlet(0.002).unwrap(), 20).unwrap();

        assert_eq!(sim.state().counters.step, 20);
        assert_relative_eq!(sim.state().time, 0.04, epsilon = 1e-12);
        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 1 + 4);
    }
}
