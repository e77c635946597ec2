use approx::{assert_abs_diff_eq, assert_relative_eq};
use mdmc::config::StageConfig;
use mdmc::output::{Dump, DumpField, Thermo, ThermoField};
use mdmc::sampler::ClusterCriterion;
use mdmc::{
    ForceProvider, Integrator, LennardJones, Move, RunConfig, Sampler, Scheme, Simulation,
    TrialOutcome,
};
use nalgebra::{Vector2, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn lj3() -> LennardJones<3> {
    LennardJones::new(1.0, 1.0, 3.0).unwrap()
}

#[test]
fn two_particles_without_trials_report_shifted_pair_energy() {
    let positions = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.5, 0.0, 0.0)];
    let velocities = vec![Vector3::zeros(); 2];
    let mut sim = Simulation::new(lj3(), positions, velocities).unwrap().with_seed(1);
    sim.add_move(Move::translation(0.1).unwrap(), 1.0).unwrap();
    sim.run_mc(0).unwrap();

    let shift = 4.0 * (3.0f64.powi(-12) - 3.0f64.powi(-6));
    let expected = 4.0 * (1.5f64.powi(-12) - 1.5f64.powi(-6)) - shift;
    assert_relative_eq!(sim.state().potential_energy(), expected, epsilon = 1e-12);
    assert_eq!(sim.state().counters.trials, 0);
}

#[test]
fn isolated_particle_accepts_every_metropolis_trial() {
    let mut sim = Simulation::new(lj3(), vec![Vector3::new(0.3, -0.2, 1.0)], vec![Vector3::zeros()])
        .unwrap()
        .with_seed(2024);
    sim.add_move(Move::translation(0.01).unwrap(), 1.0).unwrap();
    sim.run_mc(1000).unwrap();

    let counters = sim.state().counters;
    assert_eq!(counters.trials, 1000);
    assert_relative_eq!(counters.acceptance_ratio(), 1.0);
    assert_eq!(sim.state().potential_energy(), 0.0);
}

#[test]
fn ejected_particle_reduces_count_by_one() {
    let positions = vec![
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(1.1, 0.0, 0.0),
        Vector3::new(0.55, 0.95, 0.0),
        Vector3::new(6.0, 0.0, 0.0),
    ];
    let velocities = vec![Vector3::zeros(); 4];
    let mut sim = Simulation::new(lj3(), positions, velocities).unwrap().with_seed(5);
    sim.set_sampler(
        Sampler::metropolis().with_cluster_criterion(ClusterCriterion::new(1.8).unwrap()),
    );

    let mv = Move::translation(0.05).unwrap();
    let mut ejected = None;
    for _ in 0..200 {
        if let TrialOutcome::Ejected { index, remaining } = sim.trial(&mv).unwrap() {
            ejected = Some((index, remaining));
            break;
        }
    }

    assert_eq!(ejected, Some((3, 3)));
    assert_eq!(sim.state().n_particles(), 3);
    let counters = sim.state().counters;
    assert!(counters.accepted < counters.trials);
    for p in sim.state().positions() {
        assert!(p.x < 2.0);
    }
}

#[test]
fn velocity_verlet_conserves_energy_of_a_dimer() {
    let positions = vec![Vector3::new(-0.65, 0.0, 0.0), Vector3::new(0.65, 0.0, 0.0)];
    let velocities = vec![Vector3::zeros(); 2];
    let mut sim = Simulation::new(lj3(), positions, velocities).unwrap();
    let e0 = sim.state().total_energy();

    sim.run_md(&Integrator::velocity_verlet(0.001).unwrap(), 10_000).unwrap();

    assert_abs_diff_eq!(sim.state().total_energy(), e0, epsilon = 1e-5);
    // the dimer only oscillates along its axis, symmetric about the origin
    let com: Vector3<f64> = sim.state().positions().iter().sum();
    assert_abs_diff_eq!(com.norm(), 0.0, epsilon = 1e-10);
}

#[test]
fn euler_drifts_more_than_verlet() {
    let run = |scheme| {
        let positions = vec![Vector2::new(0.0, 0.0), Vector2::new(1.3, 0.0)];
        let mut sim =
            Simulation::new(LennardJones::<2>::new(1.0, 1.0, 3.0).unwrap(), positions, vec![Vector2::zeros(); 2])
                .unwrap();
        let e0 = sim.state().total_energy();
        sim.run_md(&Integrator::new(scheme, 0.005).unwrap(), 2000).unwrap();
        (sim.state().total_energy() - e0).abs()
    };

    assert!(run(Scheme::Euler) > run(Scheme::VelocityVerlet));
}

#[test]
fn md_then_mc_from_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
dimension: 2
seed: 3
system:
  positions:
    type: cubic_lattice
    n_per_side: 3
    spacing: 1.12
  velocities:
    type: maxwell_boltzmann
    temperature: 0.2
stages:
  - type: md
    steps: 200
    time_step: 0.002
    scheme: velocity_verlet
  - type: mc
    steps: 500
    temperature: 0.5
    cluster_radius: 2.5
    moves:
      - move: { type: translation, dx: 0.05 }
        weight: 0.5
      - move: { type: force_biased, dx: 0.03, diffusion: 0.0005 }
        weight: 0.5
"#;
    let config = RunConfig::from_yaml(yaml).unwrap();
    let mut rng = StdRng::seed_from_u64(config.seed.unwrap());
    let positions = config.generate_positions::<2, _>(&mut rng).unwrap();
    let velocities = config.generate_velocities::<2, _>(positions.len(), &mut rng).unwrap();
    let mut sim = Simulation::new(config.forcefield::<2>().unwrap(), positions, velocities)
        .unwrap()
        .with_seed(9);

    let thermo_path = dir.path().join("thermo.dat");
    let dump_path = dir.path().join("traj.xyz");
    sim.add_observer(Box::new(
        Thermo::create(&thermo_path, 50, vec![ThermoField::Step, ThermoField::TotEng]).unwrap(),
    ));
    sim.add_observer(Box::new(
        Dump::<2, _>::create(&dump_path, 100, vec![DumpField::X, DumpField::Y]).unwrap(),
    ));

    for stage in &config.stages {
        match stage {
            StageConfig::Md(md) => sim.run_md(&md.integrator().unwrap(), md.steps).unwrap(),
            StageConfig::Mc(mc) => {
                sim.set_sampler(mc.sampler().unwrap());
                for m in &mc.moves {
                    sim.add_move(m.kind, m.weight).unwrap();
                }
                sim.run_mc(mc.steps).unwrap();
            }
        }
    }

    let state = sim.state();
    assert_eq!(state.counters.step, 700);
    assert_eq!(state.counters.trials, 500);
    assert!(state.counters.accepted > 0);
    assert!(state.n_particles() <= 9);
    let expected = sim.forcefield().potential_energy(state.positions());
    assert_relative_eq!(state.potential_energy(), expected, epsilon = 1e-12);

    let thermo = std::fs::read_to_string(&thermo_path).unwrap();
    assert_eq!(thermo.lines().count(), 1 + 700 / 50);
    let dump = std::fs::read_to_string(&dump_path).unwrap();
    assert_eq!(dump.lines().filter(|l| l.starts_with("step=")).count(), 7);

    let snapshot = dir.path().join("final.xyz");
    sim.snapshot(&snapshot, true).unwrap();
    let text = std::fs::read_to_string(&snapshot).unwrap();
    assert!(text.lines().nth(1).unwrap().ends_with("fields=x y vx vy"));
}
