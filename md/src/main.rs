//! Command-line entry point: runs the stages of a YAML run file

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use mdmc::config::{RunConfig, StageConfig};
use mdmc::output::{Dump, Thermo};
use mdmc::{init, LennardJones, Simulation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tracing::info;

mod cli;

use cli::{setup_output, Args};

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_output(args.output.as_ref());

    info!("Reading configuration from: {}", args.config_file);
    let mut config = RunConfig::from_file(&args.config_file)
        .wrap_err_with(|| format!("Unable to load configuration file: {}", args.config_file))?;

    if let Some(seed) = args.seed {
        info!("Overriding seed with: {}", seed);
        config.seed = Some(seed);
    }
    if let Some(dir) = &args.output_dir {
        info!("Overriding output directory with: {}", dir);
        config.output_dir = dir.into();
    }
    info!("Configuration loaded:\n{:?}", config);

    if args.check {
        info!("Configuration is valid");
        return Ok(());
    }

    match config.dimension {
        2 => run::<2>(&config),
        _ => run::<3>(&config),
    }
}

/// Build the system described by `config` and execute its stages in order
fn run<const D: usize>(config: &RunConfig) -> Result<()> {
    fs::create_dir_all(&config.output_dir).wrap_err_with(|| {
        format!(
            "Unable to create output directory: {}",
            config.output_dir.display()
        )
    })?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let positions = config.generate_positions::<D, _>(&mut rng)?;
    let velocities = config.generate_velocities::<D, _>(positions.len(), &mut rng)?;
    info!(
        "Generated {} particles, initial temperature {:.6}",
        positions.len(),
        init::temperature(&velocities)
    );

    let forcefield: LennardJones<D> = config.forcefield()?;
    if let Some(volume) = forcefield.boundary().volume() {
        info!(
            "Periodic cell volume {:.6}, number density {:.6}",
            volume,
            positions.len() as f64 / volume
        );
    }
    let mut sim = Simulation::new(forcefield, positions, velocities)?.with_seed(rng.gen());
    attach_observers(&mut sim, config)?;

    let output = &config.output;
    if let Some(file) = &output.initial_snapshot {
        sim.snapshot(config.output_path(file), output.snapshot_velocities)?;
    }

    for (i, stage) in config.stages.iter().enumerate() {
        match stage {
            StageConfig::Md(md) => {
                info!("Stage {}: molecular dynamics", i + 1);
                sim.run_md(&md.integrator()?, md.steps)?;
            }
            StageConfig::Mc(mc) => {
                info!("Stage {}: Monte Carlo", i + 1);
                sim.set_sampler(mc.sampler()?);
                sim.clear_moves();
                for m in &mc.moves {
                    sim.add_move(m.kind, m.weight)?;
                }
                sim.run_mc(mc.steps)?;
            }
        }
    }

    if let Some(file) = &output.final_snapshot {
        sim.snapshot(config.output_path(file), output.snapshot_velocities)?;
    }

    let state = sim.state();
    info!("Run finished after {} steps", state.counters.step);
    info!("  Particles:        {}", state.n_particles());
    info!("  Potential energy: {:.10}", state.potential_energy());
    info!("  Kinetic energy:   {:.10}", state.kinetic_energy());
    info!("  Total energy:     {:.10}", state.total_energy());
    Ok(())
}

fn attach_observers<const D: usize>(
    sim: &mut Simulation<D, LennardJones<D>>,
    config: &RunConfig,
) -> Result<()> {
    if let Some(dump) = &config.output.dump {
        let path = config.output_path(&dump.file);
        let fields = dump
            .fields
            .clone()
            .unwrap_or_else(|| Dump::<D, Vec<u8>>::default_fields(false));
        let observer = Dump::<D, _>::create(&path, dump.every, fields)
            .wrap_err_with(|| format!("Unable to open dump file: {}", path.display()))?;
        sim.add_observer(Box::new(observer));
        info!("Trajectory every {} steps to {}", dump.every, path.display());
    }
    if let Some(thermo) = &config.output.thermo {
        let path = config.output_path(&thermo.file);
        let observer = Thermo::create(&path, thermo.every, thermo.fields.clone())
            .wrap_err_with(|| format!("Unable to open thermo file: {}", path.display()))?;
        sim.add_observer(Box::new(observer));
        info!("Thermo every {} steps to {}", thermo.every, path.display());
    }
    Ok(())
}
