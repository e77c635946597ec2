use crate::bias::GaussianWindows;
use crate::boundary::Boundary;
use crate::error::{ensure_positive, Result, SimError};
use crate::init;
use crate::lj_pot::LennardJones;
use crate::moves::{Move, MoveSet};
use crate::output::{DumpField, ThermoField};
use crate::run_md::{Integrator, Scheme};
use crate::sampler::{ClusterCriterion, ReferenceDraw, Sampler, Umbrella};
use crate::state::Vector;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration of a complete run: system, potential, stages and output
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RunConfig {
    /// Spatial dimension, 2 or 3
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Seed for every random draw of the run; entropy when absent
    pub seed: Option<u64>,
    /// Directory all output files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub system: SystemConfig,
    #[serde(default)]
    pub potential: PotentialConfig,
    /// Stages executed in order on the same state
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Initial configuration of the particles
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    pub positions: PositionConfig,
    #[serde(default)]
    pub velocities: VelocityConfig,
    #[serde(default)]
    pub boundary: BoundaryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionConfig {
    /// Explicit list of coordinates, one row per particle
    Explicit { coords: Vec<Vec<f64>> },
    /// Simple cubic (square in 2D) lattice
    CubicLattice {
        n_per_side: usize,
        spacing: f64,
        offset: Option<Vec<f64>>,
    },
    /// Face-centred lattice of `cells` unit cells per side filling `length`
    FccLattice { cells: usize, length: f64 },
    /// Random positions in a box with a minimum pair distance
    Random {
        n_atoms: usize,
        box_lengths: Vec<f64>,
        min_distance: f64,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VelocityConfig {
    #[default]
    Zero,
    Explicit { velocities: Vec<Vec<f64>> },
    /// Maxwell-Boltzmann distribution at the given reduced temperature
    MaxwellBoltzmann { temperature: f64 },
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoundaryConfig {
    #[default]
    Open,
    Periodic { lengths: Vec<f64> },
}

/// Lennard-Jones parameters in reduced units
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PotentialConfig {
    #[serde(default = "default_one")]
    pub sigma: f64,
    #[serde(default = "default_one")]
    pub epsilon: f64,
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
}

impl Default for PotentialConfig {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            epsilon: 1.0,
            cutoff: default_cutoff(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageConfig {
    /// Molecular dynamics
    Md(MdStage),
    /// Monte Carlo sampling
    Mc(McStage),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MdStage {
    pub steps: usize,
    pub time_step: f64,
    #[serde(default)]
    pub scheme: Scheme,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct McStage {
    pub steps: usize,
    pub moves: Vec<WeightedMove>,
    #[serde(default = "default_one")]
    pub temperature: f64,
    #[serde(default)]
    pub reference_draw: ReferenceDraw,
    /// Stillinger cluster radius; no particle is ever ejected when absent
    pub cluster_radius: Option<f64>,
    /// Metropolis acceptance when absent
    pub umbrella: Option<UmbrellaConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WeightedMove {
    #[serde(rename = "move")]
    pub kind: Move,
    pub weight: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UmbrellaConfig {
    pub windows: usize,
    pub width: f64,
    /// Window this stage samples in
    pub window: usize,
    /// Length that maps the centroid distance onto `[0, 1]`
    pub scale: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OutputConfig {
    pub dump: Option<DumpConfig>,
    pub thermo: Option<ThermoConfig>,
    pub initial_snapshot: Option<PathBuf>,
    pub final_snapshot: Option<PathBuf>,
    #[serde(default)]
    pub snapshot_velocities: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DumpConfig {
    #[serde(default = "default_dump_file")]
    pub file: PathBuf,
    #[serde(default = "default_every")]
    pub every: u64,
    /// Positions of every axis when absent
    pub fields: Option<Vec<DumpField>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ThermoConfig {
    #[serde(default = "default_thermo_file")]
    pub file: PathBuf,
    #[serde(default = "default_every")]
    pub every: u64,
    #[serde(default = "default_thermo_fields")]
    pub fields: Vec<ThermoField>,
}

// Default value functions
fn default_dimension() -> usize {
    3
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_one() -> f64 {
    1.0
}
fn default_cutoff() -> f64 {
    3.0
}
fn default_every() -> u64 {
    100
}
fn default_dump_file() -> PathBuf {
    PathBuf::from("trajectory.xyz")
}
fn default_thermo_file() -> PathBuf {
    PathBuf::from("thermo.dat")
}
fn default_thermo_fields() -> Vec<ThermoField> {
    vec![
        ThermoField::Step,
        ThermoField::Time,
        ThermoField::PotEng,
        ThermoField::KinEng,
        ThermoField::TotEng,
        ThermoField::NPar,
        ThermoField::AccRatio,
    ]
}

fn to_vector<const D: usize>(what: &'static str, row: &[f64]) -> Result<Vector<D>> {
    if row.len() != D {
        return Err(SimError::Shape {
            what,
            expected: D,
            found: row.len(),
        });
    }
    Ok(Vector::<D>::from_column_slice(row))
}

impl RunConfig {
    /// Load configuration from a YAML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: RunConfig = serde_yml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check every parameter before any step runs
    pub fn validate(&self) -> Result<()> {
        let d = self.dimension;
        if d != 2 && d != 3 {
            return Err(SimError::Config(format!("dimension must be 2 or 3, got {d}")));
        }

        let rows_match = |what: &'static str, rows: &[Vec<f64>]| -> Result<()> {
            match rows.iter().find(|r| r.len() != d) {
                Some(r) => Err(SimError::Shape {
                    what,
                    expected: d,
                    found: r.len(),
                }),
                None => Ok(()),
            }
        };

        // System
        match &self.system.positions {
            PositionConfig::Explicit { coords } => rows_match("explicit coordinates", coords)?,
            PositionConfig::CubicLattice {
                spacing, offset, ..
            } => {
                ensure_positive("lattice spacing", *spacing)?;
                if let Some(offset) = offset {
                    rows_match("lattice offset", std::slice::from_ref(offset))?;
                }
            }
            PositionConfig::FccLattice { cells, length } => {
                if *cells == 0 {
                    return Err(SimError::Config("Lattice needs at least one cell".into()));
                }
                ensure_positive("lattice length", *length)?;
            }
            PositionConfig::Random {
                box_lengths,
                min_distance,
                ..
            } => {
                rows_match("random box", std::slice::from_ref(box_lengths))?;
                for &l in box_lengths {
                    ensure_positive("box length", l)?;
                }
                if !(min_distance.is_finite() && *min_distance >= 0.0) {
                    return Err(SimError::Config(format!(
                        "Minimum distance must be non-negative, got {min_distance}"
                    )));
                }
            }
        }
        match &self.system.velocities {
            VelocityConfig::Zero => {}
            VelocityConfig::Explicit { velocities } => {
                rows_match("explicit velocities", velocities)?;
                if let PositionConfig::Explicit { coords } = &self.system.positions {
                    if coords.len() != velocities.len() {
                        return Err(SimError::Shape {
                            what: "explicit velocities",
                            expected: coords.len(),
                            found: velocities.len(),
                        });
                    }
                }
            }
            VelocityConfig::MaxwellBoltzmann { temperature } => {
                ensure_positive("temperature", *temperature)?;
            }
        }
        if let BoundaryConfig::Periodic { lengths } = &self.system.boundary {
            rows_match("periodic box", std::slice::from_ref(lengths))?;
            for &l in lengths {
                ensure_positive("box length", l)?;
            }
        }

        // Potential
        ensure_positive("sigma", self.potential.sigma)?;
        ensure_positive("epsilon", self.potential.epsilon)?;
        ensure_positive("cutoff", self.potential.cutoff)?;
        if let BoundaryConfig::Periodic { lengths } = &self.system.boundary {
            let shortest = lengths.iter().copied().fold(f64::INFINITY, f64::min);
            if self.potential.cutoff > 0.5 * shortest {
                return Err(SimError::Config(format!(
                    "cutoff {} exceeds half the shortest periodic box edge {}",
                    self.potential.cutoff, shortest
                )));
            }
        }

        // Stages
        if self.stages.is_empty() {
            return Err(SimError::Config("At least one stage is required".into()));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            match stage {
                StageConfig::Md(md) => {
                    if md.steps == 0 {
                        return Err(SimError::Config(format!("Stage {i}: steps must be positive")));
                    }
                    md.integrator()?;
                }
                StageConfig::Mc(mc) => {
                    if mc.steps == 0 {
                        return Err(SimError::Config(format!("Stage {i}: steps must be positive")));
                    }
                    mc.move_set()?.validate()?;
                    mc.sampler()?;
                }
            }
        }

        // Output
        if let Some(dump) = &self.output.dump {
            if dump.every == 0 {
                return Err(SimError::Config("Dump interval must be positive".into()));
            }
            if let Some(fields) = &dump.fields {
                if fields.is_empty() {
                    return Err(SimError::Config("Dump needs at least one field".into()));
                }
            }
        }
        if let Some(thermo) = &self.output.thermo {
            if thermo.every == 0 {
                return Err(SimError::Config("Thermo interval must be positive".into()));
            }
            if thermo.fields.is_empty() {
                return Err(SimError::Config("Thermo needs at least one field".into()));
            }
        }

        Ok(())
    }

    /// Generate initial positions; `rng` is only drawn from for random packing
    pub fn generate_positions<const D: usize, R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<Vector<D>>> {
        match &self.system.positions {
            PositionConfig::Explicit { coords } => coords
                .iter()
                .map(|c| to_vector::<D>("explicit coordinates", c))
                .collect(),
            PositionConfig::CubicLattice {
                n_per_side,
                spacing,
                offset,
            } => {
                let offset = match offset {
                    Some(o) => to_vector::<D>("lattice offset", o)?,
                    None => Vector::<D>::zeros(),
                };
                init::cubic_lattice::<D>(*n_per_side, *spacing, offset)
            }
            PositionConfig::FccLattice { cells, length } => init::fcc_lattice::<D>(*cells, *length),
            PositionConfig::Random {
                n_atoms,
                box_lengths,
                min_distance,
            } => {
                let box_lengths = to_vector::<D>("random box", box_lengths)?;
                init::random_packing(*n_atoms, box_lengths, *min_distance, rng)
            }
        }
    }

    /// Generate initial velocities for `n_atoms` particles
    pub fn generate_velocities<const D: usize, R: Rng + ?Sized>(
        &self,
        n_atoms: usize,
        rng: &mut R,
    ) -> Result<Vec<Vector<D>>> {
        match &self.system.velocities {
            VelocityConfig::Zero => Ok(vec![Vector::<D>::zeros(); n_atoms]),
            VelocityConfig::Explicit { velocities } => {
                if velocities.len() != n_atoms {
                    return Err(SimError::Shape {
                        what: "explicit velocities",
                        expected: n_atoms,
                        found: velocities.len(),
                    });
                }
                velocities
                    .iter()
                    .map(|v| to_vector::<D>("explicit velocities", v))
                    .collect()
            }
            VelocityConfig::MaxwellBoltzmann { temperature } => {
                init::maxwell_boltzmann::<D, _>(n_atoms, *temperature, rng)
            }
        }
    }

    pub fn boundary<const D: usize>(&self) -> Result<Boundary<D>> {
        match &self.system.boundary {
            BoundaryConfig::Open => Ok(Boundary::Open),
            BoundaryConfig::Periodic { lengths } => {
                Boundary::periodic(to_vector::<D>("periodic box", lengths)?)
            }
        }
    }

    pub fn forcefield<const D: usize>(&self) -> Result<LennardJones<D>> {
        let p = &self.potential;
        LennardJones::new(p.sigma, p.epsilon, p.cutoff)?.with_boundary(self.boundary()?)
    }

    /// Path of `file` inside the output directory
    pub fn output_path(&self, file: &Path) -> PathBuf {
        self.output_dir.join(file)
    }
}

impl MdStage {
    pub fn integrator(&self) -> Result<Integrator> {
        Integrator::new(self.scheme, self.time_step)
    }
}

impl McStage {
    pub fn move_set(&self) -> Result<MoveSet> {
        let mut set = MoveSet::new();
        for m in &self.moves {
            set.add(m.kind, m.weight)?;
        }
        Ok(set)
    }

    pub fn sampler(&self) -> Result<Sampler> {
        let sampler = match &self.umbrella {
            None => Sampler::metropolis(),
            Some(u) => {
                let windows = GaussianWindows::new(u.windows, u.width)?;
                Sampler::umbrella(Umbrella::new(Box::new(windows), u.window, u.scale)?)
            }
        };
        let mut sampler = sampler
            .with_temperature(self.temperature)?
            .with_reference_draw(self.reference_draw);
        if let Some(radius) = self.cluster_radius {
            sampler = sampler.with_cluster_criterion(ClusterCriterion::new(radius)?);
        }
        Ok(sampler)
    }
}
