//! Trajectory and thermodynamic output
//!
//! Observers are handed the simulation state after every completed step or
//! trial and decide from the step counter whether to write anything.

use crate::error::{Result, SimError};
use crate::state::SimulationState;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub trait Observer<const D: usize> {
    /// Called with a fully updated state after each step or trial
    fn observe(&mut self, state: &SimulationState<D>) -> Result<()>;

    /// Flush buffered output at the end of a run
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Per-particle column of a dump frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpField {
    X,
    Y,
    Z,
    Vx,
    Vy,
    Vz,
    Ax,
    Ay,
    Az,
}

impl DumpField {
    pub const POSITIONS: [DumpField; 3] = [DumpField::X, DumpField::Y, DumpField::Z];
    pub const VELOCITIES: [DumpField; 3] = [DumpField::Vx, DumpField::Vy, DumpField::Vz];

    pub fn name(&self) -> &'static str {
        match self {
            DumpField::X => "x",
            DumpField::Y => "y",
            DumpField::Z => "z",
            DumpField::Vx => "vx",
            DumpField::Vy => "vy",
            DumpField::Vz => "vz",
            DumpField::Ax => "ax",
            DumpField::Ay => "ay",
            DumpField::Az => "az",
        }
    }

    fn axis(&self) -> usize {
        match self {
            DumpField::X | DumpField::Vx | DumpField::Ax => 0,
            DumpField::Y | DumpField::Vy | DumpField::Ay => 1,
            DumpField::Z | DumpField::Vz | DumpField::Az => 2,
        }
    }

    fn value<const D: usize>(&self, state: &SimulationState<D>, i: usize) -> f64 {
        let k = self.axis();
        match self {
            DumpField::X | DumpField::Y | DumpField::Z => state.positions()[i][k],
            DumpField::Vx | DumpField::Vy | DumpField::Vz => state.velocities()[i][k],
            DumpField::Ax | DumpField::Ay | DumpField::Az => state.accelerations()[i][k],
        }
    }
}

/// Writes XYZ-style frames: particle count, a comment line carrying the step
/// and the column names, then one row per particle
#[derive(Debug)]
pub struct Dump<const D: usize, W: Write> {
    writer: W,
    every: u64,
    fields: Vec<DumpField>,
}

impl<const D: usize> Dump<D, BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, every: u64, fields: Vec<DumpField>) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), every, fields)
    }
}

impl<const D: usize, W: Write> Dump<D, W> {
    pub fn new(writer: W, every: u64, fields: Vec<DumpField>) -> Result<Self> {
        if every == 0 {
            return Err(SimError::Config("dump stride must be positive".into()));
        }
        if fields.is_empty() {
            return Err(SimError::Config("dump needs at least one field".into()));
        }
        if let Some(f) = fields.iter().find(|f| f.axis() >= D) {
            return Err(SimError::Config(format!(
                "dump field `{}` does not exist in {D} dimensions",
                f.name()
            )));
        }
        Ok(Self {
            writer,
            every,
            fields,
        })
    }

    /// Position columns, optionally followed by velocity columns, for `D`
    pub fn default_fields(with_velocities: bool) -> Vec<DumpField> {
        let mut fields = DumpField::POSITIONS[..D.min(3)].to_vec();
        if with_velocities {
            fields.extend_from_slice(&DumpField::VELOCITIES[..D.min(3)]);
        }
        fields
    }

    pub fn write_frame(&mut self, state: &SimulationState<D>) -> Result<()> {
        let names: Vec<&str> = self.fields.iter().map(DumpField::name).collect();
        writeln!(self.writer, "{}", state.n_particles())?;
        writeln!(
            self.writer,
            "step={} fields={}",
            state.counters.step,
            names.join(" ")
        )?;
        for i in 0..state.n_particles() {
            let row: Vec<String> = self
                .fields
                .iter()
                .map(|f| format!("{:.10}", f.value(state, i)))
                .collect();
            writeln!(self.writer, "{}", row.join(" "))?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<const D: usize, W: Write> Observer<D> for Dump<D, W> {
    fn observe(&mut self, state: &SimulationState<D>) -> Result<()> {
        if state.counters.step % self.every == 0 {
            self.write_frame(state)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Scalar column of the thermo log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermoField {
    Step,
    Time,
    PotEng,
    KinEng,
    TotEng,
    NPar,
    #[serde(rename = "acc_ratio")]
    AccRatio,
}

impl ThermoField {
    pub fn name(&self) -> &'static str {
        match self {
            ThermoField::Step => "step",
            ThermoField::Time => "time",
            ThermoField::PotEng => "poteng",
            ThermoField::KinEng => "kineng",
            ThermoField::TotEng => "toteng",
            ThermoField::NPar => "npar",
            ThermoField::AccRatio => "acc_ratio",
        }
    }

    fn format<const D: usize>(&self, state: &SimulationState<D>) -> String {
        match self {
            ThermoField::Step => state.counters.step.to_string(),
            ThermoField::NPar => state.n_particles().to_string(),
            ThermoField::Time => format!("{:.6}", state.time),
            ThermoField::PotEng => format!("{:.10}", state.potential_energy()),
            ThermoField::KinEng => format!("{:.10}", state.kinetic_energy()),
            ThermoField::TotEng => format!("{:.10}", state.total_energy()),
            ThermoField::AccRatio => format!("{:.6}", state.counters.acceptance_ratio()),
        }
    }
}

/// Whitespace-separated table of scalar observables, one row per stride
#[derive(Debug)]
pub struct Thermo<W: Write> {
    writer: W,
    every: u64,
    fields: Vec<ThermoField>,
}

impl Thermo<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, every: u64, fields: Vec<ThermoField>) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), every, fields)
    }
}

impl<W: Write> Thermo<W> {
    pub fn new(mut writer: W, every: u64, fields: Vec<ThermoField>) -> Result<Self> {
        if every == 0 {
            return Err(SimError::Config("thermo stride must be positive".into()));
        }
        if fields.is_empty() {
            return Err(SimError::Config("thermo needs at least one field".into()));
        }
        let header: Vec<&str> = fields.iter().map(ThermoField::name).collect();
        writeln!(writer, "# {}", header.join(" "))?;
        Ok(Self {
            writer,
            every,
            fields,
        })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<const D: usize, W: Write> Observer<D> for Thermo<W> {
    fn observe(&mut self, state: &SimulationState<D>) -> Result<()> {
        if state.counters.step % self.every == 0 {
            let row: Vec<String> = self.fields.iter().map(|f| f.format(state)).collect();
            writeln!(self.writer, "{}", row.join(" "))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Write a single frame of positions (and optionally velocities) to `path`
pub fn write_snapshot<const D: usize, P: AsRef<Path>>(
    path: P,
    state: &SimulationState<D>,
    with_velocities: bool,
) -> Result<()> {
    let fields = Dump::<D, BufWriter<File>>::default_fields(with_velocities);
    let mut dump = Dump::<D, _>::create(path, 1, fields)?;
    dump.write_frame(state)?;
    dump.writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn state() -> SimulationState<3> {
        SimulationState::new(
            vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.5, 0.0, 0.0)],
            vec![Vector3::new(0.1, 0.0, 0.0), Vector3::zeros()],
        )
        .unwrap()
    }

    #[test]
    fn test_dump_frame_layout() {
        let fields = Dump::<3, Vec<u8>>::default_fields(true);
        let mut dump = Dump::<3, _>::new(Vec::new(), 1, fields).unwrap();
        dump.observe(&state()).unwrap();
        let text = String::from_utf8(dump.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "2");
        assert_eq!(lines[1], "step=0 fields=x y z vx vy vz");
        let row: Vec<f64> = lines[2].split_whitespace().map(|v| v.parse().unwrap()).collect();
        assert_eq!(row, vec![0.0, 0.0, 0.0, 0.1, 0.0, 0.0]);
    }

    #[test]
    fn test_dump_respects_stride() {
        let mut dump = Dump::<3, _>::new(Vec::new(), 2, vec![DumpField::X]).unwrap();
        let mut s = state();
        for step in 0..5 {
            s.counters.step = step;
            dump.observe(&s).unwrap();
        }
        let text = String::from_utf8(dump.into_inner()).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("step=")).count(), 3);
    }

    #[test]
    fn test_dump_rejects_missing_axis() {
        assert!(Dump::<2, _>::new(Vec::new(), 1, vec![DumpField::Z]).is_err());
        assert_eq!(
            Dump::<2, Vec<u8>>::default_fields(false),
            vec![DumpField::X, DumpField::Y]
        );
    }

    #[test]
    fn test_thermo_rows() {
        let fields = vec![ThermoField::Step, ThermoField::NPar, ThermoField::AccRatio];
        let mut thermo = Thermo::new(Vec::new(), 1, fields).unwrap();
        let mut s = state();
        s.counters.trials = 4;
        s.counters.accepted = 1;
        Observer::<3>::observe(&mut thermo, &s).unwrap();

        let text = String::from_utf8(thermo.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# step npar acc_ratio");
        assert_eq!(lines[1], "0 2 0.250000");
    }

    #[test]
    fn test_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.xyz");
        write_snapshot(&path, &state(), false).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("2\nstep=0 fields=x y z\n"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_field_names_deserialize() {
        let fields: Vec<ThermoField> = serde_yml::from_str("[step, poteng, acc_ratio]").unwrap();
        assert_eq!(fields, vec![ThermoField::Step, ThermoField::PotEng, ThermoField::AccRatio]);
        let dump: Vec<DumpField> = serde_yml::from_str("[x, vy]").unwrap();
        assert_eq!(dump, vec![DumpField::X, DumpField::Vy]);
    }
}
