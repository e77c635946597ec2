//! Initial configurations and velocities
//!
//! These produce the positions and velocities a [`crate::Simulation`] is
//! built from. They run once, before any step.

use crate::error::{ensure_positive, Result, SimError};
use crate::state::Vector;
use rand::prelude::*;
use rand_distr::StandardNormal;

/// Simple cubic (square in 2D) lattice with `n_per_side` sites per axis
pub fn cubic_lattice<const D: usize>(
    n_per_side: usize,
    spacing: f64,
    offset: Vector<D>,
) -> Result<Vec<Vector<D>>> {
    ensure_positive("lattice spacing", spacing)?;
    Ok(grid::<D>(n_per_side)?
        .map(|cell| offset + cell * spacing)
        .collect())
}

/// Face-centred lattice of `cells` unit cells per axis filling a cube of
/// edge `length`. The basis is the cell origin plus the centre of every
/// face spanned by two axes: 4 sites per cell in 3D, 2 in 2D.
pub fn fcc_lattice<const D: usize>(cells: usize, length: f64) -> Result<Vec<Vector<D>>> {
    ensure_positive("lattice length", length)?;
    if cells == 0 {
        return Err(SimError::Config("lattice needs at least one cell".into()));
    }
    let a = length / cells as f64;

    let mut basis = vec![Vector::<D>::zeros()];
    for i in 0..D {
        for j in (i + 1)..D {
            let mut site = Vector::<D>::zeros();
            site[i] = 0.5;
            site[j] = 0.5;
            basis.push(site);
        }
    }

    let cells = grid::<D>(cells)?;
    let mut positions = Vec::with_capacity(cells.len() * basis.len());
    for cell in cells {
        for b in &basis {
            positions.push((cell + b) * a);
        }
    }
    Ok(positions)
}

/// Uniform random positions in `[0, box_lengths)` with every pair at least
/// `min_distance` apart
pub fn random_packing<const D: usize, R: Rng + ?Sized>(
    n_atoms: usize,
    box_lengths: Vector<D>,
    min_distance: f64,
    rng: &mut R,
) -> Result<Vec<Vector<D>>> {
    const MAX_ATTEMPTS: usize = 10_000;

    let min_d2 = min_distance * min_distance;
    let mut positions: Vec<Vector<D>> = Vec::with_capacity(n_atoms);
    for _ in 0..n_atoms {
        let mut placed = false;
        for _ in 0..MAX_ATTEMPTS {
            let candidate = box_lengths.map(|l| rng.gen::<f64>() * l);
            if positions.iter().all(|p| (candidate - p).norm_squared() >= min_d2) {
                positions.push(candidate);
                placed = true;
                break;
            }
        }
        if !placed {
            return Err(SimError::Config(format!(
                "could not place particle {} of {n_atoms} with minimum distance {min_distance}",
                positions.len() + 1
            )));
        }
    }
    Ok(positions)
}

/// Maxwell-Boltzmann velocities at `temperature` (unit mass, k_B = 1) with
/// the centre-of-mass motion removed and, for more than one particle,
/// rescaled to the exact temperature
pub fn maxwell_boltzmann<const D: usize, R: Rng + ?Sized>(
    n_atoms: usize,
    temperature: f64,
    rng: &mut R,
) -> Result<Vec<Vector<D>>> {
    ensure_positive("temperature", temperature)?;
    if n_atoms == 0 {
        return Ok(Vec::new());
    }

    let scale = temperature.sqrt();
    let mut velocities: Vec<Vector<D>> = (0..n_atoms)
        .map(|_| Vector::<D>::from_fn(|_, _| rng.sample::<f64, _>(StandardNormal)) * scale)
        .collect();

    let v_cm: Vector<D> = velocities.iter().sum::<Vector<D>>() / n_atoms as f64;
    for v in &mut velocities {
        *v -= v_cm;
    }

    if n_atoms > 1 {
        let current = velocities.iter().map(|v| v.norm_squared()).sum::<f64>()
            / (D as f64 * n_atoms as f64);
        if current > 0.0 {
            let factor = (temperature / current).sqrt();
            for v in &mut velocities {
                *v *= factor;
            }
        }
    }

    Ok(velocities)
}

/// Instantaneous temperature of unit-mass velocities, k_B = 1
pub fn temperature<const D: usize>(velocities: &[Vector<D>]) -> f64 {
    if velocities.is_empty() {
        return 0.0;
    }
    velocities.iter().map(|v| v.norm_squared()).sum::<f64>() / (D as f64 * velocities.len() as f64)
}

/// Integer lattice points `[0, n)^D`, first axis slowest
fn grid<const D: usize>(n: usize) -> Result<impl ExactSizeIterator<Item = Vector<D>>> {
    let total = n
        .checked_pow(D as u32)
        .ok_or_else(|| SimError::Config(format!("lattice of {n} sites per side is too large")))?;
    Ok((0..total).map(move |mut flat| {
        let mut point = Vector::<D>::zeros();
        for k in (0..D).rev() {
            point[k] = (flat % n) as f64;
            flat /= n;
        }
        point
    }))
}
