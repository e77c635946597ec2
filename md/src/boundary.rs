use crate::error::{ensure_positive, Result};
use crate::state::Vector;

/// Simulation cell seen by the interaction model and the cluster criterion
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Boundary<const D: usize> {
    /// Unbounded space, plain Euclidean separations
    #[default]
    Open,
    /// Orthorhombic periodic cell with the given edge lengths
    Periodic { lengths: Vector<D> },
}

impl<const D: usize> Boundary<D> {
    pub fn periodic(lengths: Vector<D>) -> Result<Self> {
        for &l in lengths.iter() {
            ensure_positive("box length", l)?;
        }
        Ok(Boundary::Periodic { lengths })
    }

    /// Separation vector `a - b`, folded with the minimum-image convention
    /// in a periodic cell
    #[inline]
    pub fn separation(&self, a: &Vector<D>, b: &Vector<D>) -> Vector<D> {
        let mut d = a - b;
        if let Boundary::Periodic { lengths } = self {
            for k in 0..D {
                let l = lengths[k];
                d[k] -= l * (d[k] / l).round();
            }
        }
        d
    }

    /// Map a position back into the primary cell, `[0, L)` along each axis
    pub fn wrap(&self, mut pos: Vector<D>) -> Vector<D> {
        if let Boundary::Periodic { lengths } = self {
            for k in 0..D {
                let l = lengths[k];
                pos[k] -= l * (pos[k] / l).floor();
            }
        }
        pos
    }

    /// Largest cutoff the minimum-image convention supports, half the
    /// shortest edge; `None` for open space
    pub fn max_cutoff(&self) -> Option<f64> {
        match self {
            Boundary::Open => None,
            Boundary::Periodic { lengths } => Some(0.5 * lengths.iter().copied().fold(f64::INFINITY, f64::min)),
        }
    }

    /// Cell volume (area in 2D); `None` for open space
    pub fn volume(&self) -> Option<f64> {
        match self {
            Boundary::Open => None,
            Boundary::Periodic { lengths } => Some(lengths.iter().product()),
        }
    }
}
