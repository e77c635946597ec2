//! Bias functions for umbrella sampling
//!
//! A bias maps a normalized reaction coordinate and a window index to a
//! positive weight. The umbrella sampler multiplies its acceptance
//! probability by the ratio of weights after and before a move.

use crate::error::{ensure_positive, Result, SimError};
use libm::erf;
use std::f64::consts::{PI, SQRT_2};
use std::fmt;

pub trait Bias: fmt::Debug {
    /// Number of windows `L` the bias is split into
    fn windows(&self) -> usize;

    /// Weight of `coordinate` in `window`
    fn weight(&self, coordinate: f64, window: usize) -> f64;

    /// Integral over `[0, 1]` of the product of two windows' weights; small
    /// values between neighbours leave gaps in the sampled coordinate
    fn overlap(&self, a: usize, b: usize) -> f64;
}

/// `L` equally spaced Gaussian windows over the unit interval, each
/// normalized to unit integral on `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianWindows {
    width: f64,
    centers: Vec<f64>,
    norms: Vec<f64>,
}

impl GaussianWindows {
    pub fn new(windows: usize, width: f64) -> Result<Self> {
        if windows == 0 {
            return Err(SimError::Config("umbrella sampling needs at least one window".into()));
        }
        ensure_positive("window width", width)?;

        let centers: Vec<f64> = (0..windows)
            .map(|k| (k as f64 + 0.5) / windows as f64)
            .collect();
        let norms = centers
            .iter()
            .map(|&c| {
                let z = width * SQRT_2;
                width * (PI / 2.0).sqrt() * (erf((1.0 - c) / z) + erf(c / z))
            })
            .collect();

        Ok(Self {
            width,
            centers,
            norms,
        })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn center(&self, window: usize) -> f64 {
        self.centers[window]
    }

    /// Integral of window `window`'s unnormalized Gaussian over `[0, 1]`
    pub fn norm(&self, window: usize) -> f64 {
        self.norms[window]
    }
}

impl Bias for GaussianWindows {
    fn windows(&self) -> usize {
        self.centers.len()
    }

    fn weight(&self, coordinate: f64, window: usize) -> f64 {
        let d = coordinate - self.centers[window];
        (-d * d / (2.0 * self.width * self.width)).exp() / self.norms[window]
    }

    fn overlap(&self, a: usize, b: usize) -> f64 {
        let s = self.width;
        let (ca, cb) = (self.centers[a], self.centers[b]);
        let mid = 0.5 * (ca + cb);
        let prefactor = (-(ca - cb).powi(2) / (4.0 * s * s)).exp();
        let integral = 0.5 * s * PI.sqrt() * (erf((1.0 - mid) / s) + erf(mid / s));
        prefactor * integral / (self.norms[a] * self.norms[b])
    }
}
