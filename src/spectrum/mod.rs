//! Wave spectra
//!
//! A spectrum is supplied by the host through [`WaveSpectrum`], which fills a
//! square grid of complex amplitudes for one tile scale. Grids are stored in
//! FFT order: zero frequency at index 0, row-major `values[y * n + x]` where
//! `x` indexes `kx` and `y` indexes `kz`. Each cell is `(real, imag, spreading)`.

mod cache;
mod data;
mod phillips;
mod wave;

pub use cache::SpectrumCache;
pub use data::{ResolvedSpectrum, ShorelineHeap, SpectrumLayout};
pub use phillips::PhillipsSpectrum;
pub use wave::{DiscreteWave, Gerstner4, GerstnerWave, sort_waves};
pub(crate) use wave::directional_factor;

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::consts::NUM_SCALES;

/// Identity of a spectrum definition, assigned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpectrumId(pub u64);

impl fmt::Display for SpectrumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spectrum#{}", self.0)
    }
}

/// Host-supplied spectrum fill
pub trait WaveSpectrum: Send + Sync + fmt::Debug {
    /// Base tile size in meters, before per-scale multipliers
    fn tile_size(&self) -> f32;

    /// Gravity used for the dispersion relation of explicit waves
    fn gravity(&self) -> f32;

    /// Wind speed this spectrum was generated for (m/s)
    fn wind_speed(&self) -> f32;

    /// Fill `grid` with the spectrum of one tile, `tile_size() * tile_scale`
    /// meters wide. `max_resolution` is the largest resolution any grid of
    /// this spectrum is filled at. Must be deterministic in `seed`.
    fn compute_spectrum(&self, grid: &mut SpectrumGrid, tile_scale: f32, max_resolution: usize, seed: u64);
}

/// Square grid of complex amplitudes in FFT order
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumGrid {
    resolution: usize,
    values: Vec<Vec3>,
}

impl SpectrumGrid {
    pub fn new(resolution: usize) -> Self {
        Self {
            resolution,
            values: vec![Vec3::ZERO; resolution * resolution],
        }
    }

    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Vec3 {
        self.values[y * self.resolution + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: Vec3) {
        self.values[y * self.resolution + x] = value;
    }

    pub fn values(&self) -> &[Vec3] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [Vec3] {
        &mut self.values
    }

    /// Subsample into a lower resolution by keeping the lowest frequencies of
    /// each quadrant (`i < r/2` maps to `i`, otherwise to `R - r + i`)
    pub fn remap_to(&self, resolution: usize) -> SpectrumGrid {
        let half = resolution / 2;
        let quarter = self.resolution - resolution;
        let source = |i: usize| if i < half { i } else { quarter + i };

        let mut grid = SpectrumGrid::new(resolution);
        for y in 0..resolution {
            let sy = source(y);
            for x in 0..resolution {
                grid.values[y * resolution + x] = self.values[sy * self.resolution + source(x)];
            }
        }
        grid
    }
}

/// One grid per tile scale at a single resolution
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumLevel {
    resolution: usize,
    grids: [SpectrumGrid; NUM_SCALES],
}

impl SpectrumLevel {
    pub fn new(grids: [SpectrumGrid; NUM_SCALES]) -> Self {
        Self {
            resolution: grids[0].resolution(),
            grids,
        }
    }

    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    #[inline]
    pub fn grid(&self, scale: usize) -> &SpectrumGrid {
        &self.grids[scale]
    }

    pub fn remap_to(&self, resolution: usize) -> SpectrumLevel {
        SpectrumLevel::new(std::array::from_fn(|scale| self.grids[scale].remap_to(resolution)))
    }
}
