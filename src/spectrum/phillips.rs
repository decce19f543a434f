//! Phillips spectrum fill
//!
//! P(k) = A · exp(-1/(kL)²) / k⁴ · exp(-k²l²), L = V²/g. Directional shaping is
//! left to the spreading channel, so the grid itself is omnidirectional.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::{SpectrumGrid, WaveSpectrum};
use crate::consts::DEFAULT_GRAVITY;
use crate::{signed_frequency, wrap_index};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhillipsSpectrum {
    /// Base tile size (m)
    pub tile_size: f32,
    /// Wind speed (m/s)
    pub wind_speed: f32,
    /// Phillips constant
    pub amplitude: f32,
    pub gravity: f32,
    /// Suppresses waves shorter than roughly this length (m)
    pub small_wave_cutoff: f32,
    /// Cosine-squared spreading strength stored in every cell (0 = isotropic)
    pub spreading: f32,
}

impl Default for PhillipsSpectrum {
    fn default() -> Self {
        Self {
            tile_size: 200.0,
            wind_speed: 10.0,
            amplitude: 0.0081,
            gravity: DEFAULT_GRAVITY,
            small_wave_cutoff: 0.1,
            spreading: 1.0,
        }
    }
}

impl PhillipsSpectrum {
    pub fn new(tile_size: f32, wind_speed: f32) -> Self {
        Self {
            tile_size,
            wind_speed,
            ..Self::default()
        }
    }

    /// Energy density at wavenumber `k`
    pub fn density(&self, k: f32) -> f32 {
        if k <= 0.0 {
            return 0.0;
        }
        let l = self.wind_speed * self.wind_speed / self.gravity;
        let k2 = k * k;
        self.amplitude * (-1.0 / (k2 * l * l)).exp() / (k2 * k2)
            * (-k2 * self.small_wave_cutoff * self.small_wave_cutoff).exp()
    }
}

/// Standard normal pair via Box-Muller
fn gaussian_pair(rng: &mut Pcg32) -> (f32, f32) {
    let u1 = 1.0 - rng.random::<f32>();
    let u2 = rng.random::<f32>();
    let r = (-2.0 * u1.ln()).sqrt();
    let (s, c) = (TAU * u2).sin_cos();
    (r * c, r * s)
}

impl WaveSpectrum for PhillipsSpectrum {
    fn tile_size(&self) -> f32 {
        self.tile_size
    }

    fn gravity(&self) -> f32 {
        self.gravity
    }

    fn wind_speed(&self) -> f32 {
        self.wind_speed
    }

    fn compute_spectrum(&self, grid: &mut SpectrumGrid, tile_scale: f32, max_resolution: usize, seed: u64) {
        let n = grid.resolution();
        let half = (n / 2) as i64;
        // Draws walk the largest lattice so a bin's value does not depend on n
        let lattice = max_resolution.max(n);

        let tile = self.tile_size * tile_scale;
        let dk = TAU / tile;
        let mut rng = Pcg32::seed_from_u64(seed);

        for j in 0..lattice {
            let sz = signed_frequency(j, lattice);
            for i in 0..lattice {
                let sx = signed_frequency(i, lattice);
                let (g1, g2) = gaussian_pair(&mut rng);
                if sx < -half || sx >= half || sz < -half || sz >= half {
                    continue;
                }

                let k = dk * ((sx * sx + sz * sz) as f32).sqrt();
                let amplitude = (self.density(k) * dk * dk * 0.5).sqrt();
                grid.set(
                    wrap_index(sx, n),
                    wrap_index(sz, n),
                    Vec3::new(g1 * amplitude, g2 * amplitude, self.spreading),
                );
            }
        }
    }
}
