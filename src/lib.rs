//! Oceanwaves - CPU synthesis and point sampling of a wind-driven ocean
//!
//! Core modules:
//! - `spectrum`: resolved wave spectra, explicit waves, shoreline candidates
//! - `fft`: scalar radix-2 inverse FFT producing displacement/force tiles
//! - `resolver`: adaptive resolution controller and the point-sampling API
//! - `water`: host-facing facade (profiles, wind, tile sizes)
//! - `particles`: quadtree of wave-particle chains for shoreline effects
//! - `settings`: data-driven quality presets and tuning

pub mod error;
pub mod fft;
pub mod particles;
pub mod resolver;
pub mod settings;
pub mod spectrum;
pub mod water;

pub use error::ConfigError;
pub use particles::{WaveParticle, WavesParticleSystem};
pub use resolver::SpectrumResolver;
pub use settings::{ParticleSettings, QualityLevel, WavesSettings};
pub use spectrum::{DiscreteWave, PhillipsSpectrum, SpectrumId, WaveSpectrum};
pub use water::{WaterParams, WeightedProfile, WindWaves};

use std::ops::{Add, Mul};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Simulation constants
pub mod consts {
    /// Number of tile scales simulated side by side
    pub const NUM_SCALES: usize = 4;
    /// Smallest resolution the FFT path runs at
    pub const MIN_FFT_RESOLUTION: usize = 16;
    /// Largest resolution the settings accept
    pub const MAX_RESOLUTION: usize = 4096;
    /// Entries in the FFT cost table (16 .. 8192)
    pub const FFT_COST_LEVELS: usize = 10;

    /// Standard gravity (m/s²)
    pub const DEFAULT_GRAVITY: f32 = 9.81;

    /// Spectra lighter than this are skipped when summing directional spectra
    pub const MIN_SPECTRUM_WEIGHT: f32 = 0.005;
    /// Profile weights at or below this are ignored on profile change
    pub const MIN_PROFILE_WEIGHT: f32 = 0.0001;
    /// Directional spectra are recomputed this many times after invalidation
    pub const DIRECTIONAL_DIRTY_FRAMES: u8 = 2;

    /// Candidates kept for shoreline wave selection
    pub const MAX_SHORELINE_CANDIDATES: usize = 200;
    /// Waves below this amplitude never become shoreline candidates
    pub const SHORELINE_MIN_AMPLITUDE: f32 = 0.025;
    /// Wind changes with a dot product above this re-sort incrementally
    pub const MOSTLY_SORTED_WIND_DOT: f32 = 0.97;
    /// Maximum vertical displacement relative to total spectrum amplitude
    pub const MAX_VERTICAL_DISPLACEMENT_FACTOR: f32 = 0.06;
}

/// Wrap a signed lattice index into `0..n`
#[inline]
pub fn wrap_index(i: i64, n: usize) -> usize {
    i.rem_euclid(n as i64) as usize
}

/// Signed frequency of an FFT-order index (`0, 1, .., n/2-1, -n/2, .., -1`)
#[inline]
pub fn signed_frequency(i: usize, n: usize) -> i64 {
    ((i + n / 2) % n) as i64 - (n / 2) as i64
}

/// Index of a power-of-two resolution in per-resolution tables (16 -> 0)
#[inline]
pub fn resolution_index(resolution: usize) -> usize {
    (resolution.trailing_zeros() as usize).saturating_sub(4)
}

/// Linear interpolation for any vector-like value
#[inline]
pub fn lerp<T>(a: T, b: T, t: f32) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    a * (1.0 - t) + b * t
}

/// Bilinear interpolation of four corner samples
#[inline]
pub fn bilinear<T>(v00: T, v10: T, v01: T, v11: T, fx: f32, fy: f32) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    lerp(lerp(v00, v10, fx), lerp(v01, v11, fx), fy)
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
/// Every critical section in this crate leaves its data consistent.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_signed_frequency() {
        let n = 8;
        let signed: Vec<i64> = (0..n).map(|i| signed_frequency(i, n)).collect();
        assert_eq!(signed, vec![0, 1, 2, 3, -4, -3, -2, -1]);
    }

    #[test]
    fn test_wrap_index() {
        assert_eq!(wrap_index(-1, 16), 15);
        assert_eq!(wrap_index(16, 16), 0);
        assert_eq!(wrap_index(-33, 16), 15);
    }

    #[test]
    fn test_resolution_index() {
        assert_eq!(resolution_index(16), 0);
        assert_eq!(resolution_index(64), 2);
        assert_eq!(resolution_index(256), 4);
    }

    #[test]
    fn test_bilinear_corners_and_center() {
        let v = bilinear(0.0f32, 1.0, 2.0, 3.0, 0.5, 0.5);
        assert!((v - 1.5).abs() < 1e-6);

        let v = bilinear(Vec2::ZERO, Vec2::X, Vec2::Y, Vec2::ONE, 1.0, 0.0);
        assert!((v - Vec2::X).length() < 1e-6);
    }
}
