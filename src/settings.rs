//! Wave synthesis and particle tuning
//!
//! Loaded from JSON by hosts that want data-driven quality control; every
//! field has a sensible default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{MAX_RESOLUTION, MIN_FFT_RESOLUTION, NUM_SCALES};
use crate::error::ConfigError;
use crate::particles::Rect;

/// Quality levels, from cheapest to most detailed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QualityLevel {
    VeryLow,
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl QualityLevel {
    pub const ALL: [QualityLevel; 5] = [
        QualityLevel::VeryLow,
        QualityLevel::Low,
        QualityLevel::Medium,
        QualityLevel::High,
        QualityLevel::Ultra,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::VeryLow => "VeryLow",
            QualityLevel::Low => "Low",
            QualityLevel::Medium => "Medium",
            QualityLevel::High => "High",
            QualityLevel::Ultra => "Ultra",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "verylow" | "very_low" => Some(QualityLevel::VeryLow),
            "low" => Some(QualityLevel::Low),
            "medium" | "med" => Some(QualityLevel::Medium),
            "high" => Some(QualityLevel::High),
            "ultra" => Some(QualityLevel::Ultra),
            _ => None,
        }
    }

    /// Spectrum resolution cap for this level
    pub fn max_spectrum_resolution(&self) -> usize {
        match self {
            QualityLevel::VeryLow => 32,
            QualityLevel::Low => 64,
            QualityLevel::Medium => 128,
            QualityLevel::High => 256,
            QualityLevel::Ultra => 256,
        }
    }

    /// Whether the CPU FFT path may be used at this level
    pub fn allow_cpu_fft(&self) -> bool {
        !matches!(self, QualityLevel::VeryLow)
    }

    /// Most detailed level; its resolution cap drives the over-budget warning
    pub fn highest() -> Self {
        QualityLevel::Ultra
    }
}

/// Wind-wave synthesis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WavesSettings {
    /// Requested spectrum resolution (power of two)
    pub resolution: usize,
    /// Quality level capping the resolution
    pub quality: QualityLevel,
    /// Bins below this amplitude never become explicit waves
    pub cpu_wave_threshold: f32,
    /// Explicit waves kept per scale
    pub cpu_max_waves: usize,
    /// Extra doublings applied to the controller's FFT resolution (0..=3)
    pub cpu_fft_precision_boost: u32,
    /// Allow the CPU FFT path at all
    pub allow_cpu_fft: bool,
    /// Tile size multiplier per scale
    pub tile_size_scales: [f32; NUM_SCALES],
    /// Multiplier on horizontal displacement and force
    pub horizontal_displacement_scale: f32,
}

impl Default for WavesSettings {
    fn default() -> Self {
        Self {
            resolution: 256,
            quality: QualityLevel::High,
            cpu_wave_threshold: 0.008,
            cpu_max_waves: 2500,
            cpu_fft_precision_boost: 1,
            allow_cpu_fft: true,
            tile_size_scales: [0.79241, 0.163151, 3.175131, 13.7315131],
            horizontal_displacement_scale: 1.0,
        }
    }
}

impl WavesSettings {
    /// Create settings for a quality level (applies its resolution cap)
    pub fn from_quality(quality: QualityLevel) -> Self {
        Self {
            quality,
            resolution: quality.max_spectrum_resolution(),
            allow_cpu_fft: quality.allow_cpu_fft(),
            ..Self::default()
        }
    }

    /// Resolution actually used for spectra: requested, capped by quality
    pub fn final_resolution(&self) -> usize {
        self.resolution.min(self.quality.max_spectrum_resolution())
    }

    /// Whether the FFT path is permitted by both the flag and the quality level
    pub fn fft_allowed(&self) -> bool {
        self.allow_cpu_fft && self.quality.allow_cpu_fft()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.resolution.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "resolution",
                value: self.resolution,
            });
        }
        if !(MIN_FFT_RESOLUTION..=MAX_RESOLUTION).contains(&self.resolution) {
            return Err(ConfigError::ResolutionOutOfRange {
                value: self.resolution,
                min: MIN_FFT_RESOLUTION,
                max: MAX_RESOLUTION,
            });
        }
        if !self.cpu_wave_threshold.is_finite() || self.cpu_wave_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.cpu_wave_threshold));
        }
        if self.cpu_max_waves == 0 {
            return Err(ConfigError::InvalidCapacity {
                field: "cpu_max_waves",
                value: self.cpu_max_waves,
            });
        }
        if self.cpu_fft_precision_boost > 3 {
            return Err(ConfigError::InvalidCapacity {
                field: "cpu_fft_precision_boost",
                value: self.cpu_fft_precision_boost as usize,
            });
        }
        for (index, &value) in self.tile_size_scales.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidTileScale { index, value });
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Wave-particle simulation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSettings {
    /// Total particle capacity
    pub max_particles: usize,
    /// Slots per quadtree leaf
    pub max_particles_per_tile: usize,
    /// Simulated seconds advanced before the first frame
    pub prewarm_time: f32,
    /// Frame-time budget for one simulation update (ms)
    pub time_per_frame_ms: f32,
    /// World area covered by the quadtree
    pub area: Rect,
    /// Margin rect extension relative to node size
    pub margin_fraction: f32,
    /// Seed for spawn irregularity
    pub rng_seed: u64,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        Self {
            max_particles: 50_000,
            max_particles_per_tile: 2000,
            prewarm_time: 40.0,
            time_per_frame_ms: 0.8,
            area: Rect::from_min_max(glam::Vec2::splat(-1000.0), glam::Vec2::splat(1000.0)),
            margin_fraction: 0.1,
            rng_seed: 0,
        }
    }
}

impl ParticleSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_particles == 0 {
            return Err(ConfigError::InvalidCapacity {
                field: "max_particles",
                value: self.max_particles,
            });
        }
        if self.max_particles_per_tile == 0 {
            return Err(ConfigError::InvalidCapacity {
                field: "max_particles_per_tile",
                value: self.max_particles_per_tile,
            });
        }
        Ok(())
    }

    /// Expected exp(duration) of one update, the stress controller's reference
    pub fn expected_duration_exp(&self) -> f32 {
        (self.time_per_frame_ms * 0.5).exp()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
