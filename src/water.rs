//! Host-facing water object
//!
//! `WindWaves` owns a [`SpectrumResolver`] and translates host-level changes
//! (profile mix, wind, seed, scroll offset) into resolver calls.

use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_GRAVITY, MIN_PROFILE_WEIGHT, NUM_SCALES};
use crate::error::ConfigError;
use crate::resolver::SpectrumResolver;
use crate::settings::WavesSettings;
use crate::spectrum::{SpectrumId, WaveSpectrum};

/// Per-instance parameters read once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterParams {
    pub seed: u64,
    pub gravity: f32,
    /// 0 keeps waves running against the wind, 1 removes them
    pub directionality: f32,
    pub uniform_scale: f32,
    /// Surface scroll offset in world units
    pub surface_offset: Vec2,
    pub wind_direction: Vec2,
}

impl Default for WaterParams {
    fn default() -> Self {
        Self {
            seed: 0,
            gravity: DEFAULT_GRAVITY,
            directionality: 0.0,
            uniform_scale: 1.0,
            surface_offset: Vec2::ZERO,
            wind_direction: Vec2::X,
        }
    }
}

/// One spectrum of the blend and its weight
#[derive(Debug, Clone)]
pub struct WeightedProfile {
    pub id: SpectrumId,
    pub spectrum: Arc<dyn WaveSpectrum>,
    pub weight: f32,
}

impl WeightedProfile {
    pub fn new(id: SpectrumId, spectrum: impl WaveSpectrum + 'static, weight: f32) -> Self {
        Self {
            id,
            spectrum: Arc::new(spectrum),
            weight,
        }
    }
}

#[derive(Debug)]
pub struct WindWaves {
    params: WaterParams,
    profiles: Vec<WeightedProfile>,
    resolver: Arc<SpectrumResolver>,
    tile_size: f32,
    wind_speed: f32,
}

impl WindWaves {
    pub fn new(settings: WavesSettings, params: WaterParams) -> Result<Self, ConfigError> {
        let resolver = SpectrumResolver::new(settings, params.seed)?;
        resolver.set_wind_direction(params.wind_direction);
        Ok(Self {
            params,
            profiles: Vec::new(),
            resolver: Arc::new(resolver),
            tile_size: 0.0,
            wind_speed: 0.0,
        })
    }

    pub fn params(&self) -> &WaterParams {
        &self.params
    }

    /// Replace host parameters; applied on the next [`update`](Self::update)
    pub fn set_params(&mut self, params: WaterParams) {
        self.params = params;
    }

    pub fn settings(&self) -> WavesSettings {
        self.resolver.settings()
    }

    pub fn set_settings(&mut self, settings: WavesSettings) -> Result<(), ConfigError> {
        self.resolver.on_maps_format_changed(settings)?;
        self.apply_tile_sizes();
        Ok(())
    }

    /// Shared handle for samplers on other threads
    pub fn resolver(&self) -> &Arc<SpectrumResolver> {
        &self.resolver
    }

    pub fn profiles(&self) -> &[WeightedProfile] {
        &self.profiles
    }

    /// Weight-blended base tile size of the current mix
    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn wind_speed(&self) -> f32 {
        self.wind_speed
    }

    pub fn tile_sizes(&self) -> [f32; NUM_SCALES] {
        self.resolver.tile_sizes()
    }

    pub fn set_profiles(&mut self, profiles: Vec<WeightedProfile>) {
        let active = || profiles.iter().filter(|profile| profile.weight > MIN_PROFILE_WEIGHT);
        let total_weight: f32 = active().map(|profile| profile.weight).sum();
        if total_weight > 0.0 {
            self.tile_size = active().map(|p| p.spectrum.tile_size() * p.weight).sum::<f32>() / total_weight;
            self.wind_speed = active().map(|p| p.spectrum.wind_speed() * p.weight).sum::<f32>() / total_weight;
        } else {
            self.tile_size = 0.0;
            self.wind_speed = 0.0;
        }

        self.profiles = profiles;
        self.apply_tile_sizes();
    }

    fn apply_tile_sizes(&self) {
        let tile_sizes = self.settings().tile_size_scales.map(|scale| scale * self.tile_size);
        self.resolver.on_profiles_changed(&self.profiles, tile_sizes);
    }

    pub fn set_wind_direction(&mut self, wind_direction: Vec2) {
        self.params.wind_direction = wind_direction;
        self.resolver.set_wind_direction(wind_direction);
    }

    /// Run one simulation tick
    pub fn update(&self, time: f32) {
        self.resolver.update(&self.params, time);
    }

    pub fn displacement_at(&self, x: f32, z: f32, spectrum_start: f32, spectrum_end: f32, time: f32) -> Vec3 {
        self.resolver.displacement_at(x, z, spectrum_start, spectrum_end, time)
    }

    pub fn horizontal_displacement_at(&self, x: f32, z: f32, spectrum_start: f32, spectrum_end: f32, time: f32) -> Vec2 {
        self.resolver.horizontal_displacement_at(x, z, spectrum_start, spectrum_end, time)
    }

    pub fn height_at(&self, x: f32, z: f32, spectrum_start: f32, spectrum_end: f32, time: f32) -> f32 {
        self.resolver.height_at(x, z, spectrum_start, spectrum_end, time)
    }

    pub fn force_and_height_at(&self, x: f32, z: f32, spectrum_start: f32, spectrum_end: f32, time: f32) -> Vec4 {
        self.resolver.force_and_height_at(x, z, spectrum_start, spectrum_end, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::PhillipsSpectrum;

    fn water() -> WindWaves {
        let settings = WavesSettings {
            resolution: 32,
            ..WavesSettings::default()
        };
        WindWaves::new(settings, WaterParams::default()).unwrap()
    }

    #[test]
    fn test_params_json_defaults() {
        let params: WaterParams = serde_json::from_str(r#"{"seed": 9}"#).unwrap();
        assert_eq!(params.seed, 9);
        assert_eq!(params.gravity, DEFAULT_GRAVITY);
        assert_eq!(params.wind_direction, Vec2::X);
    }

    #[test]
    fn test_blended_tile_size() {
        let mut water = water();
        water.set_profiles(vec![
            WeightedProfile::new(SpectrumId(1), PhillipsSpectrum::new(100.0, 8.0), 0.25),
            WeightedProfile::new(SpectrumId(2), PhillipsSpectrum::new(300.0, 16.0), 0.75),
        ]);
        assert!((water.tile_size() - 250.0).abs() < 1e-3);
        assert!((water.wind_speed() - 14.0).abs() < 1e-4);

        let scales = water.settings().tile_size_scales;
        let tile_sizes = water.tile_sizes();
        for scale in 0..NUM_SCALES {
            assert!((tile_sizes[scale] - scales[scale] * water.tile_size()).abs() < 1e-3);
        }
        assert_eq!(water.resolver().cache().len(), 2);
    }

    #[test]
    fn test_empty_mix_is_flat() {
        let mut water = water();
        water.set_profiles(Vec::new());
        water.update(0.0);
        assert_eq!(water.tile_size(), 0.0);
        assert_eq!(water.height_at(1.0, 2.0, 0.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn test_settings_change_keeps_profiles() {
        let mut water = water();
        water.set_profiles(vec![WeightedProfile::new(SpectrumId(1), PhillipsSpectrum::new(100.0, 8.0), 1.0)]);
        let mut settings = water.settings();
        settings.resolution = 64;
        water.set_settings(settings).unwrap();

        let entry = water.resolver().cache().get(SpectrumId(1)).unwrap();
        assert_eq!(entry.layout().final_resolution, 64);
        assert_eq!(entry.weight(), 1.0);
    }

    #[test]
    fn test_wind_direction_reaches_resolver() {
        let mut water = water();
        water.set_wind_direction(Vec2::new(0.0, -2.0));
        assert_eq!(water.resolver().wind_direction(), Vec2::NEG_Y);
        assert_eq!(water.params().wind_direction, Vec2::new(0.0, -2.0));
    }

    #[test]
    fn test_sampling_moves_with_surface_offset() {
        let settings = WavesSettings {
            resolution: 32,
            allow_cpu_fft: false,
            ..WavesSettings::default()
        };
        let mut water = WindWaves::new(settings, WaterParams::default()).unwrap();
        water.set_profiles(vec![WeightedProfile::new(SpectrumId(1), PhillipsSpectrum::new(100.0, 10.0), 1.0)]);
        water.update(0.0);
        let reference = water.height_at(0.0, 0.0, 0.0, 1.0, 0.5);

        water.set_params(WaterParams {
            surface_offset: Vec2::new(3.0, -4.0),
            ..water.params().clone()
        });
        water.update(0.0);
        let shifted = water.height_at(-3.0, 4.0, 0.0, 1.0, 0.5);
        assert!((shifted - reference).abs() < 1e-5);
    }
}
