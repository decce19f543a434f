//! Per-tick spectrum driver
//!
//! Owns the spectrum cache, the four tile states and the FFT engine. One
//! thread calls [`SpectrumResolver::update`] per simulation tick; any number
//! of threads may sample concurrently through `&self`.

mod controller;
mod sampling;

pub use controller::FftCostTable;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use glam::Vec2;

use crate::consts::{
    MAX_VERTICAL_DISPLACEMENT_FACTOR, MIN_PROFILE_WEIGHT, MIN_SPECTRUM_WEIGHT, NUM_SCALES,
    SHORELINE_MIN_AMPLITUDE,
};
use crate::error::ConfigError;
use crate::fft::{FftEngine, SpectrumLayer, SynthesisInput, TileSpectrum};
use crate::lock;
use crate::settings::WavesSettings;
use crate::spectrum::{DiscreteWave, Gerstner4, GerstnerWave, ResolvedSpectrum, SpectrumCache, SpectrumLayout};
use crate::water::{WaterParams, WeightedProfile};

/// Spectrum weights below this are ignored by shoreline selection
const MIN_SHORELINE_WEIGHT: f32 = 0.001;

/// Aggregate amplitude figures of the current profile mix
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectrumStatistics {
    pub total_amplitude: f32,
    pub max_vertical_displacement: f32,
    pub max_horizontal_displacement: f32,
}

/// Inputs captured at the last tick, read by samplers
#[derive(Debug, Clone, Copy)]
struct FrameState {
    time: f32,
    surface_offset: Vec2,
    uniform_scale: f32,
    gravity: f32,
    directionality: f32,
    wind_direction: Vec2,
    tile_sizes: [f32; NUM_SCALES],
}

impl Default for FrameState {
    fn default() -> Self {
        let params = WaterParams::default();
        Self {
            time: 0.0,
            surface_offset: params.surface_offset,
            uniform_scale: params.uniform_scale,
            gravity: params.gravity,
            directionality: params.directionality,
            wind_direction: params.wind_direction,
            tile_sizes: [0.0; NUM_SCALES],
        }
    }
}

#[derive(Debug)]
struct FilteredWaves {
    waves: Arc<[DiscreteWave]>,
    /// Per-tile FFT resolution the list was built against
    coverage: [Option<usize>; NUM_SCALES],
    dirty: bool,
}

pub struct SpectrumResolver {
    settings: Mutex<WavesSettings>,
    cache: SpectrumCache,
    profiles: Mutex<Vec<WeightedProfile>>,
    tiles: [TileSpectrum; NUM_SCALES],
    engine: Mutex<FftEngine>,
    cost_table: FftCostTable,
    frame: Mutex<FrameState>,
    statistics: Mutex<SpectrumStatistics>,
    filtered: Mutex<FilteredWaves>,
    /// Samples taken since the last tick
    samples: AtomicU64,
}

impl std::fmt::Debug for SpectrumResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumResolver")
            .field("spectra", &self.cache.len())
            .field("frame", &self.frame())
            .field("statistics", &self.statistics())
            .finish()
    }
}

impl SpectrumResolver {
    pub fn new(settings: WavesSettings, seed: u64) -> Result<Self, ConfigError> {
        settings.validate()?;
        let layout = SpectrumLayout::from_settings(&settings);
        Ok(Self {
            settings: Mutex::new(settings),
            cache: SpectrumCache::new(layout, seed),
            profiles: Mutex::new(Vec::new()),
            tiles: std::array::from_fn(TileSpectrum::new),
            engine: Mutex::new(FftEngine::new()),
            cost_table: FftCostTable::new(),
            frame: Mutex::new(FrameState::default()),
            statistics: Mutex::new(SpectrumStatistics::default()),
            filtered: Mutex::new(FilteredWaves {
                waves: Arc::from(Vec::new()),
                coverage: [None; NUM_SCALES],
                dirty: true,
            }),
            samples: AtomicU64::new(0),
        })
    }

    pub fn settings(&self) -> WavesSettings {
        lock(&self.settings).clone()
    }

    pub fn cache(&self) -> &SpectrumCache {
        &self.cache
    }

    pub fn tile(&self, scale: usize) -> &TileSpectrum {
        &self.tiles[scale]
    }

    fn frame(&self) -> FrameState {
        *lock(&self.frame)
    }

    pub fn wind_direction(&self) -> Vec2 {
        lock(&self.frame).wind_direction
    }

    /// Time of the last tick
    pub fn last_frame_time(&self) -> f32 {
        lock(&self.frame).time
    }

    pub fn tile_sizes(&self) -> [f32; NUM_SCALES] {
        lock(&self.frame).tile_sizes
    }

    pub fn statistics(&self) -> SpectrumStatistics {
        *lock(&self.statistics)
    }

    pub fn total_amplitude(&self) -> f32 {
        self.statistics().total_amplitude
    }

    pub fn max_vertical_displacement(&self) -> f32 {
        self.statistics().max_vertical_displacement
    }

    pub fn max_horizontal_displacement(&self) -> f32 {
        self.statistics().max_horizontal_displacement
    }

    /// Mean explicit-wave count over the resolved spectra
    pub fn avg_cpu_waves(&self) -> usize {
        let entries = self.cache.entries();
        if entries.is_empty() {
            return 0;
        }
        let total: usize = entries.iter().map(|entry| entry.cpu_waves_count()).sum();
        (total as f32 / entries.len() as f32).round() as usize
    }

    pub(crate) fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Advance to `time`: apply host parameters, pick per-tile resolutions
    /// and synthesize the FFT tiles
    pub fn update(&self, params: &WaterParams, time: f32) {
        if self.cache.set_seed(params.seed) {
            self.apply_profiles();
        }

        let wind_direction = params.wind_direction.normalize_or(Vec2::X);
        let spreading_changed = {
            let mut frame = lock(&self.frame);
            let changed = frame.directionality != params.directionality
                || frame.gravity != params.gravity
                || frame.wind_direction != wind_direction;
            frame.time = time;
            frame.surface_offset = params.surface_offset;
            frame.uniform_scale = params.uniform_scale;
            frame.gravity = params.gravity;
            frame.directionality = params.directionality;
            frame.wind_direction = wind_direction;
            changed
        };
        if spreading_changed {
            self.invalidate_directional_spectrum();
        }

        let samples = self.samples.swap(0, Ordering::Relaxed);
        let frame = self.frame();
        let settings = self.settings();
        let final_resolution = settings.final_resolution();
        let entries: Vec<Arc<ResolvedSpectrum>> = self
            .cache
            .entries()
            .into_iter()
            .filter(|entry| entry.weight() > MIN_SPECTRUM_WEIGHT)
            .collect();

        for (scale, tile) in self.tiles.iter().enumerate() {
            if entries.is_empty() || frame.tile_sizes[scale] <= 0.0 {
                tile.set_resolve_mode(false, tile.resolution());
                continue;
            }

            let weighted_waves = |mip: usize| -> u64 {
                entries
                    .iter()
                    .map(|entry| (entry.cpu_waves_in_mip(scale, mip) as f32 * entry.weight()) as u64)
                    .sum()
            };
            let (resolution, resolve_by_fft) = self.cost_table.select_resolution(
                weighted_waves,
                samples,
                final_resolution,
                settings.cpu_fft_precision_boost,
                settings.fft_allowed(),
            );
            tile.set_resolve_mode(resolve_by_fft, resolution);
        }

        let mut engine = lock(&self.engine);
        for (scale, tile) in self.tiles.iter().enumerate() {
            if !tile.is_resolved_by_fft() {
                continue;
            }
            let resolution = tile.resolution();
            let layers: Vec<SpectrumLayer> = entries
                .iter()
                .filter_map(|entry| {
                    entry.spectrum_values(resolution).map(|level| SpectrumLayer {
                        level,
                        weight: entry.weight(),
                    })
                })
                .collect();
            let input = SynthesisInput {
                layers: &layers,
                tile_size: frame.tile_sizes[scale],
                wind_direction: frame.wind_direction,
                directionality: frame.directionality,
                gravity: frame.gravity,
            };
            engine.compute(tile, &input, time, tile.stale_index());
        }
    }

    pub fn set_wind_direction(&self, wind_direction: Vec2) {
        let wind_direction = wind_direction.normalize_or(Vec2::X);
        {
            let mut frame = lock(&self.frame);
            if frame.wind_direction == wind_direction {
                return;
            }
            frame.wind_direction = wind_direction;
        }
        self.invalidate_directional_spectrum();
    }

    /// Replace the profile mix and the per-scale tile sizes
    pub fn on_profiles_changed(&self, profiles: &[WeightedProfile], tile_sizes: [f32; NUM_SCALES]) {
        *lock(&self.profiles) = profiles.to_vec();
        lock(&self.frame).tile_sizes = tile_sizes;
        self.apply_profiles();
    }

    fn apply_profiles(&self) {
        self.cache.set_all_weights(0.0);

        let profiles = lock(&self.profiles).clone();
        let mut total_amplitude = 0.0;
        for profile in profiles.iter().filter(|profile| profile.weight > MIN_PROFILE_WEIGHT) {
            let entry = self.cache.get_or_create(profile.id, &profile.spectrum);
            entry.set_weight(profile.weight);
            total_amplitude += entry.total_amplitude() * profile.weight;
        }

        let horizontal_scale = lock(&self.settings).horizontal_displacement_scale;
        let max_vertical_displacement = total_amplitude * MAX_VERTICAL_DISPLACEMENT_FACTOR;
        let statistics = SpectrumStatistics {
            total_amplitude,
            max_vertical_displacement,
            max_horizontal_displacement: max_vertical_displacement * horizontal_scale,
        };
        *lock(&self.statistics) = statistics;
        log::info!(
            "Profiles changed: {} active, total amplitude {:.3}",
            profiles.len(),
            statistics.total_amplitude
        );

        self.invalidate_directional_spectrum();
    }

    /// Apply new settings; resolution or layout changes drop every resolved spectrum
    pub fn on_maps_format_changed(&self, settings: WavesSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        let layout = SpectrumLayout::from_settings(&settings);
        *lock(&self.settings) = settings;
        if layout != self.cache.layout() {
            self.cache.reset(layout);
        }
        self.apply_profiles();
        Ok(())
    }

    /// Rebuild directional spectra on the next ticks and explicit waves on next use
    pub fn invalidate_directional_spectrum(&self) {
        for entry in self.cache.entries() {
            entry.set_cpu_waves_dirty();
        }
        for tile in &self.tiles {
            tile.invalidate_directional();
        }
        lock(&self.filtered).dirty = true;
    }

    fn fft_coverage(&self) -> [Option<usize>; NUM_SCALES] {
        std::array::from_fn(|scale| self.tiles[scale].fft_coverage())
    }

    /// Explicit waves not covered by the published FFT tiles, weighted and
    /// sorted by descending amplitude
    pub fn filtered_cpu_waves(&self) -> Arc<[DiscreteWave]> {
        let mut filtered = lock(&self.filtered);
        let coverage = self.fft_coverage();
        if !filtered.dirty && filtered.coverage == coverage {
            return filtered.waves.clone();
        }

        let frame = self.frame();
        let mut waves = Vec::new();
        for entry in self.cache.entries() {
            let weight = entry.weight();
            if weight <= MIN_SPECTRUM_WEIGHT {
                continue;
            }
            entry.update_spectral_values(frame.wind_direction, frame.directionality);

            for scale in 0..NUM_SCALES {
                if frame.tile_sizes[scale] <= 0.0 {
                    continue;
                }
                entry.extend_cpu_waves(scale, coverage[scale], weight, &mut waves);
            }
        }
        waves.sort_by(|a, b| b.priority.total_cmp(&a.priority));

        filtered.waves = waves.into();
        filtered.coverage = coverage;
        filtered.dirty = false;
        filtered.waves.clone()
    }

    /// Waves running within `coincidence_range` degrees of `angle`, least
    /// important first
    pub fn select_shoreline_waves(&self, count: usize, angle: f32, coincidence_range: f32) -> Vec<GerstnerWave> {
        let frame = self.frame();
        let mut found: Vec<(f32, GerstnerWave)> = Vec::new();

        for entry in self.cache.entries() {
            let weight = entry.weight();
            if weight < MIN_SHORELINE_WEIGHT {
                continue;
            }
            entry.update_spectral_values(frame.wind_direction, frame.directionality);

            let matching = entry
                .shoreline_candidates()
                .into_iter()
                .filter(|wave| {
                    let wave_angle = wave.direction.x.atan2(wave.direction.y).to_degrees();
                    delta_angle(wave_angle, angle).abs() < coincidence_range && wave.amplitude > SHORELINE_MIN_AMPLITUDE
                })
                .take(count);
            found.extend(matching.map(|wave| (wave.priority * weight, wave.to_gerstner(weight))));
        }

        found.sort_by(|a, b| b.0.total_cmp(&a.0));
        found.truncate(count);
        found.into_iter().rev().map(|(_, wave)| wave).collect()
    }

    /// The `count` strongest explicit waves, zero-padded
    pub fn find_most_meaningful_waves(&self, count: usize) -> Vec<GerstnerWave> {
        let waves = self.filtered_cpu_waves();
        let mut gerstners: Vec<GerstnerWave> = waves.iter().take(count).map(|wave| wave.to_gerstner(1.0)).collect();
        gerstners.resize(count, GerstnerWave::default());
        gerstners
    }

    /// The strongest explicit waves packed in groups of four
    pub fn find_gerstners(&self, count: usize) -> Vec<Gerstner4> {
        let blocks = count / 4;
        let waves = self.find_most_meaningful_waves(blocks * 4);
        waves
            .chunks_exact(4)
            .map(|chunk| Gerstner4::new([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

/// Shortest signed difference between two angles in degrees
fn delta_angle(current: f32, target: f32) -> f32 {
    let delta = (target - current).rem_euclid(360.0);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::{PhillipsSpectrum, SpectrumId, WaveSpectrum};
    use proptest::prelude::*;

    fn settings(resolution: usize) -> WavesSettings {
        WavesSettings {
            resolution,
            ..WavesSettings::default()
        }
    }

    fn profile(id: u64, weight: f32) -> WeightedProfile {
        let spectrum: Arc<dyn WaveSpectrum> = Arc::new(PhillipsSpectrum::new(100.0, 10.0));
        WeightedProfile { id: SpectrumId(id), spectrum, weight }
    }

    fn tile_sizes(settings: &WavesSettings, tile_size: f32) -> [f32; NUM_SCALES] {
        settings.tile_size_scales.map(|scale| scale * tile_size)
    }

    fn resolver(resolution: usize) -> SpectrumResolver {
        let settings = settings(resolution);
        let resolver = SpectrumResolver::new(settings.clone(), 42).unwrap();
        resolver.on_profiles_changed(&[profile(1, 1.0)], tile_sizes(&settings, 100.0));
        resolver
    }

    #[test]
    fn test_delta_angle() {
        assert_eq!(delta_angle(10.0, 30.0), 20.0);
        assert_eq!(delta_angle(350.0, 10.0), 20.0);
        assert_eq!(delta_angle(10.0, 350.0), -20.0);
        assert_eq!(delta_angle(0.0, 180.0), 180.0);
    }

    #[test]
    fn test_profiles_set_weights_and_statistics() {
        let settings = settings(32);
        let resolver = SpectrumResolver::new(settings.clone(), 1).unwrap();
        resolver.on_profiles_changed(&[profile(1, 0.75), profile(2, 0.00005)], tile_sizes(&settings, 100.0));

        assert_eq!(resolver.cache().len(), 1);
        let entry = resolver.cache().get(SpectrumId(1)).unwrap();
        assert_eq!(entry.weight(), 0.75);

        let statistics = resolver.statistics();
        assert!((statistics.total_amplitude - entry.total_amplitude() * 0.75).abs() < 1e-5);
        assert!((statistics.max_vertical_displacement - statistics.total_amplitude * 0.06).abs() < 1e-6);
        assert_eq!(statistics.max_horizontal_displacement, statistics.max_vertical_displacement);

        // Dropped from the mix: entry kept, weight zeroed
        resolver.on_profiles_changed(&[profile(3, 1.0)], tile_sizes(&settings, 100.0));
        assert_eq!(resolver.cache().get(SpectrumId(1)).unwrap().weight(), 0.0);
        assert_eq!(resolver.cache().len(), 2);
    }

    #[test]
    fn test_filtered_waves_sorted_and_weighted() {
        let settings = settings(32);
        let resolver = SpectrumResolver::new(settings.clone(), 3).unwrap();
        resolver.on_profiles_changed(&[profile(1, 0.5)], tile_sizes(&settings, 100.0));

        let waves = resolver.filtered_cpu_waves();
        assert!(!waves.is_empty());
        assert!(waves.windows(2).all(|pair| pair[0].priority >= pair[1].priority));

        let entry = resolver.cache().get(SpectrumId(1)).unwrap();
        let unweighted: f32 = (0..NUM_SCALES)
            .flat_map(|scale| entry.cpu_waves(scale))
            .flatten()
            .map(|wave| wave.amplitude)
            .fold(0.0, f32::max);
        assert!((waves[0].amplitude - unweighted * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fft_tiles_shrink_filtered_list() {
        let resolver = resolver(64);
        let all = resolver.filtered_cpu_waves().len();

        resolver.update(&WaterParams { seed: 42, ..WaterParams::default() }, 0.0);
        assert!(resolver.tiles.iter().all(TileSpectrum::is_resolved_by_fft));
        let direct = resolver.filtered_cpu_waves().len();
        assert!(direct < all);
    }

    #[test]
    fn test_filtered_waves_follow_published_tiles() {
        let resolver = resolver(64);
        resolver.update(&WaterParams { seed: 42, ..WaterParams::default() }, 0.0);
        let covered = resolver.filtered_cpu_waves();
        let tile = resolver.tile(0);
        let resolution = tile.resolution();
        assert_eq!(tile.fft_coverage(), Some(resolution));

        // Mid-tick switch to another resolution: nothing published yet, so
        // samplers keep the old tile and the old wave list
        let next = if resolution > 16 { resolution / 2 } else { resolution * 2 };
        assert!(tile.set_resolve_mode(true, next));
        assert_eq!(tile.snapshot(0.0).unwrap().resolution(), resolution);
        assert!(Arc::ptr_eq(&resolver.filtered_cpu_waves(), &covered));

        // Dropping the tile hands its bins back to the explicit list at once
        tile.set_resolve_mode(false, next);
        assert!(tile.snapshot(0.0).is_none());
        assert!(resolver.filtered_cpu_waves().len() > covered.len());
    }

    #[test]
    fn test_update_publishes_tiles() {
        let resolver = resolver(32);
        let params = WaterParams { seed: 42, ..WaterParams::default() };
        resolver.update(&params, 0.5);
        resolver.update(&params, 1.0);

        for tile in &resolver.tiles {
            let snapshot = tile.snapshot(0.75).unwrap();
            assert_eq!(snapshot.older.time, 0.5);
            assert_eq!(snapshot.newer.time, 1.0);
            assert!((snapshot.t - 0.5).abs() < 1e-6);
        }
        assert_eq!(resolver.last_frame_time(), 1.0);
    }

    #[test]
    fn test_disallowed_fft_keeps_tiles_direct() {
        let settings = WavesSettings {
            allow_cpu_fft: false,
            ..settings(32)
        };
        let resolver = SpectrumResolver::new(settings.clone(), 42).unwrap();
        resolver.on_profiles_changed(&[profile(1, 1.0)], tile_sizes(&settings, 100.0));
        resolver.update(&WaterParams { seed: 42, ..WaterParams::default() }, 0.0);
        assert!(resolver.tiles.iter().all(|tile| tile.snapshot(0.0).is_none()));
    }

    #[test]
    fn test_seed_change_rebuilds_spectra() {
        let reseeding = resolver(32);
        let before = reseeding.filtered_cpu_waves();
        let old = reseeding.cache().get(SpectrumId(1)).unwrap();

        reseeding.update(&WaterParams { seed: 7, ..WaterParams::default() }, 0.0);
        assert_eq!(reseeding.cache().seed(), 7);
        let reseeded = reseeding.cache().get(SpectrumId(1)).unwrap();
        assert!(!Arc::ptr_eq(&old, &reseeded));
        assert_eq!(reseeded.weight(), 1.0);

        // Same seed and weights again: identical waves
        let again = resolver(32);
        assert_eq!(again.filtered_cpu_waves(), before);
    }

    #[test]
    fn test_maps_format_change_drops_resolved_data() {
        let resolver = resolver(32);
        let old = resolver.cache().get(SpectrumId(1)).unwrap();

        resolver.on_maps_format_changed(settings(64)).unwrap();
        let new = resolver.cache().get(SpectrumId(1)).unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(new.layout().final_resolution, 64);

        assert!(resolver.on_maps_format_changed(settings(48)).is_err());
        assert_eq!(resolver.settings().resolution, 64);
    }

    #[test]
    fn test_wind_change_resorts_filtered_waves() {
        let resolver = resolver(32);
        let east = resolver.filtered_cpu_waves();
        resolver.set_wind_direction(Vec2::new(0.0, 3.0));
        assert_eq!(resolver.wind_direction(), Vec2::Y);
        let north = resolver.filtered_cpu_waves();

        assert_eq!(east.len(), north.len());
        assert_ne!(east[0], north[0]);
        assert!(north.windows(2).all(|pair| pair[0].priority >= pair[1].priority));
    }

    #[test]
    fn test_shoreline_selection_by_angle() {
        let resolver = resolver(64);
        let waves = resolver.select_shoreline_waves(8, 90.0, 30.0);
        assert!(waves.len() <= 8);
        for wave in &waves {
            let angle = wave.direction.x.atan2(wave.direction.y).to_degrees();
            assert!(delta_angle(angle, 90.0).abs() < 30.0);
        }
        assert!(waves.windows(2).all(|pair| pair[0].amplitude <= pair[1].amplitude));
    }

    #[test]
    fn test_most_meaningful_waves_padded() {
        let resolver = resolver(32);
        let filtered = resolver.filtered_cpu_waves();

        let top = resolver.find_most_meaningful_waves(3);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].amplitude, filtered[0].amplitude);
        assert_eq!(top[0].offset, filtered[0].phase);

        let padded = resolver.find_most_meaningful_waves(filtered.len() + 2);
        assert_eq!(padded[filtered.len()], GerstnerWave::default());

        let blocks = resolver.find_gerstners(10);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].waves[3].amplitude, filtered[7].amplitude);
    }

    /// FFT resolution per tile after one tick with `samples` queries, 0 when direct
    fn tile_resolutions(settings: WavesSettings, samples: u64) -> [usize; NUM_SCALES] {
        let resolver = SpectrumResolver::new(settings.clone(), 42).unwrap();
        resolver.on_profiles_changed(&[profile(1, 1.0)], tile_sizes(&settings, 100.0));
        resolver.samples.store(samples, Ordering::Relaxed);
        resolver.update(&WaterParams { seed: 42, ..WaterParams::default() }, 0.0);
        std::array::from_fn(|scale| {
            let tile = resolver.tile(scale);
            if tile.is_resolved_by_fft() { tile.resolution() } else { 0 }
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_larger_cpu_budget_never_lowers_resolution(
            max_waves in 1usize..300,
            extra_waves in 0usize..300,
            threshold in 0.0001f32..0.05,
            lowered in 0.0f32..=1.0,
            samples in 1u64..2000,
        ) {
            let base = WavesSettings {
                cpu_max_waves: max_waves,
                cpu_wave_threshold: threshold,
                cpu_fft_precision_boost: 0,
                ..settings(64)
            };
            let larger = WavesSettings {
                cpu_max_waves: max_waves + extra_waves,
                cpu_wave_threshold: threshold * lowered,
                ..base.clone()
            };

            let low = tile_resolutions(base, samples);
            let high = tile_resolutions(larger, samples);
            for scale in 0..NUM_SCALES {
                prop_assert!(high[scale] >= low[scale], "scale {}: {:?} vs {:?}", scale, low, high);
            }
        }
    }

    #[test]
    fn test_larger_cpu_budget_raises_resolution() {
        let tight = WavesSettings {
            cpu_max_waves: 1,
            cpu_wave_threshold: 0.05,
            cpu_fft_precision_boost: 0,
            ..settings(64)
        };
        let generous = WavesSettings {
            cpu_max_waves: usize::MAX,
            cpu_wave_threshold: 0.0,
            ..tight.clone()
        };
        let samples = 10_000;
        assert_eq!(tile_resolutions(tight, samples), [0; NUM_SCALES]);
        assert!(tile_resolutions(generous, samples).iter().all(|&resolution| resolution >= 16));
    }

    #[test]
    fn test_avg_cpu_waves() {
        let settings = settings(32);
        let resolver = SpectrumResolver::new(settings.clone(), 5).unwrap();
        assert_eq!(resolver.avg_cpu_waves(), 0);
        resolver.on_profiles_changed(&[profile(1, 0.5), profile(2, 0.5)], tile_sizes(&settings, 100.0));

        let counts: Vec<usize> = resolver.cache().entries().iter().map(|e| e.cpu_waves_count()).collect();
        let expected = ((counts[0] + counts[1]) as f32 / 2.0).round() as usize;
        assert_eq!(resolver.avg_cpu_waves(), expected);
    }
}
