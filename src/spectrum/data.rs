//! Spectrum data resolved for one water instance
//!
//! Base grids are filled once at the final resolution. Lower resolutions are
//! derived on demand by quadrant remapping of the nearest cached higher level.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f32::consts::TAU;
use std::sync::{Arc, Mutex, OnceLock};

use glam::Vec2;

use super::{DiscreteWave, SpectrumGrid, SpectrumId, SpectrumLevel, WaveSpectrum, sort_waves};
use crate::consts::{
    MAX_SHORELINE_CANDIDATES, MIN_FFT_RESOLUTION, MOSTLY_SORTED_WIND_DOT, NUM_SCALES,
    SHORELINE_MIN_AMPLITUDE,
};
use crate::settings::{QualityLevel, WavesSettings};
use crate::{lock, resolution_index, signed_frequency};

/// Resolution-dependent inputs shared by every resolved spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumLayout {
    pub final_resolution: usize,
    /// Largest resolution any quality level allows
    pub max_resolution: usize,
    pub tile_size_scales: [f32; NUM_SCALES],
    pub cpu_max_waves: usize,
    pub cpu_wave_threshold: f32,
}

impl SpectrumLayout {
    pub fn from_settings(settings: &WavesSettings) -> Self {
        Self {
            final_resolution: settings.final_resolution(),
            max_resolution: QualityLevel::highest().max_spectrum_resolution(),
            tile_size_scales: settings.tile_size_scales,
            cpu_max_waves: settings.cpu_max_waves,
            cpu_wave_threshold: settings.cpu_wave_threshold,
        }
    }

    /// Number of explicit-wave mip buckets
    pub fn mip_count(&self) -> usize {
        resolution_index(self.final_resolution) + 1
    }
}

/// Whether an FFT at `fft_resolution` synthesizes `wave`. The Nyquist row and
/// column are left to direct summation.
pub fn covered_by_fft(wave: &DiscreteWave, final_resolution: usize, fft_resolution: usize) -> bool {
    let half = (fft_resolution / 2) as i64;
    let inside = |i: u16| signed_frequency(i as usize, final_resolution).abs() < half;
    inside(wave.u) && inside(wave.v)
}

/// Mip bucket for a bin whose nearest-edge distance in FFT order is `distance`
pub fn mip_index(distance: usize) -> usize {
    if distance == 0 {
        return 0;
    }
    (distance.ilog2() as usize).saturating_sub(4)
}

struct ShorelineEntry(DiscreteWave);

impl PartialEq for ShorelineEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ShorelineEntry {}

impl PartialOrd for ShorelineEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShorelineEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.shoreline_priority.total_cmp(&other.0.shoreline_priority)
    }
}

/// Bounded max-heap keeping the waves with the lowest `k / amplitude`
pub struct ShorelineHeap {
    heap: BinaryHeap<ShorelineEntry>,
    capacity: usize,
}

impl ShorelineHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, wave: DiscreteWave) {
        self.heap.push(ShorelineEntry(wave));
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Kept waves, best (lowest `k / amplitude`) first
    pub fn into_sorted_vec(self) -> Vec<DiscreteWave> {
        self.heap.into_sorted_vec().into_iter().map(|entry| entry.0).collect()
    }
}

struct WaveSets {
    /// `[scale][mip]`, each bucket sorted by descending priority
    cpu_waves: [Vec<Vec<DiscreteWave>>; NUM_SCALES],
    shoreline: Vec<DiscreteWave>,
    dirty: bool,
    last_wind_direction: Vec2,
}

struct Resolved {
    level: Arc<SpectrumLevel>,
    total_amplitude: f32,
    waves: Mutex<WaveSets>,
}

/// A spectrum definition resolved against one layout and seed
pub struct ResolvedSpectrum {
    id: SpectrumId,
    spectrum: Arc<dyn WaveSpectrum>,
    seed: u64,
    layout: SpectrumLayout,
    resolved: OnceLock<Resolved>,
    /// Grids per resolution index; the final resolution is always present once resolved
    levels: Mutex<Vec<Option<Arc<SpectrumLevel>>>>,
    weight: Mutex<f32>,
}

impl std::fmt::Debug for ResolvedSpectrum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSpectrum")
            .field("id", &self.id)
            .field("seed", &self.seed)
            .field("resolved", &self.resolved.get().is_some())
            .field("weight", &self.weight())
            .finish()
    }
}

impl ResolvedSpectrum {
    pub fn new(id: SpectrumId, spectrum: Arc<dyn WaveSpectrum>, seed: u64, layout: SpectrumLayout) -> Self {
        let levels = vec![None; layout.mip_count()];
        Self {
            id,
            spectrum,
            seed,
            layout,
            resolved: OnceLock::new(),
            levels: Mutex::new(levels),
            weight: Mutex::new(0.0),
        }
    }

    pub fn id(&self) -> SpectrumId {
        self.id
    }

    pub fn spectrum(&self) -> &Arc<dyn WaveSpectrum> {
        &self.spectrum
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn layout(&self) -> &SpectrumLayout {
        &self.layout
    }

    pub fn weight(&self) -> f32 {
        *lock(&self.weight)
    }

    pub fn set_weight(&self, weight: f32) {
        *lock(&self.weight) = weight;
    }

    /// Fill base grids and extract explicit waves if not done yet.
    /// Concurrent callers block until the data exists.
    pub fn validate(&self) {
        self.resolved();
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    fn resolved(&self) -> &Resolved {
        self.resolved.get_or_init(|| self.resolve())
    }

    fn resolve(&self) -> Resolved {
        let resolution = self.layout.final_resolution;
        if resolution > self.layout.max_resolution {
            log::warn!(
                "Spectrum resolution {} exceeds the highest quality level's {}",
                resolution,
                self.layout.max_resolution
            );
        }

        let max_resolution = self.layout.max_resolution.max(resolution);
        let grids = std::array::from_fn(|scale| {
            let mut grid = SpectrumGrid::new(resolution);
            self.spectrum.compute_spectrum(
                &mut grid,
                self.layout.tile_size_scales[scale],
                max_resolution,
                self.seed.wrapping_add(scale as u64),
            );
            grid
        });
        let level = Arc::new(SpectrumLevel::new(grids));
        lock(&self.levels)[resolution_index(resolution)] = Some(level.clone());

        let (waves, total_amplitude) = self.find_cpu_waves(&level);
        log::debug!(
            "Resolved {} at {}: {} explicit waves, total amplitude {:.3}",
            self.id,
            resolution,
            waves.cpu_waves.iter().flatten().map(Vec::len).sum::<usize>(),
            total_amplitude
        );

        Resolved {
            level,
            total_amplitude,
            waves: Mutex::new(waves),
        }
    }

    fn find_cpu_waves(&self, level: &SpectrumLevel) -> (WaveSets, f32) {
        let resolution = level.resolution();
        let mip_count = self.layout.mip_count();
        let gravity = self.spectrum.gravity();
        let mut shoreline = ShorelineHeap::new(MAX_SHORELINE_CANDIDATES);
        let mut total_amplitude = 0.0;

        let cpu_waves = std::array::from_fn(|scale| {
            let tile_size = self.spectrum.tile_size() * self.layout.tile_size_scales[scale];
            let frequency_scale = TAU / tile_size;
            let texel_offset = 0.5 / resolution as f32 * tile_size;
            let grid = level.grid(scale);
            let mut buckets = vec![Vec::new(); mip_count];

            for u in 0..resolution {
                let kx = frequency_scale * signed_frequency(u, resolution) as f32;
                for v in 0..resolution {
                    let kz = frequency_scale * signed_frequency(v, resolution) as f32;
                    let cell = grid.get(u, v);
                    let amplitude = cell.x.hypot(cell.y);
                    total_amplitude += amplitude;

                    if amplitude >= self.layout.cpu_wave_threshold {
                        let distance = (u.min(resolution - 1 - u)).max(v.min(resolution - 1 - v));
                        let wave = DiscreteWave::new(scale, u, v, kx, kz, cell, gravity, texel_offset);
                        buckets[mip_index(distance)].push(wave);
                    }

                    if amplitude > SHORELINE_MIN_AMPLITUDE {
                        shoreline.push(DiscreteWave::new(scale, u, v, kx, kz, cell, gravity, texel_offset));
                    }
                }
            }

            for bucket in &mut buckets {
                sort_waves(bucket, false);
                bucket.truncate(self.layout.cpu_max_waves);
            }
            buckets
        });

        let waves = WaveSets {
            cpu_waves,
            shoreline: shoreline.into_sorted_vec(),
            dirty: true,
            last_wind_direction: Vec2::ZERO,
        };
        (waves, total_amplitude)
    }

    /// Grids at `resolution`, deriving and caching them from the nearest
    /// cached higher resolution. `None` for resolutions above the final one.
    pub fn spectrum_values(&self, resolution: usize) -> Option<Arc<SpectrumLevel>> {
        if !resolution.is_power_of_two()
            || resolution < MIN_FFT_RESOLUTION
            || resolution > self.layout.final_resolution
        {
            return None;
        }
        self.resolved();

        let index = resolution_index(resolution);
        let mut levels = lock(&self.levels);
        if let Some(level) = &levels[index] {
            return Some(level.clone());
        }

        let higher = levels[index + 1..].iter().flatten().next()?.clone();
        let level = Arc::new(higher.remap_to(resolution));
        levels[index] = Some(level.clone());
        Some(level)
    }

    pub fn set_cpu_waves_dirty(&self) {
        if let Some(resolved) = self.resolved.get() {
            lock(&resolved.waves).dirty = true;
        }
    }

    /// Re-apply directional spreading to every explicit wave and re-sort
    pub fn update_spectral_values(&self, wind_direction: Vec2, directionality: f32) {
        let resolved = self.resolved();
        let mut waves = lock(&resolved.waves);
        if !waves.dirty {
            return;
        }
        waves.dirty = false;

        let directionality_inv = 1.0 - directionality;
        let mostly_sorted = waves.last_wind_direction.dot(wind_direction) >= MOSTLY_SORTED_WIND_DOT;
        let level = &resolved.level;

        for buckets in &mut waves.cpu_waves {
            for bucket in buckets.iter_mut() {
                for wave in bucket.iter_mut() {
                    wave.update_spectral_values(level.grid(wave.scale_index as usize), wind_direction, directionality_inv);
                }
                sort_waves(bucket, mostly_sorted);
            }
        }
        for wave in &mut waves.shoreline {
            wave.update_spectral_values(level.grid(wave.scale_index as usize), wind_direction, directionality_inv);
        }
        waves.last_wind_direction = wind_direction;
    }

    pub fn total_amplitude(&self) -> f32 {
        self.resolved().total_amplitude
    }

    /// Explicit waves of one scale, per mip bucket
    pub fn cpu_waves(&self, scale: usize) -> Vec<Vec<DiscreteWave>> {
        lock(&self.resolved().waves).cpu_waves[scale].clone()
    }

    pub fn cpu_waves_in_mip(&self, scale: usize, mip: usize) -> usize {
        lock(&self.resolved().waves).cpu_waves[scale]
            .get(mip)
            .map_or(0, Vec::len)
    }

    pub fn cpu_waves_count(&self) -> usize {
        lock(&self.resolved().waves)
            .cpu_waves
            .iter()
            .flatten()
            .map(Vec::len)
            .sum()
    }

    /// Append the waves of `scale` that an FFT at `fft_resolution` does not
    /// synthesize (all of them for `None`), amplitudes and priorities scaled
    /// by `weight`
    pub fn extend_cpu_waves(&self, scale: usize, fft_resolution: Option<usize>, weight: f32, out: &mut Vec<DiscreteWave>) {
        let final_resolution = self.layout.final_resolution;
        let waves = lock(&self.resolved().waves);
        let uncovered = waves.cpu_waves[scale]
            .iter()
            .flatten()
            .filter(|wave| !fft_resolution.is_some_and(|r| covered_by_fft(wave, final_resolution, r)));
        out.extend(uncovered.map(|wave| {
            let mut wave = *wave;
            wave.amplitude *= weight;
            wave.priority = wave.amplitude;
            wave
        }));
    }

    /// Up to 200 candidates with the lowest `k / amplitude`, best first
    pub fn shoreline_candidates(&self) -> Vec<DiscreteWave> {
        lock(&self.resolved().waves).shoreline.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::PhillipsSpectrum;
    use proptest::prelude::*;

    fn layout(resolution: usize) -> SpectrumLayout {
        SpectrumLayout {
            final_resolution: resolution,
            max_resolution: 256,
            tile_size_scales: [1.0, 0.25, 4.0, 16.0],
            cpu_max_waves: usize::MAX,
            cpu_wave_threshold: 0.0,
        }
    }

    fn resolved(resolution: usize, seed: u64) -> ResolvedSpectrum {
        let spectrum: Arc<dyn WaveSpectrum> = Arc::new(PhillipsSpectrum::new(100.0, 12.0));
        ResolvedSpectrum::new(SpectrumId(1), spectrum, seed, layout(resolution))
    }

    #[test]
    fn test_mip_index() {
        assert_eq!(mip_index(0), 0);
        assert_eq!(mip_index(1), 0);
        assert_eq!(mip_index(31), 0);
        assert_eq!(mip_index(32), 1);
        assert_eq!(mip_index(64), 2);
        assert_eq!(mip_index(127), 2);
    }

    #[test]
    fn test_mip_count() {
        assert_eq!(layout(256).mip_count(), 5);
        assert_eq!(layout(16).mip_count(), 1);
    }

    #[test]
    fn test_explicit_waves_conserve_energy() {
        let data = resolved(64, 3);
        data.validate();

        let mut grid_energy = 0.0f64;
        let level = data.spectrum_values(64).unwrap();
        for scale in 0..NUM_SCALES {
            for value in level.grid(scale).values() {
                grid_energy += f64::from(value.x * value.x + value.y * value.y);
            }
        }

        let mut wave_energy = 0.0f64;
        for scale in 0..NUM_SCALES {
            for bucket in data.cpu_waves(scale) {
                for wave in bucket {
                    wave_energy += f64::from(wave.amplitude * wave.amplitude);
                }
            }
        }

        assert!(grid_energy > 0.0);
        assert!(((wave_energy - grid_energy) / grid_energy).abs() < 1e-4);
    }

    #[test]
    fn test_fft_coverage_excludes_nyquist() {
        let wave = |u, v| DiscreteWave::new(0, u, v, 1.0, 0.0, glam::Vec3::X, 9.81, 0.0);
        assert!(covered_by_fft(&wave(0, 0), 64, 16));
        assert!(covered_by_fft(&wave(7, 57), 64, 16));
        assert!(!covered_by_fft(&wave(8, 0), 64, 16));
        assert!(!covered_by_fft(&wave(0, 56), 64, 16));
        assert!(covered_by_fft(&wave(31, 33), 64, 64));
        assert!(!covered_by_fft(&wave(32, 0), 64, 64));
    }

    #[test]
    fn test_extend_splits_waves_between_fft_and_direct() {
        let data = resolved(64, 6);
        let total = data.cpu_waves(1).iter().map(Vec::len).sum::<usize>();

        let mut all = Vec::new();
        data.extend_cpu_waves(1, None, 0.5, &mut all);
        assert_eq!(all.len(), total);
        assert!(all.iter().all(|wave| wave.priority == wave.amplitude));

        let mut direct = Vec::new();
        data.extend_cpu_waves(1, Some(32), 0.5, &mut direct);
        let covered = all.iter().filter(|wave| covered_by_fft(wave, 64, 32)).count();
        assert_eq!(direct.len() + covered, total);
    }

    #[test]
    fn test_same_seed_same_waves() {
        let a = resolved(32, 11);
        let b = resolved(32, 11);
        for scale in 0..NUM_SCALES {
            assert_eq!(a.cpu_waves(scale), b.cpu_waves(scale));
        }
        assert_eq!(a.shoreline_candidates(), b.shoreline_candidates());
    }

    #[test]
    fn test_buckets_sorted_by_priority() {
        let data = resolved(64, 5);
        data.update_spectral_values(Vec2::new(0.6, 0.8), 0.5);
        for scale in 0..NUM_SCALES {
            for bucket in data.cpu_waves(scale) {
                assert!(bucket.windows(2).all(|pair| pair[0].priority >= pair[1].priority));
            }
        }
    }

    #[test]
    fn test_buckets_truncated_to_max_waves() {
        let spectrum: Arc<dyn WaveSpectrum> = Arc::new(PhillipsSpectrum::new(100.0, 12.0));
        let mut layout = layout(64);
        layout.cpu_max_waves = 10;
        let data = ResolvedSpectrum::new(SpectrumId(2), spectrum, 1, layout);
        for scale in 0..NUM_SCALES {
            assert!(data.cpu_waves(scale).iter().all(|bucket| bucket.len() <= 10));
        }
    }

    #[test]
    fn test_derived_level_matches_quadrant_remap() {
        let data = resolved(256, 9);
        let base = data.spectrum_values(256).unwrap();

        let level64 = data.spectrum_values(64).unwrap();
        assert_eq!(*level64, base.remap_to(64));

        // Derived from the cached 64 level; identical to remapping the base directly
        let level32 = data.spectrum_values(32).unwrap();
        assert_eq!(*level32, level64.remap_to(32));
        assert_eq!(*level32, base.remap_to(32));

        assert!(data.spectrum_values(512).is_none());
        assert!(data.spectrum_values(48).is_none());
    }

    #[test]
    fn test_shoreline_candidates_lowest_priority() {
        let data = resolved(64, 21);
        let candidates = data.shoreline_candidates();

        let level = data.spectrum_values(64).unwrap();
        let mut all = Vec::new();
        for scale in 0..NUM_SCALES {
            let tile_size = 100.0 * layout(64).tile_size_scales[scale];
            let frequency_scale = TAU / tile_size;
            let grid = level.grid(scale);
            for u in 0..64 {
                for v in 0..64 {
                    let cell = grid.get(u, v);
                    let amplitude = cell.x.hypot(cell.y);
                    if amplitude > SHORELINE_MIN_AMPLITUDE {
                        let kx = frequency_scale * signed_frequency(u, 64) as f32;
                        let kz = frequency_scale * signed_frequency(v, 64) as f32;
                        all.push((kx * kx + kz * kz).sqrt() / amplitude);
                    }
                }
            }
        }
        all.sort_by(f32::total_cmp);

        assert!(all.len() > MAX_SHORELINE_CANDIDATES);
        assert_eq!(candidates.len(), MAX_SHORELINE_CANDIDATES);
        assert!(candidates
            .windows(2)
            .all(|pair| pair[0].shoreline_priority <= pair[1].shoreline_priority));
        let worst_kept = candidates[MAX_SHORELINE_CANDIDATES - 1].shoreline_priority;
        assert!((worst_kept - all[MAX_SHORELINE_CANDIDATES - 1]).abs() <= 1e-6 * worst_kept.max(1.0));
    }

    #[test]
    fn test_concurrent_validation_sees_complete_data() {
        let data = Arc::new(resolved(64, 4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let data = data.clone();
                std::thread::spawn(move || data.cpu_waves_count())
            })
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(counts.iter().all(|&count| count == counts[0] && count > 0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_shoreline_heap_keeps_lowest(priorities in prop::collection::vec(0.0f32..100.0, 0..400)) {
            let mut heap = ShorelineHeap::new(MAX_SHORELINE_CANDIDATES);
            for &priority in &priorities {
                let mut wave = DiscreteWave::new(0, 1, 0, 1.0, 0.0, glam::Vec3::new(1.0, 0.0, 0.0), 9.81, 0.0);
                wave.shoreline_priority = priority;
                heap.push(wave);
            }

            let kept: Vec<f32> = heap.into_sorted_vec().iter().map(|w| w.shoreline_priority).collect();
            let mut expected = priorities.clone();
            expected.sort_by(f32::total_cmp);
            expected.truncate(MAX_SHORELINE_CANDIDATES);
            prop_assert_eq!(kept, expected);
        }
    }
}
