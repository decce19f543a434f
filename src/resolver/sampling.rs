//! Point sampling: interpolated FFT tiles plus direct explicit-wave sums

use std::ops::{Add, Mul};

use glam::{Vec2, Vec3, Vec4};

use super::{FrameState, SpectrumResolver};
use crate::fft::{FftResults, TileSnapshot};
use crate::spectrum::DiscreteWave;
use crate::{bilinear, lerp, wrap_index};

/// Bilinear taps into one tile
struct Taps {
    indices: [usize; 4],
    fx: f32,
    fy: f32,
}

impl Taps {
    fn new(p: Vec2, tile_size: f32, resolution: usize, final_resolution: usize) -> Self {
        let half_texel = 0.5 / final_resolution as f32 * tile_size;
        let q = (p + Vec2::splat(half_texel)) * (resolution as f32 / tile_size);
        let (fx0, fy0) = (q.x.floor(), q.y.floor());

        let x0 = wrap_index(fx0 as i64, resolution);
        let y0 = wrap_index(fy0 as i64, resolution);
        let x1 = (x0 + 1) % resolution;
        let y1 = (y0 + 1) % resolution;
        Self {
            indices: [y0 * resolution + x0, y0 * resolution + x1, y1 * resolution + x0, y1 * resolution + x1],
            fx: q.x - fx0,
            fy: q.y - fy0,
        }
    }

    fn sample<T>(&self, values: &[T]) -> T
    where
        T: Copy + Add<Output = T> + Mul<f32, Output = T>,
    {
        let [i00, i10, i01, i11] = self.indices;
        bilinear(values[i00], values[i10], values[i01], values[i11], self.fx, self.fy)
    }
}

/// Spatial then temporal interpolation of one field of a snapshot
fn interpolate<T>(snapshot: &TileSnapshot, taps: &Taps, field: impl Fn(&FftResults) -> &[T]) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    lerp(taps.sample(field(&snapshot.older)), taps.sample(field(&snapshot.newer)), snapshot.t)
}

/// `[start · n, end · n)` of a list of `n` waves
fn wave_range(count: usize, spectrum_start: f32, spectrum_end: f32) -> std::ops::Range<usize> {
    let start = (spectrum_start.clamp(0.0, 1.0) * count as f32) as usize;
    let end = (spectrum_end.clamp(0.0, 1.0) * count as f32) as usize;
    start..end.max(start)
}

impl SpectrumResolver {
    /// World `(x, z)` to synthesis space
    fn synthesis_point(frame: &FrameState, x: f32, z: f32) -> Vec2 {
        -(Vec2::new(x, z) + frame.surface_offset)
    }

    /// Accumulate FFT tiles (when the bulk band is included) and the selected
    /// slice of explicit waves
    fn sample<T>(
        &self,
        x: f32,
        z: f32,
        spectrum_start: f32,
        spectrum_end: f32,
        time: f32,
        from_tile: impl Fn(&TileSnapshot, &Taps) -> T,
        from_wave: impl Fn(&DiscreteWave, Vec2, f32) -> T,
    ) -> (T, FrameState)
    where
        T: Copy + Default + Add<Output = T>,
    {
        self.record_sample();
        let frame = self.frame();
        let p = Self::synthesis_point(&frame, x, z);
        let mut result = T::default();

        if spectrum_start <= 0.0 {
            let final_resolution = self.settings().final_resolution();
            for (scale, tile) in self.tiles.iter().enumerate() {
                let tile_size = frame.tile_sizes[scale];
                if tile_size <= 0.0 {
                    continue;
                }
                let Some(snapshot) = tile.snapshot(time) else {
                    continue;
                };
                let taps = Taps::new(p, tile_size, snapshot.resolution(), final_resolution);
                result = result + from_tile(&snapshot, &taps);
            }
        }

        let waves = self.filtered_cpu_waves();
        for wave in &waves[wave_range(waves.len(), spectrum_start, spectrum_end)] {
            result = result + from_wave(wave, p, time);
        }
        (result, frame)
    }

    fn horizontal_scale(&self, frame: &FrameState) -> f32 {
        self.settings().horizontal_displacement_scale * frame.uniform_scale
    }

    /// `(dx, height, dz)` at world `(x, z)`
    pub fn displacement_at(&self, x: f32, z: f32, spectrum_start: f32, spectrum_end: f32, time: f32) -> Vec3 {
        let (d, frame) = self.sample(
            x,
            z,
            spectrum_start,
            spectrum_end,
            time,
            |snapshot, taps| {
                let horizontal = interpolate(snapshot, taps, |r| r.displacements.as_slice());
                let height = interpolate(snapshot, taps, |r| r.force_and_height.as_slice()).w;
                Vec3::new(horizontal.x, height, horizontal.y)
            },
            DiscreteWave::displacement_at,
        );
        let horizontal = self.horizontal_scale(&frame);
        Vec3::new(d.x * horizontal, d.y * frame.uniform_scale, d.z * horizontal)
    }

    pub fn horizontal_displacement_at(&self, x: f32, z: f32, spectrum_start: f32, spectrum_end: f32, time: f32) -> Vec2 {
        let (d, frame) = self.sample(
            x,
            z,
            spectrum_start,
            spectrum_end,
            time,
            |snapshot, taps| interpolate(snapshot, taps, |r| r.displacements.as_slice()),
            DiscreteWave::horizontal_displacement_at,
        );
        d * self.horizontal_scale(&frame)
    }

    pub fn height_at(&self, x: f32, z: f32, spectrum_start: f32, spectrum_end: f32, time: f32) -> f32 {
        let (height, frame) = self.sample(
            x,
            z,
            spectrum_start,
            spectrum_end,
            time,
            |snapshot, taps| interpolate(snapshot, taps, |r| r.force_and_height.as_slice()).w,
            DiscreteWave::height_at,
        );
        height * frame.uniform_scale
    }

    /// `(force.x, force.y, force.z, height)` at world `(x, z)`
    pub fn force_and_height_at(&self, x: f32, z: f32, spectrum_start: f32, spectrum_end: f32, time: f32) -> Vec4 {
        let (f, frame) = self.sample(
            x,
            z,
            spectrum_start,
            spectrum_end,
            time,
            |snapshot, taps| interpolate(snapshot, taps, |r| r.force_and_height.as_slice()),
            DiscreteWave::force_and_height_at,
        );
        let horizontal = self.horizontal_scale(&frame);
        Vec4::new(
            f.x * horizontal,
            f.y * 0.5 * frame.uniform_scale,
            f.z * horizontal,
            f.w * frame.uniform_scale,
        )
    }
}
