//! Scalar radix-2 inverse FFT for wave tiles
//!
//! Six real fields are synthesized in one complex transform by packing
//! pairs of Hermitian spectra as `A + iB`:
//! - lane 0: height + i·force.y
//! - lane 1: displacement.x + i·displacement.z
//! - lane 2: force.x + i·force.z
//!
//! The output is in natural order: texel `y * n + x` lies at
//! `(x, y) · tile_size / n` in synthesis space.

mod tile;

pub use tile::{FftResults, TileSnapshot, TileSpectrum};

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use num_complex::Complex32;

use crate::consts::MIN_SPECTRUM_WEIGHT;
use crate::spectrum::{SpectrumLevel, directional_factor};
use crate::{lock, signed_frequency};

/// Complex lanes transformed together
pub const LANES: usize = 3;

/// Tile sizes closer than 1/1024 m share a k-map
const K_MAP_QUANTIZATION: f32 = 1024.0;

type Cell = [Complex32; LANES];

const ZERO_CELL: Cell = [Complex32::new(0.0, 0.0); LANES];

/// One weighted spectrum contributing to a tile
#[derive(Debug, Clone)]
pub struct SpectrumLayer {
    pub level: Arc<SpectrumLevel>,
    pub weight: f32,
}

/// Everything besides tile state that a tile computation reads
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub layers: &'a [SpectrumLayer],
    pub tile_size: f32,
    pub wind_direction: Vec2,
    pub directionality: f32,
    pub gravity: f32,
}

/// Bit-reversal and twiddle tables plus scratch buffers for one resolution
#[derive(Debug)]
pub struct FftTables {
    resolution: usize,
    bit_reverse: Vec<usize>,
    /// `e^{+2πi j/n}` for `j < n/2`
    twiddles: Vec<Complex32>,
    k_maps: HashMap<i64, Arc<[Vec3]>>,
    timed: Vec<Cell>,
    line: Vec<Cell>,
    scratch: Vec<Cell>,
}

impl FftTables {
    pub fn new(resolution: usize) -> Self {
        let bits = resolution.trailing_zeros();
        let bit_reverse = (0..resolution)
            .map(|i| if bits == 0 { 0 } else { i.reverse_bits() >> (usize::BITS - bits) })
            .collect();
        let twiddles = (0..resolution / 2)
            .map(|j| Complex32::from_polar(1.0, TAU * j as f32 / resolution as f32))
            .collect();

        Self {
            resolution,
            bit_reverse,
            twiddles,
            k_maps: HashMap::new(),
            timed: vec![ZERO_CELL; resolution * resolution],
            line: vec![ZERO_CELL; resolution],
            scratch: vec![ZERO_CELL; resolution],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// `(k̂x, k̂z, k)` per FFT-order texel, cached per quantized tile size
    pub fn k_map(&mut self, tile_size: f32) -> Arc<[Vec3]> {
        let key = (tile_size * K_MAP_QUANTIZATION).round() as i64;
        let n = self.resolution;
        self.k_maps
            .entry(key)
            .or_insert_with(|| {
                let frequency_scale = TAU / tile_size;
                let mut map = Vec::with_capacity(n * n);
                for y in 0..n {
                    let kz = frequency_scale * signed_frequency(y, n) as f32;
                    for x in 0..n {
                        let kx = frequency_scale * signed_frequency(x, n) as f32;
                        let k = (kx * kx + kz * kz).sqrt();
                        if k > 0.0 {
                            map.push(Vec3::new(kx / k, kz / k, k));
                        } else {
                            map.push(Vec3::ZERO);
                        }
                    }
                }
                map.into()
            })
            .clone()
    }

    /// Unnormalized inverse transform of one line, in place
    fn inverse_line(bit_reverse: &[usize], twiddles: &[Complex32], line: &mut [Cell], scratch: &mut [Cell]) {
        let n = line.len();
        for (i, &source) in bit_reverse.iter().enumerate() {
            scratch[i] = line[source];
        }

        let mut span = 1;
        while span < n {
            let stride = n / (span * 2);
            for start in (0..n).step_by(span * 2) {
                for j in 0..span {
                    let w = twiddles[j * stride];
                    let a = scratch[start + j];
                    let b = scratch[start + j + span];
                    for lane in 0..LANES {
                        let t = b[lane] * w;
                        scratch[start + j][lane] = a[lane] + t;
                        scratch[start + j + span][lane] = a[lane] - t;
                    }
                }
            }
            span *= 2;
        }

        line.copy_from_slice(scratch);
    }

    /// 2D inverse transform of the timed spectrum: rows, then columns
    fn transform(&mut self) {
        let n = self.resolution;
        for row in self.timed.chunks_exact_mut(n) {
            Self::inverse_line(&self.bit_reverse, &self.twiddles, row, &mut self.scratch);
        }

        for x in 0..n {
            for y in 0..n {
                self.line[y] = self.timed[y * n + x];
            }
            Self::inverse_line(&self.bit_reverse, &self.twiddles, &mut self.line, &mut self.scratch);
            for y in 0..n {
                self.timed[y * n + x] = self.line[y];
            }
        }
    }

    /// Advance the directional spectrum to `time` and pack the six fields
    fn compute_timed_spectra(&mut self, directional: &[Vec2], k_map: &[Vec3], wind_direction: Vec2, gravity: f32, time: f32) {
        let n = self.resolution;
        let half = n / 2;

        for y in 0..n {
            let y2 = (n - y) % n;
            for x in 0..n {
                let x2 = (n - x) % n;
                let index = y * n + x;
                let s1 = directional[index];
                let s2 = directional[y2 * n + x2];

                let km = k_map[index];
                let k = km.z;
                let nk = if k > 0.0 { Vec2::new(km.x, km.y) } else { wind_direction };
                // Odd fields cannot be represented on self-conjugate bins
                let nkx = if x == half || k == 0.0 { 0.0 } else { nk.x };
                let nkz = if y == half || k == 0.0 { 0.0 } else { nk.y };

                let (s, c) = (time * (gravity * k).sqrt()).sin_cos();
                let a = 0.5 * ((s1.x + s2.x) * c - (s1.y + s2.y) * s);
                let b = 0.5 * ((s1.x - s2.x) * s + (s1.y - s2.y) * c);

                let (kx, kz) = (nkx * k, nkz * k);
                self.timed[index] = [
                    Complex32::new(a + k * b, b - k * a),
                    Complex32::new(nkx * b + nkz * a, nkz * b - nkx * a),
                    Complex32::new(kx * b + kz * a, kz * b - kx * a),
                ];
            }
        }
    }

    fn unpack(&self, results: &mut FftResults) {
        for (index, cell) in self.timed.iter().enumerate() {
            let [height_force_y, displacement, force_xz] = *cell;
            results.displacements[index] = Vec2::new(displacement.re, displacement.im);
            results.force_and_height[index] = Vec4::new(force_xz.re, height_force_y.im, force_xz.im, height_force_y.re);
        }
    }
}

/// Weighted sum of all layers with directional spreading applied. The
/// Nyquist row and column stay empty; explicit waves cover them.
pub(crate) fn compute_directional_spectra(values: &mut [Vec2], scale: usize, input: &SynthesisInput<'_>, k_map: &[Vec3]) {
    values.fill(Vec2::ZERO);
    let directionality_inv = 1.0 - input.directionality;
    let n = values.len().isqrt();
    let half = n / 2;

    for layer in input.layers {
        if layer.weight <= MIN_SPECTRUM_WEIGHT {
            continue;
        }
        let grid = layer.level.grid(scale);
        if grid.values().len() != values.len() {
            continue;
        }

        for (index, ((value, cell), km)) in values.iter_mut().zip(grid.values()).zip(k_map).enumerate() {
            if index % n == half || index / n == half {
                continue;
            }
            let direction = if km.z > 0.0 { Vec2::new(km.x, km.y) } else { input.wind_direction };
            let factor = directional_factor(direction, input.wind_direction, cell.z, directionality_inv);
            *value += Vec2::new(cell.x, cell.y) * (factor * layer.weight);
        }
    }
}

/// Tile synthesizer; owns per-resolution tables and scratch space
#[derive(Debug, Default)]
pub struct FftEngine {
    tables: HashMap<usize, FftTables>,
}

impl FftEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&mut self, resolution: usize) -> &mut FftTables {
        self.tables
            .entry(resolution)
            .or_insert_with(|| FftTables::new(resolution))
    }

    /// Synthesize `tile` at `time` into result slot `output_buffer_index` and publish it
    pub fn compute(&mut self, tile: &TileSpectrum, input: &SynthesisInput<'_>, time: f32, output_buffer_index: usize) {
        let resolution = tile.resolution();
        if resolution < 2 || !resolution.is_power_of_two() {
            return;
        }

        let tables = self.tables(resolution);
        let k_map = tables.k_map(input.tile_size);
        {
            let mut directional = lock(tile.directional());
            if directional.values.len() != resolution * resolution {
                directional.values = vec![Vec2::ZERO; resolution * resolution];
                directional.dirty = directional.dirty.max(1);
            }
            if directional.dirty > 0 {
                compute_directional_spectra(&mut directional.values, tile.scale_index(), input, &k_map);
                directional.dirty -= 1;
            }
            tables.compute_timed_spectra(&directional.values, &k_map, input.wind_direction, input.gravity, time);
        }

        tables.transform();

        let mut results = tile.take_buffer(output_buffer_index, resolution);
        tables.unpack(&mut results);
        results.time = time;
        tile.publish(output_buffer_index, results);
    }
}
