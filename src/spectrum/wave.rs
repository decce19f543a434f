//! Explicit waves extracted from a spectrum
//!
//! A wave sampled at synthesis-space point `p` has phase
//! `θ = k·(dir·p) + ω·t + phase` and contributes
//! height `A cos θ`, horizontal displacement `dir · A sin θ` and force
//! `(dir.x·k·A sin θ, -k·A cos θ, dir.y·k·A sin θ)`.

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::SpectrumGrid;

/// One spectrum bin evaluated in closed form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscreteWave {
    pub scale_index: u8,
    /// FFT-order grid indices at the final resolution
    pub u: u16,
    pub v: u16,
    /// Unit propagation direction (wind direction when `k == 0`)
    pub direction: Vec2,
    /// Wavenumber magnitude
    pub k: f32,
    /// Angular frequency
    pub w: f32,
    pub amplitude: f32,
    /// Initial phase, including the half-texel offset
    pub phase: f32,
    /// Half-texel phase offset `k·δ`
    pub offset: f32,
    /// Sort key for explicit-wave lists (current amplitude)
    pub priority: f32,
    /// Sort key for shoreline candidates (`k / amplitude`, lower is better)
    pub shoreline_priority: f32,
}

impl DiscreteWave {
    /// Build a wave from the grid cell at `(u, v)` with wavevector `(kx, kz)`.
    /// `texel_offset` is the half-texel shift `δ` in meters on each axis.
    pub fn new(scale_index: usize, u: usize, v: usize, kx: f32, kz: f32, cell: Vec3, gravity: f32, texel_offset: f32) -> Self {
        let k = (kx * kx + kz * kz).sqrt();
        let direction = if k > 0.0 {
            Vec2::new(kx / k, kz / k)
        } else {
            Vec2::X
        };
        let amplitude = cell.x.hypot(cell.y);
        let offset = (kx + kz) * texel_offset;

        Self {
            scale_index: scale_index as u8,
            u: u as u16,
            v: v as u16,
            direction,
            k,
            w: (gravity * k).sqrt(),
            amplitude,
            phase: cell.y.atan2(cell.x) + offset,
            offset,
            priority: amplitude,
            shoreline_priority: if amplitude > 0.0 { k / amplitude } else { f32::INFINITY },
        }
    }

    /// Re-apply directional spreading for a new wind direction
    pub fn update_spectral_values(&mut self, grid: &SpectrumGrid, wind_direction: Vec2, directionality_inv: f32) {
        let cell = grid.get(self.u as usize, self.v as usize);
        if self.k == 0.0 {
            self.direction = wind_direction;
        }

        let factor = directional_factor(self.direction, wind_direction, cell.z, directionality_inv);
        self.amplitude = cell.x.hypot(cell.y) * factor;
        self.phase = cell.y.atan2(cell.x) + self.offset;
        self.priority = self.amplitude;
    }

    #[inline]
    fn angle(&self, p: Vec2, time: f32) -> f32 {
        self.k * self.direction.dot(p) + self.w * time + self.phase
    }

    pub fn height_at(&self, p: Vec2, time: f32) -> f32 {
        self.amplitude * self.angle(p, time).cos()
    }

    pub fn horizontal_displacement_at(&self, p: Vec2, time: f32) -> Vec2 {
        self.direction * (self.amplitude * self.angle(p, time).sin())
    }

    /// `(dx, height, dz)`
    pub fn displacement_at(&self, p: Vec2, time: f32) -> Vec3 {
        let (s, c) = self.angle(p, time).sin_cos();
        let d = self.direction * (self.amplitude * s);
        Vec3::new(d.x, self.amplitude * c, d.y)
    }

    /// `(force.x, force.y, force.z, height)`
    pub fn force_and_height_at(&self, p: Vec2, time: f32) -> Vec4 {
        let (s, c) = self.angle(p, time).sin_cos();
        let ka = self.k * self.amplitude;
        Vec4::new(
            self.direction.x * ka * s,
            -ka * c,
            self.direction.y * ka * s,
            self.amplitude * c,
        )
    }

    pub fn to_gerstner(&self, weight: f32) -> GerstnerWave {
        GerstnerWave {
            direction: self.direction,
            amplitude: self.amplitude * weight,
            offset: self.phase,
            k: self.k,
            w: self.w,
        }
    }
}

/// Cosine-squared spreading around the wind; waves running against the wind
/// are attenuated by `directionality_inv`
pub(crate) fn directional_factor(direction: Vec2, wind_direction: Vec2, spreading: f32, directionality_inv: f32) -> f32 {
    let dp = wind_direction.dot(direction);
    let phi = (dp * 0.999).acos();
    let factor = (1.0 + spreading * (2.0 * phi).cos()).max(0.0).sqrt();
    if dp < 0.0 { factor * directionality_inv } else { factor }
}

/// Gerstner wave parameters for hosts that render waves analytically
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GerstnerWave {
    pub direction: Vec2,
    pub amplitude: f32,
    pub offset: f32,
    pub k: f32,
    pub w: f32,
}

/// Four Gerstner waves packed for vectorized evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Gerstner4 {
    pub waves: [GerstnerWave; 4],
}

impl Gerstner4 {
    pub fn new(waves: [GerstnerWave; 4]) -> Self {
        Self { waves }
    }

    pub fn amplitudes(&self) -> Vec4 {
        Vec4::from_array(self.waves.map(|wave| wave.amplitude))
    }
}

/// Sort descending by priority.
///
/// A full stable sort normally; when the list is known to be mostly sorted
/// (small wind change) a single adaptive exchange pass that steps back after
/// every swap.
pub fn sort_waves(waves: &mut [DiscreteWave], mostly_sorted: bool) {
    if !mostly_sorted {
        waves.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        return;
    }

    let mut prev = 0;
    let mut index = 1;
    while index < waves.len() {
        if waves[prev].priority < waves[index].priority {
            waves.swap(prev, index);
            if index != 1 {
                index -= 2;
            }
        }
        prev = index;
        index += 1;
    }
}
