//! Render vertex for wave-particle quads

use bytemuck::{Pod, Zeroable};

/// Quad corner UVs in emission order
pub const QUAD_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];

/// One corner of a particle quad; every corner carries the full particle state
/// and the renderer expands the quad from `uv`
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub direction: [f32; 2],
    pub amplitude: f32,
    pub frequency: f32,
}

impl ParticleVertex {
    /// Marks an empty slot; renderers drop quads whose position is NaN
    pub const INVALID: ParticleVertex = ParticleVertex {
        position: [f32::NAN, f32::NAN],
        uv: [0.0; 2],
        direction: [0.0; 2],
        amplitude: 0.0,
        frequency: 0.0,
    };

    pub const fn new(position: [f32; 2], uv: [f32; 2], direction: [f32; 2], amplitude: f32, frequency: f32) -> Self {
        Self {
            position,
            uv,
            direction,
            amplitude,
            frequency,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.position[0].is_nan()
    }
}
