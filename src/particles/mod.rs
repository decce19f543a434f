//! Wave particles: discrete wave fronts for shoreline effects
//!
//! Particles form chains (groups), live in a generational arena and are
//! indexed by a quadtree whose leaves update them at visibility- and
//! load-dependent rates.

mod particle;
pub mod quadtree;
mod rect;
mod system;
mod vertex;

pub use particle::{
    Arena, ArenaKey, GroupId, MAX_SUBDIVISIONS_PER_UPDATE, MIN_PARTICLE_AMPLITUDE, PARTICLE_SPACING, ParticleArena,
    ParticleId, ParticleRef, WaveParticle, WaveParticlesGroup,
};
pub use quadtree::{NodePayload, Quadtree, QuadtreeNode};
pub use rect::Rect;
pub use system::{
    INVISIBLE_SLOTS_PER_UPDATE, MAX_STRESS, MIN_STRESS, ParticleNode, WaveParticlesQuadtree, WavesParticlePlugin,
    WavesParticleSystem,
};
pub use vertex::{ParticleVertex, QUAD_UVS};
