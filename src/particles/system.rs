//! Wave-particle simulation driver
//!
//! `WaveParticlesQuadtree` steps the particles stored in each leaf at a
//! cadence that depends on visibility and on a load-driven stress factor.
//! `WavesParticleSystem` owns it, spawns particle fans and advances time.

use std::time::Instant;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::particle::{GroupId, MAX_SUBDIVISIONS_PER_UPDATE, PARTICLE_SPACING, ParticleArena, ParticleId, ParticleRef};
use super::quadtree::{NodeId, NodePayload, Quadtree};
use super::vertex::QUAD_UVS;
use super::{ParticleVertex, Rect, WaveParticle};
use crate::error::ConfigError;
use crate::settings::ParticleSettings;

/// Element slots an invisible leaf refreshes per call
pub const INVISIBLE_SLOTS_PER_UPDATE: usize = 8;
/// Cheap / costly group update intervals (s) for leaves in view
pub const VISIBLE_UPDATE_DELAYS: (f32, f32) = (0.01, 0.4);
/// Cheap / costly group update intervals (s) for leaves out of view
pub const INVISIBLE_UPDATE_DELAYS: (f32, f32) = (1.5, 8.0);

pub const MIN_STRESS: f32 = 1.0;
pub const MAX_STRESS: f32 = 20.0;
/// Measured update durations are clamped to this before `exp`
const MAX_MEASURED_DURATION_MS: f32 = 50.0;
const STRESS_DECAY: f32 = 0.98;
const STRESS_GAIN: f32 = 0.04;
/// Simulation step used while prewarming
pub const PREWARM_STEP: f32 = 0.1;

/// Per-leaf state: quad vertices per slot and the registry of groups present
#[derive(Debug)]
pub struct ParticleNode {
    vertices: Vec<ParticleVertex>,
    groups: Vec<GroupId>,
    last_update_index: usize,
}

impl ParticleNode {
    /// Four vertices per element slot; empty slots are [`ParticleVertex::INVALID`]
    pub fn vertices(&self) -> &[ParticleVertex] {
        &self.vertices
    }

    pub fn groups(&self) -> &[GroupId] {
        &self.groups
    }

    /// Slot the next invisible refresh starts at
    pub fn last_update_index(&self) -> usize {
        self.last_update_index
    }

    fn write_quad(&mut self, slot: usize, particle: &WaveParticle) {
        if let Some(quad) = self.vertices.get_mut(slot * 4..slot * 4 + 4) {
            for (vertex, uv) in quad.iter_mut().zip(QUAD_UVS) {
                *vertex = particle.vertex(uv);
            }
        }
    }
}

impl NodePayload<ParticleRef> for ParticleNode {
    fn new(capacity: usize) -> Self {
        Self {
            vertices: vec![ParticleVertex::INVALID; capacity * 4],
            groups: Vec::with_capacity((capacity >> 3).max(1)),
            last_update_index: 0,
        }
    }

    fn element_added(&mut self, _slot: usize, element: &ParticleRef) {
        if !self.groups.contains(&element.group) {
            self.groups.push(element.group);
        }
    }

    fn element_removed(&mut self, slot: usize) {
        if let Some(quad) = self.vertices.get_mut(slot * 4..slot * 4 + 4) {
            quad.fill(ParticleVertex::INVALID);
        }
    }

    fn split(&mut self) {
        self.vertices = Vec::new();
        self.groups = Vec::new();
    }
}

/// Spatial index of wave particles with time-sliced leaf updates
#[derive(Debug)]
pub struct WaveParticlesQuadtree {
    tree: Quadtree<ParticleRef, ParticleNode>,
    arena: ParticleArena,
    visible_rects: Vec<Rect>,
    stress: f32,
}

impl WaveParticlesQuadtree {
    pub fn new(rect: Rect, max_elements_per_node: usize, max_total_elements: usize, margin_fraction: f32) -> Self {
        Self {
            tree: Quadtree::new(rect, max_elements_per_node, max_total_elements, margin_fraction),
            arena: ParticleArena::new(),
            visible_rects: Vec::new(),
            stress: MIN_STRESS,
        }
    }

    pub fn tree(&self) -> &Quadtree<ParticleRef, ParticleNode> {
        &self.tree
    }

    pub fn arena(&self) -> &ParticleArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut ParticleArena {
        &mut self.arena
    }

    /// Particles currently placed in the tree
    pub fn count(&self) -> usize {
        self.tree.count()
    }

    pub fn free_space(&self) -> usize {
        self.tree.free_space()
    }

    pub fn stress(&self) -> f32 {
        self.stress
    }

    /// Rects currently in view; leaves overlapping one update at the fast cadence
    pub fn set_visible_rects(&mut self, rects: Vec<Rect>) {
        self.visible_rects = rects;
    }

    pub fn insert(&mut self, reference: ParticleRef) -> bool {
        let arena = &self.arena;
        let inserted = self.tree.insert(reference, |element| {
            arena
                .particle(element.particle)
                .map_or(Vec2::NAN, |particle| particle.position)
        });
        for orphan in self.tree.take_orphans() {
            self.arena.release(orphan.particle);
        }
        inserted
    }

    /// Step the simulation and feed the wall-clock duration into the stress factor
    pub fn update_simulation_measured(&mut self, time: f32, expected_duration_exp: f32) {
        let start = Instant::now();
        self.update_simulation(time);
        let duration_ms = start.elapsed().as_secs_f32() * 1000.0;
        self.apply_stress(duration_ms, expected_duration_exp);
    }

    pub fn update_simulation(&mut self, time: f32) {
        let mut pending = Vec::new();
        for leaf in self.tree.leaves() {
            if self.tree.node(leaf).num_elements() != 0 {
                self.update_leaf(leaf, time, &mut pending);
            }
        }

        for reference in pending {
            if !self.insert(reference) {
                self.arena.release(reference.particle);
            }
        }
    }

    fn apply_stress(&mut self, duration_ms: f32, expected_duration_exp: f32) {
        let duration = duration_ms.min(MAX_MEASURED_DURATION_MS);
        self.stress = self.stress * STRESS_DECAY + (duration.exp() - expected_duration_exp) * STRESS_GAIN;
        if self.stress < MIN_STRESS {
            self.stress = MIN_STRESS;
        }
        // Also catches NaN
        if !(self.stress < MAX_STRESS) {
            self.stress = MAX_STRESS;
        }
        log::trace!("Wave particle update took {:.3} ms, stress {:.3}", duration_ms, self.stress);
    }

    fn update_leaf(&mut self, leaf: NodeId, time: f32, pending: &mut Vec<ParticleRef>) {
        let node = self.tree.node(leaf);
        let rect = *node.rect();
        let margin_rect = *node.margin_rect();
        let capacity = node.elements().len();
        let visible = self.visible_rects.iter().any(|view| rect.overlaps(view));

        let (start, end) = if visible {
            (0, capacity)
        } else {
            let payload = &mut self.tree.node_mut(leaf).payload;
            let start = payload.last_update_index;
            let mut end = start + INVISIBLE_SLOTS_PER_UPDATE;
            if end >= capacity {
                end = capacity;
                payload.last_update_index = 0;
            } else {
                payload.last_update_index = end;
            }
            (start, end)
        };

        let (update_delay, costly_update_delay) = if visible {
            VISIBLE_UPDATE_DELAYS
        } else {
            INVISIBLE_UPDATE_DELAYS
        };
        let update_delay = update_delay * self.stress;
        let costly_update_delay = costly_update_delay * self.stress;
        let mut did_costly_update = false;

        let mut index = 0;
        while let Some(&group) = self.tree.node(leaf).payload.groups.get(index) {
            let Some(entry) = self.arena.group(group).filter(|_| self.arena.is_group_alive(group)) else {
                self.tree.node_mut(leaf).payload.groups.remove(index);
                continue;
            };
            let (last_update_time, last_costly_update_time) = (entry.last_update_time, entry.last_costly_update_time);

            if time >= last_update_time + update_delay {
                if time >= last_costly_update_time + costly_update_delay && !did_costly_update {
                    if !self.arena.group_touches(group, &margin_rect) {
                        self.tree.node_mut(leaf).payload.groups.remove(index);
                        continue;
                    }

                    // Subdivision only where someone is looking
                    let budget = if visible {
                        MAX_SUBDIVISIONS_PER_UPDATE.min(self.tree.free_space().saturating_sub(pending.len()))
                    } else {
                        0
                    };
                    pending.extend(self.arena.costly_update_group(group, time, budget));
                    did_costly_update = true;
                }
                self.arena.update_group(group, time);
            }
            index += 1;
        }

        for slot in start..end {
            let Some(reference) = self.tree.node(leaf).elements().get(slot).copied().flatten() else {
                continue;
            };
            match self.arena.particle(reference.particle).copied() {
                Some(particle) if particle.is_alive && margin_rect.contains(particle.position) => {
                    self.tree.node_mut(leaf).payload.write_quad(slot, &particle);
                }
                Some(particle) if particle.is_alive => {
                    self.tree.remove_at(leaf, slot);
                    pending.push(reference);
                }
                _ => {
                    self.tree.remove_at(leaf, slot);
                    self.arena.release(reference.particle);
                }
            }
        }
    }

    /// Quads of every leaf overlapping `rect`, four vertices per particle
    pub fn render(&self, rect: &Rect) -> Vec<ParticleVertex> {
        self.tree
            .leaves_overlapping(rect)
            .into_iter()
            .map(|leaf| self.tree.node(leaf))
            .filter(|node| node.num_elements() != 0)
            .flat_map(|node| node.payload.vertices.chunks_exact(4))
            .filter(|quad| quad[0].is_valid())
            .flatten()
            .copied()
            .collect()
    }
}

/// Hook run before every simulation step, typically to spawn particles
pub trait WavesParticlePlugin: Send {
    fn update_particles(&mut self, system: &mut WavesParticleSystem, time: f32, delta_time: f32);
}

/// Owner of the wave-particle simulation
pub struct WavesParticleSystem {
    settings: ParticleSettings,
    particles: WaveParticlesQuadtree,
    rng: Pcg32,
    simulation_time: f32,
    expected_duration_exp: f32,
    prewarmed: bool,
    uniform_scale: f32,
    plugins: Vec<Box<dyn WavesParticlePlugin>>,
}

impl std::fmt::Debug for WavesParticleSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavesParticleSystem")
            .field("settings", &self.settings)
            .field("particles", &self.particles.count())
            .field("simulation_time", &self.simulation_time)
            .field("stress", &self.particles.stress())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

impl WavesParticleSystem {
    pub fn new(settings: ParticleSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let particles = WaveParticlesQuadtree::new(
            settings.area,
            settings.max_particles_per_tile,
            settings.max_particles,
            settings.margin_fraction,
        );
        log::info!(
            "Wave particle system: {} particles, {} per tile",
            settings.max_particles,
            settings.max_particles_per_tile
        );
        Ok(Self {
            rng: Pcg32::seed_from_u64(settings.rng_seed),
            expected_duration_exp: settings.expected_duration_exp(),
            settings,
            particles,
            simulation_time: 0.0,
            prewarmed: false,
            uniform_scale: 1.0,
            plugins: Vec::new(),
        })
    }

    pub fn settings(&self) -> &ParticleSettings {
        &self.settings
    }

    pub fn particles(&self) -> &WaveParticlesQuadtree {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut WaveParticlesQuadtree {
        &mut self.particles
    }

    pub fn particle_count(&self) -> usize {
        self.particles.count()
    }

    pub fn free_space(&self) -> usize {
        self.particles.free_space()
    }

    pub fn simulation_time(&self) -> f32 {
        self.simulation_time
    }

    pub fn stress(&self) -> f32 {
        self.particles.stress()
    }

    pub fn uniform_scale(&self) -> f32 {
        self.uniform_scale
    }

    /// World scale applied to particle fans spawned from now on
    pub fn set_uniform_scale(&mut self, uniform_scale: f32) {
        self.uniform_scale = uniform_scale;
    }

    pub fn set_visible_rects(&mut self, rects: Vec<Rect>) {
        self.particles.set_visible_rects(rects);
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn WavesParticlePlugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Add a lone particle as a new group
    pub fn spawn(&mut self, particle: WaveParticle) -> bool {
        let group = self.particles.arena_mut().create_group(self.simulation_time);
        let Some(reference) = self.particles.arena_mut().add_particle(group, particle) else {
            return false;
        };
        if self.particles.insert(reference) {
            true
        } else {
            self.particles.arena_mut().release(reference.particle);
            false
        }
    }

    /// Add a fan of `2 * clones + 1` particles spread sideways from
    /// `particle`, forming one chain. Amplitudes vary down to
    /// `1 / irregularity` of the source amplitude. Returns false without spawning
    /// anything when capacity is short.
    pub fn spawn_with_clones(&mut self, particle: WaveParticle, clones: usize, irregularity: f32) -> bool {
        if self.particles.free_space() < clones * 2 + 1 {
            return false;
        }

        let mut template = particle;
        template.base_amplitude *= self.uniform_scale;
        template.frequency /= self.uniform_scale;
        let lateral = Vec2::new(template.direction.y, -template.direction.x);
        let spacing = PARTICLE_SPACING / template.frequency;
        let min_amplitude = if irregularity > 1.0 { 1.0 / irregularity } else { 1.0 };

        let group = self.particles.arena_mut().create_group(self.simulation_time);
        let clones = clones as i64;
        let mut previous: Option<ParticleId> = None;

        for i in -clones..=clones {
            let mut clone = template;
            clone.position = template.position + lateral * (i as f32 * spacing);
            if min_amplitude < 1.0 {
                clone.base_amplitude *= self.rng.random_range(min_amplitude..=1.0);
            }
            clone.amplitude = clone.base_amplitude;
            clone.disallow_subdivision = previous.is_none() || i == clones;

            let arena = self.particles.arena_mut();
            let Some(reference) = arena.add_particle(group, clone) else {
                return previous.is_some();
            };
            if let Some(previous) = previous {
                arena.link(previous, reference.particle);
            }

            if !self.particles.insert(reference) {
                let arena = self.particles.arena_mut();
                arena.release(reference.particle);
                if let Some(last) = previous.and_then(|previous| arena.particle_mut(previous)) {
                    last.disallow_subdivision = true;
                }
                return previous.is_some();
            }
            previous = Some(reference.particle);
        }
        true
    }

    /// Advance the simulation by `delta_time`, prewarming on the first call
    pub fn update(&mut self, delta_time: f32) {
        if !self.prewarmed {
            self.prewarm();
        }

        self.simulation_time += delta_time;
        self.update_plugins(delta_time);
        self.particles
            .update_simulation_measured(self.simulation_time, self.expected_duration_exp);
    }

    /// Run fixed steps until `prewarm_time`; no frame budget applies
    pub fn prewarm(&mut self) {
        self.prewarmed = true;
        let mut steps = 0;
        while self.simulation_time < self.settings.prewarm_time {
            self.simulation_time += PREWARM_STEP;
            self.update_plugins(PREWARM_STEP);
            self.particles.update_simulation(self.simulation_time);
            steps += 1;
        }
        if steps > 0 {
            log::debug!("Prewarmed wave particles over {} steps", steps);
        }
    }

    fn update_plugins(&mut self, delta_time: f32) {
        let mut plugins = std::mem::take(&mut self.plugins);
        let time = self.simulation_time;
        for plugin in &mut plugins {
            plugin.update_particles(self, time, delta_time);
        }
        // Keep plugins registered from inside a callback
        plugins.append(&mut self.plugins);
        self.plugins = plugins;
    }

    pub fn render(&self, rect: &Rect) -> Vec<ParticleVertex> {
        self.particles.render(rect)
    }
}
