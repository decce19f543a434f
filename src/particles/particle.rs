//! Wave particles, their chains and the arena that owns them
//!
//! A group is one continuous wave front: a chain of particles linked left to
//! right by id. Particles and groups live in generational arenas, so ids held
//! by quadtree slots or node registries never alias a recycled entry.

use std::f32::consts::TAU;
use std::marker::PhantomData;

use glam::Vec2;

use super::{ParticleVertex, Rect};
use crate::consts::DEFAULT_GRAVITY;

/// Neighbour spacing of a fresh chain is `PARTICLE_SPACING / k`
pub const PARTICLE_SPACING: f32 = 1.48;
/// Particles whose amplitude falls below this die
pub const MIN_PARTICLE_AMPLITUDE: f32 = 0.0025;
/// Chain subdivisions allowed per costly update
pub const MAX_SUBDIVISIONS_PER_UPDATE: usize = 30;
/// Runs at most this long keep their directions untouched
const MIN_FILTERED_RUN: usize = 3;
const AMPLITUDE_DAMPING: f32 = 0.1;

/// Key of an [`Arena`] slot
pub trait ArenaKey: Copy {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn index(self) -> usize;
    fn generation(self) -> u32;
}

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl ArenaKey for $name {
            #[inline]
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            #[inline]
            fn index(self) -> usize {
                self.index as usize
            }

            #[inline]
            fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

arena_key!(
    /// Stable handle of a [`WaveParticle`]
    ParticleId
);
arena_key!(
    /// Stable handle of a [`WaveParticlesGroup`]
    GroupId
);

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot vector with a LIFO freelist; removing bumps the slot generation
#[derive(Debug, Clone)]
pub struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _key: PhantomData<K>,
}

impl<K, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> K {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return K::from_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        K::from_parts(index, 0)
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.slots
            .get(key.index())
            .filter(|slot| slot.generation == key.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots
            .get_mut(key.index())
            .filter(|slot| slot.generation == key.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, key: K) -> Option<T> {
        let slot = self.slots.get_mut(key.index())?;
        if slot.generation != key.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index() as u32);
        self.len -= 1;
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (K::from_parts(index as u32, slot.generation), value))
        })
    }
}

/// A discrete wave-front element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveParticle {
    pub position: Vec2,
    /// Unit propagation direction
    pub direction: Vec2,
    pub amplitude: f32,
    /// Amplitude the particle relaxes towards; decays over time
    pub base_amplitude: f32,
    /// Angular wavenumber (rad/m)
    pub frequency: f32,
    pub is_alive: bool,
    /// Set on chain ends; a particle with a left neighbour and this flag ends a run
    pub disallow_subdivision: bool,
    group: Option<GroupId>,
    left: Option<ParticleId>,
    right: Option<ParticleId>,
}

impl WaveParticle {
    pub fn new(position: Vec2, direction: Vec2, amplitude: f32, frequency: f32) -> Self {
        Self {
            position,
            direction: direction.normalize_or(Vec2::X),
            amplitude,
            base_amplitude: amplitude,
            frequency,
            is_alive: true,
            disallow_subdivision: false,
            group: None,
            left: None,
            right: None,
        }
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn left(&self) -> Option<ParticleId> {
        self.left
    }

    pub fn right(&self) -> Option<ParticleId> {
        self.right
    }

    /// Deep-water phase speed `sqrt(g / k)`
    pub fn speed(&self) -> f32 {
        if self.frequency > 0.0 {
            (DEFAULT_GRAVITY / self.frequency).sqrt()
        } else {
            0.0
        }
    }

    pub fn wavelength(&self) -> f32 {
        TAU / self.frequency
    }

    /// Ends a run: subdivision and direction filtering stop here
    #[inline]
    fn is_run_end(&self) -> bool {
        self.disallow_subdivision && self.left.is_some()
    }

    fn advance(&mut self, delta_time: f32, step: f32) {
        self.position += self.direction * self.speed() * delta_time;
        self.amplitude = self.amplitude * (1.0 - step) + self.base_amplitude * step;
        self.base_amplitude *= (-delta_time * self.frequency * AMPLITUDE_DAMPING).exp();
    }

    pub fn vertex(&self, uv: [f32; 2]) -> ParticleVertex {
        ParticleVertex::new(
            self.position.to_array(),
            uv,
            self.direction.to_array(),
            self.amplitude,
            self.frequency,
        )
    }
}

/// One wave front and its update clocks
#[derive(Debug, Clone, PartialEq)]
pub struct WaveParticlesGroup {
    pub left_particle: Option<ParticleId>,
    pub last_update_time: f32,
    pub last_costly_update_time: f32,
    particle_count: usize,
}

impl WaveParticlesGroup {
    fn new(start_time: f32) -> Self {
        Self {
            left_particle: None,
            last_update_time: start_time,
            last_costly_update_time: start_time,
            particle_count: 0,
        }
    }

    /// Particles still held by the arena, dead ones awaiting recycling included
    pub fn particle_count(&self) -> usize {
        self.particle_count
    }
}

/// Quadtree element: a particle and the group it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleRef {
    pub particle: ParticleId,
    pub group: GroupId,
}

/// Owner of every particle and group
#[derive(Debug, Default)]
pub struct ParticleArena {
    particles: Arena<ParticleId, WaveParticle>,
    groups: Arena<GroupId, WaveParticlesGroup>,
}

impl ParticleArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn particle(&self, id: ParticleId) -> Option<&WaveParticle> {
        self.particles.get(id)
    }

    pub fn particle_mut(&mut self, id: ParticleId) -> Option<&mut WaveParticle> {
        self.particles.get_mut(id)
    }

    pub fn group(&self, id: GroupId) -> Option<&WaveParticlesGroup> {
        self.groups.get(id)
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn particles(&self) -> impl Iterator<Item = (ParticleId, &WaveParticle)> {
        self.particles.iter()
    }

    pub fn create_group(&mut self, start_time: f32) -> GroupId {
        self.groups.insert(WaveParticlesGroup::new(start_time))
    }

    /// Store `particle` in `group`; the first particle becomes the group's left end
    pub fn add_particle(&mut self, group: GroupId, mut particle: WaveParticle) -> Option<ParticleRef> {
        let entry = self.groups.get_mut(group)?;
        entry.particle_count += 1;
        let is_first = entry.left_particle.is_none();

        particle.group = Some(group);
        particle.left = None;
        particle.right = None;
        let id = self.particles.insert(particle);
        if is_first {
            if let Some(entry) = self.groups.get_mut(group) {
                entry.left_particle = Some(id);
            }
        }
        Some(ParticleRef { particle: id, group })
    }

    /// Link `left` and `right` as neighbours
    pub fn link(&mut self, left: ParticleId, right: ParticleId) {
        if let Some(particle) = self.particles.get_mut(left) {
            particle.right = Some(right);
        }
        if let Some(particle) = self.particles.get_mut(right) {
            particle.left = Some(left);
        }
    }

    pub fn is_group_alive(&self, group: GroupId) -> bool {
        self.groups
            .get(group)
            .and_then(|entry| entry.left_particle)
            .and_then(|id| self.particles.get(id))
            .is_some_and(|particle| particle.is_alive)
    }

    /// Alive particles of `group`, left to right
    pub fn chain(&self, group: GroupId) -> Vec<ParticleId> {
        let mut chain = Vec::new();
        let mut cursor = self.groups.get(group).and_then(|entry| entry.left_particle);
        while let Some(id) = cursor {
            let Some(particle) = self.particles.get(id) else {
                break;
            };
            if chain.len() > self.particles.len() {
                log::warn!("Wave particle chain of {:?} does not terminate", group);
                break;
            }
            chain.push(id);
            cursor = particle.right;
        }
        chain
    }

    /// Whether any particle of `group` lies inside `rect`
    pub fn group_touches(&self, group: GroupId, rect: &Rect) -> bool {
        self.is_group_alive(group)
            && self
                .chain(group)
                .into_iter()
                .filter_map(|id| self.particles.get(id))
                .any(|particle| rect.contains(particle.position))
    }

    /// Mark a particle dead and unlink it. A dying chain end hands its
    /// subdivision barrier to the neighbour that becomes the new end.
    pub fn kill(&mut self, id: ParticleId) {
        let Some(particle) = self.particles.get_mut(id) else {
            return;
        };
        if !particle.is_alive {
            return;
        }
        particle.is_alive = false;
        let left = particle.left.take();
        let right = particle.right.take();
        let barrier = particle.disallow_subdivision;
        let group = particle.group;

        if let Some(neighbour) = left.and_then(|left| self.particles.get_mut(left)) {
            neighbour.right = right;
        }
        if let Some(neighbour) = right.and_then(|right| self.particles.get_mut(right)) {
            neighbour.left = left;
        }
        if barrier {
            if let Some(heir) = left.or(right).and_then(|heir| self.particles.get_mut(heir)) {
                heir.disallow_subdivision = true;
            }
        }
        if let Some(entry) = group.and_then(|group| self.groups.get_mut(group)) {
            if entry.left_particle == Some(id) {
                entry.left_particle = right;
            }
        }
    }

    /// Drop a particle from the arena, killing it first if needed. The group
    /// goes with its last particle.
    pub fn release(&mut self, id: ParticleId) -> Option<WaveParticle> {
        self.kill(id);
        let particle = self.particles.remove(id)?;
        if let Some(group) = particle.group {
            let empty = match self.groups.get_mut(group) {
                Some(entry) => {
                    entry.particle_count = entry.particle_count.saturating_sub(1);
                    entry.particle_count == 0
                }
                None => false,
            };
            if empty {
                self.groups.remove(group);
            }
        }
        Some(particle)
    }

    /// Advance every particle of `group` to `time`
    pub fn update_group(&mut self, group: GroupId, time: f32) {
        let Some(entry) = self.groups.get_mut(group) else {
            return;
        };
        let delta_time = time - entry.last_update_time;
        entry.last_update_time = time;
        let step = delta_time.min(1.0);

        let mut cursor = entry.left_particle;
        while let Some(id) = cursor {
            let Some(particle) = self.particles.get_mut(id) else {
                break;
            };
            cursor = particle.right;
            particle.advance(delta_time, step);
            if particle.amplitude < MIN_PARTICLE_AMPLITUDE {
                self.kill(id);
            }
        }
    }

    /// Subdivide stretched links (at most `max_subdivisions`) and smooth the
    /// directions of every run. Returns the particles created, which the
    /// caller must place in the quadtree.
    pub fn costly_update_group(&mut self, group: GroupId, time: f32, max_subdivisions: usize) -> Vec<ParticleRef> {
        let Some(entry) = self.groups.get_mut(group) else {
            return Vec::new();
        };
        entry.last_costly_update_time = time;

        let mut created = Vec::new();
        let mut cursor = entry.left_particle;
        while let Some(id) = cursor {
            let Some(particle) = self.particles.get(id).copied() else {
                break;
            };
            cursor = particle.right;
            if created.len() >= max_subdivisions || particle.is_run_end() {
                continue;
            }
            let Some(right_id) = particle.right else {
                continue;
            };
            let Some(right) = self.particles.get(right_id).copied() else {
                continue;
            };
            if particle.position.distance(right.position) <= 2.0 * PARTICLE_SPACING / particle.frequency {
                continue;
            }

            let mut middle = WaveParticle::new(
                (particle.position + right.position) * 0.5,
                (particle.direction + right.direction).normalize_or(particle.direction),
                (particle.base_amplitude + right.base_amplitude) * 0.5,
                (particle.frequency + right.frequency) * 0.5,
            );
            middle.amplitude = (particle.amplitude + right.amplitude) * 0.5;
            let Some(reference) = self.add_particle(group, middle) else {
                break;
            };
            self.link(id, reference.particle);
            self.link(reference.particle, right_id);
            created.push(reference);
        }

        let chain = self.chain(group);
        let mut run_start = 0;
        for (i, &id) in chain.iter().enumerate() {
            let is_last = i + 1 == chain.len();
            let is_barrier = self.particles.get(id).is_some_and(|p| p.disallow_subdivision);
            if i != run_start && (is_barrier || is_last) {
                if i + 1 - run_start > MIN_FILTERED_RUN {
                    self.filter_refracted_directions(&chain[run_start..=i]);
                }
                run_start = i + 1;
            }
        }

        created
    }

    /// Keep a run either expanding or contracting: directions blend linearly
    /// from the left half's mean to the right half's mean
    fn filter_refracted_directions(&mut self, run: &[ParticleId]) {
        let half = run.len() / 2;
        let mean_direction = |ids: &[ParticleId]| {
            ids.iter()
                .filter_map(|&id| self.particles.get(id))
                .map(|particle| particle.direction)
                .sum::<Vec2>()
                .normalize_or_zero()
        };
        let left_direction = mean_direction(&run[..half]);
        let right_direction = mean_direction(&run[half..]);

        let last = (run.len() - 1) as f32;
        for (i, &id) in run.iter().enumerate() {
            if let Some(particle) = self.particles.get_mut(id) {
                particle.direction = left_direction.lerp(right_direction, i as f32 / last);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Group of `count` particles spaced `spacing` apart along +Y, heading +X
    fn chain(arena: &mut ParticleArena, count: usize, spacing: f32) -> (GroupId, Vec<ParticleId>) {
        let group = arena.create_group(0.0);
        let mut ids: Vec<ParticleId> = Vec::new();
        for i in 0..count {
            let particle = WaveParticle::new(Vec2::new(0.0, i as f32 * spacing), Vec2::X, 1.0, 1.0);
            let id = arena.add_particle(group, particle).unwrap().particle;
            if let Some(&previous) = ids.last() {
                arena.link(previous, id);
            }
            ids.push(id);
        }
        if let (Some(&first), Some(&last)) = (ids.first(), ids.last()) {
            arena.particle_mut(first).unwrap().disallow_subdivision = true;
            arena.particle_mut(last).unwrap().disallow_subdivision = true;
        }
        (group, ids)
    }

    #[test]
    fn test_arena_recycles_with_new_generation() {
        let mut arena: Arena<ParticleId, u32> = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Some(1));
        let b = arena.insert(2);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&2));
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_particle_moves_at_phase_speed() {
        let mut arena = ParticleArena::new();
        let (group, ids) = chain(&mut arena, 1, 1.0);
        arena.update_group(group, 2.0);

        let particle = arena.particle(ids[0]).unwrap();
        let expected = DEFAULT_GRAVITY.sqrt() * 2.0;
        assert!((particle.position.x - expected).abs() < 1e-4);
        assert!(particle.base_amplitude < 1.0);
        assert_eq!(arena.group(group).unwrap().last_update_time, 2.0);
    }

    #[test]
    fn test_weak_particle_dies_and_unlinks() {
        let mut arena = ParticleArena::new();
        let (group, ids) = chain(&mut arena, 3, 1.0);
        arena.particle_mut(ids[0]).unwrap().amplitude = 0.001;
        arena.particle_mut(ids[0]).unwrap().base_amplitude = 0.001;
        arena.update_group(group, 0.01);

        assert!(!arena.particle(ids[0]).unwrap().is_alive);
        assert_eq!(arena.group(group).unwrap().left_particle, Some(ids[1]));
        assert_eq!(arena.particle(ids[1]).unwrap().left(), None);
        assert!(arena.particle(ids[1]).unwrap().disallow_subdivision);
        assert_eq!(arena.chain(group), vec![ids[1], ids[2]]);
        assert!(arena.is_group_alive(group));
    }

    #[test]
    fn test_release_frees_group_with_last_particle() {
        let mut arena = ParticleArena::new();
        let (group, ids) = chain(&mut arena, 2, 1.0);
        arena.release(ids[1]);
        assert!(arena.particle(ids[0]).unwrap().right().is_none());
        assert!(arena.group(group).is_some());
        arena.release(ids[0]);
        assert!(arena.group(group).is_none());
        assert!(!arena.is_group_alive(group));
        assert_eq!(arena.particle_count(), 0);
    }

    #[test]
    fn test_costly_update_subdivides_stretched_links() {
        let mut arena = ParticleArena::new();
        // Spacing 4 exceeds 2 * 1.48 / k for k = 1
        let (group, ids) = chain(&mut arena, 3, 4.0);
        let created = arena.costly_update_group(group, 1.0, MAX_SUBDIVISIONS_PER_UPDATE);

        assert_eq!(created.len(), 2);
        let chain = arena.chain(group);
        assert_eq!(chain.len(), 5);
        assert_eq!(chain[0], ids[0]);
        assert_eq!(chain[2], ids[1]);
        assert_eq!(chain[4], ids[2]);
        let middle = arena.particle(chain[1]).unwrap();
        assert!((middle.position - Vec2::new(0.0, 2.0)).length() < 1e-6);
        assert!(!middle.disallow_subdivision);
        assert_eq!(arena.group(group).unwrap().particle_count(), 5);
        assert_eq!(arena.group(group).unwrap().last_costly_update_time, 1.0);
    }

    #[test]
    fn test_subdivision_budget() {
        let mut arena = ParticleArena::new();
        let (group, _) = chain(&mut arena, 10, 4.0);
        let created = arena.costly_update_group(group, 1.0, 3);
        assert_eq!(created.len(), 3);
        assert_eq!(arena.chain(group).len(), 13);
    }

    #[test]
    fn test_refraction_filter_blends_half_means() {
        let mut arena = ParticleArena::new();
        let (group, ids) = chain(&mut arena, 5, 1.0);
        let left = Vec2::new(1.0, 1.0).normalize();
        let right = Vec2::new(1.0, -1.0).normalize();
        for (i, &id) in ids.iter().enumerate() {
            arena.particle_mut(id).unwrap().direction = if i < 2 { left } else { right };
        }
        arena.costly_update_group(group, 1.0, 0);

        let direction = |i: usize| arena.particle(ids[i]).unwrap().direction;
        assert!((direction(0) - left).length() < 1e-5);
        assert!((direction(4) - right).length() < 1e-5);
        assert!((direction(2) - left.lerp(right, 0.5)).length() < 1e-5);
    }

    #[test]
    fn test_short_runs_keep_directions() {
        let mut arena = ParticleArena::new();
        let (group, ids) = chain(&mut arena, 3, 1.0);
        arena.particle_mut(ids[1]).unwrap().direction = Vec2::Y;
        arena.costly_update_group(group, 1.0, 0);
        assert_eq!(arena.particle(ids[1]).unwrap().direction, Vec2::Y);
    }
}
