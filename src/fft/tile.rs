//! Per-scale FFT tile state and result publication
//!
//! Results are immutable once published. The simulation writes into the older
//! slot and swaps it in; readers clone both `Arc`s under a short lock and
//! interpolate without holding it.

use std::sync::{Arc, Mutex};

use glam::{Vec2, Vec4};

use crate::consts::DIRECTIONAL_DIRTY_FRAMES;
use crate::{lock, resolution_index};

/// One synthesized tile at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct FftResults {
    pub time: f32,
    pub resolution: usize,
    /// Horizontal displacement per texel, row-major `y * n + x`
    pub displacements: Vec<Vec2>,
    /// `(force.x, force.y, force.z, height)` per texel
    pub force_and_height: Vec<Vec4>,
}

impl FftResults {
    pub fn new(resolution: usize) -> Self {
        let cells = resolution * resolution;
        Self {
            time: f32::NEG_INFINITY,
            resolution,
            displacements: vec![Vec2::ZERO; cells],
            force_and_height: vec![Vec4::ZERO; cells],
        }
    }

    #[inline]
    pub fn height(&self, index: usize) -> f32 {
        self.force_and_height[index].w
    }
}

/// Two results bracketing a sample time plus the blend factor between them
#[derive(Debug, Clone)]
pub struct TileSnapshot {
    pub older: Arc<FftResults>,
    pub newer: Arc<FftResults>,
    pub t: f32,
}

impl TileSnapshot {
    pub fn resolution(&self) -> usize {
        self.newer.resolution
    }
}

/// Directional spectrum buffer, owned by the simulation side
#[derive(Debug, Default)]
pub(crate) struct DirectionalSpectrum {
    pub values: Vec<Vec2>,
    pub dirty: u8,
}

#[derive(Debug)]
struct ResolveState {
    resolution: usize,
    mip_index: usize,
    resolve_by_fft: bool,
    results: [Option<Arc<FftResults>>; 2],
    recent: usize,
}

/// Simulation state of one tile scale
#[derive(Debug)]
pub struct TileSpectrum {
    scale_index: usize,
    state: Mutex<ResolveState>,
    directional: Mutex<DirectionalSpectrum>,
}

impl TileSpectrum {
    pub fn new(scale_index: usize) -> Self {
        Self {
            scale_index,
            state: Mutex::new(ResolveState {
                resolution: 0,
                mip_index: 0,
                resolve_by_fft: false,
                results: [None, None],
                recent: 0,
            }),
            directional: Mutex::new(DirectionalSpectrum::default()),
        }
    }

    pub fn scale_index(&self) -> usize {
        self.scale_index
    }

    pub fn resolution(&self) -> usize {
        lock(&self.state).resolution
    }

    /// Index of the highest explicit-wave mip covered by the FFT
    pub fn mip_index(&self) -> usize {
        lock(&self.state).mip_index
    }

    pub fn is_resolved_by_fft(&self) -> bool {
        lock(&self.state).resolve_by_fft
    }

    /// Switch between FFT and direct-only resolution. Returns whether the set
    /// of explicit waves covered by the FFT changed.
    pub fn set_resolve_mode(&self, resolve_by_fft: bool, resolution: usize) -> bool {
        let mut state = lock(&self.state);
        let mode_changed = state.resolve_by_fft != resolve_by_fft;
        let resolution_changed = resolve_by_fft && state.resolution != resolution;
        if !mode_changed && !resolution_changed {
            return false;
        }

        log::debug!(
            "Tile {} resolve mode: fft={} resolution={}",
            self.scale_index,
            resolve_by_fft,
            resolution
        );

        state.resolve_by_fft = resolve_by_fft;
        if resolution_changed {
            // Published results at the old resolution keep serving readers
            // until the first publish at the new one
            state.resolution = resolution;
            state.mip_index = resolution_index(resolution);

            let mut directional = lock(&self.directional);
            directional.values = vec![Vec2::ZERO; resolution * resolution];
            directional.dirty = DIRECTIONAL_DIRTY_FRAMES;
        }
        true
    }

    /// Resolution of the most recent published results while the tile is
    /// resolved by FFT. This is what samplers actually see, so the explicit
    /// wave list excludes exactly these bins.
    pub fn fft_coverage(&self) -> Option<usize> {
        let state = lock(&self.state);
        if !state.resolve_by_fft {
            return None;
        }
        state.results[state.recent].as_ref().map(|results| results.resolution)
    }

    /// Force the directional spectrum to be rebuilt on the next computations
    pub fn invalidate_directional(&self) {
        lock(&self.directional).dirty = DIRECTIONAL_DIRTY_FRAMES;
    }

    pub(crate) fn directional(&self) -> &Mutex<DirectionalSpectrum> {
        &self.directional
    }

    /// Slot the next computation should write into (the older one)
    pub fn stale_index(&self) -> usize {
        1 - lock(&self.state).recent
    }

    /// Take the buffer in `index` for reuse if no reader still holds it
    pub(crate) fn take_buffer(&self, index: usize, resolution: usize) -> FftResults {
        let stale = lock(&self.state).results[index].take();
        match stale.map(Arc::try_unwrap) {
            Some(Ok(results)) if results.resolution == resolution => results,
            _ => FftResults::new(resolution),
        }
    }

    /// Publish `results` into `index` and make it the most recent slot
    pub(crate) fn publish(&self, index: usize, results: FftResults) {
        let mut state = lock(&self.state);
        if results.resolution != state.resolution {
            // Resolution changed while computing; the result is stale
            return;
        }
        state.results[index] = Some(Arc::new(results));
        state.recent = index;
    }

    /// Results bracketing `time`. `None` until the tile has been computed.
    pub fn snapshot(&self, time: f32) -> Option<TileSnapshot> {
        let state = lock(&self.state);
        if !state.resolve_by_fft {
            return None;
        }

        let newer = state.results[state.recent].clone()?;
        let older = state.results[1 - state.recent]
            .clone()
            .filter(|older| older.resolution == newer.resolution)
            .unwrap_or_else(|| newer.clone());
        drop(state);

        let span = newer.time - older.time;
        let t = if span > 0.0 {
            ((time - older.time) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Some(TileSnapshot { older, newer, t })
    }
}
