//! Adaptive FFT resolution controller
//!
//! Per tile, grows the FFT resolution while the explicit waves it would take
//! over cost more to sum directly (per sample) than the extra FFT work.

use crate::consts::{FFT_COST_LEVELS, MIN_FFT_RESOLUTION};

/// Marginal cost of each FFT resolution step, starting at 16
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FftCostTable {
    costs: [u64; FFT_COST_LEVELS],
}

impl Default for FftCostTable {
    fn default() -> Self {
        let mut costs = [0u64; FFT_COST_LEVELS];
        let mut resolution = MIN_FFT_RESOLUTION as u64;
        for cost in &mut costs {
            *cost = resolution * resolution * u64::from(resolution.ilog2());
            resolution <<= 1;
        }
        for i in (1..FFT_COST_LEVELS).rev() {
            costs[i] -= costs[i - 1];
        }
        Self { costs }
    }
}

impl FftCostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra cost of going from the previous resolution to mip `mip`
    pub fn cost(&self, mip: usize) -> u64 {
        self.costs[mip.min(FFT_COST_LEVELS - 1)]
    }

    /// Pick the FFT resolution for one tile.
    ///
    /// `weighted_waves(mip)` is the weighted explicit-wave count of bucket
    /// `mip` summed over all spectra. Returns the resolution and whether the
    /// tile should be resolved by FFT at all.
    pub fn select_resolution(
        &self,
        weighted_waves: impl Fn(usize) -> u64,
        samples: u64,
        final_resolution: usize,
        precision_boost: u32,
        allow_fft: bool,
    ) -> (usize, bool) {
        let mut resolution = MIN_FFT_RESOLUTION;
        let mut mip = 0;

        loop {
            let waves = weighted_waves(mip);
            if waves.saturating_mul(samples) < self.cost(mip).saturating_add(samples) {
                resolution >>= 1;
                break;
            }
            if resolution >= final_resolution {
                break;
            }
            resolution <<= 1;
            mip += 1;
        }

        resolution = (resolution << precision_boost).min(final_resolution);
        (resolution, resolution >= MIN_FFT_RESOLUTION && allow_fft)
    }
}
