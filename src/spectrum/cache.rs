//! Per-water cache of resolved spectra
//!
//! Entries are keyed by spectrum identity and implicitly by seed: changing the
//! seed drops every entry at once.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{ResolvedSpectrum, SpectrumId, SpectrumLayout, WaveSpectrum};
use crate::lock;

struct CacheState {
    seed: u64,
    layout: SpectrumLayout,
    entries: BTreeMap<SpectrumId, Arc<ResolvedSpectrum>>,
}

pub struct SpectrumCache {
    state: Mutex<CacheState>,
}

impl SpectrumCache {
    pub fn new(layout: SpectrumLayout, seed: u64) -> Self {
        Self {
            state: Mutex::new(CacheState {
                seed,
                layout,
                entries: BTreeMap::new(),
            }),
        }
    }

    pub fn seed(&self) -> u64 {
        lock(&self.state).seed
    }

    pub fn layout(&self) -> SpectrumLayout {
        lock(&self.state).layout.clone()
    }

    /// Resolved data for `id`, created and fully computed if absent
    pub fn get_or_create(&self, id: SpectrumId, spectrum: &Arc<dyn WaveSpectrum>) -> Arc<ResolvedSpectrum> {
        let entry = {
            let mut state = lock(&self.state);
            let seed = state.seed;
            let layout = state.layout.clone();
            state
                .entries
                .entry(id)
                .or_insert_with(|| Arc::new(ResolvedSpectrum::new(id, spectrum.clone(), seed, layout)))
                .clone()
        };
        entry.validate();
        entry
    }

    pub fn get(&self, id: SpectrumId) -> Option<Arc<ResolvedSpectrum>> {
        lock(&self.state).entries.get(&id).cloned()
    }

    /// Snapshot of every entry, ordered by id
    pub fn entries(&self) -> Vec<Arc<ResolvedSpectrum>> {
        lock(&self.state).entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).entries.is_empty()
    }

    /// Drop all entries if `seed` differs from the current one; returns whether it did
    pub fn set_seed(&self, seed: u64) -> bool {
        let mut state = lock(&self.state);
        if state.seed == seed {
            return false;
        }
        log::info!("Water seed changed {} -> {}, dropping {} resolved spectra", state.seed, seed, state.entries.len());
        state.seed = seed;
        state.entries.clear();
        true
    }

    /// Drop all entries and resolve future ones against `layout`
    pub fn reset(&self, layout: SpectrumLayout) {
        let mut state = lock(&self.state);
        log::info!("Spectrum layout changed, dropping {} resolved spectra", state.entries.len());
        state.layout = layout;
        state.entries.clear();
    }

    pub fn set_all_weights(&self, weight: f32) {
        for entry in lock(&self.state).entries.values() {
            entry.set_weight(weight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WavesSettings;
    use crate::spectrum::PhillipsSpectrum;

    fn cache(seed: u64) -> SpectrumCache {
        let mut settings = WavesSettings::default();
        settings.resolution = 32;
        SpectrumCache::new(SpectrumLayout::from_settings(&settings), seed)
    }

    #[test]
    fn test_get_or_create_returns_same_entry() {
        let cache = cache(1);
        let spectrum: Arc<dyn WaveSpectrum> = Arc::new(PhillipsSpectrum::default());
        let a = cache.get_or_create(SpectrumId(7), &spectrum);
        let b = cache.get_or_create(SpectrumId(7), &spectrum);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_resolved());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_seed_change_invalidates() {
        let cache = cache(1);
        let spectrum: Arc<dyn WaveSpectrum> = Arc::new(PhillipsSpectrum::default());
        let before = cache.get_or_create(SpectrumId(7), &spectrum);

        assert!(!cache.set_seed(1));
        assert_eq!(cache.len(), 1);

        assert!(cache.set_seed(2));
        assert!(cache.is_empty());

        let after = cache.get_or_create(SpectrumId(7), &spectrum);
        assert_eq!(after.seed(), 2);
        assert_ne!(before.shoreline_candidates(), after.shoreline_candidates());
    }

    #[test]
    fn test_entries_ordered_by_id() {
        let cache = cache(1);
        let spectrum: Arc<dyn WaveSpectrum> = Arc::new(PhillipsSpectrum::default());
        cache.get_or_create(SpectrumId(9), &spectrum);
        cache.get_or_create(SpectrumId(3), &spectrum);
        let ids: Vec<_> = cache.entries().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![SpectrumId(3), SpectrumId(9)]);
    }
}
