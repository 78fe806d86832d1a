//! Hash allow-lists restricting which pipelines replay.

use std::collections::HashSet;

use crate::Hash;

/// Whether pipeline replay is restricted to allow-listed hashes.
///
/// The mode is decided once at construction: if neither list has entries
/// every pipeline replays, otherwise replay is restricted and a category
/// whose list is empty replays nothing. Shader modules and trivial
/// categories are never filtered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilterMode {
    ReplayAll,
    AllowListed,
}

#[derive(Debug, Clone)]
pub struct ReplayFilter {
    mode: FilterMode,
    graphics: HashSet<Hash>,
    compute: HashSet<Hash>,
}

impl ReplayFilter {
    pub fn new(graphics: HashSet<Hash>, compute: HashSet<Hash>) -> Self {
        let mode = if graphics.is_empty() && compute.is_empty() {
            FilterMode::ReplayAll
        } else {
            FilterMode::AllowListed
        };
        Self {
            mode,
            graphics,
            compute,
        }
    }

    /// A filter that replays everything.
    pub fn all() -> Self {
        Self::new(HashSet::new(), HashSet::new())
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn allows_graphics(&self, hash: Hash) -> bool {
        match self.mode {
            FilterMode::ReplayAll => true,
            FilterMode::AllowListed => self.graphics.contains(&hash),
        }
    }

    pub fn allows_compute(&self, hash: Hash) -> bool {
        match self.mode {
            FilterMode::ReplayAll => true,
            FilterMode::AllowListed => self.compute.contains(&hash),
        }
    }
}

impl Default for ReplayFilter {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_replays_everything() {
        let filter = ReplayFilter::all();
        assert_eq!(filter.mode(), FilterMode::ReplayAll);
        assert!(filter.allows_graphics(0x1));
        assert!(filter.allows_compute(0x2));
    }

    #[test]
    fn graphics_list_restricts_graphics() {
        let filter = ReplayFilter::new([0x2u64].into_iter().collect(), HashSet::new());
        assert_eq!(filter.mode(), FilterMode::AllowListed);
        assert!(filter.allows_graphics(0x2));
        assert!(!filter.allows_graphics(0x1));
    }

    #[test]
    fn one_sided_list_blocks_the_other_category() {
        let filter = ReplayFilter::new(HashSet::new(), [0x7u64].into_iter().collect());
        assert!(filter.allows_compute(0x7));
        assert!(!filter.allows_compute(0x8));
        // Restricted mode applies to both categories.
        assert!(!filter.allows_graphics(0x7));
    }
}
