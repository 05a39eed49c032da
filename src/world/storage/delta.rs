//! Per-chunk overlay of voxel overrides relative to the procedural base.
//!
//! A delta starts sparse (index/material pairs) and converts to a dense
//! override table once enough of the chunk has been edited. The two
//! thresholds are separated by more than 2x so representation flips cannot
//! thrash under an oscillating edit pattern.

use crate::constants::core::{OCC_WORDS, VOXELS_PER_CHUNK};
use crate::constants::delta::{DEMOTE_DENSITY, PROMOTE_DENSITY};
use crate::world::core::MaterialId;

use super::Chunk64;

/// Dense-table sentinel for "no override at this voxel"
pub const NO_OVERRIDE: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaMode {
    Sparse,
    Dense,
}

/// One sparse override entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaEntry {
    pub index: u32,
    pub material: u16,
}

/// Lazy overlay of per-voxel overrides for one chunk
#[derive(Clone)]
pub struct ChunkDelta {
    pub mode: DeltaMode,
    /// Sparse representation (default), kept sorted by voxel index
    pub entries: Vec<DeltaEntry>,
    /// Dense representation, N3 entries with NO_OVERRIDE marking untouched voxels
    pub dense: Vec<u16>,
    /// Bitset of voxels touched since the last persist, shared across modes
    pub dirty_mask: Vec<u64>,
    /// Set when runtime edits require persistence
    pub dirty: bool,
    /// Exact number of active overrides
    pub override_count: u32,
}

impl ChunkDelta {
    pub fn new() -> Self {
        Self {
            mode: DeltaMode::Sparse,
            entries: Vec::new(),
            dense: Vec::new(),
            dirty_mask: Vec::new(),
            dirty: false,
            override_count: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.override_count == 0
    }

    pub fn clear(&mut self, mode: DeltaMode) {
        self.mode = mode;
        self.entries.clear();
        self.dense.clear();
        self.dirty_mask.clear();
        self.dirty = false;
        self.override_count = 0;
    }

    /// Fraction of the chunk covered by overrides, in [0, 1]
    pub fn edit_density(&self) -> f32 {
        if self.override_count == 0 {
            return 0.0;
        }
        (self.override_count as f32 / VOXELS_PER_CHUNK as f32).min(1.0)
    }

    /// Convert to the dense representation
    pub fn ensure_dense(&mut self) {
        if self.mode == DeltaMode::Dense {
            return;
        }
        let mut dense = vec![NO_OVERRIDE; VOXELS_PER_CHUNK];
        self.override_count = self.entries.len() as u32;
        for e in &self.entries {
            if (e.index as usize) < dense.len() {
                dense[e.index as usize] = e.material;
            }
        }
        self.dense = dense;
        self.entries.clear();
        self.mode = DeltaMode::Dense;
    }

    /// Convert to the sparse representation
    pub fn ensure_sparse(&mut self) {
        if self.mode == DeltaMode::Sparse {
            return;
        }
        self.entries.clear();
        self.override_count = 0;
        for (i, &mat) in self.dense.iter().enumerate() {
            if mat != NO_OVERRIDE {
                self.entries.push(DeltaEntry {
                    index: i as u32,
                    material: mat,
                });
                self.override_count += 1;
            }
        }
        self.dense.clear();
        self.mode = DeltaMode::Sparse;
    }

    /// Switch representation per the density hysteresis. Idempotent.
    pub fn normalize(&mut self) {
        if self.is_empty() {
            if self.mode != DeltaMode::Sparse {
                self.clear(DeltaMode::Sparse);
            }
            return;
        }
        let density = self.edit_density();
        match self.mode {
            DeltaMode::Sparse => {
                if density >= PROMOTE_DENSITY {
                    self.ensure_dense();
                }
            }
            DeltaMode::Dense => {
                if density <= DEMOTE_DENSITY {
                    self.ensure_sparse();
                }
            }
        }
    }

    pub fn mark_dirty(&mut self, index: u32) {
        if self.dirty_mask.len() < OCC_WORDS {
            self.dirty_mask.clear();
            self.dirty_mask.resize(OCC_WORDS, 0);
        }
        let w = (index >> 6) as usize;
        let bit = 1u64 << (index & 63);
        if self.dirty_mask[w] & bit == 0 {
            self.dirty_mask[w] |= bit;
            self.dirty = true;
        }
    }

    pub fn test_dirty(&self, index: u32) -> bool {
        let w = (index >> 6) as usize;
        match self.dirty_mask.get(w) {
            Some(&word) => word & (1u64 << (index & 63)) != 0,
            None => false,
        }
    }

    /// The only mutator. Installs an override of `new_material` at `index`,
    /// or removes the override when the edit restores the base material.
    /// Flips the dirty bit iff the effective override changed.
    pub fn apply_edit(&mut self, index: u32, base_material: MaterialId, new_material: MaterialId) {
        if index as usize >= VOXELS_PER_CHUNK {
            return;
        }

        let mut changed = false;
        match self.mode {
            DeltaMode::Dense => {
                if self.dense.is_empty() {
                    self.dense.resize(VOXELS_PER_CHUNK, NO_OVERRIDE);
                }
                let slot = &mut self.dense[index as usize];
                if new_material == base_material {
                    if *slot != NO_OVERRIDE {
                        *slot = NO_OVERRIDE;
                        self.override_count = self.override_count.saturating_sub(1);
                        changed = true;
                    }
                } else {
                    if *slot == NO_OVERRIDE {
                        self.override_count += 1;
                    }
                    if *slot != new_material.0 {
                        *slot = new_material.0;
                        changed = true;
                    }
                }
            }
            DeltaMode::Sparse => {
                let found = self.entries.binary_search_by_key(&index, |e| e.index);
                if new_material == base_material {
                    if let Ok(pos) = found {
                        self.entries.remove(pos);
                        self.override_count = self.override_count.saturating_sub(1);
                        changed = true;
                    }
                } else {
                    match found {
                        Ok(pos) => {
                            if self.entries[pos].material != new_material.0 {
                                self.entries[pos].material = new_material.0;
                                changed = true;
                            }
                        }
                        Err(pos) => {
                            self.entries.insert(
                                pos,
                                DeltaEntry {
                                    index,
                                    material: new_material.0,
                                },
                            );
                            self.override_count += 1;
                            changed = true;
                        }
                    }
                }
            }
        }

        if changed {
            self.mark_dirty(index);
        }
    }

    /// Effective override at `index`, if any
    pub fn override_at(&self, index: u32) -> Option<MaterialId> {
        match self.mode {
            DeltaMode::Dense => match self.dense.get(index as usize) {
                Some(&mat) if mat != NO_OVERRIDE => Some(MaterialId(mat)),
                _ => None,
            },
            DeltaMode::Sparse => self
                .entries
                .binary_search_by_key(&index, |e| e.index)
                .ok()
                .map(|pos| MaterialId(self.entries[pos].material)),
        }
    }
}

impl Default for ChunkDelta {
    fn default() -> Self {
        Self::new()
    }
}

/// Write every override in `delta` into `chunk` via `set_voxel`
pub fn apply_chunk_delta(delta: &ChunkDelta, chunk: &mut Chunk64) {
    if delta.is_empty() {
        return;
    }
    match delta.mode {
        DeltaMode::Dense => {
            if delta.dense.len() != VOXELS_PER_CHUNK {
                return;
            }
            for (i, &mat) in delta.dense.iter().enumerate() {
                if mat == NO_OVERRIDE {
                    continue;
                }
                let (x, y, z) = Chunk64::delinearize(i as u32);
                chunk.set_voxel(x, y, z, MaterialId(mat));
            }
        }
        DeltaMode::Sparse => {
            for e in &delta.entries {
                let (x, y, z) = Chunk64::delinearize(e.index);
                chunk.set_voxel(x, y, z, MaterialId(e.material));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: MaterialId = MaterialId::ROCK;

    #[test]
    fn test_edit_then_revert_leaves_empty_but_dirty() {
        let mut d = ChunkDelta::new();
        d.apply_edit(42, BASE, MaterialId::DIRT);
        assert_eq!(d.override_count, 1);
        d.apply_edit(42, BASE, BASE);
        assert!(d.is_empty());
        assert!(d.test_dirty(42));
        assert!(d.dirty);
    }

    #[test]
    fn test_same_override_twice_counts_once() {
        let mut d = ChunkDelta::new();
        d.apply_edit(7, BASE, MaterialId::WATER);
        d.apply_edit(7, BASE, MaterialId::WATER);
        assert_eq!(d.override_count, 1);
    }

    #[test]
    fn test_promotion_at_threshold() {
        // Scenario: 18% of 262144 = 47186 distinct overrides promote to dense
        let mut d = ChunkDelta::new();
        let target = (VOXELS_PER_CHUNK as f32 * PROMOTE_DENSITY).ceil() as u32;
        for i in 0..target {
            d.apply_edit(i, BASE, MaterialId::DIRT);
            d.normalize();
        }
        assert_eq!(d.mode, DeltaMode::Dense);
        assert_eq!(d.override_count, target);
        assert_eq!(target, 47186);
    }

    #[test]
    fn test_demotion_below_threshold() {
        let mut d = ChunkDelta::new();
        let promote = (VOXELS_PER_CHUNK as f32 * PROMOTE_DENSITY).ceil() as u32;
        for i in 0..promote {
            d.apply_edit(i, BASE, MaterialId::DIRT);
        }
        d.normalize();
        assert_eq!(d.mode, DeltaMode::Dense);

        // Revert down to the demote threshold
        let demote = (VOXELS_PER_CHUNK as f32 * DEMOTE_DENSITY).floor() as u32;
        for i in demote..promote {
            d.apply_edit(i, BASE, BASE);
        }
        d.normalize();
        assert_eq!(d.mode, DeltaMode::Sparse);
        assert_eq!(d.override_count, demote);
    }

    #[test]
    fn test_normalize_idempotent() {
        let mut d = ChunkDelta::new();
        for i in 0..60_000 {
            d.apply_edit(i, BASE, MaterialId::LAVA);
        }
        d.normalize();
        let mode = d.mode;
        let count = d.override_count;
        d.normalize();
        assert_eq!(d.mode, mode);
        assert_eq!(d.override_count, count);
    }

    #[test]
    fn test_mode_conversion_preserves_overrides() {
        let mut d = ChunkDelta::new();
        d.apply_edit(3, BASE, MaterialId::DIRT);
        d.apply_edit(100_000, BASE, MaterialId::WATER);
        d.ensure_dense();
        assert_eq!(d.override_at(3), Some(MaterialId::DIRT));
        assert_eq!(d.override_at(100_000), Some(MaterialId::WATER));
        assert_eq!(d.override_at(4), None);
        d.ensure_sparse();
        assert_eq!(d.override_count, 2);
        assert_eq!(d.override_at(100_000), Some(MaterialId::WATER));
    }

    #[test]
    fn test_override_count_exact_under_random_churn() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // override_count must equal the number of effective overrides after
        // any interleaving of edits, reverts, and normalizations
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut d = ChunkDelta::new();
        let mut expected: std::collections::HashMap<u32, u16> =
            std::collections::HashMap::new();

        for step in 0..20_000 {
            let index = rng.gen_range(0..VOXELS_PER_CHUNK as u32);
            let revert = rng.gen_bool(0.4);
            let new = if revert {
                BASE
            } else {
                MaterialId(rng.gen_range(1..5))
            };
            d.apply_edit(index, BASE, new);
            if new == BASE {
                expected.remove(&index);
            } else {
                expected.insert(index, new.0);
            }
            if step % 1000 == 0 {
                d.normalize();
            }
        }

        assert_eq!(d.override_count as usize, expected.len());
        for (&index, &mat) in &expected {
            assert_eq!(d.override_at(index), Some(MaterialId(mat)));
        }
    }

    #[test]
    fn test_apply_to_chunk() {
        let mut d = ChunkDelta::new();
        d.apply_edit(Chunk64::lindex(1, 2, 3), BASE, MaterialId::DIRT);
        d.apply_edit(Chunk64::lindex(4, 5, 6), BASE, MaterialId::AIR);

        let mut c = Chunk64::new();
        for z in 0..Chunk64::N {
            for y in 0..Chunk64::N {
                for x in 0..Chunk64::N {
                    c.set_voxel(x, y, z, BASE);
                }
            }
        }
        apply_chunk_delta(&d, &mut c);
        assert_eq!(c.get_material(1, 2, 3), MaterialId::DIRT);
        assert!(!c.is_solid(4, 5, 6));
        assert!(c.is_solid(0, 0, 0));

        // Repeated application on an already-applied chunk is a no-op
        let mut again = c.clone();
        apply_chunk_delta(&d, &mut again);
        assert_eq!(again.get_material(1, 2, 3), MaterialId::DIRT);
        assert!(!again.is_solid(4, 5, 6));
    }
}
