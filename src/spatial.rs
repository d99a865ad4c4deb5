//! Spatial hashing for O(1)-average neighbor queries.
//!
//! Rebuilt from scratch every tick so arbitrary particle motion never
//! invalidates it: hash each particle's grid cell into `[0, n)`, sort the
//! (particle, hash) table with a bitonic compare-exchange network, then
//! record each hash bucket's contiguous `[start, end)` slice. Queries scan
//! the 3x3 block of cells around a point and re-validate candidates, since
//! the modulo-n hash domain makes bucket collisions expected rather than
//! exceptional.
//!
//! The sort is the data-parallel part: each compare-exchange round touches
//! disjoint aligned blocks of the entry table, so a round is one
//! `par_chunks_mut` pass and the end of that pass is the round barrier the
//! network's correctness rests on.

use glam::{IVec2, Vec2};
use rayon::prelude::*;

/// Cell offsets of the 3x3 query block, own cell first.
pub const NEIGHBOR_OFFSETS: [IVec2; 9] = [
    IVec2::new(0, 0),
    IVec2::new(1, 0),
    IVec2::new(1, 1),
    IVec2::new(0, 1),
    IVec2::new(-1, 1),
    IVec2::new(-1, 0),
    IVec2::new(-1, -1),
    IVec2::new(0, -1),
    IVec2::new(1, -1),
];

// Multiplicative hash constants. The negative-coordinate multipliers differ
// from the non-negative ones on purpose: plain multiplicative mixing
// clusters badly on small negative cell coordinates, and the asymmetric
// primes spread those cells as well as the positive ones.
const X_NEG: i32 = 786_433;
const X_POS: i32 = 196_613;
const Y_NEG: i32 = 100_663_319;
const Y_POS: i32 = 12_582_917;
const HASH_SEED: i32 = 3_145_739;
const HASH_MIX: i32 = 25_165_843;

/// One slot of the sorted lookup table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpatialEntry {
    /// Index into the particle arrays.
    pub particle: u32,
    /// Hash of the particle's grid cell, in `[0, n)`.
    pub hash: i32,
}

/// Padding for the sort network's power-of-two tail. Sorts past every real
/// hash, so padded slots sink to the end and never join a real swap.
const SENTINEL: SpatialEntry = SpatialEntry {
    particle: u32::MAX,
    hash: i32::MAX,
};

/// Contiguous slice `[start, end)` of the sorted entry table belonging to
/// one hash bucket. `start == end` means the bucket is unoccupied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellRange {
    pub start: u32,
    pub end: u32,
}

impl CellRange {
    pub const EMPTY: Self = Self { start: 0, end: 0 };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Grid cell containing a position, for a given cell size.
#[inline]
pub fn quantize(position: Vec2, cell_size: f32) -> IVec2 {
    (position / cell_size).floor().as_ivec2()
}

/// Hash a cell coordinate into `[0, n)`.
///
/// Wrapping i32 multiply-mix, logical shift right (making the value
/// non-negative), then modulo the particle count. The modulo doubles as the
/// defensive wrap against pathological coordinates: no computed hash can
/// index out of bounds.
#[inline]
pub fn hash_cell(cell: IVec2, n: usize) -> i32 {
    debug_assert!(n > 0 && n <= u32::MAX as usize);
    let x = cell.x.wrapping_mul(if cell.x < 0 { X_NEG } else { X_POS });
    let y = cell.y.wrapping_mul(if cell.y < 0 { Y_NEG } else { Y_POS });
    let mixed = HASH_SEED.wrapping_add(x).wrapping_mul(HASH_MIX).wrapping_add(y);
    (((mixed as u32) >> 1) % n as u32) as i32
}

/// Per-tick spatial index over a fixed particle set.
///
/// Two instances run side by side each tick (influence radius and sample
/// radius); they share input positions but own disjoint buffers. All
/// buffers are sized once at construction and reused in place.
pub struct SpatialLookup {
    cell_size: f32,
    num_particles: usize,
    /// Sort-network width: `num_particles.next_power_of_two()`.
    n_pow2: usize,
    /// `n_pow2` slots; `[num_particles..]` hold the permanent sentinel.
    entries: Vec<SpatialEntry>,
    /// One range per hash bucket, `num_particles` slots.
    ranges: Vec<CellRange>,
}

impl SpatialLookup {
    pub fn new(num_particles: usize, cell_size: f32) -> Self {
        let n_pow2 = num_particles.next_power_of_two();
        Self {
            cell_size,
            num_particles,
            n_pow2,
            entries: vec![SENTINEL; n_pow2],
            ranges: vec![CellRange::EMPTY; num_particles],
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// The sorted entry table (real slots only, padding excluded).
    pub fn entries(&self) -> &[SpatialEntry] {
        &self.entries[..self.num_particles]
    }

    /// The per-bucket range table.
    pub fn ranges(&self) -> &[CellRange] {
        &self.ranges
    }

    /// Rebuild the index for this tick: hash, sort, ranges.
    ///
    /// Three phases, each completing fully before the next begins; within
    /// the sort every compare-exchange round is itself a barrier boundary.
    pub fn build(&mut self, positions: &[Vec2]) {
        debug_assert_eq!(positions.len(), self.num_particles);
        let n = self.num_particles;
        if n == 0 {
            return;
        }

        // Hash phase: write (particle, cell hash) per slot, reset ranges.
        let cell_size = self.cell_size;
        self.entries[..n]
            .par_iter_mut()
            .zip(positions.par_iter())
            .enumerate()
            .for_each(|(i, (entry, &pos))| {
                *entry = SpatialEntry {
                    particle: i as u32,
                    hash: hash_cell(quantize(pos, cell_size), n),
                };
            });
        self.ranges
            .par_iter_mut()
            .for_each(|range| *range = CellRange::EMPTY);

        self.sort_entries();
        self.fill_ranges();
    }

    /// Scalar reference build: same table layout via a stdlib sort.
    ///
    /// Kept as the oracle the parallel network is validated against.
    pub fn build_scalar(&mut self, positions: &[Vec2]) {
        debug_assert_eq!(positions.len(), self.num_particles);
        let n = self.num_particles;
        if n == 0 {
            return;
        }
        for (i, entry) in self.entries[..n].iter_mut().enumerate() {
            *entry = SpatialEntry {
                particle: i as u32,
                hash: hash_cell(quantize(positions[i], self.cell_size), n),
            };
        }
        for range in &mut self.ranges {
            *range = CellRange::EMPTY;
        }
        self.entries[..n].sort_unstable_by_key(|e| e.hash);
        self.fill_ranges();
    }

    /// Bitonic compare-exchange network over the power-of-two entry table.
    ///
    /// For each group size k = 2, 4, ..., n_pow2 and each comparator offset
    /// j = k/2 down to 1, exchange pairs (i, i + j) where bit j of i is
    /// clear, ascending iff `i & k == 0`. Pairs of a round live inside
    /// aligned blocks of 2j entries, so disjoint `par_chunks_mut` blocks
    /// realize the round without locks; rounds never overlap because each
    /// `par_chunks_mut` pass completes before the next starts.
    fn sort_entries(&mut self) {
        let n_pow2 = self.n_pow2;
        if n_pow2 < 2 {
            return;
        }
        let mut group_size = 2;
        while group_size <= n_pow2 {
            let mut comp_offset = group_size >> 1;
            while comp_offset > 0 {
                let block = comp_offset << 1;
                self.entries
                    .par_chunks_mut(block)
                    .enumerate()
                    .for_each(|(chunk_index, chunk)| {
                        let base = chunk_index * block;
                        let ascending = base & group_size == 0;
                        for a in 0..comp_offset {
                            let b = a + comp_offset;
                            let out_of_order = if ascending {
                                chunk[a].hash > chunk[b].hash
                            } else {
                                chunk[a].hash < chunk[b].hash
                            };
                            if out_of_order {
                                chunk.swap(a, b);
                            }
                        }
                    });
                comp_offset >>= 1;
            }
            group_size <<= 1;
        }
    }

    /// Close/open bucket ranges at every hash change in the sorted table.
    fn fill_ranges(&mut self) {
        let n = self.num_particles;
        for i in 0..n {
            let hash = self.entries[i].hash as usize;
            if i == 0 || self.entries[i - 1].hash != self.entries[i].hash {
                self.ranges[hash].start = i as u32;
            }
            if i + 1 == n || self.entries[i + 1].hash != self.entries[i].hash {
                self.ranges[hash].end = (i + 1) as u32;
            }
        }
    }

    /// Visit every particle within one cell size of `point`.
    ///
    /// Scans the 3x3 cell block around the point. Each candidate is
    /// re-validated two ways before the callback fires: its true cell must be
    /// the cell being probed (hash collisions mix foreign cells into a
    /// bucket, and without this check a particle whose colliding cell also
    /// sits in the block would be visited twice), and its true distance
    /// must be inside the query radius.
    ///
    /// `positions` must be the array the lookup was built from.
    pub fn for_each_in_radius<F>(&self, point: Vec2, positions: &[Vec2], mut visit: F)
    where
        F: FnMut(usize, f32),
    {
        let n = self.num_particles;
        if n == 0 {
            return;
        }
        let radius_sq = self.cell_size * self.cell_size;
        let center = quantize(point, self.cell_size);
        for offset in NEIGHBOR_OFFSETS {
            let cell = center + offset;
            let range = self.ranges[hash_cell(cell, n) as usize];
            for entry in &self.entries[range.start as usize..range.end as usize] {
                let index = entry.particle as usize;
                let pos = positions[index];
                if quantize(pos, self.cell_size) != cell {
                    continue;
                }
                let dist_sq = (pos - point).length_squared();
                if dist_sq < radius_sq {
                    visit(index, dist_sq);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scatter(count: usize, extent: f32) -> Vec<Vec2> {
        // Deterministic pseudo-random scatter, negative and positive coords.
        let mut positions = Vec::with_capacity(count);
        let mut state = 0x2545_f491u32;
        for _ in 0..count {
            let mut next = || {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            };
            positions.push(Vec2::new(next() * extent, next() * extent));
        }
        positions
    }

    #[test]
    fn hash_stays_in_domain() {
        for n in [1usize, 7, 64, 1000] {
            for cell in [
                IVec2::new(0, 0),
                IVec2::new(-1, -1),
                IVec2::new(i32::MAX, i32::MIN),
                IVec2::new(-123_456, 789_012),
            ] {
                let h = hash_cell(cell, n);
                assert!((0..n as i32).contains(&h), "hash {h} outside [0, {n})");
            }
        }
    }

    #[test]
    fn sorted_after_build_non_power_of_two() {
        for count in [1usize, 2, 3, 5, 31, 100] {
            let positions = scatter(count, 10.0);
            let mut lookup = SpatialLookup::new(count, 0.5);
            lookup.build(&positions);
            let entries = lookup.entries();
            assert!(entries.windows(2).all(|w| w[0].hash <= w[1].hash));
            // Sentinel padding stays past the real slots.
            assert!(lookup.entries[count..].iter().all(|e| *e == SENTINEL));
        }
    }

    #[test]
    fn empty_lookup_is_inert() {
        let mut lookup = SpatialLookup::new(0, 0.5);
        lookup.build(&[]);
        assert!(lookup.entries().is_empty());
        let mut visited = 0;
        lookup.for_each_in_radius(Vec2::ZERO, &[], |_, _| visited += 1);
        assert_eq!(visited, 0);
    }

    #[test]
    fn single_particle_found() {
        let positions = vec![Vec2::new(0.2, 0.3)];
        let mut lookup = SpatialLookup::new(1, 0.5);
        lookup.build(&positions);
        let mut found = Vec::new();
        lookup.for_each_in_radius(Vec2::new(0.25, 0.3), &positions, |i, _| found.push(i));
        assert_eq!(found, vec![0]);
    }

    #[test]
    fn parallel_build_matches_scalar_layout() {
        let positions = scatter(200, 5.0);
        let mut fast = SpatialLookup::new(200, 0.5);
        let mut slow = SpatialLookup::new(200, 0.5);
        fast.build(&positions);
        slow.build_scalar(&positions);

        let fast_hashes: Vec<i32> = fast.entries().iter().map(|e| e.hash).collect();
        let slow_hashes: Vec<i32> = slow.entries().iter().map(|e| e.hash).collect();
        assert_eq!(fast_hashes, slow_hashes);
        assert_eq!(fast.ranges(), slow.ranges());
    }

    #[test]
    fn query_never_yields_duplicates() {
        let positions = scatter(64, 1.0);
        let mut lookup = SpatialLookup::new(64, 0.5);
        lookup.build(&positions);
        for &point in &positions {
            let mut seen = vec![false; positions.len()];
            lookup.for_each_in_radius(point, &positions, |i, _| {
                assert!(!seen[i], "particle {i} visited twice");
                seen[i] = true;
            });
        }
    }
}
