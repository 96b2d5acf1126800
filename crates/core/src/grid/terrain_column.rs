//! Terrain-following vertical storage
//!
//! Every horizontal cell stores only its *active* vertical window, from the
//! ground/obstacle top up to the domain ceiling, while all formulas keep
//! addressing cells with a single absolute vertical index counted from the
//! bottom of the world. `TerrainColumn` performs that translation.
//!
//! ```text
//! absolute index:  0   1   2   3   4   5   6
//! stored window:              [s0  s1  s2  s3]     delta = 4 - 7 = -3
//! get(1) -> 0.0 (below the window)   get(4) -> s1
//! ```
//!
//! Reads outside the window return `0.0` and writes outside it are dropped.
//! Out-of-range access is defined behaviour, not an error, so the momentum
//! kernels can address solid neighbours without branching.

use serde::{Deserialize, Serialize};

/// One vertical column of terrain-following storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainColumn {
    data: Vec<f32>,
    /// `stored_len - domain_len`; zero or negative
    delta: isize,
}

impl TerrainColumn {
    /// Create a zeroed column storing the top `stored_len` of `domain_len` indices
    #[must_use]
    pub fn new(stored_len: usize, domain_len: usize) -> Self {
        debug_assert!(stored_len <= domain_len, "stored window exceeds domain");
        Self {
            data: vec![0.0; stored_len],
            delta: stored_len as isize - domain_len as isize,
        }
    }

    /// Offset added to an absolute index to obtain the storage index
    #[inline]
    pub fn delta(&self) -> isize {
        self.delta
    }

    /// Number of stored values
    #[inline]
    pub fn stored_len(&self) -> usize {
        self.data.len()
    }

    /// Lowest absolute index backed by storage
    #[inline]
    pub fn first_stored_index(&self) -> usize {
        (-self.delta) as usize
    }

    #[inline(always)]
    fn local(&self, index: usize) -> Option<usize> {
        let idx = index as isize + self.delta;
        if (0..self.data.len() as isize).contains(&idx) {
            Some(idx as usize)
        } else {
            None
        }
    }

    /// Value at absolute index, `0.0` outside the stored window
    #[inline(always)]
    pub fn get(&self, index: usize) -> f32 {
        match self.local(index) {
            Some(idx) => self.data[idx],
            None => 0.0,
        }
    }

    /// Store a value at absolute index; ignored outside the stored window
    #[inline(always)]
    pub fn set(&mut self, index: usize, value: f32) {
        if let Some(idx) = self.local(index) {
            self.data[idx] = value;
        }
    }

    /// Load `W` contiguous values starting at absolute `index`
    ///
    /// Lanes that fall outside the stored window (below or above) are zero.
    #[inline]
    pub fn get_lanes<const W: usize>(&self, index: usize) -> [f32; W] {
        let mut lanes = [0.0; W];
        let start = index as isize + self.delta;
        let len = self.data.len() as isize;

        // Common case: fully inside the window
        if start >= 0 && start + W as isize <= len {
            let start = start as usize;
            lanes.copy_from_slice(&self.data[start..start + W]);
            return lanes;
        }

        let lo = start.max(0);
        let hi = (start + W as isize).min(len);
        if lo < hi {
            let dst = (lo - start) as usize..(hi - start) as usize;
            lanes[dst].copy_from_slice(&self.data[lo as usize..hi as usize]);
        }
        lanes
    }

    /// Store `W` contiguous values starting at absolute `index`
    ///
    /// Only the lanes that overlap the stored window are written.
    #[inline]
    pub fn set_lanes<const W: usize>(&mut self, index: usize, lanes: [f32; W]) {
        let start = index as isize + self.delta;
        let len = self.data.len() as isize;
        let lo = start.max(0);
        let hi = (start + W as isize).min(len);
        if lo < hi {
            let src = (lo - start) as usize..(hi - start) as usize;
            self.data[lo as usize..hi as usize].copy_from_slice(&lanes[src]);
        }
    }

    /// Stored values, lowest absolute index first
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Overwrite every stored value
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Copy values from a column with the same window
    pub fn copy_from(&mut self, other: &TerrainColumn) {
        debug_assert_eq!(self.delta, other.delta, "column windows differ");
        self.data.copy_from_slice(&other.data);
    }
}

/// Horizontal grid of `TerrainColumn`s including a one-cell halo
///
/// Horizontal indices run `0..=nii + 1` and `0..=njj + 1`; the halo rows
/// hold boundary values. Columns are stored `i`-major so that
/// [`ColumnGrid::slabs_mut`] hands out one contiguous slab (all `j` for a
/// fixed `i`) per parallel task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnGrid {
    ni: usize,
    nj: usize,
    domain_len: usize,
    columns: Vec<TerrainColumn>,
}

impl ColumnGrid {
    /// Build a grid whose columns store `floor(i, j) ..domain_len`
    pub fn with_floors(
        nii: usize,
        njj: usize,
        domain_len: usize,
        floor: impl Fn(usize, usize) -> usize,
    ) -> Self {
        let ni = nii + 2;
        let nj = njj + 2;
        let mut columns = Vec::with_capacity(ni * nj);
        for i in 0..ni {
            for j in 0..nj {
                let floor = floor(i, j).min(domain_len);
                columns.push(TerrainColumn::new(domain_len - floor, domain_len));
            }
        }
        Self {
            ni,
            nj,
            domain_len,
            columns,
        }
    }

    /// Build a grid whose columns store the full vertical domain
    pub fn full(nii: usize, njj: usize, domain_len: usize) -> Self {
        Self::with_floors(nii, njj, domain_len, |_, _| 0)
    }

    /// Number of `i` rows including halo (`nii + 2`)
    #[inline]
    pub fn ni(&self) -> usize {
        self.ni
    }

    /// Number of `j` columns per slab including halo (`njj + 2`)
    #[inline]
    pub fn nj(&self) -> usize {
        self.nj
    }

    /// Length of the absolute vertical index range
    #[inline]
    pub fn domain_len(&self) -> usize {
        self.domain_len
    }

    /// Column at `(i, j)`
    #[inline]
    pub fn column(&self, i: usize, j: usize) -> &TerrainColumn {
        &self.columns[i * self.nj + j]
    }

    /// Mutable column at `(i, j)`
    #[inline]
    pub fn column_mut(&mut self, i: usize, j: usize) -> &mut TerrainColumn {
        &mut self.columns[i * self.nj + j]
    }

    /// Value at `(i, j, k)` with terrain-column semantics
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f32 {
        self.column(i, j).get(k)
    }

    /// Store a value at `(i, j, k)` with terrain-column semantics
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f32) {
        self.column_mut(i, j).set(k, value);
    }

    /// All columns with fixed `i`
    #[inline]
    pub fn slab(&self, i: usize) -> &[TerrainColumn] {
        &self.columns[i * self.nj..(i + 1) * self.nj]
    }

    /// Mutable `i` slabs in order, one chunk per `i`
    pub fn slabs_mut(&mut self) -> std::slice::ChunksMut<'_, TerrainColumn> {
        self.columns.chunks_mut(self.nj)
    }

    /// Set every stored value of every column
    pub fn fill(&mut self, value: f32) {
        for column in &mut self.columns {
            column.fill(value);
        }
    }

    /// Copy all values from a grid with identical column windows
    pub fn copy_from(&mut self, other: &ColumnGrid) {
        debug_assert_eq!(self.columns.len(), other.columns.len());
        for (dst, src) in self.columns.iter_mut().zip(&other.columns) {
            dst.copy_from(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_inside_window() {
        let mut col = TerrainColumn::new(4, 7);
        assert_eq!(col.delta(), -3);
        assert_eq!(col.first_stored_index(), 3);

        for k in 3..7 {
            col.set(k, k as f32 * 1.5);
        }
        for k in 3..7 {
            assert_eq!(col.get(k), k as f32 * 1.5);
        }
    }

    #[test]
    fn test_outside_window_reads_zero_and_drops_writes() {
        let mut col = TerrainColumn::new(4, 7);
        col.fill(9.0);

        // Below the window
        col.set(1, 5.0);
        assert_eq!(col.get(0), 0.0);
        assert_eq!(col.get(1), 0.0);
        assert_eq!(col.get(2), 0.0);

        // Above the window
        col.set(7, 5.0);
        col.set(100, 5.0);
        assert_eq!(col.get(7), 0.0);
        assert_eq!(col.get(100), 0.0);

        // Storage untouched by dropped writes
        assert!(col.as_slice().iter().all(|&v| v == 9.0));
    }

    #[test]
    fn test_lanes_fully_inside() {
        let mut col = TerrainColumn::new(8, 8);
        col.set_lanes(2, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(col.get_lanes::<4>(2), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(col.get(1), 0.0);
        assert_eq!(col.get(6), 0.0);
    }

    #[test]
    fn test_lanes_partial_overlap_low_side() {
        let mut col = TerrainColumn::new(5, 8);
        for k in 3..8 {
            col.set(k, k as f32);
        }

        // Starts two below the window: two zero lanes, then stored values
        assert_eq!(col.get_lanes::<4>(1), [0.0, 0.0, 3.0, 4.0]);

        // Writes only land inside the window
        col.set_lanes(1, [10.0, 11.0, 12.0, 13.0]);
        assert_eq!(col.get(3), 12.0);
        assert_eq!(col.get(4), 13.0);
        assert_eq!(col.get(2), 0.0);
    }

    #[test]
    fn test_lanes_far_below_is_zero() {
        let mut col = TerrainColumn::new(2, 12);
        col.fill(7.0);
        assert_eq!(col.get_lanes::<4>(0), [0.0; 4]);
        assert_eq!(col.get_lanes::<4>(6), [0.0; 4]);
    }

    #[test]
    fn test_lanes_high_side_is_clamped() {
        let mut col = TerrainColumn::new(4, 4);
        col.fill(1.0);
        assert_eq!(col.get_lanes::<4>(2), [1.0, 1.0, 0.0, 0.0]);

        col.set_lanes(2, [5.0, 6.0, 7.0, 8.0]);
        assert_eq!(col.as_slice(), &[1.0, 1.0, 5.0, 6.0]);
    }

    #[test]
    fn test_column_grid_floors() {
        let grid = ColumnGrid::with_floors(3, 2, 6, |i, j| i + j);
        assert_eq!(grid.ni(), 5);
        assert_eq!(grid.nj(), 4);
        assert_eq!(grid.column(0, 0).stored_len(), 6);
        assert_eq!(grid.column(2, 1).first_stored_index(), 3);
        // Floors above the domain collapse to an empty window
        assert_eq!(grid.column(4, 3).stored_len(), 0);
    }

    #[test]
    fn test_column_grid_slabs_are_i_major() {
        let mut grid = ColumnGrid::full(2, 2, 3);
        for (i, slab) in grid.slabs_mut().enumerate() {
            for column in slab.iter_mut() {
                column.fill(i as f32);
            }
        }
        assert_eq!(grid.get(3, 0, 1), 3.0);
        assert_eq!(grid.slab(1).len(), 4);
        assert_eq!(grid.slab(1)[2].get(2), 1.0);
    }
}
