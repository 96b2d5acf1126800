//! Transient concentration accumulation
//!
//! Particles deposit their mass into a 4D grid indexed by horizontal cell,
//! transient vertical layer and source group. Many particle workers add into
//! the grid at once, so every `(i, j, k)` cell carries its own lock over the
//! small source-group vector:
//!
//! ```text
//! cells[(i - 1, j - 1, k - 1)] = Mutex<[c_sg0, c_sg1, ..]>
//! ```
//!
//! Lock granularity is one horizontal/vertical cell: two workers only
//! contend when they hit the same cell.

use crate::grid::{GridError, VerticalGrid};
use rayon::prelude::*;
use std::sync::{Mutex, PoisonError};
use tracing::{info, trace};

/// One particle contribution for a single micro time step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleDeposit {
    /// Position relative to the grid's south-west corner (m)
    pub x: f32,
    pub y: f32,
    /// Particle height (m, same datum as `ground`)
    pub z: f32,
    /// Ground height under the particle (m)
    pub ground: f32,
    /// Particle mass (kg)
    pub mass: f32,
    /// Horizontal cell area used for normalisation (m²)
    pub area: f32,
    /// Time-step scaling factor
    pub scale: f32,
    /// Internal source-group index
    pub source_group: usize,
    /// Particle was reflected this step; handled elsewhere
    pub reflected: bool,
}

/// Lock-protected transient concentration grid
#[derive(Debug)]
pub struct TransientConcentration {
    nii: usize,
    njj: usize,
    dxk: f32,
    dyk: f32,
    vertical: VerticalGrid,
    source_groups: usize,
    cells: Vec<Mutex<Box<[f32]>>>,
}

impl TransientConcentration {
    /// Zeroed grid of `nii × njj` cells of `dxk × dyk` over a transient table
    ///
    /// # Errors
    /// Returns an error for an empty grid, a non-positive cell size or zero
    /// source groups.
    pub fn new(
        nii: usize,
        njj: usize,
        dxk: f32,
        dyk: f32,
        vertical: VerticalGrid,
        source_groups: usize,
    ) -> Result<Self, GridError> {
        if nii == 0 || njj == 0 {
            return Err(GridError::EmptyGrid);
        }
        for size in [dxk, dyk] {
            if !size.is_finite() || size <= 0.0 {
                return Err(GridError::InvalidCellSize(size));
            }
        }
        if source_groups == 0 {
            return Err(GridError::InvalidSourceGroups);
        }

        let count = nii * njj * vertical.layers();
        let cells = (0..count)
            .map(|_| Mutex::new(vec![0.0; source_groups].into_boxed_slice()))
            .collect();

        info!(
            "Transient concentration grid: {}x{}x{} cells, {} source groups",
            nii,
            njj,
            vertical.layers(),
            source_groups
        );

        Ok(Self {
            nii,
            njj,
            dxk,
            dyk,
            vertical,
            source_groups,
            cells,
        })
    }

    /// Number of source groups
    #[inline]
    pub fn source_groups(&self) -> usize {
        self.source_groups
    }

    /// Transient vertical table
    #[inline]
    pub fn vertical(&self) -> &VerticalGrid {
        &self.vertical
    }

    #[inline]
    fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        ((i - 1) * self.njj + (j - 1)) * self.vertical.layers() + (k - 1)
    }

    /// Target cell `(i, j, k)` for a position, `None` outside the grid
    ///
    /// `z_rel` is the height above ground; heights below ground fall into
    /// the first layer.
    pub fn cell_index(&self, x: f32, y: f32, z_rel: f32) -> Option<(usize, usize, usize)> {
        // Checked before the cast: huge or non-finite coordinates must not wrap
        let fi = (x / self.dxk).floor();
        let fj = (y / self.dyk).floor();
        let inside = (0.0..self.nii as f32).contains(&fi)
            && (0.0..self.njj as f32).contains(&fj)
            && z_rel <= self.vertical.top();
        if !inside {
            return None;
        }
        Some((fi as usize + 1, fj as usize + 1, self.vertical.index_of(z_rel)))
    }

    /// Add one particle's contribution; returns the cell it landed in
    ///
    /// Adds `mass · scale / (area · dz[k])`. Reflected particles, particles
    /// outside the horizontal grid or above the table, and unknown source
    /// groups are ignored.
    pub fn accumulate(&self, deposit: &ParticleDeposit) -> Option<(usize, usize, usize)> {
        if deposit.reflected || deposit.source_group >= self.source_groups {
            return None;
        }
        let (i, j, k) = self.cell_index(deposit.x, deposit.y, deposit.z - deposit.ground)?;
        let value = deposit.mass * deposit.scale / (deposit.area * self.vertical.dz(k));

        // The guarded data is a plain float vector; a panic elsewhere
        // cannot leave it half-written
        let mut cell = self.cells[self.flat_index(i, j, k)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cell[deposit.source_group] += value;
        Some((i, j, k))
    }

    /// Accumulate a batch in parallel; returns the number of deposits added
    pub fn accumulate_batch(&self, deposits: &[ParticleDeposit]) -> usize {
        deposits
            .par_iter()
            .filter(|d| self.accumulate(d).is_some())
            .count()
    }

    /// Concentration of source group `sg` in cell `(i, j, k)`
    ///
    /// Indices outside the grid read as zero.
    pub fn get(&self, i: usize, j: usize, k: usize, sg: usize) -> f32 {
        if i == 0 || j == 0 || k == 0 {
            return 0.0;
        }
        if i > self.nii || j > self.njj || k > self.vertical.layers() || sg >= self.source_groups {
            return 0.0;
        }
        let cell = self.cells[self.flat_index(i, j, k)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cell[sg]
    }

    /// Sum over all cells and source groups
    pub fn total(&self) -> f32 {
        self.cells
            .iter()
            .map(|cell| {
                cell.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .sum::<f32>()
            })
            .sum()
    }

    /// Zero the grid at the start of an accumulation window
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.get_mut().unwrap_or_else(PoisonError::into_inner).fill(0.0);
        }
        trace!("Transient concentration grid reset");
    }
}
