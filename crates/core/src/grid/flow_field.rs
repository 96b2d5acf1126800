//! Staggered flow-field state
//!
//! One `FlowFieldState` per simulation run replaces a set of shared global
//! arrays. It is passed by reference into the momentum kernels (which mutate
//! it column by column) and into the wind interpolator (read-only).
//!
//! # Staggering
//!
//! ```text
//!            vk[i][j+1]
//!          +-----^-----+
//!          |           |
//! uk[i][j] >  (i,j,k)  > uk[i+1][j]       wk[k]   : bottom face of layer k
//!          |           |                  wk[k+1] : top face of layer k
//!          +-----^-----+
//!             vk[i][j]
//! ```
//!
//! Every field is a [`ColumnGrid`] of absolute length `nkk + 2`; index
//! `nkk + 1` holds the top boundary. Columns store the window from the
//! obstacle floor `KKART[i][j]` upwards, so reads inside solid geometry
//! return zero.

use super::{ColumnGrid, FlowGrid};
use serde::{Deserialize, Serialize};

/// Velocity, pressure-correction and viscosity fields of the flow solver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowFieldState {
    /// Transported u at west faces (m/s)
    pub uk: ColumnGrid,
    /// Transported v at south faces (m/s)
    pub vk: ColumnGrid,
    /// Transported w at bottom faces (m/s)
    pub wk: ColumnGrid,
    /// Advecting u from the previous outer iteration (m/s)
    pub uks: ColumnGrid,
    /// Advecting v from the previous outer iteration (m/s)
    pub vks: ColumnGrid,
    /// Advecting w from the previous outer iteration (m/s)
    pub wks: ColumnGrid,
    /// Pressure correction per cell, supplied by the pressure solver
    pub dpm_new: ColumnGrid,
    /// Eddy viscosity per cell (m²/s), supplied by the turbulence model
    pub eddy_viscosity: ColumnGrid,
}

impl FlowFieldState {
    /// Zeroed state laid out for `grid`
    pub fn new(grid: &FlowGrid) -> Self {
        let obstacles = grid.obstacles();
        let make = || {
            ColumnGrid::with_floors(grid.nii(), grid.njj(), grid.column_len(), |i, j| {
                obstacles.kkart(i, j)
            })
        };
        Self {
            uk: make(),
            vk: make(),
            wk: make(),
            uks: make(),
            vks: make(),
            wks: make(),
            dpm_new: make(),
            eddy_viscosity: make(),
        }
    }

    /// Set a uniform wind everywhere the flow is open
    ///
    /// Faces inside or touching solid geometry stay at zero; the ground face
    /// of every column keeps `w = 0`. Transported and advecting fields receive
    /// the same values.
    pub fn fill_uniform(&mut self, grid: &FlowGrid, u: f32, v: f32, w: f32) {
        let obstacles = grid.obstacles();
        let top = grid.nkk() + 1;
        let ni = self.uk.ni();
        let nj = self.uk.nj();

        for i in 0..ni {
            for j in 0..nj {
                let floor = obstacles.kkart(i, j);
                let floor_west = if i > 0 { obstacles.kkart(i - 1, j) } else { floor };
                let floor_south = if j > 0 { obstacles.kkart(i, j - 1) } else { floor };

                for k in 0..=top {
                    let u_val = if k > floor.max(floor_west) { u } else { 0.0 };
                    let v_val = if k > floor.max(floor_south) { v } else { 0.0 };
                    let w_val = if k > floor + 1 { w } else { 0.0 };
                    self.uk.set(i, j, k, u_val);
                    self.vk.set(i, j, k, v_val);
                    self.wk.set(i, j, k, w_val);
                }
            }
        }
        self.freeze_advecting_velocities();
    }

    /// Set a uniform eddy viscosity in every stored cell
    pub fn fill_viscosity(&mut self, value: f32) {
        self.eddy_viscosity.fill(value);
    }

    /// Copy the transported velocities into the advecting fields
    ///
    /// Called by the outer iteration once the pressure correction has made
    /// the transported field mass-consistent.
    pub fn freeze_advecting_velocities(&mut self) {
        self.uks.copy_from(&self.uk);
        self.vks.copy_from(&self.vk);
        self.wks.copy_from(&self.wk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{ObstacleGrid, RoughnessConfig, VerticalGrid};

    fn grid_with_building() -> FlowGrid {
        let v = VerticalGrid::from_heights(vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]).unwrap();
        #[rustfmt::skip]
        let heights = [
            0.0, 0.0, 0.0,
            0.0, 20.0, 0.0,
            0.0, 0.0, 0.0,
        ];
        let obstacles =
            ObstacleGrid::from_building_heights(3, 3, &heights, &v, &RoughnessConfig::default())
                .unwrap();
        FlowGrid::new(10.0, 10.0, 0.0, v, obstacles).unwrap()
    }

    #[test]
    fn test_fill_uniform_respects_obstacles() {
        let grid = grid_with_building();
        let mut state = FlowFieldState::new(&grid);
        state.fill_uniform(&grid, 2.0, 1.0, 0.5);

        // Open column
        assert_eq!(state.uk.get(1, 1, 1), 2.0);
        assert_eq!(state.uk.get(1, 1, 6), 2.0);
        assert_eq!(state.wk.get(1, 1, 1), 0.0);
        assert_eq!(state.wk.get(1, 1, 2), 0.5);

        // Building at (2, 2) blocks layers 1..=2
        assert_eq!(state.uk.get(2, 2, 2), 0.0);
        assert_eq!(state.uk.get(2, 2, 3), 2.0);
        // East face of the building touches solid at low levels
        assert_eq!(state.uk.get(3, 2, 1), 0.0);
        assert_eq!(state.uk.get(3, 2, 3), 2.0);
        // North face likewise for v
        assert_eq!(state.vk.get(2, 3, 2), 0.0);
        assert_eq!(state.vk.get(2, 3, 3), 1.0);
        // Roof face keeps w = 0
        assert_eq!(state.wk.get(2, 2, 3), 0.0);
        assert_eq!(state.wk.get(2, 2, 4), 0.5);

        assert_eq!(state.uks, state.uk);
    }
}
