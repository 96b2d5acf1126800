//! Flow-grid geometry and obstacle/terrain description
//!
//! `FlowGrid` bundles everything that is fixed for one weather/terrain
//! configuration: horizontal resolution, the stretched vertical table, and
//! per-column obstacle floors, ceilings, building heights, the advection
//! domain mask and the two friction-velocity helper terms.
//!
//! Horizontal indices are 1-based (`1..=nii`, `1..=njj`); index `0` and
//! `nii + 1` / `njj + 1` form a one-cell halo that carries boundary values.
//! All per-cell arrays are stored `i`-major over the halo grid.

use super::{vertical_index, GridError, VerticalGrid};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Von Kármán constant
pub const VON_KARMAN: f32 = 0.4;

/// Roughness lengths used for the wall-function helper terms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoughnessConfig {
    /// Surface roughness of open terrain (m)
    pub terrain_z0: f32,

    /// Roughness of building roofs and walls (m)
    pub obstacle_z0: f32,
}

impl Default for RoughnessConfig {
    fn default() -> Self {
        Self {
            terrain_z0: 0.2,
            obstacle_z0: 0.01,
        }
    }
}

/// Friction-velocity helper `κ / ln(0.5·dz / z0)` for the first active layer
///
/// The log argument is floored at 1.5 so tiny layers over rough surfaces
/// cannot produce a negative or infinite helper.
#[inline]
pub fn friction_helper(first_layer_dz: f32, z0: f32) -> f32 {
    VON_KARMAN / (0.5 * first_layer_dz / z0.max(1e-6)).max(1.5).ln()
}

/// Per-column obstacle and terrain description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleGrid {
    nii: usize,
    njj: usize,
    /// Lowest free layer is `kkart + 1`
    kkart: Vec<usize>,
    /// Topmost active layer of the column
    vertical_index: Vec<usize>,
    /// Building height above ground (m)
    cutk: Vec<f32>,
    /// Cell participates in the momentum solve
    advdom: Vec<bool>,
    ustar_terrain: Vec<f32>,
    ustar_obstacle: Vec<f32>,
}

impl ObstacleGrid {
    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        i * (self.njj + 2) + j
    }

    /// Obstacle-free grid spanning the full vertical table
    pub fn flat(nii: usize, njj: usize, vertical: &VerticalGrid, roughness: &RoughnessConfig) -> Self {
        let cells = (nii + 2) * (njj + 2);
        let dz1 = vertical.dz(1);
        Self {
            nii,
            njj,
            kkart: vec![0; cells],
            vertical_index: vec![vertical.layers(); cells],
            cutk: vec![0.0; cells],
            advdom: vec![true; cells],
            ustar_terrain: vec![friction_helper(dz1, roughness.terrain_z0); cells],
            ustar_obstacle: vec![friction_helper(dz1, roughness.obstacle_z0); cells],
        }
    }

    /// Derive obstacle floors from building heights on the interior cells
    ///
    /// `building_heights` holds `nii * njj` values, row `i - 1` first. Halo
    /// cells copy their nearest interior neighbour. A layer is blocked when
    /// the building covers at least half of it.
    ///
    /// # Errors
    /// Returns an error if the array has the wrong length or contains
    /// negative or non-finite heights.
    pub fn from_building_heights(
        nii: usize,
        njj: usize,
        building_heights: &[f32],
        vertical: &VerticalGrid,
        roughness: &RoughnessConfig,
    ) -> Result<Self, GridError> {
        if nii == 0 || njj == 0 {
            return Err(GridError::EmptyGrid);
        }
        if building_heights.len() != nii * njj {
            return Err(GridError::DimensionMismatch {
                what: "building_heights",
                expected: nii * njj,
                actual: building_heights.len(),
            });
        }
        if let Some(&bad) = building_heights
            .iter()
            .find(|h| !h.is_finite() || **h < 0.0)
        {
            return Err(GridError::InvalidParameter {
                name: "building_height",
                value: bad,
            });
        }

        let mut grid = Self::flat(nii, njj, vertical, roughness);
        for i in 0..nii + 2 {
            for j in 0..njj + 2 {
                let ii = i.clamp(1, nii) - 1;
                let jj = j.clamp(1, njj) - 1;
                let height = building_heights[ii * njj + jj];
                let floor = blocked_layers(vertical, height);
                let idx = grid.index(i, j);
                grid.kkart[idx] = floor;
                grid.cutk[idx] = height;

                let first = vertical.dz(floor + 1);
                grid.ustar_terrain[idx] = friction_helper(first, roughness.terrain_z0);
                grid.ustar_obstacle[idx] = friction_helper(first, roughness.obstacle_z0);
            }
        }

        let blocked = grid.kkart.iter().filter(|&&k| k > 0).count();
        info!(
            "Obstacle grid: {}x{} cells, {} columns with obstacles",
            nii, njj, blocked
        );
        Ok(grid)
    }

    /// Build from explicit per-cell arrays over the halo grid
    ///
    /// # Errors
    /// Returns an error if any array length differs from `(nii + 2) * (njj + 2)`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        nii: usize,
        njj: usize,
        kkart: Vec<usize>,
        vertical_index: Vec<usize>,
        cutk: Vec<f32>,
        advdom: Vec<bool>,
        ustar_terrain: Vec<f32>,
        ustar_obstacle: Vec<f32>,
    ) -> Result<Self, GridError> {
        let expected = (nii + 2) * (njj + 2);
        let lengths = [
            ("kkart", kkart.len()),
            ("vertical_index", vertical_index.len()),
            ("cutk", cutk.len()),
            ("advdom", advdom.len()),
            ("ustar_terrain", ustar_terrain.len()),
            ("ustar_obstacle", ustar_obstacle.len()),
        ];
        for (what, actual) in lengths {
            if actual != expected {
                return Err(GridError::DimensionMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self {
            nii,
            njj,
            kkart,
            vertical_index,
            cutk,
            advdom,
            ustar_terrain,
            ustar_obstacle,
        })
    }

    /// Lower every column ceiling to at most `ceiling`
    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        for top in &mut self.vertical_index {
            *top = (*top).min(ceiling);
        }
        self
    }

    /// Restrict the momentum solve to cells where `mask(i, j)` holds
    pub fn with_advection_domain(mut self, mask: impl Fn(usize, usize) -> bool) -> Self {
        for i in 0..self.nii + 2 {
            for j in 0..self.njj + 2 {
                let idx = self.index(i, j);
                self.advdom[idx] = mask(i, j);
            }
        }
        self
    }

    /// Obstacle floor `KKART[i][j]`
    #[inline]
    pub fn kkart(&self, i: usize, j: usize) -> usize {
        self.kkart[self.index(i, j)]
    }

    /// Column ceiling `VerticalIndex[i][j]`
    #[inline]
    pub fn ceiling(&self, i: usize, j: usize) -> usize {
        self.vertical_index[self.index(i, j)]
    }

    /// Building height `CUTK[i][j]` (m)
    #[inline]
    pub fn building_height(&self, i: usize, j: usize) -> f32 {
        self.cutk[self.index(i, j)]
    }

    /// Cell belongs to the active advection domain
    #[inline]
    pub fn in_domain(&self, i: usize, j: usize) -> bool {
        self.advdom[self.index(i, j)]
    }

    /// Friction helper for the first active layer, terrain variant below
    /// 1 m of building height and obstacle variant above
    #[inline]
    pub fn friction_helper(&self, i: usize, j: usize) -> f32 {
        let idx = self.index(i, j);
        if self.cutk[idx] < 1.0 {
            self.ustar_terrain[idx]
        } else {
            self.ustar_obstacle[idx]
        }
    }

    /// Any interior cell carries an obstacle
    pub fn has_obstacles(&self) -> bool {
        self.kkart.iter().any(|&k| k > 0) || self.cutk.iter().any(|&h| h > 0.0)
    }

    fn validate(&self, nkk: usize) -> Result<(), GridError> {
        for i in 0..self.nii + 2 {
            for j in 0..self.njj + 2 {
                let floor = self.kkart(i, j);
                let ceiling = self.ceiling(i, j);
                if ceiling > nkk {
                    return Err(GridError::ColumnCeiling {
                        i,
                        j,
                        floor,
                        ceiling,
                    });
                }
                if self.in_domain(i, j) && floor >= ceiling {
                    return Err(GridError::ColumnCeiling {
                        i,
                        j,
                        floor,
                        ceiling,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Number of layers a building of `height` blocks
fn blocked_layers(vertical: &VerticalGrid, height: f32) -> usize {
    if height <= 0.0 {
        return 0;
    }
    let heights = vertical.heights();
    let k = vertical_index(heights, height);
    let mid = heights[k - 1] + 0.5 * vertical.dz(k);
    if height >= mid {
        k
    } else {
        k - 1
    }
}

/// Immutable geometry of the prognostic flow grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGrid {
    nii: usize,
    njj: usize,
    dxk: f32,
    dyk: f32,
    /// Domain minimum elevation (m)
    ahmin: f32,
    vertical: VerticalGrid,
    obstacles: ObstacleGrid,
}

impl FlowGrid {
    /// Assemble and validate the flow grid
    ///
    /// # Errors
    /// Returns an error for empty grids, non-positive cell sizes, obstacle
    /// arrays of the wrong shape, or columns whose obstacle floor is not
    /// below the ceiling inside the advection domain.
    pub fn new(
        dxk: f32,
        dyk: f32,
        ahmin: f32,
        vertical: VerticalGrid,
        obstacles: ObstacleGrid,
    ) -> Result<Self, GridError> {
        let (nii, njj) = (obstacles.nii, obstacles.njj);
        if nii == 0 || njj == 0 {
            return Err(GridError::EmptyGrid);
        }
        for size in [dxk, dyk] {
            if !size.is_finite() || size <= 0.0 {
                return Err(GridError::InvalidCellSize(size));
            }
        }
        if let Err(e) = obstacles.validate(vertical.layers()) {
            warn!("Rejected flow grid: {e}");
            return Err(e);
        }

        info!(
            "Flow grid: {}x{}x{} cells, {:.1}x{:.1}m, top {:.1}m",
            nii,
            njj,
            vertical.layers(),
            dxk,
            dyk,
            vertical.top()
        );

        Ok(Self {
            nii,
            njj,
            dxk,
            dyk,
            ahmin,
            vertical,
            obstacles,
        })
    }

    /// Interior cells in x
    #[inline]
    pub fn nii(&self) -> usize {
        self.nii
    }

    /// Interior cells in y
    #[inline]
    pub fn njj(&self) -> usize {
        self.njj
    }

    /// Number of flow layers
    #[inline]
    pub fn nkk(&self) -> usize {
        self.vertical.layers()
    }

    /// Cell size in x (m)
    #[inline]
    pub fn dxk(&self) -> f32 {
        self.dxk
    }

    /// Cell size in y (m)
    #[inline]
    pub fn dyk(&self) -> f32 {
        self.dyk
    }

    /// Horizontal cell area (m²)
    #[inline]
    pub fn area_xy(&self) -> f32 {
        self.dxk * self.dyk
    }

    /// Domain minimum elevation (m)
    #[inline]
    pub fn ahmin(&self) -> f32 {
        self.ahmin
    }

    /// Flow vertical table
    #[inline]
    pub fn vertical(&self) -> &VerticalGrid {
        &self.vertical
    }

    /// Obstacle description
    #[inline]
    pub fn obstacles(&self) -> &ObstacleGrid {
        &self.obstacles
    }

    /// Length of the absolute vertical index range of staggered columns
    ///
    /// Indices `0..=nkk + 1`: index `nkk + 1` carries the top boundary.
    #[inline]
    pub fn column_len(&self) -> usize {
        self.nkk() + 2
    }
}
