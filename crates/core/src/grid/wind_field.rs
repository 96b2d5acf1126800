//! Particle wind interpolation on the staggered flow grid
//!
//! Reconstructs the local wind vector at a particle position from the
//! face-centred velocities produced by the momentum solver.
//!
//! # Regimes
//!
//! - **Terrain following**: the vertical layer is found by binary search on
//!   `z - AHMIN`; u and v are interpolated linearly between the two faces
//!   straddling the particle along x and y, w between the bottom and top
//!   face of the layer, using the layer thickness as the denominator.
//! - **Flat with obstacles**: identical staggered interpolation, with heights
//!   measured directly above the flat ground.
//! - **Flat without obstacles**: no grid lookup at all; horizontal wind comes
//!   from the observed vertical profile, linear between observation levels
//!   and a stability-dependent power law outside them.
//!
//! ```text
//! unstable (L < 0):  p = max(0.35 - 0.4 |L|^-0.15, 0.05)
//! stable   (L >= 0): p = 0.56 L^-0.15
//! u(z) = u_ref (z / z_ref)^p
//! ```
//!
//! Interpolation is a pure function of the grid state: nothing is mutated.

use crate::core_types::vec3::Vec3;
use crate::grid::{vertical_index, FlowFieldState, FlowGrid, GridError};
use serde::{Deserialize, Serialize};

/// Smallest |Obukhov length| used by the profile exponent (m)
const MIN_OBUKHOV: f32 = 1.0;

/// Power-law exponent of the wind profile for Obukhov length `obukhov`
///
/// `|L|` is floored at 1 m so a zero length yields a finite exponent.
#[must_use]
pub fn power_law_exponent(obukhov: f32) -> f32 {
    let magnitude = obukhov.abs().max(MIN_OBUKHOV);
    if obukhov < 0.0 {
        (0.35 - 0.4 * magnitude.powf(-0.15)).max(0.05)
    } else {
        0.56 * magnitude.powf(-0.15)
    }
}

/// Vertical terrain treatment of the flow domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topography {
    /// Terrain-following grid referenced to the domain minimum
    Terrain,
    /// Flat ground at height zero
    Flat,
}

/// Observed wind profile used over flat, obstacle-free domains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindProfile {
    /// Measurement heights above ground, strictly increasing (m)
    heights: Vec<f32>,
    /// u at each measurement height (m/s)
    u: Vec<f32>,
    /// v at each measurement height (m/s)
    v: Vec<f32>,
    /// Power-law exponent derived from the Obukhov length
    exponent: f32,
}

impl WindProfile {
    /// Build a profile from observation levels
    ///
    /// # Errors
    /// Returns an error if the arrays differ in length, are empty, or the
    /// heights are not strictly increasing and positive.
    pub fn new(heights: Vec<f32>, u: Vec<f32>, v: Vec<f32>, obukhov: f32) -> Result<Self, GridError> {
        if heights.is_empty() {
            return Err(GridError::EmptyGrid);
        }
        for (what, len) in [("profile u", u.len()), ("profile v", v.len())] {
            if len != heights.len() {
                return Err(GridError::DimensionMismatch {
                    what,
                    expected: heights.len(),
                    actual: len,
                });
            }
        }
        let first = heights[0];
        if !first.is_finite() || first <= 0.0 {
            return Err(GridError::NonMonotonicHeights { index: 0 });
        }
        if let Some(index) = (1..heights.len()).find(|&k| heights[k] <= heights[k - 1]) {
            return Err(GridError::NonMonotonicHeights { index });
        }

        Ok(Self {
            heights,
            u,
            v,
            exponent: power_law_exponent(obukhov),
        })
    }

    /// Profile exponent in use
    #[inline]
    pub fn exponent(&self) -> f32 {
        self.exponent
    }

    /// Horizontal wind `(u, v)` at height `z` above ground
    pub fn wind_at(&self, z: f32) -> (f32, f32) {
        let z = z.max(0.0);
        let last = self.heights.len() - 1;

        if z <= self.heights[0] {
            let scale = (z / self.heights[0]).powf(self.exponent);
            return (self.u[0] * scale, self.v[0] * scale);
        }
        if z >= self.heights[last] {
            let scale = (z / self.heights[last]).powf(self.exponent);
            return (self.u[last] * scale, self.v[last] * scale);
        }

        // Bracketing levels: heights[n - 1] < z < heights[n]
        let n = self.heights.partition_point(|&h| h < z);
        let (h0, h1) = (self.heights[n - 1], self.heights[n]);
        let frac = (z - h0) / (h1 - h0);
        (
            self.u[n - 1] + frac * (self.u[n] - self.u[n - 1]),
            self.v[n - 1] + frac * (self.v[n] - self.v[n - 1]),
        )
    }
}

/// Particle state needed for one interpolation
#[derive(Debug, Clone, Copy)]
pub struct WindQuery {
    /// Horizontal cell index in x (`1..=nii`)
    pub i: usize,
    /// Horizontal cell index in y (`1..=njj`)
    pub j: usize,
    /// Vertical layer if already known; searched otherwise
    pub k: Option<usize>,
    /// Ground (terrain or roof) height under the particle (m); only the
    /// profile regime uses it, to measure height above the surface
    pub surface_height: f32,
    /// Position relative to the grid's south-west corner; `z` is absolute
    /// for terrain-following grids and above ground for flat ones
    pub position: Vec3,
}

/// Result of one interpolation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolatedWind {
    /// Wind vector (m/s)
    pub wind: Vec3,
    /// Vertical layer used
    pub k: usize,
}

/// Read-only wind reconstruction over a solved flow field
#[derive(Debug, Clone, Copy)]
pub struct WindFieldInterpolator<'a> {
    grid: &'a FlowGrid,
    field: &'a FlowFieldState,
    topography: Topography,
    profile: Option<&'a WindProfile>,
    has_obstacles: bool,
}

impl<'a> WindFieldInterpolator<'a> {
    /// Create an interpolator over `field`
    #[must_use]
    pub fn new(grid: &'a FlowGrid, field: &'a FlowFieldState, topography: Topography) -> Self {
        Self {
            grid,
            field,
            topography,
            profile: None,
            has_obstacles: grid.obstacles().has_obstacles(),
        }
    }

    /// Use an observed profile over flat, obstacle-free domains
    #[must_use]
    pub fn with_profile(mut self, profile: &'a WindProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Interpolated wind and the vertical layer used
    #[must_use]
    pub fn interpolate(&self, query: &WindQuery) -> InterpolatedWind {
        let pos = query.position;
        match (self.topography, self.profile) {
            (Topography::Terrain, _) => {
                self.staggered(query.i, query.j, query.k, pos.x, pos.y, pos.z - self.grid.ahmin())
            }
            (Topography::Flat, Some(profile)) if !self.has_obstacles => {
                let z = pos.z - query.surface_height;
                let (u, v) = profile.wind_at(z);
                let k = query
                    .k
                    .unwrap_or_else(|| vertical_index(self.grid.vertical().heights(), z));
                InterpolatedWind {
                    wind: Vec3::new(u, v, 0.0),
                    k,
                }
            }
            (Topography::Flat, _) => self.staggered(query.i, query.j, query.k, pos.x, pos.y, pos.z),
        }
    }

    /// Interpolated wind at a position, locating the horizontal cell first
    #[must_use]
    pub fn wind_at(&self, position: Vec3, surface_height: f32) -> InterpolatedWind {
        let i = cell_index(position.x, self.grid.dxk(), self.grid.nii());
        let j = cell_index(position.y, self.grid.dyk(), self.grid.njj());
        self.interpolate(&WindQuery {
            i,
            j,
            k: None,
            surface_height,
            position,
        })
    }

    fn staggered(
        &self,
        i: usize,
        j: usize,
        k: Option<usize>,
        x: f32,
        y: f32,
        z_rel: f32,
    ) -> InterpolatedWind {
        let vertical = self.grid.vertical();
        let k = k
            .unwrap_or_else(|| vertical_index(vertical.heights(), z_rel))
            .clamp(1, vertical.layers());
        let dxk = self.grid.dxk();
        let dyk = self.grid.dyk();

        let fx = ((x - (i as f32 - 1.0) * dxk) / dxk).clamp(0.0, 1.0);
        let fy = ((y - (j as f32 - 1.0) * dyk) / dyk).clamp(0.0, 1.0);
        let fz = ((z_rel - vertical.height(k - 1)) / vertical.dz(k)).clamp(0.0, 1.0);

        let uk = &self.field.uk;
        let vk = &self.field.vk;
        let wk = self.field.wk.column(i, j);

        let u_west = uk.get(i, j, k);
        let u_east = uk.get(i + 1, j, k);
        let v_south = vk.get(i, j, k);
        let v_north = vk.get(i, j + 1, k);
        let w_bottom = wk.get(k);
        let w_top = wk.get(k + 1);

        InterpolatedWind {
            wind: Vec3::new(
                u_west + fx * (u_east - u_west),
                v_south + fy * (v_north - v_south),
                w_bottom + fz * (w_top - w_bottom),
            ),
            k,
        }
    }
}

/// 1-based cell index containing coordinate `x`, clamped to `1..=n`
#[inline]
fn cell_index(x: f32, size: f32, n: usize) -> usize {
    let idx = (x / size).floor();
    if idx >= n as f32 {
        n
    } else if idx >= 0.0 {
        idx as usize + 1
    } else {
        1
    }
}
