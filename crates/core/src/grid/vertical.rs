//! Non-uniform vertical grids and the vertical index search
//!
//! Heights are stored as a table `heights[0..=n]` in metres above the domain
//! minimum: `heights[0]` is the ground reference (normally 0) and
//! `heights[k]` is the top of layer `k`, so layer `k` spans
//! `heights[k - 1] .. heights[k]` and has thickness `dz[k]`.
//!
//! Two tables exist per simulation: the flow-field table (`HOKART`, built by
//! geometric stretching) and the coarser transient-concentration table
//! (`HoKartTrans`, built by banded stretching up to a height cap).

use super::GridError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fraction of the table probed first by [`vertical_index`]
///
/// Most particles and cells sit in the lowest part of the table, so the
/// first probe at `n / PROBE_FRACTION` usually discards seven eighths of the
/// search range in one comparison.
pub const PROBE_FRACTION: usize = 8;

/// Smallest `k` in `1..=n` with `heights[k] >= h`, clamped to `[1, n]`
///
/// `heights` must be strictly increasing with `heights.len() >= 2`. Exact
/// matches resolve to the matching index. Heights above the table top return
/// `n`, heights at or below `heights[1]` return `1`.
#[inline]
pub fn vertical_index(heights: &[f32], h: f32) -> usize {
    debug_assert!(heights.len() >= 2, "height table needs at least one layer");
    let n = heights.len() - 1;

    let probe = (n / PROBE_FRACTION).max(1);
    let (mut lo, mut hi) = if heights[probe] >= h {
        (1, probe)
    } else {
        (probe + 1, n)
    };

    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if heights[mid] >= h {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    lo.min(n)
}

#[inline]
fn is_positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

/// Flow-field stretching parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StretchingConfig {
    /// Thickness of the lowest layer (m)
    pub first_layer: f32,

    /// Constant growth factor between consecutive layers
    pub factor: f32,

    /// Optional `(height, factor)` bands; when non-empty, the factor of the
    /// last band whose height is at or below the current table top is used
    /// instead of `factor`
    pub flexible: Vec<(f32, f32)>,
}

impl Default for StretchingConfig {
    fn default() -> Self {
        Self {
            first_layer: 2.0,
            factor: 1.01,
            flexible: Vec::new(),
        }
    }
}

impl StretchingConfig {
    fn factor_at(&self, height: f32) -> f32 {
        self.flexible
            .iter()
            .take_while(|(band_height, _)| *band_height <= height)
            .last()
            .map_or(self.factor, |(_, factor)| *factor)
    }
}

/// Transient concentration table parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransientGridConfig {
    /// Thickness of the lowest layer (m)
    pub first_layer: f32,

    /// Stop adding layers once the table top reaches this height (m)
    pub height_cap: f32,

    /// Hard cap on the number of layers
    pub max_layers: usize,
}

impl Default for TransientGridConfig {
    fn default() -> Self {
        Self {
            first_layer: 2.0,
            height_cap: 800.0,
            max_layers: 100,
        }
    }
}

/// Stretching band of the transient table: `(below height, factor, max step)`
const TRANSIENT_BANDS: [(f32, f32, f32); 4] = [
    (30.0, 1.2, 4.0),
    (100.0, 1.3, 8.0),
    (400.0, 1.4, 12.0),
    (f32::INFINITY, 1.5, 20.0),
];

/// Monotone height table with per-layer thickness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalGrid {
    /// `heights[0..=n]`, metres above the domain minimum
    heights: Vec<f32>,
    /// `dz[k] = heights[k] - heights[k - 1]`, `dz[0]` mirrors `dz[1]`
    dz: Vec<f32>,
}

impl VerticalGrid {
    /// Build from a height table `heights[0..=n]`
    ///
    /// # Errors
    /// Returns an error if the table has no layer, is not strictly
    /// increasing, or contains non-finite values.
    pub fn from_heights(heights: Vec<f32>) -> Result<Self, GridError> {
        if heights.len() < 2 {
            return Err(GridError::EmptyGrid);
        }

        let mut dz = Vec::with_capacity(heights.len());
        dz.push(0.0);
        for k in 1..heights.len() {
            let thickness = heights[k] - heights[k - 1];
            if !thickness.is_finite() {
                return Err(GridError::ZeroLayerThickness { layer: k });
            }
            if thickness <= 0.0 {
                return Err(GridError::NonMonotonicHeights { index: k });
            }
            dz.push(thickness);
        }
        dz[0] = dz[1];

        Ok(Self { heights, dz })
    }

    /// Geometrically stretched flow-field table with `nkk` layers
    ///
    /// # Errors
    /// Returns an error if the first layer or a stretching factor is not positive.
    pub fn stretched(config: &StretchingConfig, nkk: usize) -> Result<Self, GridError> {
        if nkk == 0 {
            return Err(GridError::EmptyGrid);
        }
        if !is_positive(config.first_layer) {
            return Err(GridError::InvalidStretching(format!(
                "first layer thickness {} must be positive",
                config.first_layer
            )));
        }
        if !is_positive(config.factor) || config.flexible.iter().any(|(_, f)| !is_positive(*f)) {
            return Err(GridError::InvalidStretching(
                "stretching factors must be positive".to_string(),
            ));
        }

        let mut heights = Vec::with_capacity(nkk + 1);
        heights.push(0.0);
        let mut thickness = config.first_layer;
        for k in 1..=nkk {
            let top = heights[k - 1];
            if k > 1 {
                thickness *= config.factor_at(top);
            }
            heights.push(top + thickness);
        }

        let grid = Self::from_heights(heights)?;
        info!(
            "Flow vertical grid: {} layers, first layer {:.2}m, top {:.1}m",
            grid.layers(),
            grid.dz(1),
            grid.top()
        );
        Ok(grid)
    }

    /// Coarser table used by the transient concentration grid
    ///
    /// Layer thickness grows by a band-dependent stretch factor but never
    /// beyond the band's maximum step (a thickness already above the step is
    /// kept, never shrunk). Layers are appended until the top reaches
    /// `height_cap` or `max_layers` layers exist.
    ///
    /// # Errors
    /// Returns an error if the first layer, cap, or layer limit is not positive.
    pub fn transient(config: &TransientGridConfig) -> Result<Self, GridError> {
        if !is_positive(config.first_layer)
            || !is_positive(config.height_cap)
            || config.max_layers == 0
        {
            return Err(GridError::InvalidStretching(format!(
                "transient grid needs positive first layer, cap and layer count: {config:?}"
            )));
        }

        let mut heights = vec![0.0_f32];
        let mut thickness = config.first_layer;
        while heights.len() <= config.max_layers {
            let top = heights[heights.len() - 1];
            if top >= config.height_cap {
                break;
            }
            if heights.len() > 1 {
                let (_, factor, max_step) = TRANSIENT_BANDS
                    .iter()
                    .copied()
                    .find(|(below, _, _)| top < *below)
                    .unwrap_or(TRANSIENT_BANDS[TRANSIENT_BANDS.len() - 1]);
                thickness = (thickness * factor).min(max_step.max(thickness));
            }
            heights.push(top + thickness);
        }

        let grid = Self::from_heights(heights)?;
        info!(
            "Transient vertical grid: {} layers, top {:.1}m",
            grid.layers(),
            grid.top()
        );
        Ok(grid)
    }

    /// Number of layers `n`
    #[inline]
    pub fn layers(&self) -> usize {
        self.heights.len() - 1
    }

    /// Height table `heights[0..=n]`
    #[inline]
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Top of layer `k`
    #[inline]
    pub fn height(&self, k: usize) -> f32 {
        self.heights[k.min(self.layers())]
    }

    /// Thickness of layer `k`, clamped to the table (`k = 0` and `k > n`
    /// return the nearest real layer)
    #[inline]
    pub fn dz(&self, k: usize) -> f32 {
        self.dz[k.min(self.layers())]
    }

    /// Distance between the centres of layers `k` and `k + 1`
    #[inline]
    pub fn center_spacing(&self, k: usize) -> f32 {
        0.5 * (self.dz(k) + self.dz(k + 1))
    }

    /// Table top (m)
    #[inline]
    pub fn top(&self) -> f32 {
        self.heights[self.layers()]
    }

    /// Layer containing height `h` (see [`vertical_index`])
    #[inline]
    pub fn index_of(&self, h: f32) -> usize {
        vertical_index(&self.heights, h)
    }
}
