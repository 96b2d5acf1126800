//! Prognostic momentum solver for the staggered flow field
//!
//! Each velocity component is updated by an implicit finite-volume solve
//! along every vertical column of the active advection domain:
//!
//! 1. Six convective face fluxes are formed from the advecting velocities
//!    (`uks`, `vks`, `wks`) and combined with diffusion conductances through
//!    the power-law scheme into neighbour coefficients.
//! 2. Lateral neighbours, the pseudo-transient term, the pressure-correction
//!    gradient, Coriolis forcing and (at the first free layer) a quadratic
//!    drag law form the explicit source `D`.
//! 3. The vertical tridiagonal system is eliminated bottom-up into `P, Q`
//!    and back-substituted top-down with under-relaxation.
//!
//! # Concurrency
//!
//! Work is distributed over `i` slabs with rayon. Each task owns the columns
//! of exactly one `i`; neighbours `i ± 1` are read from a snapshot taken at
//! the start of the call, so no task can observe or produce a partial write
//! of another slab. Inside a slab the `j` neighbours are read live, which
//! makes the `j` traversal a Gauss-Seidel sweep whose direction is set by
//! [`SweepDirection`].
//!
//! # Ordering
//!
//! Components must be solved U, then V, then W within an iteration: the V
//! and W drag terms read the freshly updated U (and V) field.
//! [`MomentumSolver::sweep`] enforces this order.

mod u_component;
mod v_component;
mod w_component;

pub use u_component::solve_u;
pub use v_component::solve_v;
pub use w_component::solve_w;

use crate::grid::{FlowFieldState, FlowGrid, GridError, TerrainColumn};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Floor on the reference wind speed used by the drag law (m/s)
pub const MIN_DRAG_SPEED: f32 = 0.01;

/// Momentum solver parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumConfig {
    /// Under-relaxation factor applied in back substitution (0, 1]
    pub relax: f32,

    /// Lower bound on the eddy viscosity (m²/s)
    pub vis_min: f32,

    /// Coriolis parameter (1/s)
    pub coriolis: f32,

    /// Geostrophic wind, x component (m/s)
    pub ug: f32,

    /// Geostrophic wind, y component (m/s)
    pub vg: f32,

    /// Pseudo time step of the transient term `AP0` (s)
    pub pseudo_dt: f32,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            relax: 0.7,
            vis_min: 0.1,
            coriolis: 1.0e-4,
            ug: 0.0,
            vg: 0.0,
            pseudo_dt: 1.0,
        }
    }
}

impl MomentumConfig {
    /// Check parameter ranges
    ///
    /// # Errors
    /// Returns [`GridError::InvalidParameter`] for a relaxation factor
    /// outside `(0, 1]`, a non-positive minimum viscosity or pseudo time
    /// step, or any non-finite value.
    pub fn validate(&self) -> Result<(), GridError> {
        let checks = [
            ("relax", self.relax, self.relax > 0.0 && self.relax <= 1.0),
            ("vis_min", self.vis_min, self.vis_min > 0.0),
            ("pseudo_dt", self.pseudo_dt, self.pseudo_dt > 0.0),
            ("coriolis", self.coriolis, true),
            ("ug", self.ug, true),
            ("vg", self.vg, true),
        ];
        for (name, value, in_range) in checks {
            if !value.is_finite() || !in_range {
                return Err(GridError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }
}

/// Horizontal traversal order of one solve (`+1` ascending, `-1` descending)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepDirection {
    /// Order of the `i` slabs
    pub is: i8,
    /// Order of the `j` columns inside a slab
    pub js: i8,
}

impl SweepDirection {
    /// Ascending in both directions
    pub const FORWARD: Self = Self { is: 1, js: 1 };

    /// Direction for outer iteration `n`
    ///
    /// Cycles `(1, 1)`, `(-1, 1)`, `(1, -1)`, `(-1, -1)` so that four
    /// consecutive iterations visit every traversal order once.
    #[must_use]
    pub fn for_iteration(n: usize) -> Self {
        let is = if n % 2 == 0 { 1 } else { -1 };
        let js = if (n / 2) % 2 == 0 { 1 } else { -1 };
        Self { is, js }
    }

    /// `lo..=hi` in the `js` order
    pub(crate) fn j_order(self, lo: usize, hi: usize) -> impl Iterator<Item = usize> {
        ordered(lo, hi, self.js)
    }
}

impl Default for SweepDirection {
    fn default() -> Self {
        Self::FORWARD
    }
}

fn ordered(lo: usize, hi: usize, step: i8) -> impl Iterator<Item = usize> {
    let count = (hi + 1).saturating_sub(lo);
    (0..count).map(move |n| if step < 0 { hi - n } else { lo + n })
}

/// Velocity component handled by a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    U,
    V,
    W,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Component::U => "U",
            Component::V => "V",
            Component::W => "W",
        };
        f.write_str(name)
    }
}

/// Summary of one component solve
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepStats {
    /// Columns solved
    pub columns: usize,
    /// Largest absolute change of any face value (m/s)
    pub max_change: f32,
}

impl SweepStats {
    #[inline]
    fn record(&mut self, change: f32) {
        self.columns += 1;
        self.max_change = self.max_change.max(change);
    }

    fn merge(self, other: Self) -> Self {
        Self {
            columns: self.columns + other.columns,
            max_change: self.max_change.max(other.max_change),
        }
    }
}

/// Statistics of one U → V → W sweep
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MomentumSweep {
    pub u: SweepStats,
    pub v: SweepStats,
    pub w: SweepStats,
}

impl MomentumSweep {
    /// Largest change over all three components
    #[must_use]
    pub fn max_change(&self) -> f32 {
        self.u.max_change.max(self.v.max_change).max(self.w.max_change)
    }
}

/// Outcome of [`MomentumSolver::iterate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    /// Sweeps performed
    pub iterations: usize,
    /// Statistics of the last sweep
    pub last: MomentumSweep,
    /// Last sweep changed no value by more than the tolerance
    pub converged: bool,
}

/// Runs the three component kernels in the required order
#[derive(Debug, Clone)]
pub struct MomentumSolver {
    config: MomentumConfig,
}

impl MomentumSolver {
    /// Create a solver after validating `config`
    ///
    /// # Errors
    /// Returns an error if the configuration is out of range.
    pub fn new(config: MomentumConfig) -> Result<Self, GridError> {
        if let Err(e) = config.validate() {
            warn!("Rejected momentum configuration: {e}");
            return Err(e);
        }
        Ok(Self { config })
    }

    /// Active configuration
    pub fn config(&self) -> &MomentumConfig {
        &self.config
    }

    /// One U → V → W pass in the given traversal order
    pub fn sweep(
        &self,
        grid: &FlowGrid,
        field: &mut FlowFieldState,
        direction: SweepDirection,
    ) -> MomentumSweep {
        let u = solve_u(grid, field, &self.config, direction);
        let v = solve_v(grid, field, &self.config, direction);
        let w = solve_w(grid, field, &self.config, direction);
        MomentumSweep { u, v, w }
    }

    /// Sweep with alternating directions until the largest change drops to
    /// `tolerance` or `max_iterations` sweeps have run
    ///
    /// Pressure correction and turbulence are external: the advecting
    /// velocities, pressure correction and viscosity are left untouched.
    pub fn iterate(
        &self,
        grid: &FlowGrid,
        field: &mut FlowFieldState,
        max_iterations: usize,
        tolerance: f32,
    ) -> IterationReport {
        let mut report = IterationReport {
            iterations: 0,
            last: MomentumSweep::default(),
            converged: false,
        };
        for n in 0..max_iterations {
            report.last = self.sweep(grid, field, SweepDirection::for_iteration(n));
            report.iterations = n + 1;
            if report.last.max_change() <= tolerance {
                report.converged = true;
                break;
            }
        }
        debug!(
            "Momentum iteration: {} sweeps, converged={}, max change {:.3e}",
            report.iterations,
            report.converged,
            report.last.max_change()
        );
        report
    }
}

/// Power-law weighting `max(0, (1 - 0.1|Pe|)^5)`
#[inline]
pub fn power_law(peclet: f32) -> f32 {
    let t = (1.0 - 0.1 * peclet.abs()).max(0.0);
    let t2 = t * t;
    t2 * t2 * t
}

/// Neighbour coefficient from a diffusion conductance and the convective
/// flux entering the control volume through that face
#[inline]
pub(crate) fn neighbour(conductance: f32, inflow: f32) -> f32 {
    conductance * power_law(inflow / conductance) + inflow.max(0.0)
}

/// Quadratic wall drag `value / |V| · (helper · |V|)² · area`
#[inline]
pub(crate) fn wall_drag(value: f32, speed: f32, helper: f32, area: f32) -> f32 {
    let speed = speed.max(MIN_DRAG_SPEED);
    let ustar = helper * speed;
    value / speed * ustar * ustar * area
}

/// Coefficients of one layer of a column system
///
/// `a · x[k] = b · x[k + 1] + c · x[k - 1] + d`
#[derive(Debug, Clone, Copy)]
pub(crate) struct LayerCoefficients {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}

/// Scratch space of the column recurrence, reused across the columns of a slab
pub(crate) struct Recurrence {
    p: Vec<f32>,
    q: Vec<f32>,
}

impl Recurrence {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            p: vec![0.0; len],
            q: vec![0.0; len],
        }
    }

    /// Forward elimination of layer `k`; `first` marks the lowest layer
    #[inline]
    pub(crate) fn eliminate(&mut self, k: usize, first: bool, coef: LayerCoefficients) {
        if first {
            self.p[k] = coef.b / coef.a;
            self.q[k] = coef.d / coef.a;
        } else {
            let denom = coef.a - coef.c * self.p[k - 1];
            self.p[k] = coef.b / denom;
            self.q[k] = (coef.d + coef.c * self.q[k - 1]) / denom;
        }
    }

    /// Relaxed back substitution from `kend` down to `kstart`
    ///
    /// Layers where `open(k)` is false are left untouched. Returns the
    /// largest absolute change.
    pub(crate) fn back_substitute(
        &self,
        column: &mut TerrainColumn,
        kstart: usize,
        kend: usize,
        relax: f32,
        open: impl Fn(usize) -> bool,
    ) -> f32 {
        let mut max_change = 0.0_f32;
        for k in (kstart..=kend).rev() {
            if !open(k) {
                continue;
            }
            let old = column.get(k);
            let new = old + relax * (self.p[k] * column.get(k + 1) + self.q[k] - old);
            column.set(k, new);
            max_change = max_change.max((new - old).abs());
        }
        max_change
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_power_law_weights() {
        assert_eq!(power_law(0.0), 1.0);
        assert_relative_eq!(power_law(5.0), 0.5_f32.powi(5));
        assert_relative_eq!(power_law(-5.0), 0.5_f32.powi(5));
        assert_eq!(power_law(10.0), 0.0);
        assert_eq!(power_law(-40.0), 0.0);
    }

    #[test]
    fn test_neighbour_coefficient_upwinding() {
        // Pure diffusion
        assert_relative_eq!(neighbour(2.0, 0.0), 2.0);
        // Strong inflow: the convective part dominates
        assert_relative_eq!(neighbour(1.0, 50.0), 50.0);
        // Strong outflow: no coupling
        assert_eq!(neighbour(1.0, -50.0), 0.0);
    }

    #[test]
    fn test_wall_drag_floor() {
        // Speed floored at 0.01
        assert_relative_eq!(wall_drag(0.0, 0.0, 0.1, 100.0), 0.0);
        assert_relative_eq!(
            wall_drag(0.005, 0.0, 0.1, 100.0),
            0.005 / 0.01 * (0.1 * 0.01_f32).powi(2) * 100.0,
            max_relative = 1e-5
        );
        assert_relative_eq!(
            wall_drag(3.0, 5.0, 0.1, 100.0),
            3.0 * 0.01 * 5.0 * 100.0,
            max_relative = 1e-5
        );
    }

    #[test]
    fn test_sweep_direction_cycle() {
        let dirs: Vec<_> = (0..5).map(SweepDirection::for_iteration).collect();
        assert_eq!(dirs[0], SweepDirection { is: 1, js: 1 });
        assert_eq!(dirs[1], SweepDirection { is: -1, js: 1 });
        assert_eq!(dirs[2], SweepDirection { is: 1, js: -1 });
        assert_eq!(dirs[3], SweepDirection { is: -1, js: -1 });
        assert_eq!(dirs[4], dirs[0]);
    }

    #[test]
    fn test_j_order() {
        let fwd: Vec<_> = SweepDirection { is: 1, js: 1 }.j_order(2, 5).collect();
        let rev: Vec<_> = SweepDirection { is: 1, js: -1 }.j_order(2, 5).collect();
        assert_eq!(fwd, vec![2, 3, 4, 5]);
        assert_eq!(rev, vec![5, 4, 3, 2]);
        assert_eq!(SweepDirection::FORWARD.j_order(3, 2).count(), 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(MomentumConfig::default().validate().is_ok());
        let bad = MomentumConfig {
            relax: 1.5,
            ..MomentumConfig::default()
        };
        assert_eq!(
            bad.validate(),
            Err(GridError::InvalidParameter {
                name: "relax",
                value: 1.5
            })
        );
        let bad = MomentumConfig {
            pseudo_dt: 0.0,
            ..MomentumConfig::default()
        };
        assert!(MomentumSolver::new(bad).is_err());
    }

    #[test]
    fn test_recurrence_solves_tridiagonal() {
        // 2x[k] = 0.5x[k+1] + 0.5x[k-1] + d with x = [1, 2, 3], x[4] = 4
        let mut column = TerrainColumn::new(5, 5);
        column.set(4, 4.0);
        let mut rec = Recurrence::new(5);
        let exact = [0.0, 1.0, 2.0, 3.0, 4.0];
        for k in 1..=3 {
            let c = if k == 1 { 0.0 } else { 0.5 };
            let below = if k == 1 { 0.0 } else { exact[k - 1] };
            let d = 2.0 * exact[k] - 0.5 * exact[k + 1] - c * below;
            rec.eliminate(k, k == 1, LayerCoefficients { a: 2.0, b: 0.5, c, d });
        }
        let change = rec.back_substitute(&mut column, 1, 3, 1.0, |_| true);
        for k in 1..=3 {
            assert_relative_eq!(column.get(k), exact[k], epsilon = 1e-5);
        }
        assert_relative_eq!(change, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_back_substitution_skips_closed_layers() {
        let mut column = TerrainColumn::new(4, 4);
        column.fill(1.0);
        let mut rec = Recurrence::new(4);
        for k in 1..=2 {
            rec.eliminate(
                k,
                k == 1,
                LayerCoefficients {
                    a: 1.0,
                    b: 0.0,
                    c: 0.0,
                    d: 5.0,
                },
            );
        }
        rec.back_substitute(&mut column, 1, 2, 0.5, |k| k > 1);
        assert_eq!(column.get(1), 1.0);
        assert_relative_eq!(column.get(2), 3.0);
    }
}
