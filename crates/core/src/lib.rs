//! Microscale Lagrangian dispersion core
//!
//! The numerical engine of a microscale dispersion model: a prognostic
//! finite-volume momentum solver on a staggered terrain-following grid, the
//! particle wind interpolation that reads its result, and the lock-protected
//! transient concentration grid particles deposit their mass into.
//!
//! ## Layout
//!
//! - [`grid`]: terrain-following column storage, vertical tables and the
//!   vertical index search, flow-grid geometry, the staggered
//!   [`FlowFieldState`] and the [`WindFieldInterpolator`]
//! - [`solver`]: U, V and W momentum kernels and the [`MomentumSolver`]
//!   that runs them in order with alternating sweep directions
//! - [`concentration`]: the [`TransientConcentration`] accumulator
//!
//! File parsing, emission bookkeeping, the pressure and turbulence solvers
//! and the simulation driver live outside this crate; they feed validated
//! arrays in through the constructors here.

pub mod concentration;
pub mod core_types;
pub mod grid;
pub mod solver;

pub use concentration::{ParticleDeposit, TransientConcentration};
pub use core_types::Vec3;
pub use grid::{
    vertical_index, ColumnGrid, FlowFieldState, FlowGrid, GridError, InterpolatedWind,
    ObstacleGrid, RoughnessConfig, StretchingConfig, TerrainColumn, Topography,
    TransientGridConfig, VerticalGrid, WindFieldInterpolator, WindProfile, WindQuery,
};
pub use solver::{
    solve_u, solve_v, solve_w, IterationReport, MomentumConfig, MomentumSolver, MomentumSweep,
    SweepDirection, SweepStats,
};
