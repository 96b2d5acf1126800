//! Shared setup for the integration tests

#![allow(dead_code)]

use dispersion_core::{FlowGrid, ObstacleGrid, RoughnessConfig, VerticalGrid};
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `HOKART = {0, 10, 20, 30, 40, 50}`
pub fn five_layers() -> VerticalGrid {
    VerticalGrid::from_heights(vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]).unwrap()
}

/// Obstacle-free 10 m grid with a frictionless ground
pub fn frictionless(nii: usize, njj: usize) -> FlowGrid {
    let cells = (nii + 2) * (njj + 2);
    let obstacles = ObstacleGrid::from_parts(
        nii,
        njj,
        vec![0; cells],
        vec![5; cells],
        vec![0.0; cells],
        vec![true; cells],
        vec![0.0; cells],
        vec![0.0; cells],
    )
    .unwrap();
    FlowGrid::new(10.0, 10.0, 0.0, five_layers(), obstacles).unwrap()
}

/// 10 m grid with buildings given row by row (`i` major)
pub fn with_buildings(nii: usize, njj: usize, heights: &[f32], ahmin: f32) -> FlowGrid {
    let vertical = five_layers();
    let obstacles =
        ObstacleGrid::from_building_heights(nii, njj, heights, &vertical, &RoughnessConfig::default())
            .unwrap();
    FlowGrid::new(10.0, 10.0, ahmin, vertical, obstacles).unwrap()
}
