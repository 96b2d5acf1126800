//! W-momentum kernel
//!
//! Solves the vertical velocity on bottom faces. The control volume of face
//! `(i, j, k)` spans the centres of layers `k - 1` and `k`, so its height is
//! the centre spacing between them. The ground face `KKART + 1` is a wall
//! and is never solved.

use super::{
    neighbour, wall_drag, Component, LayerCoefficients, MomentumConfig, Recurrence,
    SweepDirection, SweepStats,
};
use crate::grid::{ColumnGrid, FlowFieldState, FlowGrid, TerrainColumn};
use rayon::prelude::*;
use tracing::debug;

struct WStencil<'a> {
    grid: &'a FlowGrid,
    config: &'a MomentumConfig,
    /// `wk` as it was at the start of the solve
    previous: &'a ColumnGrid,
    uk: &'a ColumnGrid,
    vk: &'a ColumnGrid,
    uks: &'a ColumnGrid,
    vks: &'a ColumnGrid,
    wks: &'a ColumnGrid,
    dpm: &'a ColumnGrid,
    vis: &'a ColumnGrid,
}

impl WStencil<'_> {
    fn solve_column(
        &self,
        i: usize,
        j: usize,
        slab: &mut [TerrainColumn],
        rec: &mut Recurrence,
    ) -> Option<f32> {
        let obstacles = self.grid.obstacles();
        if !obstacles.in_domain(i, j) {
            return None;
        }
        let floor = obstacles.kkart(i, j);
        let kstart = floor + 2;
        let kend = obstacles.ceiling(i, j);
        if kstart > kend {
            return None;
        }

        let vertical = self.grid.vertical();
        let dxk = self.grid.dxk();
        let dyk = self.grid.dyk();
        let area = self.grid.area_xy();
        let cfg = self.config;
        let helper = obstacles.friction_helper(i, j);

        let own = &slab[j];
        let south = &slab[j - 1];
        let north = &slab[j + 1];
        let east = self.previous.column(i + 1, j);
        let west = self.previous.column(i - 1, j);

        for k in kstart..=kend {
            let hz = vertical.center_spacing(k - 1);
            let w = own.get(k);
            let vis = (0.5 * (self.vis.get(i, j, k - 1) + self.vis.get(i, j, k))).max(cfg.vis_min);

            let fe = 0.5 * (self.uks.get(i + 1, j, k - 1) + self.uks.get(i + 1, j, k)) * dyk * hz;
            let fw = 0.5 * (self.uks.get(i, j, k - 1) + self.uks.get(i, j, k)) * dyk * hz;
            let fn_ = 0.5 * (self.vks.get(i, j + 1, k - 1) + self.vks.get(i, j + 1, k)) * dxk * hz;
            let fs = 0.5 * (self.vks.get(i, j, k - 1) + self.vks.get(i, j, k)) * dxk * hz;
            let ft = 0.5 * (self.wks.get(i, j, k) + self.wks.get(i, j, k + 1)) * area;
            let fb = 0.5 * (self.wks.get(i, j, k - 1) + self.wks.get(i, j, k)) * area;

            let de = vis * dyk * hz / dxk;
            let dn = vis * dxk * hz / dyk;
            let dt = vis * area / vertical.dz(k);
            let db = vis * area / vertical.dz(k - 1);

            let ae = neighbour(de, -fe);
            let aw = neighbour(de, fw);
            let an = neighbour(dn, -fn_);
            let as_ = neighbour(dn, fs);
            let b = neighbour(dt, -ft);
            let mut c = neighbour(db, fb);
            let ap0 = area * hz / cfg.pseudo_dt;

            let mut d = ae * east.get(k)
                + aw * west.get(k)
                + an * north.get(k)
                + as_ * south.get(k)
                + ap0 * w
                + (self.dpm.get(i, j, k - 1) - self.dpm.get(i, j, k)) * area;

            if k == kstart {
                c = 0.0;
                let u_ref = 0.5 * (self.uk.get(i, j, k) + self.uk.get(i + 1, j, k));
                let v_ref = 0.5 * (self.vk.get(i, j, k) + self.vk.get(i, j + 1, k));
                let speed = (u_ref * u_ref + v_ref * v_ref + w * w).sqrt();
                d -= wall_drag(w, speed, helper, area);
            }

            let a = ae + aw + an + as_ + b + c + ap0;
            rec.eliminate(k, k == kstart, LayerCoefficients { a, b, c, d });
        }

        Some(rec.back_substitute(&mut slab[j], kstart, kend, cfg.relax, |k| {
            floor + 1 < k
        }))
    }
}

/// Update `wk` on all open bottom faces above the ground face,
/// `i ∈ 2..=nii-1`, `j ∈ 2..=njj-1`
pub fn solve_w(
    grid: &FlowGrid,
    field: &mut FlowFieldState,
    config: &MomentumConfig,
    sweep: SweepDirection,
) -> SweepStats {
    let nii = grid.nii();
    let njj = grid.njj();
    let FlowFieldState {
        uk,
        vk,
        wk,
        uks,
        vks,
        wks,
        dpm_new,
        eddy_viscosity,
    } = field;

    let previous = wk.clone();
    let stencil = WStencil {
        grid,
        config,
        previous: &previous,
        uk,
        vk,
        uks,
        vks,
        wks,
        dpm: dpm_new,
        vis: eddy_viscosity,
    };

    let len = wk.domain_len();
    let mut slabs: Vec<(usize, &mut [TerrainColumn])> = wk
        .slabs_mut()
        .enumerate()
        .filter(|(i, _)| (2..nii).contains(i))
        .collect();
    if sweep.is < 0 {
        slabs.reverse();
    }

    let stats = slabs
        .into_par_iter()
        .map(|(i, slab)| {
            let mut rec = Recurrence::new(len);
            let mut stats = SweepStats::default();
            for j in sweep.j_order(2, njj.saturating_sub(1)) {
                if let Some(change) = stencil.solve_column(i, j, slab, &mut rec) {
                    stats.record(change);
                }
            }
            stats
        })
        .reduce(SweepStats::default, SweepStats::merge);

    debug!(
        "{} sweep ({}, {}): {} columns, max change {:.3e}",
        Component::W,
        sweep.is,
        sweep.js,
        stats.columns,
        stats.max_change
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::fixtures;
    use approx::assert_abs_diff_eq;

    fn quiet_config() -> MomentumConfig {
        MomentumConfig {
            relax: 1.0,
            coriolis: 0.0,
            ..MomentumConfig::default()
        }
    }

    #[test]
    fn test_horizontal_flow_keeps_zero_w() {
        let grid = fixtures::flat_grid(4, 4);
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 2.0, 1.0, 0.0);
        field.fill_viscosity(1.0);

        let stats = solve_w(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        assert_eq!(stats.columns, 4);
        assert_eq!(stats.max_change, 0.0);
        for k in 0..=6 {
            assert_eq!(field.wk.get(2, 2, k), 0.0);
        }
    }

    #[test]
    fn test_ground_face_is_never_written() {
        let grid = fixtures::frictionless_grid(3, 3);
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 0.0, 0.0, 1.0);
        field.fill_viscosity(1.0);
        for k in 1..=5 {
            field.dpm_new.set(2, 2, k, -(k as f32));
        }

        solve_w(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        assert_eq!(field.wk.get(2, 2, 1), 0.0);
        // Pressure decreasing with height drives upward flow
        for k in 2..=5 {
            assert!(field.wk.get(2, 2, k) > 0.0);
        }
    }

    #[test]
    fn test_roof_face_stays_closed() {
        let grid = fixtures::building_grid();
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 0.0, 0.0, 0.5);
        field.fill_viscosity(1.0);

        solve_w(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        // Floor 2: face 3 is the roof
        assert_eq!(field.wk.get(2, 2, 3), 0.0);
        assert!(field.wk.get(2, 2, 4) > 0.0);
    }

    #[test]
    fn test_pressure_pulse_is_symmetric() {
        let grid = fixtures::frictionless_grid(5, 5);
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 0.0, 0.0, 0.0);
        field.fill_viscosity(1.0);
        field.dpm_new.set(3, 3, 2, 2.0);

        solve_w(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        // Up through the top face, down through the bottom face
        assert!(field.wk.get(3, 3, 3) > 0.0);
        assert!(field.wk.get(3, 3, 2) < 0.0);
        assert_abs_diff_eq!(field.wk.get(2, 3, 3), 0.0);
    }
}
