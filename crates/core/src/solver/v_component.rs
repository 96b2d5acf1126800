//! V-momentum kernel
//!
//! Solves the y velocity on south faces. The control volume of face
//! `(i, j, k)` spans the centres of cells `j - 1` and `j`. The drag term
//! reads the U field updated earlier in the same iteration.

use super::{
    neighbour, wall_drag, Component, LayerCoefficients, MomentumConfig, Recurrence,
    SweepDirection, SweepStats,
};
use crate::grid::{ColumnGrid, FlowFieldState, FlowGrid, TerrainColumn};
use rayon::prelude::*;
use tracing::debug;

struct VStencil<'a> {
    grid: &'a FlowGrid,
    config: &'a MomentumConfig,
    /// `vk` as it was at the start of the solve
    previous: &'a ColumnGrid,
    uk: &'a ColumnGrid,
    uks: &'a ColumnGrid,
    vks: &'a ColumnGrid,
    wks: &'a ColumnGrid,
    dpm: &'a ColumnGrid,
    vis: &'a ColumnGrid,
}

impl VStencil<'_> {
    fn solve_column(
        &self,
        i: usize,
        j: usize,
        slab: &mut [TerrainColumn],
        rec: &mut Recurrence,
    ) -> Option<f32> {
        let obstacles = self.grid.obstacles();
        if !(obstacles.in_domain(i, j) && obstacles.in_domain(i, j - 1)) {
            return None;
        }
        let floor = obstacles.kkart(i, j);
        let floor_south = obstacles.kkart(i, j - 1);
        let kstart = floor.max(floor_south) + 1;
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
            let dz = vertical.dz(k);
            let v = own.get(k);
            let vis = (0.5 * (self.vis.get(i, j, k) + self.vis.get(i, j - 1, k))).max(cfg.vis_min);

            let fe = 0.5 * (self.uks.get(i + 1, j, k) + self.uks.get(i + 1, j - 1, k)) * dyk * dz;
            let fw = 0.5 * (self.uks.get(i, j, k) + self.uks.get(i, j - 1, k)) * dyk * dz;
            let fn_ = 0.5 * (self.vks.get(i, j, k) + self.vks.get(i, j + 1, k)) * dxk * dz;
            let fs = 0.5 * (self.vks.get(i, j - 1, k) + self.vks.get(i, j, k)) * dxk * dz;
            let ft = 0.5 * (self.wks.get(i, j, k + 1) + self.wks.get(i, j - 1, k + 1)) * area;
            let fb = 0.5 * (self.wks.get(i, j, k) + self.wks.get(i, j - 1, k)) * area;

            let de = vis * dyk * dz / dxk;
            let dn = vis * dxk * dz / dyk;
            let dt = vis * area / vertical.center_spacing(k);
            let db = vis * area / vertical.center_spacing(k - 1);

            let ae = neighbour(de, -fe);
            let aw = neighbour(de, fw);
            let an = neighbour(dn, -fn_);
            let as_ = neighbour(dn, fs);
            let b = neighbour(dt, -ft);
            let mut c = neighbour(db, fb);
            let ap0 = area * dz / cfg.pseudo_dt;

            let mut d = ae * east.get(k)
                + aw * west.get(k)
                + an * north.get(k)
                + as_ * south.get(k)
                + ap0 * v
                + (self.dpm.get(i, j - 1, k) - self.dpm.get(i, j, k)) * dxk * dz
                + cfg.coriolis * (cfg.vg - v) * area * dz;

            if k == kstart {
                c = 0.0;
                let u_ref = 0.25
                    * (self.uk.get(i, j, k)
                        + self.uk.get(i + 1, j, k)
                        + self.uk.get(i, j - 1, k)
                        + self.uk.get(i + 1, j - 1, k));
                let speed = (u_ref * u_ref + v * v).sqrt();
                d -= wall_drag(v, speed, helper, area);
            }

            let a = ae + aw + an + as_ + b + c + ap0;
            rec.eliminate(k, k == kstart, LayerCoefficients { a, b, c, d });
        }

        Some(rec.back_substitute(&mut slab[j], kstart, kend, cfg.relax, |k| {
            floor < k && floor_south < k
        }))
    }
}

/// Update `vk` on all open south faces, `i ∈ 2..=nii-1`, `j ∈ 2..=njj`
pub fn solve_v(
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
        uks,
        vks,
        wks,
        dpm_new,
        eddy_viscosity,
        ..
    } = field;

    let previous = vk.clone();
    let stencil = VStencil {
        grid,
        config,
        previous: &previous,
        uk,
        uks,
        vks,
        wks,
        dpm: dpm_new,
        vis: eddy_viscosity,
    };

    let len = vk.domain_len();
    let mut slabs: Vec<(usize, &mut [TerrainColumn])> = vk
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
            for j in sweep.j_order(2, njj) {
                if let Some(change) = stencil.solve_column(i, j, slab, &mut rec) {
                    stats.record(change);
                }
            }
            stats
        })
        .reduce(SweepStats::default, SweepStats::merge);

    debug!(
        "{} sweep ({}, {}): {} columns, max change {:.3e}",
        Component::V,
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
    fn test_uniform_crossflow_is_fixed_point() {
        let grid = fixtures::frictionless_grid(4, 4);
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 1.0, -1.5, 0.0);
        field.fill_viscosity(1.0);

        let stats = solve_v(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        // i in 2..=3, j in 2..=4
        assert_eq!(stats.columns, 6);
        for i in 2..=3 {
            for j in 2..=4 {
                for k in 1..=5 {
                    assert_abs_diff_eq!(field.vk.get(i, j, k), -1.5, epsilon = 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_coriolis_relaxes_toward_geostrophic_wind() {
        let grid = fixtures::frictionless_grid(3, 3);
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 0.0, 0.0, 0.0);
        field.fill_viscosity(1.0);
        let config = MomentumConfig {
            relax: 1.0,
            coriolis: 1.0e-2,
            vg: 4.0,
            ..MomentumConfig::default()
        };

        solve_v(&grid, &mut field, &config, SweepDirection::FORWARD);
        let v = field.vk.get(2, 2, 3);
        assert!(v > 0.0 && v < 4.0);
    }

    #[test]
    fn test_drag_reads_updated_u() {
        let grid = fixtures::flat_grid(3, 3);
        let mut calm = FlowFieldState::new(&grid);
        calm.fill_uniform(&grid, 0.0, 1.0, 0.0);
        calm.fill_viscosity(1.0);
        let mut windy = calm.clone();
        for i in 0..5 {
            for j in 0..5 {
                windy.uk.set(i, j, 1, 10.0);
            }
        }

        solve_v(&grid, &mut calm, &quiet_config(), SweepDirection::FORWARD);
        solve_v(&grid, &mut windy, &quiet_config(), SweepDirection::FORWARD);
        // Stronger cross wind means a larger drag speed at the wall
        assert!(windy.vk.get(2, 2, 1) < calm.vk.get(2, 2, 1));
    }

    #[test]
    fn test_faces_touching_buildings_stay_closed() {
        let grid = fixtures::building_grid();
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 0.0, 2.5, 0.0);
        field.fill_viscosity(0.5);

        for n in 0..4 {
            solve_v(&grid, &mut field, &quiet_config(), SweepDirection::for_iteration(n));
        }
        for k in 0..=2 {
            assert_eq!(field.vk.get(2, 2, k), 0.0);
            assert_eq!(field.vk.get(2, 3, k), 0.0);
        }
        assert!(field.vk.get(2, 3, 3) > 0.0);
    }
}
