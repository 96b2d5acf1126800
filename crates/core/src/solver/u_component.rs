//! U-momentum kernel
//!
//! Solves the x velocity on west faces. The control volume of face
//! `(i, j, k)` spans the centres of cells `i - 1` and `i`; it is open only
//! where both cells are inside the advection domain and above their
//! obstacle floors.

use super::{
    neighbour, wall_drag, Component, LayerCoefficients, MomentumConfig, Recurrence,
    SweepDirection, SweepStats,
};
use crate::grid::{ColumnGrid, FlowFieldState, FlowGrid, TerrainColumn};
use rayon::prelude::*;
use tracing::debug;

struct UStencil<'a> {
    grid: &'a FlowGrid,
    config: &'a MomentumConfig,
    /// `uk` as it was at the start of the solve
    previous: &'a ColumnGrid,
    vk: &'a ColumnGrid,
    uks: &'a ColumnGrid,
    vks: &'a ColumnGrid,
    wks: &'a ColumnGrid,
    dpm: &'a ColumnGrid,
    vis: &'a ColumnGrid,
}

impl UStencil<'_> {
    fn solve_column(
        &self,
        i: usize,
        j: usize,
        slab: &mut [TerrainColumn],
        rec: &mut Recurrence,
    ) -> Option<f32> {
        let obstacles = self.grid.obstacles();
        if !(obstacles.in_domain(i, j) && obstacles.in_domain(i - 1, j)) {
            return None;
        }
        let floor = obstacles.kkart(i, j);
        let floor_west = obstacles.kkart(i - 1, j);
        let kstart = floor.max(floor_west) + 1;
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
            let u = own.get(k);
            let vis = (0.5 * (self.vis.get(i, j, k) + self.vis.get(i - 1, j, k))).max(cfg.vis_min);

            let fe = 0.5 * (self.uks.get(i, j, k) + self.uks.get(i + 1, j, k)) * dyk * dz;
            let fw = 0.5 * (self.uks.get(i - 1, j, k) + self.uks.get(i, j, k)) * dyk * dz;
            let fn_ = 0.5 * (self.vks.get(i, j + 1, k) + self.vks.get(i - 1, j + 1, k)) * dxk * dz;
            let fs = 0.5 * (self.vks.get(i, j, k) + self.vks.get(i - 1, j, k)) * dxk * dz;
            let ft = 0.5 * (self.wks.get(i, j, k + 1) + self.wks.get(i - 1, j, k + 1)) * area;
            let fb = 0.5 * (self.wks.get(i, j, k) + self.wks.get(i - 1, j, k)) * area;

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
                + ap0 * u
                + (self.dpm.get(i - 1, j, k) - self.dpm.get(i, j, k)) * dyk * dz
                + cfg.coriolis * (cfg.ug - u) * area * dz;

            if k == kstart {
                // Wall face: drag law instead of diffusion into the ground
                c = 0.0;
                let v_ref = 0.25
                    * (self.vk.get(i, j, k)
                        + self.vk.get(i, j + 1, k)
                        + self.vk.get(i - 1, j, k)
                        + self.vk.get(i - 1, j + 1, k));
                let speed = (u * u + v_ref * v_ref).sqrt();
                d -= wall_drag(u, speed, helper, area);
            }

            let a = ae + aw + an + as_ + b + c + ap0;
            rec.eliminate(k, k == kstart, LayerCoefficients { a, b, c, d });
        }

        Some(rec.back_substitute(&mut slab[j], kstart, kend, cfg.relax, |k| {
            floor < k && floor_west < k
        }))
    }
}

/// Update `uk` on all open west faces, `i ∈ 2..=nii`, `j ∈ 2..=njj-1`
pub fn solve_u(
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

    let previous = uk.clone();
    let stencil = UStencil {
        grid,
        config,
        previous: &previous,
        vk,
        uks,
        vks,
        wks,
        dpm: dpm_new,
        vis: eddy_viscosity,
    };

    let len = uk.domain_len();
    let mut slabs: Vec<(usize, &mut [TerrainColumn])> = uk
        .slabs_mut()
        .enumerate()
        .filter(|(i, _)| (2..=nii).contains(i))
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
        Component::U,
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
    use crate::grid::ObstacleGrid;
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
    fn test_uniform_inflow_is_fixed_point() {
        let grid = fixtures::frictionless_grid(4, 4);
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 2.0, 0.0, 0.0);
        field.fill_viscosity(1.0);

        let stats = solve_u(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        // i in 2..=4, j in 2..=3
        assert_eq!(stats.columns, 6);
        assert!(stats.max_change < 1e-5);
        for i in 2..=4 {
            for j in 2..=3 {
                for k in 1..=5 {
                    assert_abs_diff_eq!(field.uk.get(i, j, k), 2.0, epsilon = 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_pressure_gradient_accelerates_flow() {
        let grid = fixtures::frictionless_grid(3, 3);
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 2.0, 0.0, 0.0);
        field.fill_viscosity(1.0);
        for k in 1..=5 {
            field.dpm_new.set(1, 2, k, 1.0);
        }

        solve_u(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        for k in 1..=5 {
            assert!(field.uk.get(2, 2, k) > 2.0);
            assert_abs_diff_eq!(field.uk.get(3, 2, k), 2.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_faces_above_lowered_ceiling_are_untouched() {
        let cells = 5 * 5;
        let obstacles = ObstacleGrid::from_parts(
            3,
            3,
            vec![0; cells],
            vec![5; cells],
            vec![0.0; cells],
            vec![true; cells],
            vec![0.0; cells],
            vec![0.0; cells],
        )
        .unwrap()
        .with_ceiling(3);
        assert_eq!(obstacles.ceiling(2, 2), 3);
        let grid = FlowGrid::new(10.0, 10.0, 0.0, fixtures::vertical(), obstacles).unwrap();
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 2.0, 0.0, 0.0);
        field.fill_viscosity(1.0);
        for k in 1..=5 {
            field.dpm_new.set(1, 2, k, 1.0);
        }

        solve_u(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        for k in 1..=3 {
            assert!(field.uk.get(2, 2, k) > 2.0);
        }
        for k in 4..=5 {
            assert_eq!(field.uk.get(2, 2, k), 2.0);
        }
    }

    #[test]
    fn test_surface_drag_slows_lowest_layer() {
        let grid = fixtures::flat_grid(3, 3);
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 2.0, 0.0, 0.0);
        field.fill_viscosity(1.0);

        solve_u(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        let bottom = field.uk.get(2, 2, 1);
        let above = field.uk.get(2, 2, 2);
        let top = field.uk.get(2, 2, 5);
        assert!(bottom < above);
        assert!(above <= top + 1e-6);
        assert!(top <= 2.0 + 1e-5);
    }

    #[test]
    fn test_faces_touching_buildings_stay_closed() {
        let grid = fixtures::building_grid();
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 3.0, 0.0, 0.0);
        field.fill_viscosity(0.5);

        for n in 0..4 {
            solve_u(&grid, &mut field, &quiet_config(), SweepDirection::for_iteration(n));
        }
        // West and east faces of the building cell (2, 2), floor 2
        for k in 0..=2 {
            assert_eq!(field.uk.get(2, 2, k), 0.0);
            assert_eq!(field.uk.get(3, 2, k), 0.0);
        }
        assert!(field.uk.get(2, 2, 3) > 0.0);
    }

    #[test]
    fn test_columns_outside_advection_domain_are_skipped() {
        let grid = fixtures::masked_grid(4, 4, |i, _| i != 3);
        let mut field = FlowFieldState::new(&grid);
        field.fill_uniform(&grid, 2.0, 0.0, 0.0);
        field.fill_viscosity(1.0);
        field.uk.set(3, 2, 2, 7.0);
        field.uk.set(4, 2, 2, 7.0);

        let stats = solve_u(&grid, &mut field, &quiet_config(), SweepDirection::FORWARD);
        // Faces 3 and 4 both touch the masked cells i = 3
        assert_eq!(stats.columns, 2);
        assert_eq!(field.uk.get(3, 2, 2), 7.0);
        assert_eq!(field.uk.get(4, 2, 2), 7.0);
    }

    #[test]
    fn test_slab_order_does_not_change_result() {
        let grid = fixtures::frictionless_grid(5, 5);
        let mut a = FlowFieldState::new(&grid);
        a.fill_uniform(&grid, 1.5, 0.0, 0.0);
        a.fill_viscosity(1.0);
        a.uk.set(3, 3, 2, 5.0);
        let mut b = a.clone();

        // i neighbours come from the snapshot, so only the j order matters
        solve_u(&grid, &mut a, &quiet_config(), SweepDirection { is: 1, js: 1 });
        solve_u(&grid, &mut b, &quiet_config(), SweepDirection { is: -1, js: 1 });
        assert_eq!(a.uk, b.uk);
    }
}
