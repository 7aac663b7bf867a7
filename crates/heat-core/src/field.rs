// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — Temperature Fields
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Field initialisation and the per-worker double buffer.

use crate::decomposition::{Decomposition, Direction, SubDomain};
use heat_math::stencil::{commit, Stencil};
use heat_types::error::{HeatError, HeatResult};
use ndarray::{s, Array2, ArrayView2};

/// `(size_x + 2) × (size_y + 2)` field: `temp_high` on the outer ring,
/// `temp_low` everywhere inside.
pub fn init_field(size_x: usize, size_y: usize, temp_high: f64, temp_low: f64) -> Array2<f64> {
    ring_field(size_x + 2, size_y + 2, temp_high, temp_low)
}

/// Ghost-inclusive global layout of `decomp`. Only the outermost ring is
/// `temp_high`; ghost cells between tiles start at `temp_low`, the value
/// their neighbour's edge cells start with.
pub fn init_global_field(decomp: &Decomposition, temp_high: f64, temp_low: f64) -> Array2<f64> {
    ring_field(decomp.size_total_x(), decomp.size_total_y(), temp_high, temp_low)
}

fn ring_field(nx: usize, ny: usize, high: f64, low: f64) -> Array2<f64> {
    Array2::from_shape_fn((nx, ny), |(i, j)| {
        if i == 0 || j == 0 || i + 1 == nx || j + 1 == ny {
            high
        } else {
            low
        }
    })
}

/// One worker's window `(xcell + 2) × (ycell + 2)`: owned cells plus a
/// ring of ghost cells. `prev` is the current state, `next` the scratch
/// buffer the stencil writes into.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalField {
    pub prev: Array2<f64>,
    pub next: Array2<f64>,
}

impl LocalField {
    /// Initial window for `sub`. Ghost sides on the global boundary take
    /// `temp_high`, sides facing a neighbour take `temp_low`.
    pub fn new(sub: &SubDomain, temp_high: f64, temp_low: f64) -> Self {
        let (nx, ny) = sub.local_shape();
        let on_boundary = |dir: Direction| sub.neighbors.get(dir).is_none();
        let north = on_boundary(Direction::North);
        let south = on_boundary(Direction::South);
        let west = on_boundary(Direction::West);
        let east = on_boundary(Direction::East);

        let prev = Array2::from_shape_fn((nx, ny), |(i, j)| {
            let hot = (i == 0 && north)
                || (i + 1 == nx && south)
                || (j == 0 && west)
                || (j + 1 == ny && east);
            if hot {
                temp_high
            } else {
                temp_low
            }
        });
        let next = prev.clone();
        LocalField { prev, next }
    }

    /// Cut `sub`'s window out of a ghost-inclusive global field.
    pub fn from_global(global: &Array2<f64>, sub: &SubDomain) -> HeatResult<Self> {
        let (gx, gy) = global.dim();
        if sub.xe + 1 >= gx || sub.ye + 1 >= gy || sub.xs == 0 || sub.ys == 0 {
            return Err(HeatError::GeometryViolation(format!(
                "Tile of rank {} ({}..={}, {}..={}) does not fit global field {:?}",
                sub.rank, sub.xs, sub.xe, sub.ys, sub.ye, (gx, gy)
            )));
        }
        let prev = global
            .slice(s![sub.xs - 1..=sub.xe + 1, sub.ys - 1..=sub.ye + 1])
            .to_owned();
        let next = prev.clone();
        Ok(LocalField { prev, next })
    }

    /// Apply `stencil` and commit; returns the local squared-difference sum.
    pub fn step(&mut self, stencil: &Stencil, threaded: bool) -> HeatResult<f64> {
        let residual = stencil.apply(&self.prev, &mut self.next, threaded)?;
        commit(&mut self.prev, &self.next)?;
        Ok(residual)
    }

    /// Owned cells of the current state.
    pub fn owned(&self) -> ArrayView2<'_, f64> {
        self.prev.slice(s![1..-1, 1..-1])
    }

    /// Owned cells flattened row-major, the layout gathered at rank 0.
    pub fn owned_buffer(&self) -> Vec<f64> {
        self.owned().iter().copied().collect()
    }
}
