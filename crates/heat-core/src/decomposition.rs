// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — Domain Decomposition
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! 2D Cartesian domain decomposition and neighbour resolution.
//!
//! The `size_x × size_y` interior is split over an `nx_domains × ny_domains`
//! process grid. Ranks are laid out row-major: `rank = row * ny_domains + col`,
//! where process rows run along `x` (array axis 0) and process columns along
//! `y` (array axis 1).
//!
//! Owned ranges are expressed in the ghost-inclusive global layout of shape
//! `(size_x + 2 * nx_domains, size_y + 2 * ny_domains)`: one boundary ring
//! around the whole domain and two ghost cells between adjacent tiles. A
//! tile's window `[xs-1 ..= xe+1] × [ys-1 ..= ye+1]` is what its worker holds.

use heat_types::config::HeatConfig;
use heat_types::error::{HeatError, HeatResult};

/// Cardinal direction in the process grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards process row − 1 (smaller `x`).
    North,
    /// Towards process row + 1.
    South,
    /// Towards process column + 1 (larger `y`).
    East,
    /// Towards process column − 1.
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    /// `(d_row, d_col)` offset in the process grid.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::North => (-1, 0),
            Direction::South => (1, 0),
            Direction::East => (0, 1),
            Direction::West => (0, -1),
        }
    }
}

/// `(row, col)` of `rank` in the process grid; `None` when `rank` is not
/// part of it, which covers every rank of an empty grid.
pub fn rank_position(rank: usize, nx_domains: usize, ny_domains: usize) -> Option<(usize, usize)> {
    if rank >= nx_domains.checked_mul(ny_domains)? {
        return None;
    }
    Some((rank / ny_domains, rank % ny_domains))
}

/// Inverse of [`rank_position`]; `None` outside the process grid.
pub fn rank_at(row: isize, col: isize, nx_domains: usize, ny_domains: usize) -> Option<usize> {
    if row < 0 || col < 0 || row as usize >= nx_domains || col as usize >= ny_domains {
        return None;
    }
    Some(row as usize * ny_domains + col as usize)
}

/// Neighbour of `rank` in `dir`, or `None` at the outer edge (no wraparound).
pub fn neighbor(rank: usize, dir: Direction, nx_domains: usize, ny_domains: usize) -> Option<usize> {
    let (row, col) = rank_position(rank, nx_domains, ny_domains)?;
    let (dr, dc) = dir.offset();
    rank_at(row as isize + dr, col as isize + dc, nx_domains, ny_domains)
}

/// Neighbour ranks indexed by [`Direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Neighbors([Option<usize>; 4]);

impl Neighbors {
    pub fn resolve(rank: usize, nx_domains: usize, ny_domains: usize) -> Self {
        let mut out = [None; 4];
        for dir in Direction::ALL {
            out[dir.index()] = neighbor(rank, dir, nx_domains, ny_domains);
        }
        Neighbors(out)
    }

    pub fn get(&self, dir: Direction) -> Option<usize> {
        self.0[dir.index()]
    }

    /// Directions that have a real neighbour, with that neighbour's rank.
    pub fn present(&self) -> impl Iterator<Item = (Direction, usize)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(move |dir| self.get(dir).map(|r| (dir, r)))
    }
}

/// One worker's tile: process-grid position, owned inclusive range in the
/// ghost-inclusive global layout, and neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDomain {
    pub rank: usize,
    pub row: usize,
    pub col: usize,
    pub xs: usize,
    pub xe: usize,
    pub ys: usize,
    pub ye: usize,
    pub neighbors: Neighbors,
}

impl SubDomain {
    /// Owned rows.
    pub fn xcell(&self) -> usize {
        self.xe - self.xs + 1
    }
    /// Owned columns.
    pub fn ycell(&self) -> usize {
        self.ye - self.ys + 1
    }
    /// Shape of the worker's local array including its ghost ring.
    pub fn local_shape(&self) -> (usize, usize) {
        (self.xcell() + 2, self.ycell() + 2)
    }
    /// First physical interior row (0-based, excluding the boundary ring) owned by this tile.
    pub fn interior_row_offset(&self) -> usize {
        self.row * self.xcell()
    }
    /// First physical interior column owned by this tile.
    pub fn interior_col_offset(&self) -> usize {
        self.col * self.ycell()
    }
}

/// Complete decomposition of the global grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    pub size_x: usize,
    pub size_y: usize,
    pub nx_domains: usize,
    pub ny_domains: usize,
    pub xcell: usize,
    pub ycell: usize,
    /// Indexed by rank.
    pub subdomains: Vec<SubDomain>,
}

impl Decomposition {
    /// Decompose `size_x × size_y` over `nx_domains × ny_domains` workers.
    ///
    /// Fails when `nproc != nx_domains * ny_domains` or when either size is
    /// not divisible by its domain count.
    pub fn new(
        size_x: usize,
        size_y: usize,
        nx_domains: usize,
        ny_domains: usize,
        nproc: usize,
    ) -> HeatResult<Self> {
        if nx_domains == 0 || ny_domains == 0 {
            return Err(HeatError::ConfigError(format!(
                "Process grid dimensions must be >= 1, got {nx_domains}x{ny_domains}"
            )));
        }
        if nproc != nx_domains * ny_domains {
            return Err(HeatError::WorkerCountMismatch {
                workers: nproc,
                nx_domains,
                ny_domains,
            });
        }
        if size_x == 0 || size_y == 0 {
            return Err(HeatError::ConfigError(format!(
                "Grid size must be >= 1 in both directions, got {size_x}x{size_y}"
            )));
        }
        if size_x % nx_domains != 0 {
            return Err(HeatError::UnevenDecomposition {
                axis: 'x',
                size: size_x,
                domains: nx_domains,
            });
        }
        if size_y % ny_domains != 0 {
            return Err(HeatError::UnevenDecomposition {
                axis: 'y',
                size: size_y,
                domains: ny_domains,
            });
        }

        let xcell = size_x / nx_domains;
        let ycell = size_y / ny_domains;
        let mut subdomains = Vec::with_capacity(nproc);

        // Each tile advances the cursor by its own cells plus the two ghost
        // cells separating it from the next tile.
        let mut xs = 1usize;
        for row in 0..nx_domains {
            let mut ys = 1usize;
            for col in 0..ny_domains {
                let rank = row * ny_domains + col;
                subdomains.push(SubDomain {
                    rank,
                    row,
                    col,
                    xs,
                    xe: xs + xcell - 1,
                    ys,
                    ye: ys + ycell - 1,
                    neighbors: Neighbors::resolve(rank, nx_domains, ny_domains),
                });
                ys += ycell + 2;
            }
            xs += xcell + 2;
        }

        Ok(Decomposition {
            size_x,
            size_y,
            nx_domains,
            ny_domains,
            xcell,
            ycell,
            subdomains,
        })
    }

    /// Decompose according to a run configuration.
    pub fn from_config(cfg: &HeatConfig, nproc: usize) -> HeatResult<Self> {
        Self::new(
            cfg.grid.size_x,
            cfg.grid.size_y,
            cfg.decomposition.nx_domains,
            cfg.decomposition.ny_domains,
            nproc,
        )
    }

    pub fn nproc(&self) -> usize {
        self.subdomains.len()
    }

    /// Rows of the ghost-inclusive global layout.
    pub fn size_total_x(&self) -> usize {
        self.size_x + 2 * self.nx_domains
    }

    /// Columns of the ghost-inclusive global layout.
    pub fn size_total_y(&self) -> usize {
        self.size_y + 2 * self.ny_domains
    }

    pub fn subdomain(&self, rank: usize) -> HeatResult<&SubDomain> {
        self.subdomains.get(rank).ok_or_else(|| {
            HeatError::GeometryViolation(format!(
                "Rank {rank} outside decomposition of {} workers",
                self.nproc()
            ))
        })
    }
}

/// Process-grid factorisation of `workers` that divides the grid evenly and
/// minimises the tile perimeter/area ratio (halo traffic per owned cell).
///
/// Returns `None` when no factorisation divides the grid evenly.
pub fn optimal_process_grid(size_x: usize, size_y: usize, workers: usize) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut best_cost = f64::MAX;

    for nx in 1..=workers {
        if workers % nx != 0 {
            continue;
        }
        let ny = workers / nx;
        if nx > size_x || ny > size_y || size_x % nx != 0 || size_y % ny != 0 {
            continue;
        }
        let tile_x = (size_x / nx) as f64;
        let tile_y = (size_y / ny) as f64;
        let cost = 2.0 * (tile_x + tile_y) / (tile_x * tile_y);
        if cost < best_cost {
            best_cost = cost;
            best = Some((nx, ny));
        }
    }
    best
}
