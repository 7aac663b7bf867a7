// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{HeatError, HeatResult};
use serde::{Deserialize, Serialize};

/// Top-level run configuration.
/// Loaded once by rank 0 and broadcast to every worker; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatConfig {
    #[serde(default = "default_run_name")]
    pub run_name: String,
    pub grid: GridConfig,
    #[serde(default)]
    pub decomposition: DecompositionConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    pub solver: SolverConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Physical interior size and mesh spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub size_x: usize,
    pub size_y: usize,
    #[serde(default = "default_spacing")]
    pub dx: f64,
    #[serde(default = "default_spacing")]
    pub dy: f64,
}

/// Process-grid shape (`nx_domains` process rows × `ny_domains` process columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompositionConfig {
    pub nx_domains: usize,
    pub ny_domains: usize,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        DecompositionConfig {
            nx_domains: 1,
            ny_domains: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Diffusion coefficient `a`.
    #[serde(default = "default_diffusivity")]
    pub diffusivity: f64,
    /// Fixed temperature of the outer boundary ring.
    #[serde(default = "default_temp_high")]
    pub temp_high: f64,
    /// Initial temperature of every interior cell.
    #[serde(default)]
    pub temp_low: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            diffusivity: default_diffusivity(),
            temp_high: default_temp_high(),
            temp_low: 0.0,
        }
    }
}

/// Stencil variant applied every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Jacobi relaxation towards the Laplace steady state.
    #[default]
    Relaxation,
    /// Explicit forward-Euler time stepping of the heat equation.
    Diffusion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub scheme: Scheme,
    pub max_steps: usize,
    /// Time step for the diffusion scheme. When absent the stable explicit
    /// step `dx²dy² / (2a(dx²+dy²))` is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    /// Stop once `sqrt(global residual) <= tolerance`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    /// Split the stencil's row loop across the rayon pool.
    #[serde(default)]
    pub threaded_stencil: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tab-separated text, one line per physical row.
    #[default]
    Text,
    /// NumPy `.npy` array.
    Npy,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_run_name() -> String {
    "heat-diffusion".to_string()
}
fn default_spacing() -> f64 {
    0.01
}
fn default_diffusivity() -> f64 {
    0.5
}
fn default_temp_high() -> f64 {
    10.0
}

impl HeatConfig {
    /// Minimal configuration for a `size_x × size_y` grid on a single worker.
    pub fn new(size_x: usize, size_y: usize, max_steps: usize) -> Self {
        HeatConfig {
            run_name: default_run_name(),
            grid: GridConfig {
                size_x,
                size_y,
                dx: default_spacing(),
                dy: default_spacing(),
            },
            decomposition: DecompositionConfig::default(),
            physics: PhysicsConfig::default(),
            solver: SolverConfig {
                scheme: Scheme::default(),
                max_steps,
                dt: None,
                tolerance: None,
                threaded_stencil: false,
            },
            output: OutputConfig::default(),
        }
    }

    /// Load from JSON file.
    pub fn from_file(path: &str) -> HeatResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> HeatResult<Self> {
        let config: Self = serde_json::from_str(contents)?;
        Ok(config)
    }

    /// Number of workers the process grid asks for.
    pub fn workers(&self) -> usize {
        self.decomposition.nx_domains * self.decomposition.ny_domains
    }

    /// Time step actually used by the diffusion scheme.
    pub fn effective_dt(&self) -> f64 {
        self.solver.dt.unwrap_or_else(|| {
            let dx2 = self.grid.dx * self.grid.dx;
            let dy2 = self.grid.dy * self.grid.dy;
            dx2 * dy2 / (2.0 * self.physics.diffusivity * (dx2 + dy2))
        })
    }

    /// Check every precondition that must hold before any iteration starts.
    pub fn validate(&self, workers: usize) -> HeatResult<()> {
        let DecompositionConfig {
            nx_domains,
            ny_domains,
        } = self.decomposition;

        if self.grid.size_x == 0 || self.grid.size_y == 0 {
            return Err(HeatError::ConfigError(format!(
                "Grid size must be >= 1 in both directions, got {}x{}",
                self.grid.size_x, self.grid.size_y
            )));
        }
        if nx_domains == 0 || ny_domains == 0 {
            return Err(HeatError::ConfigError(format!(
                "Process grid dimensions must be >= 1, got {nx_domains}x{ny_domains}"
            )));
        }
        if workers != nx_domains * ny_domains {
            return Err(HeatError::WorkerCountMismatch {
                workers,
                nx_domains,
                ny_domains,
            });
        }
        if self.grid.size_x % nx_domains != 0 {
            return Err(HeatError::UnevenDecomposition {
                axis: 'x',
                size: self.grid.size_x,
                domains: nx_domains,
            });
        }
        if self.grid.size_y % ny_domains != 0 {
            return Err(HeatError::UnevenDecomposition {
                axis: 'y',
                size: self.grid.size_y,
                domains: ny_domains,
            });
        }

        for (name, value) in [
            ("dx", self.grid.dx),
            ("dy", self.grid.dy),
            ("diffusivity", self.physics.diffusivity),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(HeatError::ConfigError(format!(
                    "{name} must be finite and > 0, got {value}"
                )));
            }
        }
        if !self.physics.temp_high.is_finite() || !self.physics.temp_low.is_finite() {
            return Err(HeatError::ConfigError(
                "Boundary and initial temperatures must be finite".to_string(),
            ));
        }
        if let Some(dt) = self.solver.dt {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(HeatError::ConfigError(format!(
                    "dt must be finite and > 0, got {dt}"
                )));
            }
        }
        if let Some(tol) = self.solver.tolerance {
            if !tol.is_finite() || tol <= 0.0 {
                return Err(HeatError::ConfigError(format!(
                    "tolerance must be finite and > 0, got {tol}"
                )));
            }
        }
        Ok(())
    }
}
