// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — Heat Core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Finite-difference heat diffusion with optional domain decomposition.
//!
//! Field initialization, process-grid decomposition, ghost-cell exchange
//! over a message-passing abstraction, the driver loop and text/NPY output.
//! Building with the `mpi` feature adds an rsmpi-backed transport.

pub mod comm;
pub mod decomposition;
pub mod driver;
pub mod exchange;
pub mod field;
#[cfg(feature = "mpi")]
pub mod mpi_comm;
pub mod output;
