// ─────────────────────────────────────────────────────────────────────
// SCPN Heat Diffusion — Field Output
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Reassembly of the gathered field and its on-disk formats.
//!
//! Text format: one line per physical row including the boundary ring,
//! values tab-separated with 11 decimals.

use crate::decomposition::Decomposition;
use heat_types::config::OutputFormat;
use heat_types::error::{HeatError, HeatResult};
use ndarray::{s, Array2, ArrayView2};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Decimals written per value.
pub const TEXT_PRECISION: usize = 11;

/// Rebuild the `(size_x + 2) × (size_y + 2)` field from the gathered buffer.
///
/// `buffer` is rank-major, then row, then column within each tile, which is
/// what concatenating every worker's row-major owned cells in rank order
/// produces. The boundary ring is filled with `temp_high`.
pub fn assemble_field(
    buffer: &[f64],
    decomp: &Decomposition,
    temp_high: f64,
) -> HeatResult<Array2<f64>> {
    let expected = decomp.size_x * decomp.size_y;
    if buffer.len() != expected {
        return Err(HeatError::GeometryViolation(format!(
            "Gathered buffer has {} values, grid {}x{} needs {expected}",
            buffer.len(),
            decomp.size_x,
            decomp.size_y
        )));
    }

    let mut field = Array2::from_elem((decomp.size_x + 2, decomp.size_y + 2), temp_high);
    let tile_len = decomp.xcell * decomp.ycell;
    for (sub, chunk) in decomp.subdomains.iter().zip(buffer.chunks_exact(tile_len)) {
        let tile = ArrayView2::from_shape((decomp.xcell, decomp.ycell), chunk).map_err(|e| {
            HeatError::GeometryViolation(format!("Rank {} tile reshape failed: {e}", sub.rank))
        })?;
        let x0 = 1 + sub.interior_row_offset();
        let y0 = 1 + sub.interior_col_offset();
        field
            .slice_mut(s![x0..x0 + decomp.xcell, y0..y0 + decomp.ycell])
            .assign(&tile);
    }
    Ok(field)
}

pub fn write_field<W: Write>(writer: &mut W, field: &Array2<f64>) -> HeatResult<()> {
    for row in field.rows() {
        let mut first = true;
        for v in row {
            if !first {
                writer.write_all(b"\t")?;
            }
            write!(writer, "{v:.prec$}", prec = TEXT_PRECISION)?;
            first = false;
        }
        writer.write_all(b"\n")?;
    }
    Ok(())
}

pub fn write_field_file<P: AsRef<Path>>(path: P, field: &Array2<f64>) -> HeatResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_field(&mut writer, field)?;
    writer.flush()?;
    Ok(())
}

/// Parse the text format back. Blank lines are skipped; every other line
/// must carry the same number of values.
pub fn read_field<R: BufRead>(reader: R) -> HeatResult<Array2<f64>> {
    let mut values = Vec::new();
    let mut ncols: Option<usize> = None;
    let mut nrows = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let before = values.len();
        for token in line.split_whitespace() {
            let v: f64 = token.parse().map_err(|_| HeatError::Parse {
                line: lineno,
                message: format!("'{token}' is not a number"),
            })?;
            values.push(v);
        }
        let width = values.len() - before;
        match ncols {
            None => ncols = Some(width),
            Some(n) if n != width => {
                return Err(HeatError::Parse {
                    line: lineno,
                    message: format!("expected {n} values, found {width}"),
                })
            }
            Some(_) => {}
        }
        nrows += 1;
    }

    let ncols = ncols.ok_or_else(|| HeatError::Parse {
        line: 0,
        message: "no data rows".to_string(),
    })?;
    Array2::from_shape_vec((nrows, ncols), values).map_err(|e| HeatError::Parse {
        line: nrows,
        message: e.to_string(),
    })
}

pub fn read_field_file<P: AsRef<Path>>(path: P) -> HeatResult<Array2<f64>> {
    read_field(BufReader::new(File::open(path)?))
}

pub fn write_npy_file<P: AsRef<Path>>(path: P, field: &Array2<f64>) -> HeatResult<()> {
    ndarray_npy::write_npy(path, field).map_err(|e| HeatError::Npy(e.to_string()))
}

pub fn read_npy_file<P: AsRef<Path>>(path: P) -> HeatResult<Array2<f64>> {
    ndarray_npy::read_npy(path).map_err(|e| HeatError::Npy(e.to_string()))
}

/// Read a field written by [`write_output`], choosing the reader by
/// extension: `.npy` is NPY, anything else the text format.
pub fn read_output<P: AsRef<Path>>(path: P) -> HeatResult<Array2<f64>> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("npy") => read_npy_file(path),
        _ => read_field_file(path),
    }
}

/// Write `field` to `path` in `format`.
pub fn write_output<P: AsRef<Path>>(
    path: P,
    field: &Array2<f64>,
    format: OutputFormat,
) -> HeatResult<()> {
    match format {
        OutputFormat::Text => write_field_file(path, field),
        OutputFormat::Npy => write_npy_file(path, field),
    }
}
