//! Circuit validation.

use crate::error::{NodalError, Result};
use crate::solver::matrix::{rank, Matrix};

/// Check that voltage-source constraints are independent.
///
/// Each source contributes its branch row of `gl`. Parallel sources, a
/// loop of sources, or a source shorted by a wire make those rows linearly
/// dependent, so their rank drops below the number of sources. The error
/// names every source whose row is redundant with the others.
pub fn check_voltage_source_loops(gl: &Matrix, sources: &[(&str, usize)], eps: f64) -> Result<()> {
    if sources.is_empty() {
        return Ok(());
    }

    let rows: Vec<&[f64]> = sources.iter().map(|&(_, branch)| gl.row(branch)).collect();
    let gv = Matrix::from_rows(&rows)?;
    let full = rank(&gv, eps);
    if full == sources.len() {
        return Ok(());
    }

    // A source is in the loop if dropping its row leaves the rank unchanged.
    let involved: Vec<&str> = (0..sources.len())
        .filter(|&skip| {
            let others: Vec<&[f64]> = rows
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != skip)
                .map(|(_, row)| *row)
                .collect();
            Matrix::from_rows(&others)
                .map(|m| rank(&m, eps) == full)
                .unwrap_or(false)
        })
        .map(|i| sources[i].0)
        .collect();

    Err(NodalError::VoltageSourceLoop {
        sources: involved.join(", "),
    })
}
