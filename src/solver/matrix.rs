//! Dense matrix storage and the direct solvers used by the analyses.
//!
//! Matrices are stored row-major. Solvers operate on *augmented* matrices
//! `[A | b]` with one extra column holding the right-hand side, and work in
//! place (rows are swapped and overwritten).

use crate::error::{NodalError, Result};

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Allocate a zero-filled `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build a matrix from row slices. All rows must have the same length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut m = Self::zeros(rows.len(), cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(NodalError::DimensionMismatch {
                    expected: format!("{} columns", cols),
                    found: format!("{} columns in row {}", row.len(), i),
                });
            }
            m.row_mut(i).copy_from_slice(row);
        }
        Ok(m)
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Add to element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] += value;
    }

    /// Borrow one row.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Mutably borrow one row.
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Zero every element.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Swap two rows in place.
    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let cols = self.cols;
        let (head, tail) = self.data.split_at_mut(hi * cols);
        head[lo * cols..(lo + 1) * cols].swap_with_slice(&mut tail[..cols]);
    }

    /// Copy `src` into the top-left corner of `self`.
    pub fn copy_from(&mut self, src: &Matrix) -> Result<()> {
        if src.rows > self.rows || src.cols > self.cols {
            return Err(NodalError::DimensionMismatch {
                expected: format!("at most {}x{}", self.rows, self.cols),
                found: format!("{}x{}", src.rows, src.cols),
            });
        }
        for i in 0..src.rows {
            let cols = src.cols;
            self.row_mut(i)[..cols].copy_from_slice(src.row(i));
        }
        Ok(())
    }

    /// Form `out = scale * M x`.
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64], scale: f64) -> Result<()> {
        if out.len() != self.rows || x.len() != self.cols {
            return Err(NodalError::DimensionMismatch {
                expected: format!("x[{}] -> out[{}]", self.cols, self.rows),
                found: format!("x[{}] -> out[{}]", x.len(), out.len()),
            });
        }
        for (i, o) in out.iter_mut().enumerate() {
            let sum: f64 = self.row(i).iter().zip(x).map(|(m, v)| m * v).sum();
            *o = scale * sum;
        }
        Ok(())
    }

    /// Largest absolute entry over the first `cols` columns.
    fn max_abs(&self, cols: usize) -> f64 {
        (0..self.rows)
            .flat_map(|r| self.row(r)[..cols].iter())
            .fold(0.0f64, |acc, v| acc.max(v.abs()))
    }
}

/// Scale factor for [`scale_add`]: one scalar, or one factor per row.
#[derive(Debug, Clone, Copy)]
pub enum Scale<'a> {
    Scalar(f64),
    Rows(&'a [f64]),
}

impl Scale<'_> {
    fn at(&self, row: usize) -> f64 {
        match self {
            Scale::Scalar(s) => *s,
            Scale::Rows(v) => v[row],
        }
    }

    fn check(&self, rows: usize) -> Result<()> {
        match self {
            Scale::Rows(v) if v.len() < rows => Err(NodalError::DimensionMismatch {
                expected: format!("{} row scale factors", rows),
                found: format!("{}", v.len()),
            }),
            _ => Ok(()),
        }
    }
}

impl From<f64> for Scale<'_> {
    fn from(s: f64) -> Self {
        Scale::Scalar(s)
    }
}

impl<'a> From<&'a [f64]> for Scale<'a> {
    fn from(v: &'a [f64]) -> Self {
        Scale::Rows(v)
    }
}

/// Form `out = scale_a * A + scale_b * B` over the bounds of `A`.
pub fn scale_add(
    a: &Matrix,
    b: &Matrix,
    scale_a: Scale<'_>,
    scale_b: Scale<'_>,
    out: &mut Matrix,
) -> Result<()> {
    if a.rows > b.rows || a.cols > b.cols || a.rows > out.rows || a.cols > out.cols {
        return Err(NodalError::DimensionMismatch {
            expected: format!("operands at least {}x{}", a.rows, a.cols),
            found: format!("B {}x{}, out {}x{}", b.rows, b.cols, out.rows, out.cols),
        });
    }
    scale_a.check(a.rows)?;
    scale_b.check(a.rows)?;

    for i in 0..a.rows {
        let (sa, sb) = (scale_a.at(i), scale_b.at(i));
        for j in 0..a.cols {
            out.set(i, j, sa * a.get(i, j) + sb * b.get(i, j));
        }
    }
    Ok(())
}

/// Rank by Gaussian elimination with row pivoting.
///
/// A pivot counts as zero when its magnitude is below `eps` times the
/// largest entry of the matrix.
pub fn rank(m: &Matrix, eps: f64) -> usize {
    let (nr, nc) = (m.rows, m.cols);
    let mut work = m.clone();
    let threshold = eps * m.max_abs(nc);

    let mut the_rank = 0;
    let mut start_col = 0;
    for row in 0..nr {
        for col in start_col..nc {
            let mut max_v = work.get(row, col).abs();
            let mut max_row = row;
            for i in (row + 1)..nr {
                let v = work.get(i, col).abs();
                if v > max_v {
                    max_v = v;
                    max_row = i;
                }
            }

            if max_v > threshold {
                start_col = col + 1;
                the_rank += 1;
                work.swap_rows(row, max_row);

                let pivot = work.get(row, col);
                for i in (row + 1)..nr {
                    let factor = work.get(i, col) / pivot;
                    if factor != 0.0 {
                        for j in col..nc {
                            let v = work.get(row, j);
                            work.add(i, j, -v * factor);
                        }
                    }
                }
                break;
            }
        }
    }
    the_rank
}

/// Mark rows that can be removed without changing the rank of `m`.
///
/// Rows are zeroed one at a time; a row whose removal leaves the rank
/// unchanged stays zeroed and is reported as dependent.
pub fn dependent_rows(m: &Matrix, eps: f64) -> Vec<bool> {
    let mut work = m.clone();
    let full_rank = rank(&work, eps);
    let mut dependent = vec![false; m.rows];

    for (row, flag) in dependent.iter_mut().enumerate() {
        work.row_mut(row).fill(0.0);
        if rank(&work, eps) == full_rank {
            *flag = true;
        } else {
            work.row_mut(row).copy_from_slice(m.row(row));
        }
    }
    dependent
}

/// Solve the augmented system `[A | b]` by Gaussian elimination with
/// partial pivoting.
///
/// An all-zero pivot column gets `eps` on the diagonal (a tiny conductance
/// to ground), so floating nodes yield a finite answer instead of a failure.
pub fn solve(m: &mut Matrix, eps: f64) -> Vec<f64> {
    let n = m.rows;
    debug_assert_eq!(m.cols, n + 1, "solve expects an augmented matrix");

    for col in 0..n {
        let mut max_v = m.get(col, col).abs();
        let mut max_row = col;
        for i in (col + 1)..n {
            let v = m.get(i, col).abs();
            if v > max_v {
                max_v = v;
                max_row = i;
            }
        }

        if max_v == 0.0 {
            log::trace!("zero pivot in column {}, substituting {:e}", col, eps);
            m.set(col, col, eps);
        } else {
            m.swap_rows(col, max_row);
        }

        let pivot = m.get(col, col);
        for i in (col + 1)..n {
            let factor = m.get(i, col) / pivot;
            if factor != 0.0 {
                for j in col..=n {
                    let v = m.get(col, j);
                    m.add(i, j, -v * factor);
                }
            }
        }
    }

    // Back substitution on the upper triangle.
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut acc = m.get(i, n);
        for j in (i + 1)..n {
            acc -= m.get(i, j) * x[j];
        }
        x[i] = acc / m.get(i, i);
    }
    x
}

/// Solve the augmented system `[A | b]` by row orthogonalization.
///
/// Rows are pivoted by remaining 2-norm and orthonormalized against each
/// other (an implicit `A = L Q` factorization); the right-hand side column is
/// transformed alongside. Rows whose remaining norm falls below `eps` times
/// the largest row norm are treated as null space and dropped, so nearly
/// singular Jacobians still produce a minimum-norm style update.
pub fn solve_orthogonal(m: &mut Matrix, eps: f64) -> Vec<f64> {
    let nr = m.rows;
    let nc = m.cols;
    let n = nc - 1;

    let mut mat_scale = 0.0;
    let mut kept_rows = nr;
    for row in 0..nr {
        let mut max_row = row;
        let mut max_sumsq = 0.0;
        for candidate in row..nr {
            let sumsq: f64 = m.row(candidate)[..n].iter().map(|v| v * v).sum();
            if candidate == row || sumsq > max_sumsq {
                max_row = candidate;
                max_sumsq = sumsq;
            }
        }
        m.swap_rows(row, max_row);

        let row_norm = max_sumsq.sqrt();
        if row == 0 {
            mat_scale = row_norm;
        }
        if row_norm <= mat_scale * eps {
            log::trace!("orthogonal solve: {} of {} rows in null space", nr - row, nr);
            kept_rows = row;
            break;
        }

        let scale = 1.0 / row_norm;
        m.row_mut(row).iter_mut().for_each(|v| *v *= scale);

        for below in (row + 1)..nr {
            let inner: f64 = (0..n).map(|c| m.get(row, c) * m.get(below, c)).sum();
            if inner != 0.0 {
                for c in 0..nc {
                    let v = m.get(row, c);
                    m.add(below, c, -inner * v);
                }
            }
        }
    }

    // Last column now holds inv(L) * b; x = Q^T (inv(L) b).
    let mut x = vec![0.0; n];
    for row in 0..kept_rows {
        let y = m.get(row, n);
        for (c, xc) in x.iter_mut().enumerate() {
            *xc += m.get(row, c) * y;
        }
    }
    x
}
