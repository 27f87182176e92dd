//! Dense rational matrices with Gauss-Jordan reduction.
//!
//! Linear parts of point-count systems are analysed by row reduction
//! over the rationals: the rank gives the count directly for pure
//! linear systems, and the reduced rows drive variable elimination for
//! mixed ones. Exact arithmetic matters here; floating point would
//! misjudge ranks.

use num_rational::BigRational;
use num_traits::{One, Zero};

/// A row-major matrix of rationals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QMatrix {
    rows: Vec<Vec<BigRational>>,
    cols: usize,
}

impl QMatrix {
    /// Builds a matrix from rows, padding short rows with zeros.
    pub fn from_rows(rows: Vec<Vec<BigRational>>) -> Self {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(cols, BigRational::zero());
                r
            })
            .collect();
        QMatrix { rows, cols }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// A single row as a slice.
    pub fn row(&self, r: usize) -> &[BigRational] {
        &self.rows[r]
    }

    /// A single entry.
    pub fn entry(&self, r: usize, c: usize) -> &BigRational {
        &self.rows[r][c]
    }

    /// Reduced row echelon form together with the pivot columns, in
    /// row order. Zero rows sink to the bottom.
    pub fn rref(mut self) -> (QMatrix, Vec<usize>) {
        let mut pivots = Vec::new();
        let mut pivot_row = 0;
        for col in 0..self.cols {
            if pivot_row >= self.rows.len() {
                break;
            }
            let Some(src) = (pivot_row..self.rows.len())
                .find(|&r| !self.rows[r][col].is_zero())
            else {
                continue;
            };
            self.rows.swap(pivot_row, src);
            let lead = self.rows[pivot_row][col].clone();
            for entry in &mut self.rows[pivot_row] {
                *entry /= lead.clone();
            }
            for r in 0..self.rows.len() {
                if r == pivot_row || self.rows[r][col].is_zero() {
                    continue;
                }
                let scale = self.rows[r][col].clone();
                for c in 0..self.cols {
                    let delta = scale.clone() * self.rows[pivot_row][c].clone();
                    self.rows[r][c] -= delta;
                }
            }
            pivots.push(col);
            pivot_row += 1;
        }
        (self, pivots)
    }

    /// Rank over the rationals.
    pub fn rank(&self) -> usize {
        let (_, pivots) = self.clone().rref();
        pivots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(n.into())
    }

    #[test]
    fn test_rref_solves_a_small_system() {
        // x + y = 2, x - y = 0
        let m = QMatrix::from_rows(vec![vec![q(1), q(1), q(2)], vec![q(1), q(-1), q(0)]]);
        let (r, pivots) = m.rref();
        assert_eq!(pivots, vec![0, 1]);
        assert_eq!(r.row(0), &[q(1), q(0), q(1)]);
        assert_eq!(r.row(1), &[q(0), q(1), q(1)]);
    }

    #[test]
    fn test_dependent_rows_reduce_rank() {
        let m = QMatrix::from_rows(vec![
            vec![q(1), q(2), q(3)],
            vec![q(2), q(4), q(6)],
            vec![q(0), q(1), q(1)],
        ]);
        assert_eq!(m.rank(), 2);
    }

    #[test]
    fn test_inconsistent_rows_pivot_in_the_last_column() {
        // x + y = 1, x + y = 2
        let m = QMatrix::from_rows(vec![vec![q(1), q(1), q(1)], vec![q(1), q(1), q(2)]]);
        let (_, pivots) = m.rref();
        assert!(pivots.contains(&2));
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let m = QMatrix::from_rows(vec![vec![q(1)], vec![q(0), q(5)]]);
        assert_eq!(m.ncols(), 2);
        assert_eq!(m.entry(0, 1), &q(0));
    }
}
