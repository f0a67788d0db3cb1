// Gleaner Plugins - Matrix transformation plugins
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Dense f32 matrices for the forecaster.

use nalgebra::DMatrix;
use std::fmt;

/// Small dense `f32` matrix
#[derive(Clone, PartialEq)]
pub struct Mat(DMatrix<f32>);

impl Mat {
    /// `rows x cols` of zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Mat(DMatrix::zeros(rows, cols))
    }

    pub fn identity(n: usize) -> Self {
        Mat(DMatrix::identity(n, n))
    }

    /// Column vector from `values`
    pub fn column(values: &[f32]) -> Self {
        Mat(DMatrix::from_column_slice(values.len(), 1, values))
    }

    pub fn rows(&self) -> usize {
        self.0.nrows()
    }

    pub fn cols(&self) -> usize {
        self.0.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.0.get((row, col)).copied()
    }

    /// Transpose
    pub fn t(&self) -> Self {
        Mat(self.0.transpose())
    }

    pub fn scale(&self, k: f32) -> Self {
        Mat(&self.0 * k)
    }

    /// Matrix product; `None` when the inner dimensions differ
    pub fn dot(&self, other: &Mat) -> Option<Self> {
        if self.cols() != other.rows() {
            return None;
        }
        Some(Mat(&self.0 * &other.0))
    }

    pub fn add_scalar(&self, k: f32) -> Self {
        Mat(self.0.add_scalar(k))
    }

    /// Cell-wise sum; `None` on a shape mismatch
    pub fn plus(&self, other: &Mat) -> Option<Self> {
        if self.0.shape() != other.0.shape() {
            return None;
        }
        Some(Mat(&self.0 + &other.0))
    }

    /// Cell-wise difference; `None` on a shape mismatch
    pub fn minus(&self, other: &Mat) -> Option<Self> {
        if self.0.shape() != other.0.shape() {
            return None;
        }
        Some(Mat(&self.0 - &other.0))
    }

    /// Cell-wise `1 / x`
    pub fn reciprocal(&self) -> Self {
        Mat(self.0.map(|x| 1.0 / x))
    }

    /// The single value of a 1x1 matrix
    pub fn flt(&self) -> Option<f32> {
        if self.0.shape() == (1, 1) {
            self.get(0, 0)
        } else {
            None
        }
    }
}

impl fmt::Debug for Mat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mat{:?}", self.0.shape())?;
        for r in 0..self.rows() {
            let row: Vec<f32> = (0..self.cols()).filter_map(|c| self.get(r, c)).collect();
            write!(f, " {:?}", row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dot_and_transpose() {
        let x = Mat::column(&[1.0, 2.0]);
        assert_eq!((x.rows(), x.cols()), (2, 1));
        assert_eq!(x.t().dot(&x).unwrap().flt(), Some(5.0));

        let outer = x.dot(&x.t()).unwrap();
        assert_eq!(outer.get(1, 1), Some(4.0));
        assert_eq!(outer.get(0, 1), Some(2.0));
        assert!(x.dot(&x).is_none());
        assert!(outer.flt().is_none());
    }

    #[test]
    fn test_cellwise() {
        let i = Mat::identity(2);
        let z = Mat::zeros(2, 2);
        assert_eq!(i.minus(&i).unwrap(), z);
        assert_eq!(i.plus(&z).unwrap(), i);
        assert!(i.plus(&Mat::zeros(2, 1)).is_none());

        let s = i.scale(4.0).add_scalar(1.0);
        assert_eq!(s.get(0, 0), Some(5.0));
        assert_eq!(s.get(0, 1), Some(1.0));
        assert_relative_eq!(s.reciprocal().get(0, 0).unwrap(), 0.2);
    }
}
