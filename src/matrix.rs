//! Row-major `f64` matrices backed by 64-byte aligned storage.
//!
//! A [`Matrix`] is described by `rows`, `cols` and `stride` (the distance in
//! elements between the starts of two consecutive rows). The invariant
//! `stride >= cols` always holds and the buffer holds exactly `rows * stride`
//! elements. Padding elements between `cols` and `stride` are never read by
//! the multiplication code.
//!
//! [`Matrix::padded`] rounds the stride up to [`MAX_LANES`] so that every row
//! starts on a [`VECTOR_ALIGNMENT`] boundary, which is what the vector kernel
//! wants for its aligned fast path.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use ndarray::Array2;
use rand::Rng;

use crate::{
    error::{configuration_error, DistmmError, Result},
    utils::{is_aligned, round_up, AlignedBuffer},
    MAX_LANES, VECTOR_ALIGNMENT,
};

/// Global problem dimensions: `A` is `a_rows x a_cols`, `B` is
/// `a_cols x b_cols` and the result is `a_rows x b_cols`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dims {
    pub a_rows: usize,
    pub a_cols: usize,
    pub b_cols: usize,
}

impl Dims {
    pub fn new(a_rows: usize, a_cols: usize, b_cols: usize) -> Self {
        Dims {
            a_rows,
            a_cols,
            b_cols,
        }
    }

    /// Rejects degenerate problems.
    pub fn validate(&self) -> Result<()> {
        if self.a_rows == 0 || self.a_cols == 0 || self.b_cols == 0 {
            return Err(configuration_error(format!(
                "dimensions must be non-zero (a_rows: {}, a_cols: {}, b_cols: {})",
                self.a_rows, self.a_cols, self.b_cols
            )));
        }
        Ok(())
    }

    /// Checks the operand shapes against these dimensions.
    pub fn check_operands(&self, a: &Matrix, b: &Matrix) -> Result<()> {
        self.validate()?;
        if a.shape() != (self.a_rows, self.a_cols) {
            return Err(configuration_error(format!(
                "A is {}x{}, expected {}x{}",
                a.rows, a.cols, self.a_rows, self.a_cols
            )));
        }
        if b.shape() != (self.a_cols, self.b_cols) {
            return Err(configuration_error(format!(
                "B is {}x{}, expected {}x{}",
                b.rows, b.cols, self.a_cols, self.b_cols
            )));
        }
        Ok(())
    }
}

/// A dense, row-major matrix of doubles.
#[derive(Clone, Debug)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    stride: usize,
    data: AlignedBuffer,
}

impl Matrix {
    /// Creates a zeroed `rows x cols` matrix whose rows are `stride` apart.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `stride < cols` or the size overflows.
    pub fn with_stride(rows: usize, cols: usize, stride: usize) -> Result<Self> {
        if stride < cols {
            return Err(configuration_error(format!(
                "stride {stride} is smaller than the column count {cols}"
            )));
        }
        let len = rows
            .checked_mul(stride)
            .ok_or_else(|| configuration_error(format!("{rows}x{stride} matrix overflows usize")))?;

        Ok(Matrix {
            rows,
            cols,
            stride,
            data: AlignedBuffer::zeroed(len, VECTOR_ALIGNMENT)?,
        })
    }

    /// Creates a zeroed, densely packed matrix (`stride == cols`).
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        Self::with_stride(rows, cols, cols)
    }

    /// Creates a zeroed matrix whose every row starts on a vector boundary.
    pub fn padded(rows: usize, cols: usize) -> Result<Self> {
        Self::with_stride(rows, cols, round_up(cols, MAX_LANES))
    }

    /// Builds a dense matrix from row-major data.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if Some(data.len()) != rows.checked_mul(cols) {
            return Err(configuration_error(format!(
                "buffer of {} elements cannot hold a {rows}x{cols} matrix",
                data.len()
            )));
        }
        Self::from_dense(rows, cols, &data)
    }

    /// Builds a matrix from a slice of equally long rows.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut matrix = Self::zeros(rows.len(), cols)?;
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(configuration_error(format!(
                    "row {i} has {} elements, expected {cols}",
                    row.len()
                )));
            }
            matrix.row_mut(i).copy_from_slice(row);
        }
        Ok(matrix)
    }

    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> f64,
    {
        let mut matrix = Self::zeros(rows, cols)?;
        for i in 0..rows {
            for (j, x) in matrix.row_mut(i).iter_mut().enumerate() {
                *x = f(i, j);
            }
        }
        Ok(matrix)
    }

    /// Fills a matrix with values drawn uniformly from `[-1, 1)`.
    pub fn random<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Result<Self> {
        Self::from_fn(rows, cols, |_, _| rng.random_range(-1.0..1.0))
    }

    /// Copies dense row-major `data` into a padded matrix.
    pub(crate) fn from_dense_padded(rows: usize, cols: usize, data: &[f64]) -> Result<Self> {
        let mut matrix = Self::padded(rows, cols)?;
        matrix.copy_dense(data)?;
        Ok(matrix)
    }

    fn from_dense(rows: usize, cols: usize, data: &[f64]) -> Result<Self> {
        let mut matrix = Self::zeros(rows, cols)?;
        matrix.copy_dense(data)?;
        Ok(matrix)
    }

    fn copy_dense(&mut self, data: &[f64]) -> Result<()> {
        if data.len() != self.rows * self.cols {
            return Err(configuration_error(format!(
                "received {} elements for a {}x{} block",
                data.len(),
                self.rows,
                self.cols
            )));
        }
        if self.cols == 0 {
            return Ok(());
        }
        for (i, src) in data.chunks_exact(self.cols).enumerate() {
            self.row_mut(i).copy_from_slice(src);
        }
        Ok(())
    }

    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline(always)]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline(always)]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// # Panics
    ///
    /// Panics if `(i, j)` is out of bounds.
    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.rows && j < self.cols, "index ({i}, {j}) out of bounds");
        self.data[i * self.stride + j]
    }

    /// # Panics
    ///
    /// Panics if `(i, j)` is out of bounds.
    #[inline(always)]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        assert!(i < self.rows && j < self.cols, "index ({i}, {j}) out of bounds");
        self.data[i * self.stride + j] = value;
    }

    /// The `cols` logical elements of row `i`.
    #[inline(always)]
    pub fn row(&self, i: usize) -> &[f64] {
        let start = i * self.stride;
        &self.data[start..start + self.cols]
    }

    #[inline(always)]
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        let start = i * self.stride;
        &mut self.data[start..start + self.cols]
    }

    /// The whole backing buffer, padding included.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn as_ptr(&self) -> *const f64 {
        self.data.as_ptr()
    }

    /// Copies the logical elements out in dense row-major order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.rows_to_vec(0, self.rows)
    }

    /// Dense row-major copy of rows `start..end`.
    pub(crate) fn rows_to_vec(&self, start: usize, end: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity((end - start) * self.cols);
        for i in start..end {
            out.extend_from_slice(self.row(i));
        }
        out
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// `true` when every row start is an `align`-byte boundary.
    pub fn is_row_aligned(&self, align: usize) -> bool {
        is_aligned(self.as_ptr(), align)
            && (self.rows <= 1 || (self.stride * std::mem::size_of::<f64>()) % align == 0)
    }

    /// Transposes into a padded matrix, so that columns of `self` become
    /// contiguous, vector-aligned rows.
    pub fn transpose_padded(&self) -> Result<Matrix> {
        let mut t = Matrix::padded(self.cols, self.rows)?;
        for i in 0..self.rows {
            for (j, &x) in self.row(i).iter().enumerate() {
                t.data[j * t.stride + i] = x;
            }
        }
        Ok(t)
    }

    /// Element-wise closeness: `|x - y| <= rel_tol * max(1, |x|, |y|)`.
    pub fn approx_eq(&self, other: &Matrix, rel_tol: f64) -> bool {
        self.shape() == other.shape()
            && (0..self.rows).all(|i| {
                self.row(i).iter().zip(other.row(i)).all(|(&x, &y)| {
                    (x - y).abs() <= rel_tol * 1.0f64.max(x.abs()).max(y.abs())
                })
            })
    }

    pub fn to_array2(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows, self.cols), |(i, j)| self.get(i, j))
    }
}

impl TryFrom<&Array2<f64>> for Matrix {
    type Error = DistmmError;

    fn try_from(array: &Array2<f64>) -> Result<Self> {
        let (rows, cols) = array.dim();
        Matrix::from_fn(rows, cols, |i, j| array[[i, j]])
    }
}

/// Logical equality; stride and padding are ignored.
impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && (0..self.rows).all(|i| self.row(i) == other.row(i))
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for i in 0..self.rows {
            if i > 0 {
                write!(f, ",\n ")?;
            }
            write!(f, "[")?;
            for (j, x) in self.row(i).iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{x}")?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}

macro_rules! impl_elementwise {
    ($trait:ident, $method:ident, $op:tt) => {
        /// Element-wise operation.
        ///
        /// # Panics
        ///
        /// Panics if the shapes differ.
        impl $trait<&Matrix> for &Matrix {
            type Output = Matrix;

            fn $method(self, rhs: &Matrix) -> Matrix {
                assert_eq!(
                    self.shape(),
                    rhs.shape(),
                    "element-wise {} requires equal shapes",
                    stringify!($method)
                );
                let mut out = self.clone();
                for i in 0..out.rows {
                    for (x, &y) in out.row_mut(i).iter_mut().zip(rhs.row(i)) {
                        *x = *x $op y;
                    }
                }
                out
            }
        }
    };
}

impl_elementwise!(Add, add, +);
impl_elementwise!(Sub, sub, -);
impl_elementwise!(Mul, mul, *);
impl_elementwise!(Div, div, /);

/// Reference triple loop, `C[i][j] = sum_k A[i][k] * B[k][j]`.
///
/// Used as the ground truth the tiled and distributed paths are checked
/// against.
pub fn naive_multiply(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    if a.cols != b.rows {
        return Err(configuration_error(format!(
            "cannot multiply {}x{} by {}x{}",
            a.rows, a.cols, b.rows, b.cols
        )));
    }
    let mut c = Matrix::zeros(a.rows, b.cols)?;
    for i in 0..a.rows {
        for j in 0..b.cols {
            let mut sum = 0.0;
            for k in 0..a.cols {
                sum += a.get(i, k) * b.get(k, j);
            }
            c.set(i, j, sum);
        }
    }
    Ok(c)
}
