//! Plain value containers for feature data.
//!
//! Floats compare bit-exactly: messages are compared after a push/pull round
//! trip, where any tolerance would hide corruption.

use super::MessageError;

/// Bit-exact comparison of two float slices.
pub(crate) fn same_floats(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Fails with [`MessageError::NonFinite`] when any value is NaN or infinite.
pub(crate) fn check_finite(field: &'static str, values: &[f32]) -> Result<(), MessageError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(MessageError::NonFinite { field })
    }
}

/// An ordered sequence of `f32` values.
#[derive(Debug, Clone, Default)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    /// Zero-filled vector of `len` elements.
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    /// Copies `data` into a new vector.
    pub fn from_slice(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.data.get(index).copied()
    }

    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: f32) {
        self.data[index] = value;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Resizes to `len`, keeping the common prefix and zero-filling growth.
    pub fn conservative_resize(&mut self, len: usize) {
        self.data.resize(len, 0.0);
    }

    /// Appends all elements of `other`.
    pub fn append(&mut self, other: &Vector) {
        self.data.extend_from_slice(&other.data);
    }
}

impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        same_floats(&self.data, &other.data)
    }
}

impl From<&[f32]> for Vector {
    fn from(data: &[f32]) -> Self {
        Self::from_slice(data)
    }
}

/// Column-major matrix: an ordered list of equal-length column vectors.
#[derive(Debug, Clone, Default)]
pub struct Matrix {
    rows: usize,
    columns: Vec<Vector>,
}

impl Matrix {
    /// Zero-filled `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            columns: (0..cols).map(|_| Vector::zeros(rows)).collect(),
        }
    }

    /// Builds a matrix from columns, which must all have the same length.
    pub fn from_columns(columns: Vec<Vector>) -> Result<Self, MessageError> {
        let rows = columns.first().map(Vector::len).unwrap_or(0);
        if let Some((index, column)) = columns.iter().enumerate().find(|(_, c)| c.len() != rows) {
            return Err(MessageError::MatrixShape {
                message: format!(
                    "column {} has {} rows, expected {}",
                    index,
                    column.len(),
                    rows
                ),
            });
        }
        Ok(Self { rows, columns })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.columns.get(col).and_then(|c| c.get(row))
    }

    /// # Panics
    /// Panics if `row` or `col` is out of bounds.
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.columns[col].set(row, value);
    }

    pub fn column(&self, col: usize) -> Option<&Vector> {
        self.columns.get(col)
    }

    pub fn columns(&self) -> &[Vector] {
        &self.columns
    }

    /// Resizes to `rows x cols`, preserving the overlapping region and
    /// zero-filling new rows and columns.
    pub fn conservative_resize(&mut self, rows: usize, cols: usize) {
        self.columns.truncate(cols);
        for column in &mut self.columns {
            column.conservative_resize(rows);
        }
        while self.columns.len() < cols {
            self.columns.push(Vector::zeros(rows));
        }
        self.rows = rows;
    }

    /// Appends the columns of `other`. Row counts must match unless this
    /// matrix has no columns yet.
    pub fn add_columns(&mut self, other: &Matrix) -> Result<(), MessageError> {
        if self.columns.is_empty() {
            self.rows = other.rows;
        } else if other.rows != self.rows && !other.columns.is_empty() {
            return Err(MessageError::MatrixShape {
                message: format!(
                    "cannot append columns with {} rows to a matrix with {} rows",
                    other.rows, self.rows
                ),
            });
        }
        self.columns.extend(other.columns.iter().cloned());
        Ok(())
    }
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.columns == other.columns
    }
}
