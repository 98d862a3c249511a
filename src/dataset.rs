use ndarray::{s, Array2, ArrayView1, ArrayView2};
use std::fmt;

use crate::error::{KMeansError, Result};

/// A single point. Always handed out as an owned copy.
pub type Point = Vec<f64>;

/// Fixed-dimension, append-only table of points.
///
/// The dimension is set once at construction. Rows can only be appended;
/// existing rows are never removed or changed.
#[derive(Debug, Clone)]
pub struct Dataset {
    dimension: usize,
    data: Array2<f64>,
}

/// Describes what is wrong with `point`, if anything.
fn point_problem(point: &[f64], dimension: usize) -> Option<String> {
    if point.len() != dimension {
        return Some(format!("point has {} values, expected {}", point.len(), dimension));
    }
    point
        .iter()
        .position(|v| !v.is_finite())
        .map(|pos| format!("point value at position {} is not a number ({})", pos, point[pos]))
}

/// Checks that `point` has the expected length and only finite values.
pub(crate) fn check_point(point: &[f64], dimension: usize) -> Result<()> {
    match point_problem(point, dimension) {
        Some(msg) => Err(KMeansError::invalid(msg)),
        None => Ok(()),
    }
}

impl Dataset {
    /// Create an empty dataset for points of length `dimension`.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(KMeansError::invalid("dataset dimension must be > 0"));
        }
        Ok(Self {
            dimension,
            data: Array2::zeros((0, dimension)),
        })
    }

    /// Create a dataset holding copies of `rows`.
    ///
    /// Every row is validated before anything is stored.
    pub fn from_rows<R: AsRef<[f64]>>(dimension: usize, rows: &[R]) -> Result<Self> {
        let mut ds = Self::new(dimension)?;
        for (i, row) in rows.iter().enumerate() {
            if let Some(msg) = point_problem(row.as_ref(), dimension) {
                return Err(KMeansError::invalid(format!("row {}: {}", i, msg)));
            }
        }
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.as_ref().iter().copied()).collect();
        ds.data = Array2::from_shape_vec((rows.len(), dimension), flat)
            .map_err(|e| KMeansError::invalid(e.to_string()))?;
        Ok(ds)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn size(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Read-only view of the stored table.
    ///
    /// This is the live storage; it cannot be written through. Use
    /// [`Dataset::contents_copy`] when an owned copy is needed.
    pub fn contents(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Deep copy of every point, in storage order.
    pub fn contents_copy(&self) -> Vec<Point> {
        self.data.outer_iter().map(|row| row.to_vec()).collect()
    }

    /// Copy of the point at `index`.
    pub fn point_at(&self, index: usize) -> Result<Point> {
        self.row(index).map(|row| row.to_vec())
    }

    pub(crate) fn row(&self, index: usize) -> Result<ArrayView1<'_, f64>> {
        if index >= self.size() {
            return Err(KMeansError::Index {
                index,
                size: self.size(),
            });
        }
        Ok(self.data.row(index))
    }

    /// Append a copy of `point`.
    pub fn add_point(&mut self, point: &[f64]) -> Result<()> {
        check_point(point, self.dimension)?;
        self.data
            .push_row(ArrayView1::from(point))
            .map_err(|e| KMeansError::invalid(e.to_string()))
    }

    /// New dataset made of the first `ncols` columns (for clustering on a subset).
    pub fn numeric_view(&self, ncols: usize) -> Result<Self> {
        if ncols == 0 {
            return Err(KMeansError::invalid("numeric view needs at least one column"));
        }
        let cols = usize::min(ncols, self.dimension);
        Ok(Self {
            dimension: cols,
            data: self.data.slice(s![.., 0..cols]).to_owned(),
        })
    }

    /// One line per point, `"<index>: [<v0>,<v1>,...]"`.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

/// Formats a value the way the render format expects: shortest round-trip
/// digits, always with a fractional part (`1.0`, `-3.0`, `0.5`), and a signed
/// two-digit exponent outside `[1e-4, 1e16)` (`1e-05`, `1.5e+20`).
pub(crate) fn format_value(v: f64) -> String {
    let repr = format!("{:?}", v);
    match repr.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.data.outer_iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let values: Vec<String> = row.iter().map(|&v| format_value(v)).collect();
            write!(f, "{}: [{}]", i, values.join(","))?;
        }
        Ok(())
    }
}
