use ndarray::{Array1, ArrayView1};
use std::collections::HashSet;
use std::fmt;

use crate::dataset::{check_point, format_value, Dataset, Point};
use crate::error::{KMeansError, Result};

/// Per-coordinate closeness test used to decide whether a centroid moved.
///
/// Two values `a` (old) and `b` (new) are close when
/// `|a - b| <= atol + rtol * |b|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: 1e-5,
            atol: 1e-8,
        }
    }
}

impl Tolerance {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Self { rtol, atol }
    }

    pub fn allclose(&self, old: &[f64], new: &[f64]) -> bool {
        old.len() == new.len()
            && old
                .iter()
                .zip(new)
                .all(|(a, b)| (a - b).abs() <= self.atol + self.rtol * b.abs())
    }
}

/// Euclidean distance between a centroid and a point of the same length.
#[inline]
pub(crate) fn e_dist(centroid: &[f64], point: ArrayView1<'_, f64>) -> f64 {
    centroid
        .iter()
        .zip(point.iter())
        .map(|(c, p)| (c - p).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// A centroid plus the dataset indices currently assigned to it.
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    dataset: &'a Dataset,
    centroid: Point,
    indices: Vec<usize>,
    seen: HashSet<usize>,
    tolerance: Tolerance,
}

impl<'a> Cluster<'a> {
    /// Create an empty cluster around a copy of `centroid`.
    pub fn new(dataset: &'a Dataset, centroid: &[f64]) -> Result<Self> {
        check_point(centroid, dataset.dimension())?;
        Ok(Self {
            dataset,
            centroid: centroid.to_vec(),
            indices: Vec::new(),
            seen: HashSet::new(),
            tolerance: Tolerance::default(),
        })
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Copy of the current centroid.
    pub fn centroid(&self) -> Point {
        self.centroid.clone()
    }

    /// Replace the centroid with a copy of `centroid`.
    pub fn set_centroid(&mut self, centroid: &[f64]) -> Result<()> {
        check_point(centroid, self.dataset.dimension())?;
        self.centroid = centroid.to_vec();
        Ok(())
    }

    /// Member indices in insertion order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Add a dataset index; adding an existing member is a no-op.
    pub fn add_index(&mut self, index: usize) -> Result<()> {
        if index >= self.dataset.size() {
            return Err(KMeansError::invalid(format!(
                "cluster index {} out of range for dataset of size {}",
                index,
                self.dataset.size()
            )));
        }
        self.assign(index);
        Ok(())
    }

    /// Membership insert for indices already known to be in range.
    pub(crate) fn assign(&mut self, index: usize) {
        debug_assert!(index < self.dataset.size());
        if self.seen.insert(index) {
            self.indices.push(index);
        }
    }

    /// Drop all members; the centroid stays.
    pub fn clear(&mut self) {
        self.indices.clear();
        self.seen.clear();
    }

    /// Copies of the member points, in insertion order.
    pub fn contents(&self) -> Vec<Point> {
        let data = self.dataset.contents();
        self.indices.iter().map(|&i| data.row(i).to_vec()).collect()
    }

    /// Euclidean distance from `point` to the centroid.
    pub fn distance(&self, point: &[f64]) -> Result<f64> {
        if point.len() != self.centroid.len() {
            return Err(KMeansError::invalid(format!(
                "point has {} values, centroid has {}",
                point.len(),
                self.centroid.len()
            )));
        }
        Ok(e_dist(&self.centroid, ArrayView1::from(point)))
    }

    pub(crate) fn distance_to_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        e_dist(&self.centroid, row)
    }

    /// Largest member distance from the centroid, 0 when empty.
    pub fn radius(&self) -> f64 {
        let data = self.dataset.contents();
        self.indices
            .iter()
            .map(|&i| self.distance_to_row(data.row(i)))
            .fold(0.0, f64::max)
    }

    /// Move the centroid to the mean of the members.
    ///
    /// Returns `true` when the centroid did not move (within the cluster's
    /// tolerance). An empty cluster keeps its centroid and reports `true`.
    pub fn update(&mut self) -> bool {
        self.update_with(self.tolerance)
    }

    pub fn update_with(&mut self, tolerance: Tolerance) -> bool {
        if self.indices.is_empty() {
            return true;
        }
        let data = self.dataset.contents();
        let mut sum = Array1::<f64>::zeros(self.centroid.len());
        for &i in &self.indices {
            sum += &data.row(i);
        }
        let mean = (sum / self.indices.len() as f64).to_vec();
        let old = std::mem::replace(&mut self.centroid, mean);
        let stable = tolerance.allclose(&old, &self.centroid);
        tracing::trace!(members = self.indices.len(), stable, "cluster centroid updated");
        stable
    }
}

impl fmt::Display for Cluster<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let centroid: Vec<String> = self.centroid.iter().map(|&v| format_value(v)).collect();
        let indices: Vec<String> = self.indices.iter().map(|i| i.to_string()).collect();
        write!(f, "[{}]:[{}]", centroid.join(", "), indices.join(", "))
    }
}
