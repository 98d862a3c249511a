use ndarray::ArrayView1;
use rand::prelude::*;
use std::collections::HashSet;

use crate::cluster::{Cluster, Tolerance};
use crate::dataset::Dataset;
use crate::error::{KMeansError, Result};

/// True when `value` holds pairwise distinct indices, each below `size`.
pub fn valid_seeds(value: &[usize], size: usize) -> bool {
    let mut seen = HashSet::with_capacity(value.len());
    value.iter().all(|&s| s < size && seen.insert(s))
}

/// Parse a comma separated seed list such as `"0,3,7"`.
///
/// Only plain non-negative integers are accepted: `2.0`, `'5'` or `-1`
/// are rejected, as are out-of-range and repeated indices.
pub fn parse_seeds(text: &str, size: usize) -> Result<Vec<usize>> {
    let mut seeds = Vec::new();
    for token in text.split(',').map(str::trim) {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(KMeansError::invalid(format!(
                "seed {:?} is not a non-negative integer",
                token
            )));
        }
        let seed = token
            .parse::<usize>()
            .map_err(|e| KMeansError::invalid(format!("seed {:?}: {}", token, e)))?;
        seeds.push(seed);
    }
    if !valid_seeds(&seeds, size) {
        return Err(KMeansError::invalid(format!(
            "seeds {:?} must be distinct indices below {}",
            seeds, size
        )));
    }
    Ok(seeds)
}

/// Where the algorithm is in its partition / update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Centroids set, no memberships yet.
    Initialized,
    /// Memberships reflect the current centroids.
    Partitioned,
    /// Centroids recomputed and at least one moved.
    Updated,
    /// The last update left every centroid in place.
    Converged,
    /// `run` spent its step budget without converging.
    Exhausted,
}

/// Result of [`Algorithm::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Converged { steps: usize },
    Exhausted { steps: usize },
}

/// Lloyd's k-means over a borrowed dataset.
///
/// The dataset is borrowed for the lifetime of the algorithm, so it can't
/// grow while clusters hold indices into it.
#[derive(Debug, Clone)]
pub struct Algorithm<'a> {
    dataset: &'a Dataset,
    clusters: Vec<Cluster<'a>>,
    phase: Phase,
}

impl<'a> Algorithm<'a> {
    /// Build `k` clusters, seeded from the given dataset indices or, when
    /// `seeds` is `None`, from `k` distinct random points.
    pub fn new(dataset: &'a Dataset, k: usize, seeds: Option<&[usize]>) -> Result<Self> {
        match seeds {
            Some(seeds) => {
                Self::check_k(dataset, k)?;
                if seeds.len() != k {
                    return Err(KMeansError::invalid(format!(
                        "expected {} seeds, got {}",
                        k,
                        seeds.len()
                    )));
                }
                if !valid_seeds(seeds, dataset.size()) {
                    return Err(KMeansError::invalid(format!(
                        "seeds {:?} must be distinct indices below {}",
                        seeds,
                        dataset.size()
                    )));
                }
                Self::from_seeds(dataset, seeds)
            }
            None => Self::with_rng(dataset, k, &mut thread_rng()),
        }
    }

    /// Random initialisation with a caller supplied generator.
    pub fn with_rng<R: Rng + ?Sized>(dataset: &'a Dataset, k: usize, rng: &mut R) -> Result<Self> {
        Self::check_k(dataset, k)?;
        let mut indices: Vec<usize> = (0..dataset.size()).collect();
        indices.shuffle(rng);
        indices.truncate(k);
        Self::from_seeds(dataset, &indices)
    }

    fn check_k(dataset: &Dataset, k: usize) -> Result<()> {
        if k == 0 || k > dataset.size() {
            return Err(KMeansError::invalid(format!(
                "cluster count {} must be in 1..={} (dataset size)",
                k,
                dataset.size()
            )));
        }
        Ok(())
    }

    fn from_seeds(dataset: &'a Dataset, seeds: &[usize]) -> Result<Self> {
        let clusters = seeds
            .iter()
            .map(|&s| Cluster::new(dataset, &dataset.point_at(s)?))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(k = clusters.len(), ?seeds, "initialised clusters");
        Ok(Self {
            dataset,
            clusters,
            phase: Phase::Initialized,
        })
    }

    /// Use `tolerance` for every cluster's stability check.
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.clusters = self
            .clusters
            .into_iter()
            .map(|c| c.with_tolerance(tolerance))
            .collect();
        self
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn clusters(&self) -> &[Cluster<'a>] {
        &self.clusters
    }

    /// Mutable access to the clusters; the slice keeps `k` fixed.
    pub fn clusters_mut(&mut self) -> &mut [Cluster<'a>] {
        &mut self.clusters
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Position of the cluster whose centroid is closest to `point`.
    /// Ties go to the earlier cluster.
    pub fn nearest(&self, point: &[f64]) -> Result<usize> {
        if point.len() != self.dataset.dimension() {
            return Err(KMeansError::invalid(format!(
                "point has {} values, expected {}",
                point.len(),
                self.dataset.dimension()
            )));
        }
        Ok(self.nearest_row(ArrayView1::from(point)))
    }

    fn nearest_row(&self, row: ArrayView1<'_, f64>) -> usize {
        let mut best_cluster = 0;
        let mut best_dist = f64::INFINITY;
        for (ci, cluster) in self.clusters.iter().enumerate() {
            let dist = cluster.distance_to_row(row);
            if dist < best_dist {
                best_dist = dist;
                best_cluster = ci;
            }
        }
        best_cluster
    }

    /// Rebuild every membership from scratch against the current centroids.
    pub fn partition(&mut self) {
        for cluster in self.clusters.iter_mut() {
            cluster.clear();
        }
        let dataset = self.dataset;
        for (i, row) in dataset.contents().outer_iter().enumerate() {
            let ci = self.nearest_row(row);
            self.clusters[ci].assign(i);
        }
        self.phase = Phase::Partitioned;
    }

    /// Recompute every centroid. Returns `true` only when none of them moved.
    pub fn update(&mut self) -> bool {
        let stable = self
            .clusters
            .iter_mut()
            .fold(true, |stable, cluster| cluster.update() & stable);
        self.phase = if stable { Phase::Converged } else { Phase::Updated };
        stable
    }

    /// One partition followed by one update.
    pub fn step(&mut self) -> bool {
        self.partition();
        let stable = self.update();
        tracing::debug!(stable, "k-means step");
        stable
    }

    /// Step until convergence or until `max_steps` steps have run.
    pub fn run(&mut self, max_steps: usize) -> RunStatus {
        for steps in 1..=max_steps {
            if self.step() {
                tracing::info!(steps, k = self.clusters.len(), "k-means converged");
                return RunStatus::Converged { steps };
            }
        }
        if max_steps > 0 {
            self.phase = Phase::Exhausted;
            tracing::info!(max_steps, "k-means stopped without converging");
        }
        RunStatus::Exhausted { steps: max_steps }
    }

    /// Cluster position of every dataset point, once a partition has run.
    ///
    /// `None` unless every point belongs to exactly one cluster, which is
    /// the case after `partition` but not after edits through `clusters_mut`.
    pub fn assignments(&self) -> Option<Vec<usize>> {
        let mut labels: Vec<Option<usize>> = vec![None; self.dataset.size()];
        for (ci, cluster) in self.clusters.iter().enumerate() {
            for &i in cluster.indices() {
                if labels[i].replace(ci).is_some() {
                    return None;
                }
            }
        }
        labels.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn square() -> Dataset {
        Dataset::from_rows(2, &[[0.0, 0.0], [10.0, 1.0], [10.0, 10.0], [0.0, 9.0]]).unwrap()
    }

    fn small_cube() -> Dataset {
        Dataset::from_rows(
            3,
            &[
                [0.5, 0.5, 0.5],
                [0.5, 0.6, 0.6],
                [0.6, 0.5, 0.6],
                [0.5, 0.6, 0.5],
                [0.5, 0.4, 0.5],
                [0.5, 0.4, 0.4],
            ],
        )
        .unwrap()
    }

    fn sorted(indices: &[usize]) -> Vec<usize> {
        let mut v = indices.to_vec();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_valid_seeds() {
        let items = [0, 3, 7, 5, 2];
        assert!(valid_seeds(&items, 8));
        assert!(!valid_seeds(&items, 7));
        assert!(!valid_seeds(&[0, 3, 7, 5, 3], 8));
        assert!(valid_seeds(&[], 8));
    }

    #[test]
    fn test_parse_seeds() {
        assert_eq!(parse_seeds("0,3,7,5,2", 8).unwrap(), vec![0, 3, 7, 5, 2]);
        assert_eq!(parse_seeds(" 1, 3 ", 4).unwrap(), vec![1, 3]);
        assert!(parse_seeds("0,3,7,5,2.0", 8).is_err());
        assert!(parse_seeds("0,3,7,'5',2", 8).is_err());
        assert!(parse_seeds("0,-3", 8).is_err());
        assert!(parse_seeds("0,3,7,5,3", 8).is_err());
        assert!(parse_seeds("0,8", 8).is_err());
        assert!(parse_seeds("", 8).is_err());
    }

    #[test]
    fn test_new_with_seeds() {
        let ds = square();
        let km = Algorithm::new(&ds, 2, Some(&[0, 2])).unwrap();
        assert_eq!(km.phase(), Phase::Initialized);
        assert_eq!(km.clusters().len(), 2);
        assert_eq!(km.clusters()[0].centroid(), vec![0.0, 0.0]);
        assert_eq!(km.clusters()[1].centroid(), vec![10.0, 10.0]);
        assert!(km.clusters().iter().all(|c| c.is_empty()));
        assert!(km.assignments().is_none());
    }

    #[test]
    fn test_new_rejects_bad_arguments() {
        let ds = square();
        assert!(Algorithm::new(&ds, 0, None).is_err());
        assert!(Algorithm::new(&ds, 5, None).is_err());
        assert!(Algorithm::new(&ds, 2, Some(&[0, 4])).is_err());
        assert!(Algorithm::new(&ds, 2, Some(&[1, 1])).is_err());
        assert!(Algorithm::new(&ds, 2, Some(&[0, 1, 2])).is_err());
        let empty = Dataset::new(2).unwrap();
        assert!(matches!(
            Algorithm::new(&empty, 1, None),
            Err(KMeansError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_random_init() {
        let ds = square();
        let mut rng = StdRng::seed_from_u64(42);
        let km = Algorithm::with_rng(&ds, 3, &mut rng).unwrap();
        let points = ds.contents_copy();
        let centroids: Vec<Vec<f64>> = km.clusters().iter().map(|c| c.centroid()).collect();
        assert_eq!(centroids.len(), 3);
        for (i, c) in centroids.iter().enumerate() {
            assert!(points.contains(c));
            assert!(!centroids[i + 1..].contains(c));
        }

        let mut rng = StdRng::seed_from_u64(42);
        let again = Algorithm::with_rng(&ds, 3, &mut rng).unwrap();
        let repeat: Vec<Vec<f64>> = again.clusters().iter().map(|c| c.centroid()).collect();
        assert_eq!(centroids, repeat);

        let all = Algorithm::new(&ds, 4, None).unwrap();
        let mut got: Vec<Vec<f64>> = all.clusters().iter().map(|c| c.centroid()).collect();
        got.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut want = points;
        want.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(got, want);
    }

    #[test]
    fn test_nearest() {
        let ds = square();
        let km1 = Algorithm::new(&ds, 2, Some(&[0, 2])).unwrap();
        let km2 = Algorithm::new(&ds, 3, Some(&[0, 2, 3])).unwrap();
        assert_eq!(km1.nearest(&[1.0, 1.0]).unwrap(), 0);
        assert_eq!(km1.nearest(&[1.0, 10.0]).unwrap(), 1);
        assert_eq!(km2.nearest(&[1.0, 1.0]).unwrap(), 0);
        assert_eq!(km2.nearest(&[1.0, 10.0]).unwrap(), 2);
        assert!(km1.nearest(&[1.0]).is_err());
    }

    #[test]
    fn test_nearest_tie_goes_to_first() {
        let ds = Dataset::from_rows(1, &[[0.0], [2.0]]).unwrap();
        let km = Algorithm::new(&ds, 2, Some(&[0, 1])).unwrap();
        assert_eq!(km.nearest(&[1.0]).unwrap(), 0);
        let km = Algorithm::new(&ds, 2, Some(&[1, 0])).unwrap();
        assert_eq!(km.nearest(&[1.0]).unwrap(), 0);
    }

    #[test]
    fn test_partition() {
        let ds = square();
        let mut km = Algorithm::new(&ds, 2, Some(&[0, 2])).unwrap();
        km.partition();
        assert_eq!(km.phase(), Phase::Partitioned);
        assert_eq!(sorted(km.clusters()[0].indices()), vec![0, 3]);
        assert_eq!(sorted(km.clusters()[1].indices()), vec![1, 2]);

        km.partition();
        assert_eq!(sorted(km.clusters()[0].indices()), vec![0, 3]);
        assert_eq!(sorted(km.clusters()[1].indices()), vec![1, 2]);
        assert_eq!(km.assignments().unwrap(), vec![0, 1, 1, 0]);

        km.clusters_mut()[0].set_centroid(&[5.0, 10.0]).unwrap();
        km.clusters_mut()[1].set_centroid(&[0.0, 2.0]).unwrap();
        km.partition();
        assert_eq!(sorted(km.clusters()[0].indices()), vec![2, 3]);
        assert_eq!(sorted(km.clusters()[1].indices()), vec![0, 1]);
    }

    #[test]
    fn test_assignments_need_complete_membership() {
        let ds = square();
        let mut km = Algorithm::new(&ds, 2, Some(&[0, 2])).unwrap();
        km.partition();
        assert_eq!(km.assignments().unwrap(), vec![0, 1, 1, 0]);

        km.clusters_mut()[1].clear();
        assert!(km.assignments().is_none());

        km.clusters_mut()[1].add_index(1).unwrap();
        km.clusters_mut()[1].add_index(2).unwrap();
        assert_eq!(km.assignments().unwrap(), vec![0, 1, 1, 0]);

        km.clusters_mut()[1].add_index(3).unwrap();
        assert!(km.assignments().is_none());
    }

    #[test]
    fn test_update() {
        let ds = square();
        let mut km = Algorithm::new(&ds, 2, Some(&[0, 2])).unwrap();
        km.partition();
        assert!(!km.update());
        assert_eq!(km.phase(), Phase::Updated);
        assert_eq!(km.clusters()[0].centroid(), vec![0.0, 4.5]);
        assert_eq!(km.clusters()[1].centroid(), vec![10.0, 5.5]);

        assert!(km.update());
        assert_eq!(km.phase(), Phase::Converged);
        assert_eq!(km.clusters()[0].centroid(), vec![0.0, 4.5]);
        assert_eq!(km.clusters()[1].centroid(), vec![10.0, 5.5]);
    }

    #[test]
    fn test_update_requires_every_cluster_stable() {
        let ds = square();
        let mut km = Algorithm::new(&ds, 2, Some(&[0, 1])).unwrap();
        km.clusters_mut()[0].add_index(3).unwrap();
        km.clusters_mut()[1].add_index(1).unwrap();
        // first cluster moves, last one stays put
        assert!(!km.update());
        assert_eq!(km.clusters()[0].centroid(), vec![0.0, 9.0]);
        assert_eq!(km.clusters()[1].centroid(), vec![10.0, 1.0]);
    }

    #[test]
    fn test_step() {
        let ds = square();
        let mut km = Algorithm::new(&ds, 2, Some(&[0, 2])).unwrap();
        assert!(!km.step());
        assert_eq!(km.clusters()[0].centroid(), vec![0.0, 4.5]);
        assert_eq!(sorted(km.clusters()[0].indices()), vec![0, 3]);
        assert_eq!(km.clusters()[1].centroid(), vec![10.0, 5.5]);
        assert_eq!(sorted(km.clusters()[1].indices()), vec![1, 2]);
        assert!(km.step());
    }

    #[test]
    fn test_run() {
        let ds = small_cube();
        let mut km = Algorithm::new(&ds, 2, Some(&[1, 3])).unwrap();
        assert_eq!(km.clusters()[0].centroid(), vec![0.5, 0.6, 0.6]);
        assert_eq!(km.clusters()[1].centroid(), vec![0.5, 0.6, 0.5]);

        let status = km.run(10);
        assert_eq!(status, RunStatus::Converged { steps: 3 });
        assert_eq!(km.phase(), Phase::Converged);

        let expected = [
            [8. / 15., 17. / 30., 17. / 30.],
            [0.5, 13. / 30., 14. / 30.],
        ];
        for (cluster, want) in km.clusters().iter().zip(expected.iter()) {
            for (got, want) in cluster.centroid().iter().zip(want.iter()) {
                assert_relative_eq!(*got, *want, epsilon = 1e-12);
            }
        }
        assert_eq!(sorted(km.clusters()[0].indices()), vec![1, 2, 3]);
        assert_eq!(sorted(km.clusters()[1].indices()), vec![0, 4, 5]);

        let before: Vec<Vec<f64>> = km.clusters().iter().map(|c| c.centroid()).collect();
        assert!(km.step());
        let after: Vec<Vec<f64>> = km.clusters().iter().map(|c| c.centroid()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_run_budget() {
        let ds = small_cube();
        let mut km = Algorithm::new(&ds, 2, Some(&[1, 3])).unwrap();
        assert_eq!(km.run(0), RunStatus::Exhausted { steps: 0 });
        assert_eq!(km.phase(), Phase::Initialized);

        assert_eq!(km.run(1), RunStatus::Exhausted { steps: 1 });
        assert_eq!(km.phase(), Phase::Exhausted);
        assert_relative_eq!(km.clusters()[0].centroid()[0], 0.55, epsilon = 1e-12);
    }

    #[test]
    fn test_tolerance_applies_to_clusters() {
        let ds = small_cube();
        let mut km = Algorithm::new(&ds, 2, Some(&[1, 3]))
            .unwrap()
            .with_tolerance(Tolerance::new(0.0, 1.0));
        assert_eq!(km.run(10), RunStatus::Converged { steps: 1 });
    }
}
