//! Lloyd's k-means clustering over fixed-dimension datasets.
//!
//! A [`Dataset`] holds the points, each [`Cluster`] a centroid plus member
//! indices, and [`Algorithm`] drives the partition / update cycle.

pub mod algorithm;
pub mod cluster;
pub mod dataset;
pub mod error;
pub mod io;

pub use algorithm::{parse_seeds, valid_seeds, Algorithm, Phase, RunStatus};
pub use cluster::{Cluster, Tolerance};
pub use dataset::{Dataset, Point};
pub use error::{KMeansError, Result};
pub use io::{read_table, Table};
