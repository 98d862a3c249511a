use thiserror::Error;

/// Errors raised by the clustering core and the table loader.
#[derive(Debug, Error)]
pub enum KMeansError {
    /// Malformed point, seed list, cluster count or dimension.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Point lookup outside the dataset.
    #[error("index {index} out of range for dataset of size {size}")]
    Index { index: usize, size: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl KMeansError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        KMeansError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, KMeansError>;
