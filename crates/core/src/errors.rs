use std::path::PathBuf;

use thiserror::Error;

use crate::repository::RepositoryError;

/// Failures of the price estimation subsystem. Training and artifact
/// failures propagate to the caller: there is no safe default total.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("no historical line items are available to train the pricing model")]
    TrainingDataUnavailable,
    #[error("invalid prediction input: {0}")]
    PredictionInput(String),
    #[error("could not read pricing artifact `{path}`: {source}")]
    ArtifactRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write pricing artifact `{path}`: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("pricing artifact `{path}` is not usable: {reason}")]
    ArtifactFormat { path: PathBuf, reason: String },
    #[error("unsupported pricing artifact version {found} (expected {expected})")]
    ArtifactVersion { found: u32, expected: u32 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Failures of the customer segmentation subsystem. All of them
/// propagate: a partial segmentation would be misleading.
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("segmentation into {requested} clusters needs at least {requested} customers, found {available}")]
    InsufficientCustomers { available: usize, requested: usize },
    #[error("clustering failed: {0}")]
    Clustering(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Failures of the learned summarization step. Internal to the narrative
/// subsystem: they are logged and collapse to the template fallback,
/// never reaching the caller.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("summarization model acquisition failed: {0}")]
    Acquisition(String),
    #[error("summarization request failed: {0}")]
    Request(String),
    #[error("summarization backend returned no usable text")]
    EmptyCompletion,
}
