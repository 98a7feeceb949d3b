//! Customer segmentation over quotation history.
//!
//! Builds a per-customer feature frame, standardizes it, partitions it
//! with seeded k-means, and names the clusters by ranking their
//! centroids. Nothing is cached: every call reads the repository fresh,
//! so concurrent invocations are independent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use crate::config::SegmentationConfig;
use crate::domain::customer::CustomerId;
use crate::errors::SegmentationError;
use crate::features::{customer_features, CustomerFeatureVector};
use crate::repository::QuotationHistoryRepository;

/// Ranked tier names, best cluster first. Clusters beyond the list get a
/// generic "Segment N" label.
pub const SEGMENT_LABELS: &[&str] = &["High-Value Frequent", "Occasional", "Dormant/Low"];

/// One row of the segmentation report, ordered for presentation by
/// (segment, total_value descending).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentAssignment {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub segment: String,
    pub cluster: usize,
    pub total_quotes: u64,
    pub total_value: f64,
    pub avg_value: f64,
    pub days_since_last: i64,
}

pub struct CustomerSegmenter<R: QuotationHistoryRepository> {
    repository: Arc<R>,
    config: SegmentationConfig,
}

impl<R: QuotationHistoryRepository> CustomerSegmenter<R> {
    pub fn new(repository: Arc<R>, config: SegmentationConfig) -> Self {
        Self { repository, config }
    }

    /// Segment every customer into the configured number of tiers.
    pub async fn compute(&self) -> Result<Vec<SegmentAssignment>, SegmentationError> {
        self.compute_at(Utc::now()).await
    }

    /// Same as [`compute`](Self::compute) with an explicit reference time
    /// for recency, which keeps results reproducible under test.
    pub async fn compute_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SegmentAssignment>, SegmentationError> {
        let histories = self.repository.customer_histories().await?;
        let vectors: Vec<CustomerFeatureVector> =
            histories.iter().map(|history| customer_features(history, now)).collect();

        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        let clusters_requested = self.config.clusters;
        if vectors.len() < clusters_requested {
            return Err(SegmentationError::InsufficientCustomers {
                available: vectors.len(),
                requested: clusters_requested,
            });
        }

        let standardized = standardize(feature_matrix(&vectors));
        let dataset = Dataset::new(standardized, Array1::<usize>::zeros(vectors.len()));
        let rng = StdRng::seed_from_u64(self.config.seed);
        let model = KMeans::params_with(clusters_requested, rng, L2Dist)
            .max_n_iterations(self.config.max_iterations)
            .tolerance(self.config.tolerance)
            .fit(&dataset)
            .map_err(|error| SegmentationError::Clustering(error.to_string()))?;
        let assignments = model.predict(&dataset);

        let labels = label_clusters(&vectors, &assignments, clusters_requested);
        let mut rows: Vec<SegmentAssignment> = vectors
            .into_iter()
            .zip(assignments.iter())
            .map(|(vector, &cluster)| SegmentAssignment {
                customer_id: vector.customer_id,
                customer_name: vector.customer_name,
                segment: labels[cluster].clone(),
                cluster,
                total_quotes: vector.total_quotes,
                total_value: vector.total_value,
                avg_value: vector.avg_value,
                days_since_last: vector.days_since_last,
            })
            .collect();

        rows.sort_by(|a, b| {
            a.segment.cmp(&b.segment).then(
                b.total_value
                    .partial_cmp(&a.total_value)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });

        info!(
            customers = rows.len(),
            clusters = clusters_requested,
            "computed customer segments"
        );
        Ok(rows)
    }
}

/// Feature columns, in frame order: total_quotes, total_value, avg_value,
/// days_since_last.
fn feature_matrix(vectors: &[CustomerFeatureVector]) -> Array2<f64> {
    let mut matrix = Array2::<f64>::zeros((vectors.len(), 4));
    for (row, vector) in vectors.iter().enumerate() {
        matrix[[row, 0]] = vector.total_quotes as f64;
        matrix[[row, 1]] = vector.total_value;
        matrix[[row, 2]] = vector.avg_value;
        matrix[[row, 3]] = vector.days_since_last as f64;
    }
    matrix
}

/// Zero mean, unit variance per column. A zero-variance column is left
/// centered instead of divided by zero.
fn standardize(mut features: Array2<f64>) -> Array2<f64> {
    let rows = features.nrows() as f64;
    for mut column in features.axis_iter_mut(Axis(1)) {
        let mean = column.sum() / rows;
        let variance = column.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / rows;
        let deviation = variance.sqrt();
        let scale = if deviation > 0.0 { deviation } else { 1.0 };
        column.mapv_inplace(|value| (value - mean) / scale);
    }
    features
}

/// Name clusters by ranking their centroid statistics.
///
/// Score = 0.6·rank(mean total_value) + 0.3·rank(mean total_quotes)
///       + 0.1·rank(−mean days_since_last), ranks ascending with
/// minimum-rank ties. Highest score takes the first label. Ranking makes
/// the labels invariant under cluster-id permutation, so input order
/// cannot change which tier a customer lands in.
fn label_clusters(
    vectors: &[CustomerFeatureVector],
    assignments: &Array1<usize>,
    clusters: usize,
) -> Vec<String> {
    let mut value_sum = vec![0.0f64; clusters];
    let mut quote_sum = vec![0.0f64; clusters];
    let mut recency_sum = vec![0.0f64; clusters];
    let mut member_count = vec![0usize; clusters];

    for (index, &cluster) in assignments.iter().enumerate() {
        value_sum[cluster] += vectors[index].total_value;
        quote_sum[cluster] += vectors[index].total_quotes as f64;
        recency_sum[cluster] += vectors[index].days_since_last as f64;
        member_count[cluster] += 1;
    }

    let mean = |sums: &[f64]| -> Vec<f64> {
        sums.iter()
            .zip(&member_count)
            .map(|(sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
            .collect()
    };
    let mean_value = mean(&value_sum);
    let mean_quotes = mean(&quote_sum);
    let mean_recency = mean(&recency_sum);

    let value_rank = rank_ascending(&mean_value);
    let quote_rank = rank_ascending(&mean_quotes);
    let recency_rank =
        rank_ascending(&mean_recency.iter().map(|days| -days).collect::<Vec<_>>());

    let scores: Vec<f64> = (0..clusters)
        .map(|cluster| {
            0.6 * value_rank[cluster] + 0.3 * quote_rank[cluster] + 0.1 * recency_rank[cluster]
        })
        .collect();

    let mut by_score: Vec<usize> = (0..clusters).collect();
    by_score.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut labels = vec![String::new(); clusters];
    for (position, &cluster) in by_score.iter().enumerate() {
        labels[cluster] = SEGMENT_LABELS
            .get(position)
            .map(|label| (*label).to_string())
            .unwrap_or_else(|| format!("Segment {}", position + 1));
    }
    labels
}

/// 1-based ascending ranks with minimum-rank tie handling.
fn rank_ascending(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|value| 1.0 + values.iter().filter(|other| **other < *value).count() as f64)
        .collect()
}
