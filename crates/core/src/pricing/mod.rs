//! Price estimation over historical quotation line items.
//!
//! The estimator owns the regression artifact lifecycle: it trains the
//! artifact from history when none is persisted, writes it to a
//! well-known path, caches the loaded model for the process lifetime, and
//! serves per-line predictions summed into a draft-quote total.

mod artifact;
mod regression;

pub use artifact::{CategoryEncoder, PriceModelArtifact, ARTIFACT_VERSION};
pub use regression::LinearFit;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use ndarray::{Array1, Array2};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::PricingConfig;
use crate::errors::PricingError;
use crate::features::{parse_draft_items, round2, DraftLineItem, LineFeature};
use crate::repository::{HistoricalLine, QuotationHistoryRepository};

pub struct PriceEstimator<R: QuotationHistoryRepository> {
    repository: Arc<R>,
    config: PricingConfig,
    cache: Mutex<Option<Arc<PriceModelArtifact>>>,
}

impl<R: QuotationHistoryRepository> PriceEstimator<R> {
    pub fn new(repository: Arc<R>, config: PricingConfig) -> Self {
        Self { repository, config, cache: Mutex::new(None) }
    }

    /// Train a fresh artifact from the full line history, persist it
    /// (overwriting any existing artifact), and make it the active model.
    pub async fn train(&self) -> Result<Arc<PriceModelArtifact>, PricingError> {
        let artifact = Arc::new(self.train_from_history().await?);
        artifact.save(&self.write_path())?;
        *self.cache.lock().await = Some(artifact.clone());
        Ok(artifact)
    }

    /// Predict a non-negative, cent-rounded total for a draft quote.
    ///
    /// An empty item list is 0.0 without touching the model. Per-line
    /// predictions are clamped at zero before summing.
    pub async fn predict(&self, items: &[DraftLineItem]) -> Result<f64, PricingError> {
        let features = items
            .iter()
            .map(LineFeature::from_draft)
            .collect::<Result<Vec<_>, _>>()?;
        if features.is_empty() {
            return Ok(0.0);
        }

        let artifact = self.acquire().await?;
        let total: f64 = features
            .iter()
            .map(|feature| artifact.predict_line(feature).max(0.0))
            .sum();
        Ok(round2(total))
    }

    /// JSON-array-shaped entry point used by the quoting API layer.
    pub async fn predict_from_json(
        &self,
        payload: serde_json::Value,
    ) -> Result<f64, PricingError> {
        let items = parse_draft_items(payload)?;
        self.predict(&items).await
    }

    /// Load-or-train, executed at most once per process.
    ///
    /// The cache mutex is held across the whole sequence so concurrent
    /// first use performs a single training run. A failure leaves the
    /// cache uninitialized; the next request retries.
    async fn acquire(&self) -> Result<Arc<PriceModelArtifact>, PricingError> {
        let mut slot = self.cache.lock().await;
        if let Some(artifact) = slot.as_ref() {
            return Ok(artifact.clone());
        }

        for path in self.candidate_paths() {
            if path.exists() {
                let artifact = Arc::new(PriceModelArtifact::load(&path)?);
                info!(
                    path = %path.display(),
                    training_rows = artifact.training_rows,
                    categories = artifact.encoder.width(),
                    "loaded pricing artifact"
                );
                *slot = Some(artifact.clone());
                return Ok(artifact);
            }
        }

        info!("no persisted pricing artifact found, training from history");
        let artifact = Arc::new(self.train_from_history().await?);
        artifact.save(&self.write_path())?;
        *slot = Some(artifact.clone());
        Ok(artifact)
    }

    async fn train_from_history(&self) -> Result<PriceModelArtifact, PricingError> {
        let rows = self.repository.priced_line_history().await?;
        if rows.is_empty() {
            warn!("pricing history is empty, nothing to train on");
            return Err(PricingError::TrainingDataUnavailable);
        }
        let artifact = fit_artifact(&rows);
        info!(
            training_rows = artifact.training_rows,
            categories = artifact.encoder.width(),
            "trained pricing artifact"
        );
        Ok(artifact)
    }

    /// Load candidates in precedence order: the explicitly configured
    /// path, then the default local path.
    fn candidate_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = &self.config.artifact_path {
            paths.push(path.clone());
        }
        paths.push(self.config.local_artifact_path.clone());
        paths
    }

    fn write_path(&self) -> PathBuf {
        self.config
            .artifact_path
            .clone()
            .unwrap_or_else(|| self.config.local_artifact_path.clone())
    }
}

/// Fit the category encoder and regression over historical rows.
fn fit_artifact(rows: &[HistoricalLine]) -> PriceModelArtifact {
    let encoder = CategoryEncoder::fit(rows.iter().map(|row| row.category.as_str()));
    let width = encoder.width() + 3;

    let mut design = Array2::<f64>::zeros((rows.len(), width));
    let mut targets = Array1::<f64>::zeros(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let feature = LineFeature::from_history(row);
        if let Some(slot) = encoder.slot(&feature.category) {
            design[[index, slot]] = 1.0;
        }
        design[[index, encoder.width()]] = feature.area;
        design[[index, encoder.width() + 1]] = f64::from(feature.quantity);
        design[[index, encoder.width() + 2]] = feature.base_cost_per_sqft;
        targets[index] = row.line_total;
    }

    let fit = regression::fit_least_squares(&design, &targets);
    PriceModelArtifact {
        version: ARTIFACT_VERSION,
        trained_at: Utc::now(),
        encoder,
        weights: fit.weights,
        intercept: fit.intercept,
        training_rows: rows.len(),
    }
}
