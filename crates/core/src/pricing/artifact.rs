//! Persisted pricing model artifact.
//!
//! The serialization format is explicit and versioned: a sorted
//! category-to-slot encoding plus an ordered coefficient list, so the
//! artifact stays portable and its schema testable.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PricingError;
use crate::features::LineFeature;

pub const ARTIFACT_VERSION: u32 = 1;

/// Categorical encoding fitted over the category values observed during
/// training. Categories are stored sorted; the index doubles as the
/// one-hot slot. Unknown categories have no slot and encode to an
/// all-zero block, never an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    categories: Vec<String>,
}

impl CategoryEncoder {
    pub fn fit<'a, I>(observed: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut categories: Vec<String> = observed.into_iter().map(str::to_owned).collect();
        categories.sort();
        categories.dedup();
        Self { categories }
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// One-hot slot of a known category.
    pub fn slot(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|known| known.as_str().cmp(category))
            .ok()
    }
}

/// The fitted model, exactly as persisted. Owned by the estimator; at
/// most one artifact is active per process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceModelArtifact {
    pub version: u32,
    pub trained_at: DateTime<Utc>,
    pub encoder: CategoryEncoder,
    /// Coefficients ordered as one per encoder slot, then area, quantity,
    /// base_cost_per_sqft.
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub training_rows: usize,
}

impl PriceModelArtifact {
    pub fn feature_len(&self) -> usize {
        self.encoder.width() + 3
    }

    /// Raw line-total prediction for one feature record. Callers clamp.
    pub fn predict_line(&self, feature: &LineFeature) -> f64 {
        let mut total = self.intercept;
        if let Some(slot) = self.encoder.slot(&feature.category) {
            total += self.weights[slot];
        }
        let numeric = self.encoder.width();
        total += self.weights[numeric] * feature.area;
        total += self.weights[numeric + 1] * f64::from(feature.quantity);
        total += self.weights[numeric + 2] * feature.base_cost_per_sqft;
        total
    }

    /// Persist to `path`, creating parent directories and overwriting any
    /// existing artifact.
    pub fn save(&self, path: &Path) -> Result<(), PricingError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| PricingError::ArtifactWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
        let payload = serde_json::to_vec_pretty(self).map_err(|error| {
            PricingError::ArtifactFormat {
                path: path.to_path_buf(),
                reason: error.to_string(),
            }
        })?;
        fs::write(path, payload).map_err(|source| PricingError::ArtifactWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, PricingError> {
        let raw = fs::read(path).map_err(|source| PricingError::ArtifactRead {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: Self =
            serde_json::from_slice(&raw).map_err(|error| PricingError::ArtifactFormat {
                path: path.to_path_buf(),
                reason: error.to_string(),
            })?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(PricingError::ArtifactVersion {
                found: artifact.version,
                expected: ARTIFACT_VERSION,
            });
        }
        if artifact.weights.len() != artifact.feature_len() {
            return Err(PricingError::ArtifactFormat {
                path: path.to_path_buf(),
                reason: format!(
                    "coefficient count {} does not match encoder width {}",
                    artifact.weights.len(),
                    artifact.feature_len()
                ),
            });
        }
        Ok(artifact)
    }
}
