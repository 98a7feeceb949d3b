//! Feature derivation from draft quote payloads and customer histories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::errors::PricingError;
use crate::repository::{CustomerHistory, HistoricalLine};

/// Category assumed when a draft line does not name one. Fitted encoders
/// that never observed it map it to an all-zero block.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Recency sentinel for customers without any quotation history.
pub const NO_HISTORY_RECENCY_DAYS: i64 = 10_000;

/// One line of a draft quote as the quoting workflow submits it.
///
/// Every field is optional so a partially filled form can still be
/// estimated; derivation fills the documented defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftLineItem {
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<u32>,
    pub width_ft: Option<f64>,
    pub height_ft: Option<f64>,
    pub base_cost_per_sqft: Option<f64>,
}

/// Flat numeric+categorical record consumed by the pricing model.
/// Derived per quote line and never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct LineFeature {
    pub category: String,
    pub area: f64,
    pub quantity: u32,
    pub base_cost_per_sqft: f64,
}

impl LineFeature {
    /// Derive a feature record from a draft line.
    ///
    /// A missing dimension yields a zero area; a missing category maps to
    /// [`UNKNOWN_CATEGORY`]; quantity defaults to 1 and base cost to 0.0.
    /// Values that are present but malformed are a request-level error.
    pub fn from_draft(item: &DraftLineItem) -> Result<Self, PricingError> {
        if let Some(width) = item.width_ft {
            ensure_measure("width_ft", width)?;
        }
        if let Some(height) = item.height_ft {
            ensure_measure("height_ft", height)?;
        }
        if let Some(base) = item.base_cost_per_sqft {
            ensure_measure("base_cost_per_sqft", base)?;
        }
        let area = match (item.width_ft, item.height_ft) {
            (Some(width), Some(height)) => width * height,
            _ => 0.0,
        };
        let quantity = item.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(PricingError::PredictionInput(
                "quantity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            category: item
                .category
                .clone()
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
            area,
            quantity,
            base_cost_per_sqft: item.base_cost_per_sqft.unwrap_or(0.0),
        })
    }

    /// Feature record for one historical training row.
    pub fn from_history(row: &HistoricalLine) -> Self {
        Self {
            category: row.category.clone(),
            area: row.width_ft * row.height_ft,
            quantity: row.quantity,
            base_cost_per_sqft: row.base_cost_per_sqft,
        }
    }
}

/// Parse the JSON-array-shaped prediction payload used by the API layer.
pub fn parse_draft_items(payload: serde_json::Value) -> Result<Vec<DraftLineItem>, PricingError> {
    serde_json::from_value(payload)
        .map_err(|error| PricingError::PredictionInput(error.to_string()))
}

fn ensure_measure(field: &str, value: f64) -> Result<(), PricingError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PricingError::PredictionInput(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

/// Per-customer feature frame row. Recomputed fresh on every
/// segmentation request; never persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomerFeatureVector {
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub total_quotes: u64,
    pub total_value: f64,
    pub avg_value: f64,
    pub days_since_last: i64,
}

/// Derive the segmentation features for one customer at reference time
/// `now`. Totals are clamped non-negative and rounded to cents.
pub fn customer_features(history: &CustomerHistory, now: DateTime<Utc>) -> CustomerFeatureVector {
    let mut quotations = history.quotations.clone();
    quotations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let total_quotes = quotations.len() as u64;
    let total_value: f64 = quotations.iter().map(|q| q.total_amount).sum::<f64>().max(0.0);
    let avg_value = if quotations.is_empty() {
        0.0
    } else {
        (total_value / quotations.len() as f64).max(0.0)
    };
    let days_since_last = quotations
        .first()
        .map(|latest| (now - latest.timestamp).num_days().max(0))
        .unwrap_or(NO_HISTORY_RECENCY_DAYS);

    CustomerFeatureVector {
        customer_id: history.customer.id.clone(),
        customer_name: history.customer.name.clone(),
        total_quotes,
        total_value: round2(total_value),
        avg_value: round2(avg_value),
        days_since_last,
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
