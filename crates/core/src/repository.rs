//! Read-only collaborator contract over the quotation history store.
//!
//! The core never writes through this seam; its only write side effect is
//! the persisted pricing artifact file.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::customer::Customer;
use crate::domain::quotation::Quotation;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("repository backend failure: {0}")]
    Backend(String),
    #[error("repository row decode failure: {0}")]
    Decode(String),
}

/// One historical line item joined with its product. Rows whose product
/// reference cannot be resolved are excluded by the adapter, so every row
/// here is usable for training.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoricalLine {
    pub quantity: u32,
    pub width_ft: f64,
    pub height_ft: f64,
    pub unit_price: f64,
    pub line_total: f64,
    pub category: String,
    pub base_cost_per_sqft: f64,
}

/// One customer with every quotation issued to them, in arbitrary order;
/// consumers re-sort as needed.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomerHistory {
    pub customer: Customer,
    pub quotations: Vec<Quotation>,
}

#[async_trait]
pub trait QuotationHistoryRepository: Send + Sync {
    /// All historical line items with their product's category and base
    /// cost, for training the pricing model.
    async fn priced_line_history(&self) -> Result<Vec<HistoricalLine>, RepositoryError>;

    /// All customers with their associated quotations, for segmentation.
    async fn customer_histories(&self) -> Result<Vec<CustomerHistory>, RepositoryError>;
}
