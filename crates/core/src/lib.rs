//! Estimation core for the Fenestra quotation workflow.
//!
//! Three subsystems share one shape: derive a feature representation from
//! transactional records, feed it to a fitted model, and degrade to a
//! deterministic fallback when the learned step is unavailable.
//!
//! - [`pricing::PriceEstimator`] predicts a draft-quote total from a
//!   persisted regression artifact trained over historical line items.
//! - [`segmentation::CustomerSegmenter`] clusters customers by quotation
//!   history and names the clusters by ranking their centroids.
//! - [`narrative::NarrativeGenerator`] compresses a deterministic quote
//!   description through a learned summarization step, falling back to a
//!   template when none can be acquired.

pub mod config;
pub mod domain;
pub mod errors;
pub mod features;
pub mod narrative;
pub mod pricing;
pub mod repository;
pub mod segmentation;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::customer::{Customer, CustomerId};
pub use domain::product::{Product, ProductId};
pub use domain::quotation::{Quotation, QuotationId};
pub use errors::{PricingError, SegmentationError, SummaryError};
pub use features::{CustomerFeatureVector, DraftLineItem, LineFeature};
pub use narrative::{NarrativeGenerator, QuoteNarrativeInput};
pub use pricing::{PriceEstimator, PriceModelArtifact};
pub use repository::{
    CustomerHistory, HistoricalLine, QuotationHistoryRepository, RepositoryError,
};
pub use segmentation::{CustomerSegmenter, SegmentAssignment, SEGMENT_LABELS};
