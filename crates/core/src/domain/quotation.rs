use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationId(pub i64);

/// Summary view of one issued quotation, as the segmenter consumes it.
/// Timestamps persisted without a zone are interpreted as UTC.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub total_amount: f64,
    pub timestamp: DateTime<Utc>,
}
