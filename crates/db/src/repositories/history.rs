use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::Row;

use fenestra_core::domain::customer::{Customer, CustomerId};
use fenestra_core::domain::quotation::{Quotation, QuotationId};
use fenestra_core::repository::{
    CustomerHistory, HistoricalLine, QuotationHistoryRepository, RepositoryError,
};

use crate::DbPool;

/// History reads over the quotation schema. The training query inner-joins
/// line items with products, so rows with a dangling product reference
/// never reach the model.
pub struct SqlHistoryRepository {
    pool: DbPool,
}

impl SqlHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(error.to_string())
}

fn decode(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

#[async_trait]
impl QuotationHistoryRepository for SqlHistoryRepository {
    async fn priced_line_history(&self) -> Result<Vec<HistoricalLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT qi.quantity, qi.width_ft, qi.height_ft, qi.unit_price, qi.line_total, \
                    p.category, p.base_cost_per_sqft \
             FROM quotation_item AS qi \
             JOIN product AS p ON qi.product_id = p.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                let quantity: i64 = row.try_get("quantity").map_err(decode)?;
                Ok(HistoricalLine {
                    quantity: quantity.max(0) as u32,
                    width_ft: row.try_get("width_ft").map_err(decode)?,
                    height_ft: row.try_get("height_ft").map_err(decode)?,
                    unit_price: row.try_get("unit_price").map_err(decode)?,
                    line_total: row.try_get("line_total").map_err(decode)?,
                    category: row.try_get("category").map_err(decode)?,
                    base_cost_per_sqft: row.try_get("base_cost_per_sqft").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn customer_histories(&self) -> Result<Vec<CustomerHistory>, RepositoryError> {
        let customer_rows = sqlx::query("SELECT id, name FROM customer ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut histories = Vec::with_capacity(customer_rows.len());
        let mut slots: HashMap<i64, usize> = HashMap::with_capacity(customer_rows.len());
        for row in customer_rows {
            let id: i64 = row.try_get("id").map_err(decode)?;
            slots.insert(id, histories.len());
            histories.push(CustomerHistory {
                customer: Customer {
                    id: CustomerId(id),
                    name: row.try_get("name").map_err(decode)?,
                },
                quotations: Vec::new(),
            });
        }

        let quotation_rows =
            sqlx::query("SELECT id, customer_id, total_amount, timestamp FROM quotation")
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

        for row in quotation_rows {
            let customer_id: i64 = row.try_get("customer_id").map_err(decode)?;
            let Some(&slot) = slots.get(&customer_id) else {
                continue;
            };
            // Stored naive; interpreted as UTC.
            let timestamp: chrono::NaiveDateTime =
                row.try_get("timestamp").map_err(decode)?;
            histories[slot].quotations.push(Quotation {
                id: QuotationId(row.try_get("id").map_err(decode)?),
                total_amount: row.try_get("total_amount").map_err(decode)?,
                timestamp: timestamp.and_utc(),
            });
        }

        Ok(histories)
    }
}
