//! Deterministic demo dataset for the quotation history schema.
//!
//! Reseeding replaces the whole dataset, so repeated `seed` runs stay
//! deterministic. Customer profiles intentionally span the three
//! segmentation tiers (high-value recent, occasional, dormant), and line
//! totals use the surrounding workflow's baseline formula
//! `unit_price × quantity × max(area, 1.0)`.

use fenestra_core::domain::product::{Product, ProductId};
use fenestra_core::repository::RepositoryError;
use tracing::info;

use crate::DbPool;

/// Markup over base cost used for fixture unit prices.
const UNIT_PRICE_MARKUP: f64 = 1.8;

const CATALOG: &[(&str, &str, f64)] = &[
    ("Double-Hung Model A", "Double-Hung Window", 28.75),
    ("Casement Model A", "Casement Window", 32.50),
    ("Bay Model A", "Bay Window", 47.25),
    ("Picture Model A", "Picture Window", 24.10),
    ("Sliding Door Model A", "Sliding Door", 39.80),
    ("French Door Model A", "French Door", 52.40),
];

struct SeedQuote {
    title: &'static str,
    days_ago: i64,
    /// (catalog index, quantity, width_ft, height_ft)
    items: &'static [(usize, i64, f64, f64)],
}

struct SeedCustomer {
    name: &'static str,
    quotes: &'static [SeedQuote],
}

const CUSTOMERS: &[SeedCustomer] = &[
    SeedCustomer {
        name: "Alice Smith",
        quotes: &[
            SeedQuote {
                title: "Full house refit",
                days_ago: 3,
                items: &[(1, 4, 3.0, 4.5), (2, 1, 6.0, 5.0), (0, 3, 2.5, 4.0)],
            },
            SeedQuote {
                title: "Conservatory glazing",
                days_ago: 9,
                items: &[(3, 2, 5.5, 4.0), (1, 2, 3.0, 4.0)],
            },
            SeedQuote {
                title: "Patio doors",
                days_ago: 16,
                items: &[(4, 2, 6.0, 6.8), (5, 1, 5.0, 6.8)],
            },
            SeedQuote {
                title: "Garage conversion",
                days_ago: 24,
                items: &[(0, 4, 2.5, 3.5), (2, 1, 5.5, 4.5)],
            },
        ],
    },
    SeedCustomer {
        name: "Grace Miller",
        quotes: &[
            SeedQuote {
                title: "New build phase one",
                days_ago: 5,
                items: &[(1, 6, 3.0, 4.5), (4, 1, 6.0, 6.8)],
            },
            SeedQuote {
                title: "New build phase two",
                days_ago: 12,
                items: &[(0, 5, 2.5, 4.0), (3, 2, 5.0, 3.5)],
            },
            SeedQuote {
                title: "Show home upgrade",
                days_ago: 20,
                items: &[(2, 2, 6.0, 5.0), (5, 1, 5.0, 6.8)],
            },
            SeedQuote {
                title: "Annex windows",
                days_ago: 31,
                items: &[(1, 3, 3.0, 4.0), (0, 2, 2.5, 3.5)],
            },
        ],
    },
    SeedCustomer {
        name: "Bob Johnson",
        quotes: &[
            SeedQuote {
                title: "Kitchen window swap",
                days_ago: 42,
                items: &[(1, 1, 3.0, 4.0), (0, 1, 2.5, 3.5)],
            },
            SeedQuote {
                title: "Back door replacement",
                days_ago: 76,
                items: &[(4, 1, 6.0, 6.8)],
            },
        ],
    },
    SeedCustomer {
        name: "Karen Davis",
        quotes: &[
            SeedQuote {
                title: "Bedroom windows",
                days_ago: 55,
                items: &[(0, 2, 2.5, 4.0)],
            },
            SeedQuote {
                title: "Bathroom window",
                days_ago: 91,
                items: &[(3, 1, 2.0, 2.0)],
            },
        ],
    },
    SeedCustomer {
        name: "Hank Wilson",
        quotes: &[SeedQuote {
            title: "Porch window",
            days_ago: 212,
            items: &[(0, 1, 2.5, 3.0)],
        }],
    },
    SeedCustomer {
        name: "Ivy Garcia",
        quotes: &[SeedQuote {
            title: "Hallway window",
            days_ago: 263,
            items: &[(3, 1, 2.5, 3.0)],
        }],
    },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedReport {
    pub customers: usize,
    pub products: usize,
    pub quotations: usize,
    pub line_items: usize,
}

pub struct SeedDataset;

impl SeedDataset {
    /// Replace the database contents with the demo dataset.
    pub async fn load(pool: &DbPool) -> Result<SeedReport, RepositoryError> {
        let mut tx = pool.begin().await.map_err(backend)?;

        for table in ["quotation_item", "quotation", "customer", "product"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        let products = catalog_products();
        for product in &products {
            sqlx::query(
                "INSERT INTO product (id, name, description, category, base_cost_per_sqft) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(product.id.0)
            .bind(&product.name)
            .bind(&product.description)
            .bind(&product.category)
            .bind(product.base_cost_per_sqft)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        let mut report = SeedReport {
            customers: 0,
            products: products.len(),
            quotations: 0,
            line_items: 0,
        };

        let mut quotation_id: i64 = 0;
        for (customer_index, customer) in CUSTOMERS.iter().enumerate() {
            let customer_id = customer_index as i64 + 1;
            sqlx::query("INSERT INTO customer (id, name) VALUES (?1, ?2)")
                .bind(customer_id)
                .bind(customer.name)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            report.customers += 1;

            for quote in customer.quotes {
                quotation_id += 1;
                let mut total_amount = 0.0;
                let lines: Vec<(i64, i64, f64, f64, f64, f64)> = quote
                    .items
                    .iter()
                    .map(|&(product_index, quantity, width, height)| {
                        let base = CATALOG[product_index].2;
                        let unit_price = round2(base * UNIT_PRICE_MARKUP);
                        let area = width * height;
                        let line_total =
                            round2(unit_price * quantity as f64 * area.max(1.0));
                        total_amount += line_total;
                        (
                            product_index as i64 + 1,
                            quantity,
                            width,
                            height,
                            unit_price,
                            line_total,
                        )
                    })
                    .collect();

                sqlx::query(
                    "INSERT INTO quotation (id, title, customer_id, total_amount, status, timestamp) \
                     VALUES (?1, ?2, ?3, ?4, 'Sent', datetime('now', ?5))",
                )
                .bind(quotation_id)
                .bind(quote.title)
                .bind(customer_id)
                .bind(round2(total_amount))
                .bind(format!("-{} days", quote.days_ago))
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
                report.quotations += 1;

                for (product_id, quantity, width, height, unit_price, line_total) in lines {
                    sqlx::query(
                        "INSERT INTO quotation_item \
                         (quotation_id, product_id, quantity, width_ft, height_ft, unit_price, line_total) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )
                    .bind(quotation_id)
                    .bind(product_id)
                    .bind(quantity)
                    .bind(width)
                    .bind(height)
                    .bind(unit_price)
                    .bind(line_total)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
                    report.line_items += 1;
                }
            }
        }

        tx.commit().await.map_err(backend)?;
        info!(
            customers = report.customers,
            products = report.products,
            quotations = report.quotations,
            line_items = report.line_items,
            "seeded demo dataset"
        );
        Ok(report)
    }

    /// Row counts currently in the database, for post-seed verification.
    pub async fn verify(pool: &DbPool) -> Result<SeedReport, RepositoryError> {
        Ok(SeedReport {
            customers: count(pool, "customer").await?,
            products: count(pool, "product").await?,
            quotations: count(pool, "quotation").await?,
            line_items: count(pool, "quotation_item").await?,
        })
    }
}

fn catalog_products() -> Vec<Product> {
    CATALOG
        .iter()
        .enumerate()
        .map(|(index, &(name, category, base_cost_per_sqft))| Product {
            id: ProductId(index as i64 + 1),
            name: name.to_string(),
            description: Some(format!(
                "High-efficiency {} with low-E glass and a sturdy frame.",
                category.to_lowercase()
            )),
            category: category.to_string(),
            base_cost_per_sqft,
        })
        .collect()
}

async fn count(pool: &DbPool, table: &str) -> Result<usize, RepositoryError> {
    let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .map_err(backend)?;
    Ok(row.0.max(0) as usize)
}

fn backend(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(error.to_string())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use fenestra_core::repository::QuotationHistoryRepository;

    use crate::{connect_url, migrations, SqlHistoryRepository};

    use super::SeedDataset;

    #[tokio::test]
    async fn seeding_is_deterministic_and_idempotent() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let first = SeedDataset::load(&pool).await.expect("seed");
        let second = SeedDataset::load(&pool).await.expect("reseed");
        assert_eq!(first, second);

        let verified = SeedDataset::verify(&pool).await.expect("verify");
        assert_eq!(verified, second);
        assert_eq!(verified.customers, 6);
        assert_eq!(verified.products, 6);
    }

    #[tokio::test]
    async fn seeded_history_feeds_both_estimators() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SeedDataset::load(&pool).await.expect("seed");

        let repository = SqlHistoryRepository::new(pool);

        let lines = repository.priced_line_history().await.expect("lines");
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|line| line.quantity >= 1));
        assert!(lines.iter().all(|line| line.line_total > 0.0));
        assert!(lines.iter().all(|line| !line.category.is_empty()));

        let histories = repository.customer_histories().await.expect("histories");
        assert_eq!(histories.len(), 6);
        let alice = histories
            .iter()
            .find(|history| history.customer.name == "Alice Smith")
            .expect("Alice seeded");
        assert_eq!(alice.quotations.len(), 4);
        assert!(alice.quotations.iter().all(|quote| quote.total_amount > 0.0));
    }
}
