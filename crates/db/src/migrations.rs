use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, MIGRATOR};
    use crate::connect_url;

    const HISTORY_TABLES: &str = "('customer', 'product', 'quotation', 'quotation_item')";

    async fn table_count(pool: &crate::DbPool) -> i64 {
        sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM sqlite_master \
             WHERE type = 'table' AND name IN {HISTORY_TABLES}"
        ))
        .fetch_one(pool)
        .await
        .expect("count tables")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_the_history_schema() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        assert_eq!(table_count(&pool).await, 4);
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_url("sqlite::memory:").await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert_eq!(table_count(&pool).await, 0);

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(table_count(&pool).await, 4);
    }
}
