use std::sync::Arc;

use fenestra_core::pricing::PriceEstimator;
use fenestra_db::{connect, migrations, SqlHistoryRepository};

use crate::commands::{load_config, runtime, CommandResult};

pub fn run(items: &str) -> CommandResult {
    let payload: serde_json::Value = match serde_json::from_str(items) {
        Ok(payload) => payload,
        Err(error) => {
            return CommandResult::failure(
                "predict",
                "invalid_payload",
                format!("items must be a JSON array: {error}"),
                2,
            );
        }
    };

    let config = match load_config("predict") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("predict") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let outcome = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let estimator = PriceEstimator::new(
            Arc::new(SqlHistoryRepository::new(pool.clone())),
            config.pricing,
        );
        let total = estimator
            .predict_from_json(payload)
            .await
            .map_err(|error| ("prediction", error.to_string(), 5u8))?;

        pool.close().await;
        Ok(total)
    });

    match outcome {
        Ok(total) => CommandResult::success_with_detail(
            "predict",
            format!("predicted quote total: {total:.2}"),
            serde_json::json!({ "predicted_total": total }),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("predict", error_class, message, exit_code)
        }
    }
}
