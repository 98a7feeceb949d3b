use std::sync::Arc;

use fenestra_core::pricing::PriceEstimator;
use fenestra_db::{connect, migrations, SqlHistoryRepository};

use crate::commands::{load_config, runtime, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("train") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("train") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let pricing = config.pricing.clone();
    let outcome = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let estimator =
            PriceEstimator::new(Arc::new(SqlHistoryRepository::new(pool.clone())), pricing);
        let artifact = estimator
            .train()
            .await
            .map_err(|error| ("training", error.to_string(), 5u8))?;

        pool.close().await;
        Ok(artifact)
    });

    match outcome {
        Ok(artifact) => {
            let path = config
                .pricing
                .artifact_path
                .unwrap_or(config.pricing.local_artifact_path);
            CommandResult::success_with_detail(
                "train",
                format!(
                    "trained pricing artifact over {} rows ({} categories)",
                    artifact.training_rows,
                    artifact.encoder.width()
                ),
                serde_json::json!({
                    "training_rows": artifact.training_rows,
                    "categories": artifact.encoder.categories(),
                    "artifact_path": path.display().to_string(),
                }),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("train", error_class, message, exit_code)
        }
    }
}
