use std::sync::Arc;

use fenestra_core::segmentation::CustomerSegmenter;
use fenestra_db::{connect, migrations, SqlHistoryRepository};

use crate::commands::{load_config, runtime, CommandResult};

pub fn run(clusters: Option<usize>) -> CommandResult {
    let mut config = match load_config("segments") {
        Ok(config) => config,
        Err(result) => return result,
    };
    if let Some(clusters) = clusters {
        if clusters == 0 {
            return CommandResult::failure(
                "segments",
                "invalid_argument",
                "--clusters must be at least 1",
                2,
            );
        }
        config.segmentation.clusters = clusters;
    }
    let runtime = match runtime("segments") {
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

        let segmenter = CustomerSegmenter::new(
            Arc::new(SqlHistoryRepository::new(pool.clone())),
            config.segmentation,
        );
        let rows = segmenter
            .compute()
            .await
            .map_err(|error| ("segmentation", error.to_string(), 5u8))?;

        pool.close().await;
        Ok(rows)
    });

    match outcome {
        Ok(rows) => {
            let detail = serde_json::to_value(&rows).unwrap_or_default();
            CommandResult::success_with_detail(
                "segments",
                format!("segmented {} customers", rows.len()),
                detail,
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("segments", error_class, message, exit_code)
        }
    }
}
