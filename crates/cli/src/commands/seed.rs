use fenestra_db::{connect, migrations, SeedDataset};

use crate::commands::{load_config, runtime, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("seed") {
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

        let loaded = SeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verified = SeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        pool.close().await;
        if verified != loaded {
            return Err((
                "seed_verification",
                format!("seeded {loaded:?} but found {verified:?}"),
                6u8,
            ));
        }
        Ok(loaded)
    });

    match outcome {
        Ok(report) => CommandResult::success_with_detail(
            "seed",
            format!(
                "demo dataset loaded: {} customers, {} products, {} quotations, {} line items",
                report.customers, report.products, report.quotations, report.line_items
            ),
            serde_json::json!({
                "customers": report.customers,
                "products": report.products,
                "quotations": report.quotations,
                "line_items": report.line_items,
            }),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
