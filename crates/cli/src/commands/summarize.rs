use fenestra_core::narrative::{NarrativeGenerator, QuoteNarrativeInput};

use crate::commands::{load_config, runtime, CommandResult};

pub fn run(payload: &str, template_only: bool) -> CommandResult {
    let input: QuoteNarrativeInput = match serde_json::from_str(payload) {
        Ok(input) => input,
        Err(error) => {
            return CommandResult::failure(
                "summarize",
                "invalid_payload",
                format!(
                    "payload must be a JSON object with customer_name, items, total_amount: {error}"
                ),
                2,
            );
        }
    };

    let config = match load_config("summarize") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("summarize") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let generator = if template_only {
        NarrativeGenerator::template_only()
    } else {
        NarrativeGenerator::new(config.summary)
    };
    let summary = runtime.block_on(generator.generate(&input));

    CommandResult::success_with_detail(
        "summarize",
        summary.clone(),
        serde_json::json!({ "summary": summary }),
    )
}
