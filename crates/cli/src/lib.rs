pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fenestra_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "fenestra",
    about = "Fenestra quotation estimation CLI",
    long_about = "Operate the Fenestra estimation core: migrations, demo data, pricing \
                  model training, draft-quote prediction, customer segmentation, and \
                  narrative summaries.",
    after_help = "Examples:\n  fenestra seed\n  fenestra train\n  fenestra predict --items \
                  '[{\"category\":\"Casement Window\",\"width_ft\":3,\"height_ft\":4,\"quantity\":2}]'\n  \
                  fenestra segments --clusters 3"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset (replaces existing rows)")]
    Seed,
    #[command(about = "Train the pricing artifact from historical line items")]
    Train,
    #[command(about = "Predict a draft-quote total from a JSON item array")]
    Predict {
        #[arg(long, help = "JSON array of draft line items")]
        items: String,
    },
    #[command(about = "Compute customer segments from quotation history")]
    Segments {
        #[arg(long, help = "Number of clusters (default from config)")]
        clusters: Option<usize>,
    },
    #[command(about = "Generate a narrative summary for a quote payload")]
    Summarize {
        #[arg(long, help = "JSON object with customer_name, items, total_amount")]
        payload: String,
        #[arg(long, help = "Skip the learned compression step")]
        template_only: bool,
    },
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // A second init (e.g. under test) is harmless, so failures are ignored.
    let result = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };
    let _ = result;
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Train => commands::train::run(),
        Command::Predict { items } => commands::predict::run(&items),
        Command::Segments { clusters } => commands::segments::run(clusters),
        Command::Summarize { payload, template_only } => {
            commands::summarize::run(&payload, template_only)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
