mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::AppConfig;
use parfum_core::{FunnelError, ReceiptRejection, Storage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "parfum")]
#[command(about = "Parfum sales bot - receipt-verified purchase funnel")]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the database and stored receipts
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot
    Run,

    /// Check an extracted receipt text offline
    Verify {
        /// File with the extractor output
        #[arg(short, long)]
        text: PathBuf,
        /// Quantity the receipt should pay for
        #[arg(short, long)]
        quantity: u32,
    },

    /// Show prize tiers for a range of order numbers
    Prizes {
        #[arg(long, default_value_t = 1)]
        from: u64,
        #[arg(long, default_value_t = 1000)]
        to: u64,
    },

    /// List open orders of a user
    Orders {
        /// Chat user id
        user_id: i64,
    },

    /// Assign items to an order, e.g. "Rose Oud: 2, Amber: 1"
    Select {
        order_id: i64,
        selections: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "parfum={},parfum_core={}",
            log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    tokio::fs::create_dir_all(&config.data_dir).await?;
    let storage = Arc::new(Storage::new(&config.database_path()).await?);

    let result = match cli.command {
        Commands::Run => commands::handle_run(&config, storage).await,
        Commands::Verify { text, quantity } => {
            commands::handle_verify(&config, &storage, &text, quantity).await
        }
        Commands::Prizes { from, to } => {
            commands::handle_prizes(&config.funnel.prize_schedule, from, to)
        }
        Commands::Orders { user_id } => commands::handle_orders(&storage, user_id).await,
        Commands::Select {
            order_id,
            selections,
        } => commands::handle_select(&storage, order_id, &selections).await,
    };

    if let Err(e) = result {
        match e {
            FunnelError::Rejected(ReceiptRejection::WrongPrice {
                expected, actual, ..
            }) => {
                eprintln!("Rejected: wrong amount");
                eprintln!("Expected: {}, Receipt: {}", expected, actual);
            }
            FunnelError::Rejected(rejection) => {
                eprintln!("Rejected: {}", rejection);
            }
            FunnelError::OrderNotFound(id) => {
                eprintln!("Error: Order #{} not found", id);
                eprintln!("Use 'parfum orders <user_id>' to see open orders");
            }
            FunnelError::Config(msg) => {
                eprintln!("Error: Invalid configuration: {}", msg);
            }
            _ => {
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
