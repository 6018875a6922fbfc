//! # factdex
//!
//! The main binary for factdex: fact fixtures, the index over them, and node
//! selection by facts.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │              apps/factdex (THE BINARY)        │
//! │                                               │
//! │   ┌─────────────┐        ┌────────────────┐   │
//! │   │    CLI      │        │  TOML config   │   │
//! │   │   (clap)    │        │ (toml + serde) │   │
//! │   └──────┬──────┘        └───────┬────────┘   │
//! │          └───────────┬───────────┘            │
//! │                      ▼                        │
//! │              ┌───────────────┐                │
//! │              │ factdex-core  │                │
//! │              │  (THE LOGIC)  │                │
//! │              └───────────────┘                │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! factdex -c factdex.toml index --hosts web1,db1
//! factdex -c factdex.toml facts -H web1
//! factdex -c factdex.toml select -s env=prod -p role=db --show-facts
//! factdex nodes --full
//! ```

use clap::Parser;
use factdex::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // FACTDEX_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("FACTDEX_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "factdex=debug"
    } else {
        "factdex=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
