//! # cardgraph
//!
//! Loads a card transaction CSV into a graph store: customers and merchants
//! as nodes, purchases as relationships.
//!
//! ## Usage
//!
//! ```bash
//! # Full load into a local Neo4j
//! cardgraph -f fraudTrain.csv
//!
//! # Embedded store, answering every reset prompt with "yes"
//! cardgraph -B redb -D cards.redb -f fraudTrain.csv --yes run
//!
//! # Counts only
//! cardgraph -B redb -D cards.redb status
//! ```

use cardgraph::cli;
use cardgraph::report::{self, Disposition};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // CARDGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("CARDGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cardgraph=info,cardgraph_core=info".into());

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

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        // The command itself failed, so there is no later step to continue with.
        let code = match report::report("cardgraph", &e) {
            Disposition::Exit(code) => code,
            Disposition::Continue => 1,
        };
        std::process::exit(code);
    }
}

fn print_banner() {
    println!(
        r#"
  cardgraph v{}
  card transactions -> customers, merchants, purchases
"#,
        env!("CARGO_PKG_VERSION")
    );
}
