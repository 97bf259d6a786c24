//! # Skillbox CLI (`skb`)
//!
//! The `skb` binary is the primary interface for Skillbox. It provides
//! commands for checking configured sources, running one-shot queries, and
//! starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! skb --config ./config/skillbox.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `skb sources` | List configured skill sources and their health |
//! | `skb query "<text>"` | Load sources, then rank skills against the text |
//! | `skb serve` | Start the HTTP server with background workers |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use skillbox::config::{load_config, SourceSpec};
use skillbox::server::run_server;
use skillbox::service::SkillService;

/// Skillbox — a semantic skill index and retrieval server for AI agents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/skillbox.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "skb",
    about = "Skillbox — a semantic skill index and retrieval server for AI agents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/skillbox.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List configured skill sources and their health.
    Sources,

    /// Load the configured sources and rank skills against a query.
    ///
    /// Runs ingestion to completion first, so slow remote sources delay
    /// the answer; use `serve` for a long-running index.
    Query {
        /// The task description to match skills against.
        text: String,

        /// Maximum number of results to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the HTTP server.
    ///
    /// Background ingestion begins immediately and the server accepts
    /// queries while it runs; the change-detection scheduler starts when
    /// `[refresh].enabled` is set.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Sources => {
            println!("{:<48} {:<10}", "SOURCE", "STATUS");
            for source in &config.sources {
                let status = match source {
                    SourceSpec::Local { path, .. } => {
                        if path.is_dir() {
                            "OK"
                        } else {
                            "MISSING"
                        }
                    }
                    SourceSpec::Github { .. } => "REMOTE",
                };
                println!("{:<48} {:<10}", source.locator(), status);
            }
            if config.sources.is_empty() {
                println!("(no sources configured)");
            }
            Ok(())
        }

        Commands::Query { text, top_k } => {
            let service = SkillService::new(config)?;
            service.start().await;

            // One-shot mode: wait for ingestion before answering.
            while !service.is_ready() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            let response = service.query(&text, top_k, None).await?;
            if response.hits.is_empty() {
                println!("No results.");
            } else {
                for (rank, hit) in response.hits.iter().enumerate() {
                    println!(
                        "{}. {} ({:.3})\n   {}",
                        rank + 1,
                        hit.skill.name,
                        hit.score,
                        hit.skill.description
                    );
                }
            }

            let status = service.status();
            for error in &status.errors {
                eprintln!("warning: {}", error);
            }

            service.stop().await;
            Ok(())
        }

        Commands::Serve => {
            let service = SkillService::new(config)?;
            service.start().await;

            let server = run_server(service.clone());
            tokio::select! {
                result = server => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    service.stop().await;
                }
            }
            Ok(())
        }
    }
}
