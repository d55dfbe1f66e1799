use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "engage-cli")]
#[command(about = "Engage command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one match pass over every enabled organization.
    Match,
    /// Serve the JSON API over run reports.
    Serve,
    /// Print a digest of recent match runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Match) {
        Commands::Match => {
            let summary = engage_pipeline::run_match_once_from_env().await?;
            println!(
                "match run complete: run_id={} orgs={} needs={} matched_pairs={} notified={} reports={}",
                summary.run_id,
                summary.enabled_orgs,
                summary.parsed_needs,
                summary.matched_pairs,
                summary.notifications_dispatched,
                summary.reports_dir
            );
        }
        Commands::Serve => {
            engage_web::serve_from_env().await?;
        }
        Commands::Report { runs } => {
            let digest = engage_pipeline::report_recent_markdown(runs, None)?;
            println!("{digest}");
        }
    }

    Ok(())
}
