use clap::Parser;
use tracing::info;
use usage_meter::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.wants_log_output() {
        tracing_subscriber::fmt::init();
    }
    info!("Starting usage meter");

    cli::run(cli).await
}
