/*
* Command line interface
* ----------------------
* usage-meter
* ├── serve [--port]                      run the HTTP API
* ├── run [--duration] [--report-to]      meter one session in the foreground
* ├── quote --cpu-core-seconds ...        price arbitrary usage totals
* ├── dashboard                           live terminal dashboard
* └── init [--force]                      write config/default.toml
*
* --config accepts either a directory (default.toml + local.toml) or a
* single file.
*/

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tracing::{error, info};

use crate::billing::SessionRecord;
use crate::config::Settings;
use crate::core::SessionManager;
use crate::monitoring::UsageTotals;
use crate::pricing::{CostBreakdown, PricingTable, PRICING_FORMULA};
use crate::reporting::ReportDispatcher;

#[derive(Parser)]
#[command(name = "usage-meter")]
#[command(about = "Pay-as-you-go resource usage meter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, value_name = "CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Meter a single session in the foreground
    Run {
        /// Session length in seconds (Ctrl-C ends it early)
        #[arg(short, long, default_value_t = 30)]
        duration: u64,
        /// Send the session report to this address afterwards
        #[arg(short, long)]
        report_to: Option<String>,
    },
    /// Price a set of usage totals
    Quote {
        #[arg(long, default_value_t = 0.0)]
        cpu_core_seconds: f64,
        #[arg(long, default_value_t = 0.0)]
        ram_gb_seconds: f64,
        #[arg(long, default_value_t = 0.0)]
        storage_gb_hours: f64,
        #[arg(long, default_value_t = 0.0)]
        bandwidth_gb: f64,
        #[arg(long, default_value_t = 0.0)]
        kwh: f64,
    },
    /// Start interactive dashboard
    Dashboard,
    /// Generate default configuration
    Init {
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// The dashboard owns the terminal; log lines would tear its screen.
    pub fn wants_log_output(&self) -> bool {
        !matches!(self.command, Commands::Dashboard)
    }
}

pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(p) if p.is_dir() => Settings::new_from_dir(p)?,
        Some(p) => Settings::new_from_file(p)?,
        None => Settings::new()?,
    };
    Ok(settings)
}

pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    let settings = || load_settings(config_path.as_deref());

    match cli.command {
        Commands::Init { force } => handle_init_command(force)?,
        Commands::Serve { port } => {
            let settings = settings()?;
            let server_port = port.unwrap_or(settings.server.port);
            info!("Starting server on port {}", server_port);
            crate::api::serve(&settings, server_port).await?;
        }
        Commands::Run { duration, report_to } => {
            let settings = settings()?;
            let destination = report_to.or_else(|| settings.reporting.default_destination.clone());
            handle_run_command(&settings, Duration::from_secs(duration), destination).await?;
        }
        Commands::Quote {
            cpu_core_seconds,
            ram_gb_seconds,
            storage_gb_hours,
            bandwidth_gb,
            kwh,
        } => {
            let settings = settings()?;
            let mut usage = UsageTotals::default();
            usage.cpu_core_seconds = cpu_core_seconds;
            usage.ram_gb_seconds = ram_gb_seconds;
            usage.storage_gb_hours = storage_gb_hours;
            usage.bandwidth_gb = bandwidth_gb;
            usage.estimated_kwh = kwh;

            let cost = PricingTable::from(&settings.pricing).compute_cost(&usage);
            println!("{}", "Cost breakdown:".bold());
            print_breakdown(&cost);
        }
        Commands::Dashboard => {
            let settings = settings()?;
            let sessions = Arc::new(Mutex::new(SessionManager::from_settings(&settings)));
            crate::dashboard::start_dashboard(sessions).await?;
        }
    }

    Ok(())
}

async fn handle_run_command(
    settings: &Settings,
    duration: Duration,
    report_to: Option<String>,
) -> Result<()> {
    let mut manager = SessionManager::from_settings(settings);
    let handle = manager.start_session().await?;
    println!(
        "{} Session {} started ({}s, sampling every {}s)",
        "✓".green(),
        handle.session_id.bold(),
        duration.as_secs(),
        settings.sample_interval().as_secs()
    );

    let every = settings.sample_interval();
    let deadline = Instant::now() + duration;
    let mut ticker = time::interval_at(Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Interrupted, closing session".yellow());
                break;
            }
            _ = ticker.tick() => {
                let status = manager.status().await?;
                println!(
                    "  {} samples  cpu {:.2} core-s  ram {:.2} GB-s  est. ${:.6}",
                    status.current_usage.samples,
                    status.current_usage.cpu_core_seconds,
                    status.current_usage.ram_gb_seconds,
                    status.estimated_cost
                );
            }
        }
    }

    let record = manager.end_session().await?;
    print_record(&record);

    if let Some(destination) = report_to {
        let dispatcher = ReportDispatcher::from_settings(&settings.reporting);
        match dispatcher
            .send_report(manager.ledger(), &destination, Some(&record.session_id))
            .await
        {
            Ok(receipt) => println!(
                "{} Report {} sent to {}",
                "✓".green(),
                receipt.invoice_id,
                receipt.sent_to
            ),
            Err(e) => error!("Failed to send report: {}", e),
        }
    }

    Ok(())
}

fn print_record(record: &SessionRecord) {
    println!(
        "{} Session {} ended after {:.4} h",
        "✓".green(),
        record.session_id.bold(),
        record.duration_hours
    );
    let usage = &record.resource_usage;
    println!("  CPU          {:.6} core-hours", usage.cpu_core_hours);
    println!("  RAM          {:.6} GB-hours", usage.ram_gb_hours);
    println!("  Storage      {:.6} GB-hours", usage.storage_gb_hours);
    println!("  Bandwidth    {:.6} GB", usage.bandwidth_gb);
    println!("  Electricity  {:.6} kWh", usage.estimated_kwh);
    print_breakdown(&record.breakdown);
}

fn print_breakdown(cost: &CostBreakdown) {
    println!("  cpu          ${:.6}", cost.cpu);
    println!("  ram          ${:.6}", cost.ram);
    println!("  storage      ${:.6}", cost.storage);
    println!("  bandwidth    ${:.6}", cost.bandwidth);
    println!("  electricity  ${:.6}", cost.electricity);
    println!("  raw          ${:.6}", cost.raw_resource_cost);
    println!("  {}        {}", "final".bold(), format!("${:.6}", cost.final_cost).green());
    println!("  ({})", PRICING_FORMULA.dimmed());
}

fn handle_init_command(force: bool) -> Result<()> {
    let config_dir = PathBuf::from("config");
    let target = config_dir.join("default.toml");
    if target.exists() && !force {
        error!("Configuration file already exists. Use --force to overwrite.");
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    let default_config = crate::config::generate_default_config();
    let config_str = toml::to_string_pretty(&default_config)?;
    std::fs::write(&target, config_str)?;

    println!("{} Default configuration generated at {}", "✓".green(), target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults_to_thirty_seconds() {
        let cli = Cli::parse_from(["usage-meter", "run"]);
        match cli.command {
            Commands::Run { duration, report_to } => {
                assert_eq!(duration, 30);
                assert!(report_to.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn quote_parses_usage_flags() {
        let cli = Cli::parse_from([
            "usage-meter",
            "quote",
            "--cpu-core-seconds",
            "3600",
            "--bandwidth-gb",
            "0.5",
        ]);
        match cli.command {
            Commands::Quote { cpu_core_seconds, bandwidth_gb, ram_gb_seconds, .. } => {
                assert_eq!(cpu_core_seconds, 3600.0);
                assert_eq!(bandwidth_gb, 0.5);
                assert_eq!(ram_gb_seconds, 0.0);
            }
            _ => panic!("expected quote"),
        }
    }

    #[test]
    fn dashboard_runs_without_log_output() {
        let dashboard = Cli::parse_from(["usage-meter", "dashboard"]);
        assert!(!dashboard.wants_log_output());

        let serve = Cli::parse_from(["usage-meter", "serve"]);
        assert!(serve.wants_log_output());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["usage-meter", "serve", "--config", "/tmp/meter"]);
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/meter")));
    }
}
