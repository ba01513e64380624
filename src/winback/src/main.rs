//! Winback: WhatsApp coupon campaign for users whose recharge has lapsed.
//!
//! Loads users, classifies them by days since their last recharge, sends one
//! coupon per eligible user, and writes the notified flag back to the CSV.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{debug, error, info};
use winback_campaign::CampaignRunner;
use winback_cdp::UserSource;
use winback_core::config::{AppConfig, SourceKind};

#[derive(Parser, Debug)]
#[command(name = "winback")]
#[command(about = "Send discount coupons over WhatsApp to users who stopped recharging")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to ./winback.toml when present)
    #[arg(long, short = 'c', env = "WINBACK_CONFIG")]
    config: Option<PathBuf>,

    /// User source: csv or api (overrides config)
    #[arg(long)]
    source: Option<SourceKind>,

    /// CSV file of users (overrides config)
    #[arg(long)]
    csv_path: Option<PathBuf>,

    /// User API endpoint (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// Date treated as today, YYYY-MM-DD (defaults to the local date)
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// Do not write the notified flag back to the CSV
    #[arg(long, default_value_t = false)]
    no_write_back: bool,

    /// Print the full run report as JSON on stdout when the run ends
    #[arg(long, default_value_t = false)]
    report_json: bool,

    /// Write run counters in Prometheus text format (node_exporter textfile)
    #[arg(long, env = "WINBACK_METRICS_FILE")]
    metrics_file: Option<PathBuf>,
}

/// Write the current metrics snapshot to `path`, replacing it atomically.
fn write_metrics(handle: &PrometheusHandle, path: &Path) -> anyhow::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, handle.render())
        .with_context(|| format!("cannot write metrics to {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("cannot move metrics into {}", path.display()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "winback=info,winback_campaign=info,winback_cdp=info,winback_channels=info,winback_loyalty=info"
                    .into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Winback starting up");

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Apply CLI overrides
    if let Some(kind) = cli.source {
        config.source.kind = kind;
    }
    if let Some(path) = cli.csv_path {
        config.source.csv_path = path;
    }
    if let Some(url) = cli.api_url {
        config.source.api_url = url;
    }
    if cli.no_write_back {
        config.campaign.write_back = false;
    }

    config.validate().context("invalid configuration")?;

    let as_of = cli.as_of.unwrap_or_else(|| Local::now().date_naive());

    info!(
        source = ?config.source.kind,
        coupons = ?config.coupons.strategy,
        validity_days = config.campaign.validity_days,
        write_back = config.campaign.write_back,
        as_of = %as_of,
        "Configuration loaded"
    );

    let source = UserSource::from_config(&config.source)?;
    let runner = CampaignRunner::from_config(&config)?;

    let report = runner
        .execute(&source, as_of, config.campaign.write_back)
        .await?;

    match &cli.metrics_file {
        Some(path) => {
            if let Err(e) = write_metrics(&metrics_handle, path) {
                error!(error = %e, "Failed to write metrics file");
            } else {
                info!(path = %path.display(), "Run metrics written");
            }
        }
        None => debug!(metrics = %metrics_handle.render(), "Run metrics"),
    }

    if cli.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.write_back_failed() {
        error!(run_id = %report.run_id, "Run finished but notified flags were not saved");
        bail!("write-back of notified flags failed; rerunning may resend coupons");
    }

    Ok(())
}
