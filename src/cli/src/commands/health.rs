//! Health check command.
//!
//! Queries `/health` and shows the job lanes and watchdog loops.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Include lane and watchdog details
    #[arg(short, long)]
    detailed: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct LaneStats {
    submitted: u64,
    completed: u64,
    failed: u64,
    skipped: u64,
}

#[derive(Debug, Deserialize, Serialize)]
struct LaneHealth {
    scheduled: usize,
    #[serde(default)]
    stats: LaneStats,
}

#[derive(Debug, Deserialize, Serialize)]
struct WatchdogHealth {
    system: String,
    events: usize,
}

#[derive(Debug, Deserialize, Serialize)]
struct Health {
    status: String,
    version: String,
    timestamp: DateTime<Utc>,
    hourly: LaneHealth,
    day_long: LaneHealth,
    #[serde(default)]
    watchdogs: Vec<WatchdogHealth>,
}

#[derive(Debug, Serialize, Tabled)]
struct LaneRow {
    #[tabled(rename = "Lane")]
    lane: &'static str,
    #[tabled(rename = "Scheduled")]
    scheduled: usize,
    #[tabled(rename = "Submitted")]
    submitted: u64,
    #[tabled(rename = "Completed")]
    completed: u64,
    #[tabled(rename = "Skipped")]
    skipped: u64,
    #[tabled(rename = "Failed")]
    failed: u64,
}

impl LaneRow {
    fn new(lane: &'static str, health: &LaneHealth) -> Self {
        Self {
            lane,
            scheduled: health.scheduled,
            submitted: health.stats.submitted,
            completed: health.stats.completed,
            skipped: health.stats.skipped,
            failed: health.stats.failed,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct WatchdogRow {
    #[tabled(rename = "System")]
    system: String,
    #[tabled(rename = "Recorded events")]
    events: usize,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: Health = client.get_raw("/health").await?;

    match format {
        OutputFormat::Table => {
            output::print_header("Skyreel Health");
            output::print_detail("Status", &health.status);
            output::print_detail("API URL", client.base_url());
            output::print_detail("Version", &health.version);
            output::print_detail("Timestamp", &health.timestamp.to_rfc3339());

            if args.detailed {
                output::print_header("Job Lanes");
                output::print_list(
                    &[
                        LaneRow::new("hourly", &health.hourly),
                        LaneRow::new("day-long", &health.day_long),
                    ],
                    format,
                )?;

                output::print_header("Watchdogs");
                let rows: Vec<WatchdogRow> = health
                    .watchdogs
                    .iter()
                    .map(|w| WatchdogRow {
                        system: w.system.clone(),
                        events: w.events,
                    })
                    .collect();
                output::print_list(&rows, format)?;
            }

            if health.status == "healthy" {
                output::print_success("All systems operational");
            } else {
                output::print_error(&format!("System status: {}", health.status));
            }
        }
        _ => output::print_item(&health, format)?,
    }

    Ok(())
}
