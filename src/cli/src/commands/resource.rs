//! Resource scheduling commands.
//!
//! Start and stop the hourly and day-long jobs of a resource, or show when
//! they will next run.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use super::{CommandReply, CommandRequest, COMMANDS_PATH};
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ResourceCommands {
    /// Schedule clip jobs for a resource
    Start {
        /// Resource ID
        id: i32,
    },

    /// Cancel clip jobs for a resource
    Stop {
        /// Resource ID
        id: i32,
    },

    /// Show the next runs of one or more scheduled resources
    Schedule {
        /// Resource IDs
        #[arg(required = true)]
        ids: Vec<i32>,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct ScheduleView {
    resource: i32,
    hourly_next_run: Option<DateTime<Utc>>,
    day_long_next_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Tabled)]
struct ScheduleRow {
    #[tabled(rename = "Resource")]
    resource: i32,
    #[tabled(rename = "Next hourly")]
    hourly: String,
    #[tabled(rename = "Next day-long")]
    day_long: String,
}

impl From<&ScheduleView> for ScheduleRow {
    fn from(view: &ScheduleView) -> Self {
        Self {
            resource: view.resource,
            hourly: output::fmt_time(view.hourly_next_run),
            day_long: output::fmt_time(view.day_long_next_run),
        }
    }
}

pub async fn execute(cmd: ResourceCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        ResourceCommands::Start { id } => {
            let reply: CommandReply = client
                .post(COMMANDS_PATH, &CommandRequest::Start { resource: id })
                .await?;

            match (&reply, format) {
                (
                    CommandReply::Scheduled {
                        hourly_next_run,
                        day_long_next_run,
                        ..
                    },
                    OutputFormat::Table,
                ) => {
                    output::print_success(&format!("Resource {} scheduled", id));
                    output::print_detail("Next hourly run", &output::fmt_time(*hourly_next_run));
                    output::print_detail("Next day-long run", &output::fmt_time(*day_long_next_run));
                }
                (CommandReply::Scheduled { .. }, _) => output::print_item(&reply, format)?,
                (other, _) => bail!("Unexpected reply to START: {:?}", other),
            }
        }

        ResourceCommands::Stop { id } => {
            let reply: CommandReply = client
                .post(COMMANDS_PATH, &CommandRequest::Stop { resource: id })
                .await?;

            match (&reply, format) {
                (CommandReply::Stopped { was_scheduled, .. }, OutputFormat::Table) => {
                    if *was_scheduled {
                        output::print_success(&format!("Resource {} stopped", id));
                    } else {
                        output::print_info(&format!("Resource {} was not scheduled", id));
                    }
                }
                (CommandReply::Stopped { .. }, _) => output::print_item(&reply, format)?,
                (other, _) => bail!("Unexpected reply to STOP: {:?}", other),
            }
        }

        ResourceCommands::Schedule { ids } => {
            let mut views = Vec::with_capacity(ids.len());
            for id in ids {
                let view: ScheduleView = client
                    .get(&format!("/api/v1/resources/{}/schedule", id))
                    .await?;
                views.push(view);
            }

            match format {
                OutputFormat::Table => {
                    let rows: Vec<ScheduleRow> = views.iter().map(ScheduleRow::from).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(&views, format)?,
            }
        }
    }

    Ok(())
}
