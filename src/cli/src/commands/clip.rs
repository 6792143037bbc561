//! On-demand clip commands.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use super::{CommandReply, CommandRequest, Instance, COMMANDS_PATH};
use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ClipCommands {
    /// Make the clips for one hour
    Hourly {
        /// Resource ID
        id: i32,

        /// Start of the hour, RFC 3339 or "YYYY-MM-DD HH:MM" in UTC
        #[arg(short, long)]
        start: String,

        /// Clip length in seconds
        #[arg(short, long)]
        length: Option<u32>,

        /// Video codec passed to the encoder
        #[arg(short, long)]
        codec: Option<String>,
    },

    /// Make the day-long clip for a local calendar day
    DayLong {
        /// Resource ID
        id: i32,

        /// Day in the resource's time zone (YYYY-MM-DD)
        #[arg(short, long)]
        day: NaiveDate,

        /// Leave the low-quality variant out
        #[arg(long)]
        no_low_quality: bool,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct ClipRow {
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Low quality")]
    low_quality: bool,
    #[tabled(rename = "Path")]
    path: String,
}

impl From<&Instance> for ClipRow {
    fn from(instance: &Instance) -> Self {
        Self {
            format: instance.format.clone(),
            start: output::fmt_time(Some(instance.range.start)),
            end: output::fmt_time(Some(instance.range.end)),
            low_quality: instance.low_quality,
            path: instance.path.clone(),
        }
    }
}

fn parse_start(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .with_context(|| format!("Invalid start time: {}", raw))?;
    Ok(naive.and_utc())
}

pub async fn execute(cmd: ClipCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let request = match cmd {
        ClipCommands::Hourly {
            id,
            start,
            length,
            codec,
        } => CommandRequest::MakeHourlyClips {
            resource: id,
            start: parse_start(&start)?,
            length_secs: length,
            codec,
        },
        ClipCommands::DayLong {
            id,
            day,
            no_low_quality,
        } => CommandRequest::MakeDayLongClip {
            resource: id,
            day,
            include_low_quality: !no_low_quality,
        },
    };

    let reply: CommandReply = client.post(COMMANDS_PATH, &request).await?;
    let CommandReply::Clips { resource, instances } = reply else {
        bail!("Unexpected reply: {:?}", reply);
    };

    match format {
        OutputFormat::Table => {
            output::print_success(&format!(
                "{} clip(s) stored for resource {}",
                instances.len(),
                resource
            ));
            let rows: Vec<ClipRow> = instances.iter().map(ClipRow::from).collect();
            output::print_list(&rows, format)?;
        }
        _ => output::print_item(&instances, format)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_formats() {
        let expected: DateTime<Utc> = "2024-06-10T13:00:00Z".parse().unwrap();
        assert_eq!(parse_start("2024-06-10T13:00:00Z").unwrap(), expected);
        assert_eq!(parse_start("2024-06-10T08:00:00-05:00").unwrap(), expected);
        assert_eq!(parse_start("2024-06-10 13:00").unwrap(), expected);
        assert!(parse_start("yesterday").is_err());
    }
}
