//! Subcommands and the command wire format they share.

pub mod clip;
pub mod config;
pub mod health;
pub mod resource;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Command posted to `/api/v1/commands`.
#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandRequest {
    Start {
        resource: i32,
    },
    Stop {
        resource: i32,
    },
    MakeHourlyClips {
        resource: i32,
        start: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        length_secs: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        codec: Option<String>,
    },
    MakeDayLongClip {
        resource: i32,
        day: NaiveDate,
        include_low_quality: bool,
    },
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Instance {
    pub resource: i32,
    pub format: String,
    pub range: TimeRange,
    pub path: String,
    #[serde(default)]
    pub low_quality: bool,
}

/// Reply to a handled command.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum CommandReply {
    Scheduled {
        resource: i32,
        hourly_next_run: Option<DateTime<Utc>>,
        day_long_next_run: Option<DateTime<Utc>>,
    },
    Stopped {
        resource: i32,
        was_scheduled: bool,
    },
    Clips {
        resource: i32,
        instances: Vec<Instance>,
    },
}

pub const COMMANDS_PATH: &str = "/api/v1/commands";
