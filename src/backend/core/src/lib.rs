#![allow(clippy::result_large_err)]
//! # Skyreel Core
//!
//! Recurring clip scheduler and self-healing watchdog for weather camera feeds.
//!
//! ## Architecture
//!
//! - **Jobs**: per-resource hourly and day-long clip schedules, each family on its own serial lane
//! - **Watchdogs**: periodic movie, retrieval, storage and remote-database checks that restart what broke and email admins
//! - **Command**: start/stop/make-clip commands over HTTP or in-process
//! - **Services**: collaborator traits (database, storage, encoder, process control, email) and their shipped implementations

pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod jobs;
pub mod resource;
pub mod services;
pub mod telemetry;
pub mod watchdog;

pub use error::{ErrorCode, ErrorSeverity, Result, SkyreelError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{fixed_clock, system_clock, Clock, TimeRange};
    pub use crate::command::{Command, CommandHandler, CommandReply};
    pub use crate::error::{ErrorCode, Result, SkyreelError};
    pub use crate::jobs::{
        ClipJob, ClipSettings, JobContext, JobFamily, JobOutcome, JobRegistry, JobTick,
        SerialJobRunner, SkipReason,
    };
    pub use crate::resource::{CaptureFormat, CollectionSpan, Resource, ResourceId, ResourceKind};
    pub use crate::services::{
        ClipRequest, CommandSink, Database, Encoder, HourlyClips, ImageProbe, Instance,
        InstanceKind, Mailer, MediaFormat, ProcessControl, RemoteDatabase, ServiceName, Storage,
    };
    pub use crate::watchdog::{
        FailureTracker, Notifier, SystemCheck, WatchdogErrorEvent, WatchdogLoop, WatchdogService,
    };
}
