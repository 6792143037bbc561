//! Configuration management.
//!
//! Values come from an optional config file and `SKYREEL__SECTION__KEY`
//! environment variables, e.g. `SKYREEL__EMAIL__SMTP_HOST`.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::ServiceName;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Command API server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Resource database configuration
    pub database: DatabaseConfig,

    /// Media storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Encoder configuration
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Clip job configuration
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Watchdog configuration
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Monitored service configuration
    #[serde(default)]
    pub services: ServicesConfig,

    /// Admin email configuration
    #[serde(default)]
    pub email: EmailConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root folder of the media tree
    #[serde(default = "default_storage_root")]
    pub root_folder: PathBuf,

    /// Timeout for storage calls (seconds)
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,

    /// Maximum number of instances fetched for one hour
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_folder: default_storage_root(),
            timeout_secs: default_storage_timeout(),
            max_instances: default_max_instances(),
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    /// Path to the ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Length of an hourly clip in seconds
    #[serde(default = "default_movie_length")]
    pub movie_length_secs: u32,

    /// Video codec for the primary (AVI) clip
    #[serde(default = "default_vcodec")]
    pub vcodec: String,

    /// Scratch directory for encoder work files
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Clip shown for hours with no hourly clip in a day-long video
    #[serde(default = "default_placeholder_clip")]
    pub placeholder_clip: PathBuf,

    /// Artifacts smaller than this are treated as missing
    #[serde(default = "default_min_clip_bytes")]
    pub min_clip_bytes: u64,

    /// Timeout for one encode (seconds)
    #[serde(default = "default_encode_timeout")]
    pub timeout_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            movie_length_secs: default_movie_length(),
            vcodec: default_vcodec(),
            work_dir: default_work_dir(),
            placeholder_clip: default_placeholder_clip(),
            min_clip_bytes: default_min_clip_bytes(),
            timeout_secs: default_encode_timeout(),
        }
    }
}

impl EncoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Minimum images for a camera clip
    #[serde(default = "default_min_instances")]
    pub camera_min_instances: usize,

    /// Minimum images for a map loop clip
    #[serde(default = "default_min_instances")]
    pub map_loop_min_instances: usize,

    /// Minutes past the hour before day-long assembly may start
    #[serde(default = "default_retrieve_grace")]
    pub retrieve_grace_minutes: u32,

    /// Extra minutes after the grace period during which assembly may still start
    #[serde(default = "default_day_long_wait")]
    pub day_long_max_wait_minutes: u32,

    /// Timeout for live image probes (seconds)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Brand used in job email subjects
    #[serde(default = "default_brand")]
    pub brand: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            camera_min_instances: default_min_instances(),
            map_loop_min_instances: default_min_instances(),
            retrieve_grace_minutes: default_retrieve_grace(),
            day_long_max_wait_minutes: default_day_long_wait(),
            probe_timeout_secs: default_probe_timeout(),
            brand: default_brand(),
        }
    }
}

impl JobsConfig {
    /// Latest minute of the hour at which a day-long assembly may start.
    pub fn last_runnable_minute(&self) -> u32 {
        self.retrieve_grace_minutes + self.day_long_max_wait_minutes
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Tick schedule of one watchdog.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct TickConfig {
    /// Run this watchdog
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minutes between ticks
    pub interval_minutes: u32,

    /// Minute past the hour of the first tick
    pub offset_minutes: u32,
}

impl TickConfig {
    pub const fn new(interval_minutes: u32, offset_minutes: u32) -> Self {
        Self {
            enabled: true,
            interval_minutes,
            offset_minutes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_movie_tick")]
    pub movie: TickConfig,

    #[serde(default = "default_retrieval_tick")]
    pub retrieval: TickConfig,

    #[serde(default = "default_storage_tick")]
    pub storage: TickConfig,

    #[serde(default = "default_remote_db_tick")]
    pub remote_database: TickConfig,

    /// Consecutive missed captures tolerated by the retrieval check
    #[serde(default = "default_tolerance_factor")]
    pub tolerance_factor: u64,

    /// Timeout for probes issued by checks (seconds)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            movie: default_movie_tick(),
            retrieval: default_retrieval_tick(),
            storage: default_storage_tick(),
            remote_database: default_remote_db_tick(),
            tolerance_factor: default_tolerance_factor(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl WatchdogConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Program used to query and control service units
    #[serde(default = "default_systemctl")]
    pub systemctl_path: PathBuf,

    #[serde(default = "default_storage_unit")]
    pub storage_unit: String,

    #[serde(default = "default_retrieval_unit")]
    pub retrieval_unit: String,

    #[serde(default = "default_movie_unit")]
    pub movie_unit: String,

    #[serde(default = "default_weatherdb_unit")]
    pub weatherdb_unit: String,

    /// Base URL of the retrieval service command API
    #[serde(default = "default_retrieval_url")]
    pub retrieval_command_url: String,

    /// Base URL of the remote database proxy
    #[serde(default = "default_remote_db_url")]
    pub remote_database_url: String,

    /// Timeout for process control and command dispatch (seconds)
    #[serde(default = "default_control_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            systemctl_path: default_systemctl(),
            storage_unit: default_storage_unit(),
            retrieval_unit: default_retrieval_unit(),
            movie_unit: default_movie_unit(),
            weatherdb_unit: default_weatherdb_unit(),
            retrieval_command_url: default_retrieval_url(),
            remote_database_url: default_remote_db_url(),
            timeout_secs: default_control_timeout(),
        }
    }
}

impl ServicesConfig {
    /// OS unit name for a monitored service.
    pub fn unit_name(&self, service: ServiceName) -> &str {
        match service {
            ServiceName::Storage => &self.storage_unit,
            ServiceName::Retrieval => &self.retrieval_unit,
            ServiceName::Movie => &self.movie_unit,
            ServiceName::WeatherDb => &self.weatherdb_unit,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// SMTP server hostname; email is disabled when unset
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    #[serde(default = "default_from_address")]
    pub from_address: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Enable STARTTLS
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Administrator recipients
    #[serde(default)]
    pub admins: Vec<String>,

    /// Timeout for one send (seconds)
    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from_address: default_from_address(),
            from_name: default_from_name(),
            use_tls: true,
            admins: Vec::new(),
            timeout_secs: default_email_timeout(),
        }
    }
}

impl EmailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8085 }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_storage_root() -> PathBuf { PathBuf::from("/var/lib/skyreel/storage") }
fn default_storage_timeout() -> u64 { 60 }
fn default_max_instances() -> usize { 360 }
fn default_ffmpeg_path() -> PathBuf { PathBuf::from("ffmpeg") }
fn default_movie_length() -> u32 { 12 }
fn default_vcodec() -> String { "mpeg4".to_string() }
fn default_work_dir() -> PathBuf { std::env::temp_dir().join("skyreel") }
fn default_placeholder_clip() -> PathBuf { PathBuf::from("/var/lib/skyreel/no-data.mp4") }
fn default_min_clip_bytes() -> u64 { 100 }
fn default_encode_timeout() -> u64 { 900 }
fn default_min_instances() -> usize { 1 }
fn default_retrieve_grace() -> u32 { 10 }
fn default_day_long_wait() -> u32 { 30 }
fn default_probe_timeout() -> u64 { 10 }
fn default_brand() -> String { "Skyreel".to_string() }
fn default_true() -> bool { true }
fn default_movie_tick() -> TickConfig { TickConfig::new(60, 16) }
fn default_retrieval_tick() -> TickConfig { TickConfig::new(15, 14) }
fn default_storage_tick() -> TickConfig { TickConfig::new(15, 12) }
fn default_remote_db_tick() -> TickConfig { TickConfig::new(15, 5) }
fn default_tolerance_factor() -> u64 { 15 }
fn default_systemctl() -> PathBuf { PathBuf::from("systemctl") }
fn default_storage_unit() -> String { "skyreel-storage".to_string() }
fn default_retrieval_unit() -> String { "skyreel-retrieval".to_string() }
fn default_movie_unit() -> String { "skyreel-movie".to_string() }
fn default_weatherdb_unit() -> String { "skyreel-weatherdb".to_string() }
fn default_retrieval_url() -> String { "http://localhost:8086".to_string() }
fn default_remote_db_url() -> String { "http://localhost:8087".to_string() }
fn default_control_timeout() -> u64 { 60 }
fn default_smtp_port() -> u16 { 587 }
fn default_from_address() -> String { "watchdog@localhost".to_string() }
fn default_from_name() -> String { "Skyreel Watchdog".to_string() }
fn default_email_timeout() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(Self::environment())
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(Self::environment())
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("SKYREEL")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("email.admins")
            .try_parsing(true)
    }
}
