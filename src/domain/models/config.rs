use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Saturates instead of panicking on values chrono cannot represent.
fn secs_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Main configuration structure for turnguard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Transcript reconciler configuration
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Terminal watchdog configuration
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Terminal bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Notification channel configuration
    #[serde(default)]
    pub events: EventsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".turnguard/turnguard.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// `sqlx` connection URL for the configured path.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::Daily
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Stdout format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Directory for rotated JSON log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation policy for file output
    #[serde(default)]
    pub rotation: RotationPolicy,

    /// Whether to also log to stdout when `log_dir` is set
    #[serde(default = "default_true")]
    pub enable_stdout: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
            enable_stdout: default_true(),
        }
    }
}

/// Transcript reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconcilerConfig {
    /// Max distance between a transcript entry and a stored turn to count as the same turn
    #[serde(default = "default_match_window_secs")]
    pub match_window_secs: u64,

    /// Max transcript entries examined per invocation
    #[serde(default = "default_max_entries_per_call")]
    pub max_entries_per_call: usize,

    /// Deviation above which a matched turn's timestamp is corrected
    #[serde(default = "default_timestamp_tolerance_ms")]
    pub timestamp_tolerance_ms: u64,

    /// Prefix length of the legacy content key format
    #[serde(default = "default_legacy_prefix_chars")]
    pub legacy_prefix_chars: usize,

    /// Interval of the periodic reconciliation sweep
    #[serde(default = "default_reconcile_interval_secs")]
    pub interval_secs: u64,
}

const fn default_match_window_secs() -> u64 {
    120
}

const fn default_max_entries_per_call() -> usize {
    500
}

const fn default_timestamp_tolerance_ms() -> u64 {
    2_000
}

const fn default_legacy_prefix_chars() -> usize {
    200
}

const fn default_reconcile_interval_secs() -> u64 {
    60
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            match_window_secs: default_match_window_secs(),
            max_entries_per_call: default_max_entries_per_call(),
            timestamp_tolerance_ms: default_timestamp_tolerance_ms(),
            legacy_prefix_chars: default_legacy_prefix_chars(),
            interval_secs: default_reconcile_interval_secs(),
        }
    }
}

impl ReconcilerConfig {
    pub fn match_window(&self) -> TimeDelta {
        secs_delta(self.match_window_secs)
    }

    pub fn timestamp_tolerance(&self) -> TimeDelta {
        i64::try_from(self.timestamp_tolerance_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Terminal watchdog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WatchdogConfig {
    /// Delay between sweeps over all registered agents
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long unexplained pane output may persist before escalating
    #[serde(default = "default_gap_threshold_ms")]
    pub gap_threshold_ms: u64,

    /// Number of pane lines captured per poll
    #[serde(default = "default_capture_lines")]
    pub capture_lines: u32,

    /// Timeout for one pane capture
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,

    /// How far back recorded turns count as explaining pane output
    #[serde(default = "default_recent_turn_window_secs")]
    pub recent_turn_window_secs: u64,

    /// Number of trailing pane lines compared against recent turns
    #[serde(default = "default_snippet_lines")]
    pub snippet_lines: usize,
}

const fn default_poll_interval_ms() -> u64 {
    2_000
}

const fn default_gap_threshold_ms() -> u64 {
    5_000
}

const fn default_capture_lines() -> u32 {
    50
}

const fn default_capture_timeout_secs() -> u64 {
    2
}

const fn default_recent_turn_window_secs() -> u64 {
    30
}

const fn default_snippet_lines() -> usize {
    6
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            gap_threshold_ms: default_gap_threshold_ms(),
            capture_lines: default_capture_lines(),
            capture_timeout_secs: default_capture_timeout_secs(),
            recent_turn_window_secs: default_recent_turn_window_secs(),
            snippet_lines: default_snippet_lines(),
        }
    }
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn gap_threshold(&self) -> Duration {
        Duration::from_millis(self.gap_threshold_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn recent_turn_window(&self) -> TimeDelta {
        secs_delta(self.recent_turn_window_secs)
    }
}

/// Terminal bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// tmux binary used for capture and send
    #[serde(default = "default_tmux_binary")]
    pub tmux_binary: String,

    /// Timeout for `send_text`
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

fn default_tmux_binary() -> String {
    "tmux".to_string()
}

const fn default_send_timeout_secs() -> u64 {
    5
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tmux_binary: default_tmux_binary(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers lag instead of blocking writers
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_channel_capacity() -> usize {
    1024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}
