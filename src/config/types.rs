use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Root configuration for dialoutd
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Per-protocol collector listeners
    pub collectors: Collectors,

    /// Socket hook applied to accepted connections
    #[serde(default)]
    pub socket: SocketConfig,

    /// Shared label mapping source
    #[serde(default)]
    pub labels: LabelsConfig,

    /// Delivery sinks
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Logging and metrics
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// The three vendor dial-out listeners. A missing section leaves that
/// protocol disabled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Collectors {
    pub cisco: Option<CollectorConfig>,
    pub nokia: Option<CollectorConfig>,
    pub huawei: Option<CollectorConfig>,
}

impl Collectors {
    /// Names of the enabled collectors, for startup logging.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.cisco.is_some() {
            names.push("cisco");
        }
        if self.nokia.is_some() {
            names.push("nokia");
        }
        if self.huawei.is_some() {
            names.push("huawei");
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.cisco.is_none() && self.nokia.is_none() && self.huawei.is_none()
    }
}

/// One protocol listener.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Bind address
    pub address: SocketAddr,

    /// Acknowledgement cap. `None` uses the protocol default; 0 makes
    /// the protocol fire-and-forget.
    pub replies: Option<u32>,

    /// Maximum inbound frame size in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Completion queue depth
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_max_frame_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_queue_depth() -> usize {
    1024
}

/// Socket hook configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SocketConfig {
    /// Network interface accepted sockets are bound to (SO_BINDTODEVICE).
    /// Best-effort: a failure is logged and the connection proceeds.
    pub bind_device: Option<String>,
}

/// Label mapping source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelsConfig {
    /// CSV file of `key,value,value,...` rows. Reloaded wholesale on
    /// SIGHUP.
    pub path: Option<PathBuf>,
}

/// Delivery sink configuration. Both sinks are optional and
/// independent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryConfig {
    pub queue: Option<QueueConfig>,
    pub push: Option<PushConfig>,
}

impl DeliveryConfig {
    pub fn sink_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.queue.is_some() {
            names.push("queue");
        }
        if self.push.is_some() {
            names.push("push");
        }
        names
    }
}

/// In-process queue producer sink.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Bounded producer capacity; deliveries beyond it are dropped and
    /// logged.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

fn default_queue_capacity() -> usize {
    10_000
}

/// Push socket sink.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Destination endpoint, `host:port`
    pub endpoint: String,

    /// Payloads buffered while the endpoint is unreachable
    #[serde(default = "default_push_buffer")]
    pub buffer: usize,
}

fn default_push_buffer() -> usize {
    1024
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON logs
    #[serde(default)]
    pub json_logs: bool,

    /// Prometheus scrape endpoint; disabled when unset
    pub metrics_address: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_address: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
