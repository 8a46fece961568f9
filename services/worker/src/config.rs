use serde::Deserialize;

/// Main configuration for the archive worker
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Worker loop configuration
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Archive storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Worker loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Seconds to sleep between poll cycles
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Seconds between status snapshots
    #[serde(default = "default_status_interval_seconds")]
    pub status_interval_seconds: u64,
    /// Maximum messages fetched per poll cycle
    #[serde(default = "default_max_messages_per_poll")]
    pub max_messages_per_poll: usize,
    /// Directory the status snapshot file is written to
    #[serde(default = "default_health_dir")]
    pub health_dir: String,
}

/// Queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Source queue URL
    #[serde(default)]
    pub queue_url: String,
    /// Dead-letter queue URL
    pub dead_letter_url: Option<String>,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for LocalStack, ElasticMQ, etc.)
    pub endpoint_url: Option<String>,
    /// Run without a queue backend (empty receives, no-op acks)
    #[serde(default = "default_true")]
    pub offline: bool,
    /// Upper bound on messages fetched in one receive call
    #[serde(default = "default_max_messages_per_poll")]
    pub max_messages_per_poll: usize,
    /// Long-poll wait in seconds for receive calls
    #[serde(default = "default_receive_wait_seconds")]
    pub receive_wait_seconds: i32,
}

/// Archive storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// S3 bucket name for the archive
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Key prefix for archived envelopes
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Write to a local filesystem mirror instead of S3
    #[serde(default = "default_true")]
    pub offline: bool,
    /// Root directory for the local mirror
    #[serde(default = "default_local_root")]
    pub local_root: String,
}

// Default value functions
fn default_service_name() -> String {
    "mailstream-worker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_poll_interval_seconds() -> u64 {
    10
}

fn default_status_interval_seconds() -> u64 {
    30
}

fn default_max_messages_per_poll() -> usize {
    10
}

fn default_health_dir() -> String {
    "./health".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_receive_wait_seconds() -> i32 {
    20
}

fn default_bucket() -> String {
    "email-data-bucket".to_string()
}

fn default_prefix() -> String {
    "emails".to_string()
}

fn default_local_root() -> String {
    "./uploads".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/worker").required(false))
            .add_source(config::File::with_name("/etc/mailstream/worker").required(false))
            // Override with environment variables
            // WORKER__QUEUE__QUEUE_URL -> queue.queue_url
            .add_source(
                config::Environment::with_prefix("WORKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            status_interval_seconds: default_status_interval_seconds(),
            max_messages_per_poll: default_max_messages_per_poll(),
            health_dir: default_health_dir(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            dead_letter_url: None,
            region: default_region(),
            endpoint_url: None,
            offline: true,
            max_messages_per_poll: default_max_messages_per_poll(),
            receive_wait_seconds: default_receive_wait_seconds(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            prefix: default_prefix(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            offline: true,
            local_root: default_local_root(),
        }
    }
}
