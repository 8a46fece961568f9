use serde::Deserialize;

/// Main configuration for the ingestion API
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP listener configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Request validation limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging and the health endpoint
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Reported API version
    #[serde(default = "default_version")]
    pub version: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared-secret token callers must present
    #[serde(default = "default_token")]
    pub token: String,
}

/// Field-level validation limits for submitted emails
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum subject length in characters
    #[serde(default = "default_max_subject_length")]
    pub max_subject_length: usize,
    /// Maximum sender length in characters
    #[serde(default = "default_max_sender_length")]
    pub max_sender_length: usize,
    /// Maximum body length in characters
    #[serde(default = "default_max_body_length")]
    pub max_body_length: usize,
    /// Maximum age of the caller-supplied event timestamp, in days
    #[serde(default = "default_max_event_age_days")]
    pub max_event_age_days: i64,
}

/// Queue configuration for the publisher
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Destination queue URL
    #[serde(default)]
    pub queue_url: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for LocalStack, ElasticMQ, etc.)
    pub endpoint_url: Option<String>,
    /// Log published envelopes instead of sending them to a queue
    #[serde(default = "default_true")]
    pub offline: bool,
}

// Default value functions
fn default_service_name() -> String {
    "mailstream-api".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_token() -> String {
    "default_secret_token".to_string()
}

fn default_max_subject_length() -> usize {
    255
}

fn default_max_sender_length() -> usize {
    255
}

fn default_max_body_length() -> usize {
    5000
}

fn default_max_event_age_days() -> i64 {
    7
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/api").required(false))
            .add_source(config::File::with_name("/etc/mailstream/api").required(false))
            // Override with environment variables
            // API__AUTH__TOKEN -> auth.token
            .add_source(
                config::Environment::with_prefix("API")
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
            version: default_version(),
            log_level: default_log_level(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: default_token(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_subject_length: default_max_subject_length(),
            max_sender_length: default_max_sender_length(),
            max_body_length: default_max_body_length(),
            max_event_age_days: default_max_event_age_days(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            region: default_region(),
            endpoint_url: None,
            offline: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.http.port, 5000);
        assert_eq!(config.limits.max_subject_length, 255);
        assert_eq!(config.limits.max_body_length, 5000);
        assert_eq!(config.limits.max_event_age_days, 7);
        assert!(config.queue.offline);
    }
}
