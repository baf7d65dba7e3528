//! Configuration module for environment variable parsing.
//!
//! Every setting has a default, so the service starts with an empty
//! environment (log-only transport, scheduler every 60 seconds).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    // =========================================================================
    // Scheduler
    // =========================================================================
    /// Whether the periodic trigger runs at all
    pub scheduler_enabled: bool,

    /// Seconds between two periodic cycles
    pub scheduler_interval_secs: u64,

    /// Page size used when walking a topic's subscribers
    pub subscriber_page_size: usize,

    // =========================================================================
    // Worker pool
    // =========================================================================
    /// Workers draining the backlog
    pub worker_core_size: usize,

    /// Core workers plus burst workers used once the backlog is full
    pub worker_max_size: usize,

    /// Deliveries allowed to wait for a core worker
    pub worker_queue_capacity: usize,

    /// Longest a submission waits for a backlog slot before being rejected
    pub worker_submit_timeout_ms: u64,

    // =========================================================================
    // Mail
    // =========================================================================
    /// Mailgun-compatible messages endpoint; unset means log-only delivery
    pub mail_api_url: Option<String>,

    /// API key for the messages endpoint
    pub mail_api_key: Option<String>,

    /// Sender address
    pub mail_from: String,

    /// Per-request timeout for the mail API in milliseconds
    pub mail_timeout_ms: u64,

    /// Base URL used to link each email to its content
    pub content_base_url: Option<String>,

    /// Optional JSON seed loaded into the store at startup
    pub seed_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            scheduler_enabled: true,
            scheduler_interval_secs: 60,
            subscriber_page_size: 1000,
            worker_core_size: 20,
            worker_max_size: 50,
            worker_queue_capacity: 5000,
            worker_submit_timeout_ms: 30_000,
            mail_api_url: None,
            mail_api_key: None,
            mail_from: "no-reply@newsletter-service.com".to_string(),
            mail_timeout_ms: 10_000,
            content_base_url: None,
            seed_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let config = Config {
            port: parse_var("PORT", defaults.port),

            scheduler_enabled: parse_bool("SCHEDULER_ENABLED", defaults.scheduler_enabled),

            scheduler_interval_secs: parse_var(
                "SCHEDULER_INTERVAL_SECONDS",
                defaults.scheduler_interval_secs,
            ),

            subscriber_page_size: parse_var("SUBSCRIBER_PAGE_SIZE", defaults.subscriber_page_size),

            worker_core_size: parse_var("WORKER_CORE_SIZE", defaults.worker_core_size),

            worker_max_size: parse_var("WORKER_MAX_SIZE", defaults.worker_max_size),

            worker_queue_capacity: parse_var(
                "WORKER_QUEUE_CAPACITY",
                defaults.worker_queue_capacity,
            ),

            worker_submit_timeout_ms: parse_var(
                "WORKER_SUBMIT_TIMEOUT_MS",
                defaults.worker_submit_timeout_ms,
            ),

            mail_api_url: non_empty("MAIL_API_URL"),

            mail_api_key: non_empty("MAIL_API_KEY"),

            mail_from: non_empty("MAIL_FROM").unwrap_or(defaults.mail_from),

            mail_timeout_ms: parse_var("MAIL_TIMEOUT_MS", defaults.mail_timeout_ms),

            content_base_url: non_empty("CONTENT_BASE_URL"),

            seed_path: non_empty("NEWSLETTER_SEED_PATH").map(PathBuf::from),
        };

        config.normalized()
    }

    /// Clamp sizes that would make the scheduler or the pool unusable.
    pub fn normalized(mut self) -> Self {
        if self.scheduler_interval_secs == 0 {
            warn!("scheduler_interval_zero, using 1 second");
            self.scheduler_interval_secs = 1;
        }
        if self.subscriber_page_size == 0 {
            warn!("subscriber_page_size_zero, using 1");
            self.subscriber_page_size = 1;
        }
        if self.worker_core_size == 0 {
            warn!("worker_core_size_zero, using 1");
            self.worker_core_size = 1;
        }
        if self.worker_max_size < self.worker_core_size {
            warn!(
                core = self.worker_core_size,
                max = self.worker_max_size,
                "worker_max_below_core, raising max to core"
            );
            self.worker_max_size = self.worker_core_size;
        }
        if self.worker_queue_capacity == 0 {
            warn!("worker_queue_capacity_zero, using 1");
            self.worker_queue_capacity = 1;
        }
        self
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    pub fn worker_submit_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_submit_timeout_ms)
    }

    pub fn mail_timeout(&self) -> Duration {
        Duration::from_millis(self.mail_timeout_ms)
    }
}

/// Parse a variable into `T`, keeping `default` when unset or invalid.
fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean flag, accepting `true/false`, `1/0`, `yes/no`.
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            default
        }
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_valid() {
        env::set_var("TEST_PARSE_VAR_VALID", "250");
        assert_eq!(parse_var("TEST_PARSE_VAR_VALID", 10usize), 250);
        env::remove_var("TEST_PARSE_VAR_VALID");
    }

    #[test]
    fn test_parse_var_invalid_uses_default() {
        env::set_var("TEST_PARSE_VAR_INVALID", "lots");
        assert_eq!(parse_var("TEST_PARSE_VAR_INVALID", 60u64), 60);
        env::remove_var("TEST_PARSE_VAR_INVALID");
    }

    #[test]
    fn test_parse_bool() {
        env::set_var("TEST_PARSE_BOOL", "no");
        assert!(!parse_bool("TEST_PARSE_BOOL", true));
        env::remove_var("TEST_PARSE_BOOL");
        assert!(parse_bool("TEST_PARSE_BOOL", true));
    }

    #[test]
    fn test_non_empty() {
        env::set_var("TEST_NON_EMPTY", "   ");
        assert_eq!(non_empty("TEST_NON_EMPTY"), None);
        env::set_var("TEST_NON_EMPTY", " https://example.com ");
        assert_eq!(
            non_empty("TEST_NON_EMPTY"),
            Some("https://example.com".to_string())
        );
        env::remove_var("TEST_NON_EMPTY");
    }

    #[test]
    fn test_normalized_raises_max_to_core() {
        let config = Config {
            worker_core_size: 30,
            worker_max_size: 10,
            worker_queue_capacity: 0,
            subscriber_page_size: 0,
            ..Config::default()
        }
        .normalized();

        assert_eq!(config.worker_max_size, 30);
        assert_eq!(config.worker_queue_capacity, 1);
        assert_eq!(config.subscriber_page_size, 1);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler_interval(), Duration::from_secs(60));
        assert_eq!(config.worker_core_size, 20);
        assert_eq!(config.worker_max_size, 50);
        assert_eq!(config.worker_queue_capacity, 5000);
        assert_eq!(config.subscriber_page_size, 1000);
    }
}
