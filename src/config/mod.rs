//! # Configuration Management
//!
//! Environment-driven configuration for the gateway. Every value has a
//! default except the shared authentication secret; a missing secret is
//! reported when the [`Authenticator`](crate::auth::Authenticator) is built.

pub mod project;

use std::path::PathBuf;
use std::time::Duration;

use validator::Validate;
use zeroize::Zeroizing;

use crate::converter::Format;
use crate::errors::{Error, Result};

pub use project::{ProjectConfig, PROJECT_FILE_NAME};

/// Top-level application configuration
#[derive(Debug, Clone, Validate)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
    #[validate(nested)]
    pub converter: ConverterConfig,
    pub confluence: ConfluenceConfig,
    pub publish: PublishConfig,
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1, message = "Bind address cannot be empty"))]
    pub bind_address: String,
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 3000 }
    }
}

/// Shared-secret authentication
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub token: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig").field("token_set", &self.token.is_some()).finish()
    }
}

/// Fixed-window rate limiting
#[derive(Debug, Clone, Validate)]
pub struct RateLimitConfig {
    #[validate(range(min = 1, message = "Rate limit must allow at least one request"))]
    pub max_requests: u32,
    #[validate(range(min = 1000, message = "Rate limit window must be at least one second"))]
    pub window_ms: u64,
    /// Key clients by the first `X-Forwarded-For` hop instead of the peer
    /// address. Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_requests: 100, window_ms: 60_000, trust_forwarded_for: false }
    }
}

/// Which converter backend renders diagrams, images and documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterBackend {
    /// Local `mmdc`, `magick` and `pandoc` subprocesses
    Cli,
    /// Remote conversion service
    Http,
}

impl std::str::FromStr for ConverterBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cli" => Ok(ConverterBackend::Cli),
            "http" => Ok(ConverterBackend::Http),
            other => Err(Error::config(format!(
                "Unknown converter backend '{}', expected 'cli' or 'http'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct ConverterConfig {
    pub backend: ConverterBackend,
    pub base_url: Option<String>,
    #[validate(range(min = 1, max = 600, message = "Conversion timeout must be 1-600 seconds"))]
    pub timeout_secs: u64,
    #[validate(length(min = 1))]
    pub mmdc_bin: String,
    #[validate(length(min = 1))]
    pub magick_bin: String,
    #[validate(length(min = 1))]
    pub pandoc_bin: String,
    pub diagram_format: Format,
}

impl ConverterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            backend: ConverterBackend::Cli,
            base_url: None,
            timeout_secs: 30,
            mmdc_bin: "mmdc".to_string(),
            magick_bin: "magick".to_string(),
            pandoc_bin: "pandoc".to_string(),
            diagram_format: Format::Png,
        }
    }
}

/// Remote wiki connection and the environment-level publish defaults
#[derive(Clone, Default)]
pub struct ConfluenceConfig {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub api_token: Option<Zeroizing<String>>,
    pub default_space_key: Option<String>,
    pub default_parent_page_id: Option<String>,
}

impl std::fmt::Debug for ConfluenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("api_token_set", &self.api_token.is_some())
            .field("default_space_key", &self.default_space_key)
            .field("default_parent_page_id", &self.default_parent_page_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Location of the persisted path-to-page cache
    pub cache_path: PathBuf,
    /// Fallback directory searched for a project file
    pub project_dir: Option<PathBuf>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self { cache_path: PathBuf::from(".pageplane/page-cache.json"), project_dir: None }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct ObservabilityConfig {
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,
    pub json_logs: bool,
    /// Prometheus exporter port, disabled when zero
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logs: false, metrics_port: 0 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            converter: ConverterConfig::default(),
            confluence: ConfluenceConfig::default(),
            publish: PublishConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let server = ServerConfig {
            bind_address: get("PAGEPLANE_BIND_ADDRESS").unwrap_or(defaults.server.bind_address),
            port: parse_or(get("PAGEPLANE_PORT"), "PAGEPLANE_PORT", defaults.server.port)?,
        };

        let auth = AuthConfig { token: get("PAGEPLANE_AUTH_TOKEN").map(Zeroizing::new) };

        let rate_limit = RateLimitConfig {
            max_requests: parse_or(
                get("PAGEPLANE_RATE_LIMIT_MAX_REQUESTS"),
                "PAGEPLANE_RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit.max_requests,
            )?,
            window_ms: parse_or(
                get("PAGEPLANE_RATE_LIMIT_WINDOW_MS"),
                "PAGEPLANE_RATE_LIMIT_WINDOW_MS",
                defaults.rate_limit.window_ms,
            )?,
            trust_forwarded_for: parse_or(
                get("PAGEPLANE_TRUST_FORWARDED_FOR"),
                "PAGEPLANE_TRUST_FORWARDED_FOR",
                defaults.rate_limit.trust_forwarded_for,
            )?,
        };

        let converter = ConverterConfig {
            backend: match get("PAGEPLANE_CONVERTER") {
                Some(value) => value.parse()?,
                None => defaults.converter.backend,
            },
            base_url: get("PAGEPLANE_CONVERTER_URL"),
            timeout_secs: parse_or(
                get("PAGEPLANE_CONVERSION_TIMEOUT_SECS"),
                "PAGEPLANE_CONVERSION_TIMEOUT_SECS",
                defaults.converter.timeout_secs,
            )?,
            mmdc_bin: get("PAGEPLANE_MMDC_BIN").unwrap_or(defaults.converter.mmdc_bin),
            magick_bin: get("PAGEPLANE_MAGICK_BIN").unwrap_or(defaults.converter.magick_bin),
            pandoc_bin: get("PAGEPLANE_PANDOC_BIN").unwrap_or(defaults.converter.pandoc_bin),
            diagram_format: match get("PAGEPLANE_DIAGRAM_FORMAT") {
                Some(value) => Format::from_name(&value).ok_or_else(|| {
                    Error::config(format!("Unsupported diagram format '{}'", value))
                })?,
                None => defaults.converter.diagram_format,
            },
        };

        let confluence = ConfluenceConfig {
            base_url: get("CONFLUENCE_BASE_URL"),
            username: get("CONFLUENCE_USERNAME"),
            api_token: get("CONFLUENCE_API_TOKEN").map(Zeroizing::new),
            default_space_key: get("CONFLUENCE_SPACE_KEY"),
            default_parent_page_id: get("CONFLUENCE_PARENT_PAGE_ID"),
        };

        let publish = PublishConfig {
            cache_path: get("PAGEPLANE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.publish.cache_path),
            project_dir: get("PAGEPLANE_PROJECT_DIR").map(PathBuf::from),
        };

        let observability = ObservabilityConfig {
            log_level: get("PAGEPLANE_LOG_LEVEL").unwrap_or(defaults.observability.log_level),
            json_logs: get("PAGEPLANE_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            metrics_port: parse_or(
                get("PAGEPLANE_METRICS_PORT"),
                "PAGEPLANE_METRICS_PORT",
                defaults.observability.metrics_port,
            )?,
        };

        let config =
            Config { server, auth, rate_limit, converter, confluence, publish, observability };
        config.validate()?;
        Ok(config)
    }

    /// Validate field ranges plus the cross-field rules
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)?;

        if self.converter.backend == ConverterBackend::Http && self.converter.base_url.is_none() {
            return Err(Error::config(
                "PAGEPLANE_CONVERTER_URL is required when PAGEPLANE_CONVERTER=http",
            ));
        }

        if !self.converter.diagram_format.is_diagram_output() {
            return Err(Error::config(format!(
                "Diagram format '{}' cannot be rendered from Mermaid",
                self.converter.diagram_format
            )));
        }

        Ok(())
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("Invalid value for {}: {} ({})", key, raw, e))),
        None => Ok(default),
    }
}
