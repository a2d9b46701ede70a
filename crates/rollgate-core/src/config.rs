//! rollgate.toml configuration parser.
//!
//! Every section and field is optional. [`Settings::from_config`]
//! resolves the file into concrete values, applying the defaults below.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::duration::parse_duration;
use crate::retry::{RetryPolicy, DEFAULT_REVERT_RETRIES};
use crate::types::StrategyKind;

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "rollgate.toml";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollgateConfig {
    pub endpoint: Option<EndpointConfig>,
    pub validation: Option<ValidationConfig>,
    pub health: Option<HealthConfig>,
    pub rollout: Option<RolloutConfig>,
    pub retry: Option<RetryConfig>,
    pub control_plane: Option<ServiceConfig>,
    pub metrics: Option<ServiceConfig>,
    pub notify: Option<ServiceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Invocation URL template. `{endpoint}` is substituted verbatim,
    /// `{endpoint_encoded}` with `:` and `/` percent-encoded, and
    /// `{qualifier}` with the runtime qualifier.
    pub url_template: Option<String>,
    pub bearer_token: Option<String>,
    pub require_auth: Option<bool>,
    pub timeout: Option<String>,
    pub session_headers: Option<Vec<String>>,
    pub protocol_version: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub probe_tool: Option<String>,
    pub probe_arguments: Option<Map<String, Value>>,
    pub invalid_arguments: Option<Map<String, Value>>,
    pub unknown_method: Option<String>,
    pub latency_samples: Option<u32>,
    pub latency_concurrency: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthConfig {
    pub interval: Option<String>,
    pub window: Option<String>,
    pub max_error_rate: Option<f64>,
    pub max_p99_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolloutConfig {
    pub strategy: Option<StrategyKind>,
    pub stages: Option<Vec<u8>>,
    pub hold: Option<String>,
    pub lease_ttl: Option<String>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub backoff: Option<String>,
    pub revert_max_retries: Option<u32>,
}

/// Base URL (and optional bearer token) of an out-of-process collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub url: Option<String>,
    pub bearer_token: Option<String>,
}

impl RollgateConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load an explicit path (must exist), or `rollgate.toml` in the
    /// working directory if present, or the empty config.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

// ── Resolved settings ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: EndpointSettings,
    pub validation: ValidationSettings,
    pub health: HealthSettings,
    pub rollout: RolloutSettings,
    pub retry: RetryPolicy,
    pub revert_retry: RetryPolicy,
    pub control_plane: ServiceConfig,
    pub metrics: ServiceConfig,
    pub notify: ServiceConfig,
}

#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub url_template: String,
    pub bearer_token: Option<String>,
    pub require_auth: bool,
    pub timeout: Duration,
    pub session_headers: Vec<String>,
    pub protocol_version: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ValidationSettings {
    pub probe_tool: String,
    pub probe_arguments: Map<String, Value>,
    pub invalid_arguments: Map<String, Value>,
    pub unknown_method: String,
    pub latency_samples: u32,
    pub latency_concurrency: u32,
}

#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub interval: Duration,
    pub window: Duration,
    pub max_error_rate: f64,
    pub max_p99_latency_ms: f64,
}

#[derive(Debug, Clone)]
pub struct RolloutSettings {
    pub strategy: StrategyKind,
    pub stages: Vec<u8>,
    pub hold: Duration,
    pub lease_ttl: Duration,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn from_config(config: &RollgateConfig) -> ConfigResult<Self> {
        let endpoint = config.endpoint.clone().unwrap_or_default();
        let validation = config.validation.clone().unwrap_or_default();
        let health = config.health.clone().unwrap_or_default();
        let rollout = config.rollout.clone().unwrap_or_default();
        let retry = config.retry.clone().unwrap_or_default();

        let mut headers: Vec<(String, String)> =
            endpoint.headers.unwrap_or_default().into_iter().collect();
        headers.sort();

        let endpoint = EndpointSettings {
            url_template: endpoint
                .url_template
                .unwrap_or_else(|| "{endpoint}".to_string()),
            bearer_token: endpoint.bearer_token,
            require_auth: endpoint.require_auth.unwrap_or(false),
            timeout: duration_field("endpoint.timeout", endpoint.timeout, "120s")?,
            session_headers: endpoint
                .session_headers
                .unwrap_or_else(|| vec!["mcp-session-id".to_string()]),
            protocol_version: endpoint
                .protocol_version
                .unwrap_or_else(|| "2024-11-05".to_string()),
            headers,
        };

        let validation = ValidationSettings {
            probe_tool: validation
                .probe_tool
                .unwrap_or_else(|| "add_numbers".to_string()),
            probe_arguments: validation.probe_arguments.unwrap_or_else(|| {
                let mut args = Map::new();
                args.insert("a".into(), Value::from(5));
                args.insert("b".into(), Value::from(3));
                args
            }),
            invalid_arguments: validation.invalid_arguments.unwrap_or_else(|| {
                let mut args = Map::new();
                args.insert("a".into(), Value::from("not-a-number"));
                args
            }),
            unknown_method: validation
                .unknown_method
                .unwrap_or_else(|| "nonexistent/method".to_string()),
            latency_samples: validation.latency_samples.unwrap_or(5),
            latency_concurrency: validation.latency_concurrency.unwrap_or(5).max(1),
        };

        let health = HealthSettings {
            interval: duration_field("health.interval", health.interval, "30s")?,
            window: duration_field("health.window", health.window, "60s")?,
            max_error_rate: health.max_error_rate.unwrap_or(0.05),
            max_p99_latency_ms: health.max_p99_latency_ms.unwrap_or(1000.0),
        };
        if !(0.0..=1.0).contains(&health.max_error_rate) {
            return Err(ConfigError::Invalid {
                field: "health.max_error_rate",
                reason: format!("{} is outside 0.0..=1.0", health.max_error_rate),
            });
        }
        if health.interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "health.interval",
                reason: "must be greater than zero".to_string(),
            });
        }

        let rollout = RolloutSettings {
            strategy: rollout.strategy.unwrap_or_default(),
            stages: rollout.stages.unwrap_or_else(|| vec![10, 25, 50, 100]),
            hold: duration_field("rollout.hold", rollout.hold, "5m")?,
            lease_ttl: duration_field("rollout.lease_ttl", rollout.lease_ttl, "1h")?,
            data_dir: rollout
                .data_dir
                .unwrap_or_else(|| PathBuf::from(".rollgate")),
        };

        let policy = RetryPolicy::new(
            retry.max_retries.unwrap_or(RetryPolicy::default().max_retries),
            duration_field("retry.backoff", retry.backoff, "1s")?,
        );
        let revert_retry = RetryPolicy::new(
            retry.revert_max_retries.unwrap_or(DEFAULT_REVERT_RETRIES),
            policy.backoff,
        );

        Ok(Self {
            endpoint,
            validation,
            health,
            rollout,
            retry: policy,
            revert_retry,
            control_plane: config.control_plane.clone().unwrap_or_default(),
            metrics: config.metrics.clone().unwrap_or_default(),
            notify: config.notify.clone().unwrap_or_default(),
        })
    }
}

fn duration_field(
    field: &'static str,
    value: Option<String>,
    default: &str,
) -> ConfigResult<Duration> {
    let raw = value.unwrap_or_else(|| default.to_string());
    parse_duration(&raw).ok_or(ConfigError::Duration { field, value: raw })
}
