//! Configuration management for the rc server
//!
//! Supports configuration via:
//! - Environment variables (primary)
//! - Optional TOML config file (secondary)
//!
//! Environment variables take precedence over config file values. The
//! resulting `Config` is fixed for the lifetime of the server.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Storage backend type of a configured remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Directory on the local filesystem
    Local,
    /// Process-local in-memory store
    Memory,
    /// AWS S3 (or an S3-compatible endpoint)
    Aws,
    /// Azure Blob Storage
    Azure,
    /// Google Cloud Storage
    Gcp,
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "file" => Ok(BackendType::Local),
            "memory" | "mem" => Ok(BackendType::Memory),
            "aws" | "s3" => Ok(BackendType::Aws),
            "azure" => Ok(BackendType::Azure),
            "gcp" | "gcs" | "google" => Ok(BackendType::Gcp),
            _ => Err(format!("Unknown backend type: {}", s)),
        }
    }
}

/// A named storage remote the browser can address as `[name]path`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Backend type
    #[serde(rename = "type")]
    pub backend_type: BackendType,

    /// Local-only: directory the remote is rooted at
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Cloud-only: container/bucket name
    #[serde(default)]
    pub container_or_bucket: Option<String>,

    /// Optional path prefix for all objects
    #[serde(default)]
    pub prefix: Option<String>,

    /// AWS-specific: region (defaults to us-east-1)
    #[serde(default)]
    pub region: Option<String>,

    /// AWS-specific: endpoint URL (for S3-compatible services)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Allow plain HTTP endpoints
    #[serde(default)]
    pub allow_http: bool,
}

impl RemoteConfig {
    /// Check the fields the backend type needs are present
    pub fn validate(&self, name: &str) -> anyhow::Result<()> {
        match self.backend_type {
            BackendType::Local if self.root.is_none() => {
                bail!("remote {:?}: local remotes need a root directory", name)
            }
            BackendType::Aws | BackendType::Azure | BackendType::Gcp
                if self.container_or_bucket.is_none() =>
            {
                bail!("remote {:?}: container_or_bucket is required", name)
            }
            _ => Ok(()),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1:5572)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Request timeout in seconds, 0 for none (default: 0)
    ///
    /// Sync calls are cancelled when it fires.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Max POST body size in bytes (default: 16MiB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            timeout_secs: 0,
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5572))
}

fn default_max_body_size() -> usize {
    16 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

/// Remote control options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcConfig {
    /// Run the rc server at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Skip the auth check on operations that require it
    #[serde(default)]
    pub no_auth: bool,

    /// Serve configured remotes under `[name]path`
    #[serde(default)]
    pub serve: bool,

    /// Directory of static files to serve on GET
    #[serde(default)]
    pub files: Option<PathBuf>,

    /// Basic auth user name
    #[serde(default)]
    pub user: Option<String>,

    /// Basic auth password
    #[serde(default, skip_serializing)]
    pub pass: Option<String>,

    /// Expose Prometheus metrics on /metrics
    #[serde(default)]
    pub metrics: bool,

    /// Max concurrently running async jobs (unlimited when unset)
    #[serde(default)]
    pub max_jobs: Option<usize>,

    /// Seconds a finished job stays queryable (default: 60)
    #[serde(default = "default_job_expire_secs")]
    pub job_expire_secs: u64,
}

fn default_job_expire_secs() -> u64 {
    60
}

impl Default for RcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            no_auth: false,
            serve: false,
            files: None,
            user: None,
            pass: None,
            metrics: false,
            max_jobs: None,
            job_expire_secs: default_job_expire_secs(),
        }
    }
}

impl RcConfig {
    /// True when an auth mechanism is set up on the listener
    pub fn using_auth(&self) -> bool {
        self.user.is_some() || self.pass.is_some()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote control configuration
    #[serde(default)]
    pub rc: RcConfig,

    /// Storage remotes by name
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteConfig>,

    /// Log level (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rc: RcConfig::default(),
            remotes: BTreeMap::new(),
            log_level: default_log_level(),
        }
    }
}

fn parse_bool(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{}: invalid boolean {:?}", name, value),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - RCSERVER_CONFIG_FILE: optional path to TOML config file
    /// - RCSERVER_BIND_ADDRESS: server bind address (default: 127.0.0.1:5572)
    /// - RCSERVER_TIMEOUT_SECS: request timeout, 0 for none (default: 0)
    /// - RCSERVER_MAX_BODY_SIZE: max POST body in bytes (default: 16MiB)
    /// - RCSERVER_ENABLED: run the rc server (default: true)
    /// - RCSERVER_NO_AUTH: skip auth checks on auth-required operations
    /// - RCSERVER_SERVE: serve remotes under /[name]path
    /// - RCSERVER_FILES: static files directory
    /// - RCSERVER_USER / RCSERVER_PASS: basic auth credentials
    /// - RCSERVER_METRICS: expose /metrics
    /// - RCSERVER_MAX_JOBS: cap on running async jobs
    /// - RCSERVER_JOB_EXPIRE_SECS: how long finished jobs are kept (default: 60)
    /// - RCSERVER_LOG_LEVEL: log level (default: info)
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match std::env::var("RCSERVER_CONFIG_FILE") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        Self::from_toml(&content).with_context(|| format!("invalid config file {}", path))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from a variable lookup
    fn apply_env<F>(&mut self, var: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = var("RCSERVER_BIND_ADDRESS") {
            self.server.bind_address = addr
                .parse()
                .with_context(|| format!("RCSERVER_BIND_ADDRESS: invalid address {:?}", addr))?;
        }
        if let Some(timeout) = var("RCSERVER_TIMEOUT_SECS") {
            self.server.timeout_secs = timeout.parse().context("RCSERVER_TIMEOUT_SECS")?;
        }
        if let Some(size) = var("RCSERVER_MAX_BODY_SIZE") {
            self.server.max_body_size = size.parse().context("RCSERVER_MAX_BODY_SIZE")?;
        }
        if let Some(v) = var("RCSERVER_ENABLED") {
            self.rc.enabled = parse_bool("RCSERVER_ENABLED", &v)?;
        }
        if let Some(v) = var("RCSERVER_NO_AUTH") {
            self.rc.no_auth = parse_bool("RCSERVER_NO_AUTH", &v)?;
        }
        if let Some(v) = var("RCSERVER_SERVE") {
            self.rc.serve = parse_bool("RCSERVER_SERVE", &v)?;
        }
        if let Some(files) = var("RCSERVER_FILES") {
            self.rc.files = Some(PathBuf::from(files));
        }
        if let Some(user) = var("RCSERVER_USER") {
            self.rc.user = Some(user);
        }
        if let Some(pass) = var("RCSERVER_PASS") {
            self.rc.pass = Some(pass);
        }
        if let Some(v) = var("RCSERVER_METRICS") {
            self.rc.metrics = parse_bool("RCSERVER_METRICS", &v)?;
        }
        if let Some(v) = var("RCSERVER_MAX_JOBS") {
            self.rc.max_jobs = Some(v.parse().context("RCSERVER_MAX_JOBS")?);
        }
        if let Some(v) = var("RCSERVER_JOB_EXPIRE_SECS") {
            self.rc.job_expire_secs = v.parse().context("RCSERVER_JOB_EXPIRE_SECS")?;
        }
        if let Some(level) = var("RCSERVER_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, remote) in &self.remotes {
            if name.is_empty() || name.contains(']') {
                bail!("invalid remote name {:?}", name);
            }
            remote.validate(name)?;
        }
        Ok(())
    }
}
