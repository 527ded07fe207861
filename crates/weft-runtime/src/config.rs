// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Deployment mode of an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Embed the workflow server and cache in-process.
    #[default]
    Standalone,
    /// Connect to externally managed workflow server and cache.
    Distributed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Standalone => write!(f, "standalone"),
            Mode::Distributed => write!(f, "distributed"),
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standalone" => Ok(Mode::Standalone),
            "distributed" => Ok(Mode::Distributed),
            _ => Err(ConfigError::Invalid(
                "WEFT_MODE",
                "must be 'standalone' or 'distributed'",
            )),
        }
    }
}

/// Weft runtime configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Mode used when the engine builder does not set one
    pub mode: Mode,
    /// Embedded HTTP server
    pub server: ServerConfig,
    /// Durable workflow engine (embedded or external)
    pub workflow_engine: WorkflowEngineConfig,
    /// Resource cache
    pub cache: CacheConfig,
    /// Fallback Redis connection details
    pub redis: RedisConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// `0` lets the OS pick a port.
    pub port: u16,
    pub timeouts: ServerTimeouts,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            timeouts: ServerTimeouts::default(),
        }
    }
}

/// HTTP server timeouts.
#[derive(Debug, Clone)]
pub struct ServerTimeouts {
    pub http_read: Duration,
    /// Also bounds total request handling time.
    pub http_write: Duration,
    pub http_idle: Duration,
    pub http_read_header: Duration,
    /// Graceful shutdown bound. `None` falls back to the embedded start timeout.
    pub server_shutdown: Option<Duration>,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            http_read: Duration::from_secs(15),
            http_write: Duration::from_secs(15),
            http_idle: Duration::from_secs(60),
            http_read_header: Duration::from_secs(5),
            server_shutdown: Some(Duration::from_secs(10)),
        }
    }
}

/// Durable workflow engine settings.
#[derive(Debug, Clone)]
pub struct WorkflowEngineConfig {
    /// `host:port` of the frontend. Required in distributed mode; filled in
    /// with the embedded server's address in standalone mode.
    pub host_port: String,
    pub namespace: String,
    /// Bound on the distributed-mode reachability probe
    pub reachability_timeout: Duration,
    pub standalone: StandaloneWorkflowConfig,
}

impl Default for WorkflowEngineConfig {
    fn default() -> Self {
        Self {
            host_port: String::new(),
            namespace: "default".to_string(),
            reachability_timeout: Duration::from_secs(5),
            standalone: StandaloneWorkflowConfig::default(),
        }
    }
}

/// Embedded workflow server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StandaloneWorkflowConfig {
    /// SQLite file, or `:memory:`
    pub database_file: String,
    pub frontend_port: u16,
    pub bind_ip: String,
    pub namespace: String,
    pub cluster_name: String,
    pub enable_ui: bool,
    /// Fail start when the UI listener cannot be opened
    pub require_ui: bool,
    pub ui_port: u16,
    pub log_level: String,
    pub start_timeout: Duration,
}

impl Default for StandaloneWorkflowConfig {
    fn default() -> Self {
        Self {
            database_file: ":memory:".to_string(),
            frontend_port: 7233,
            bind_ip: "127.0.0.1".to_string(),
            namespace: "default".to_string(),
            cluster_name: "weft-standalone".to_string(),
            enable_ui: false,
            require_ui: false,
            ui_port: 8233,
            log_level: "warn".to_string(),
            start_timeout: Duration::from_secs(30),
        }
    }
}

/// Field-by-field overlay for [`StandaloneWorkflowConfig`].
///
/// Only `Some` values that are non-empty (strings) or non-zero (ports,
/// timeouts) replace the base value.
#[derive(Debug, Clone, Default)]
pub struct StandaloneWorkflowOverride {
    pub database_file: Option<String>,
    pub frontend_port: Option<u16>,
    pub bind_ip: Option<String>,
    pub namespace: Option<String>,
    pub cluster_name: Option<String>,
    pub enable_ui: Option<bool>,
    pub require_ui: Option<bool>,
    pub ui_port: Option<u16>,
    pub log_level: Option<String>,
    pub start_timeout: Option<Duration>,
}

impl StandaloneWorkflowOverride {
    /// Apply the overlay onto `base`.
    pub fn apply_to(&self, base: &mut StandaloneWorkflowConfig) {
        overlay_str(&mut base.database_file, &self.database_file);
        overlay_port(&mut base.frontend_port, self.frontend_port);
        overlay_str(&mut base.bind_ip, &self.bind_ip);
        overlay_str(&mut base.namespace, &self.namespace);
        overlay_str(&mut base.cluster_name, &self.cluster_name);
        if let Some(enable_ui) = self.enable_ui {
            base.enable_ui = enable_ui;
        }
        if let Some(require_ui) = self.require_ui {
            base.require_ui = require_ui;
        }
        overlay_port(&mut base.ui_port, self.ui_port);
        overlay_str(&mut base.log_level, &self.log_level);
        if let Some(timeout) = self.start_timeout
            && !timeout.is_zero()
        {
            base.start_timeout = timeout;
        }
    }
}

fn overlay_str(target: &mut String, value: &Option<String>) {
    if let Some(value) = value
        && !value.trim().is_empty()
    {
        *target = value.trim().to_string();
    }
}

fn overlay_port(target: &mut u16, value: Option<u16>) {
    if let Some(port) = value
        && port != 0
    {
        *target = port;
    }
}

/// Resource cache settings.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Full connection URL; takes precedence over host/port
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub db: u32,
    pub standalone: StandaloneCacheConfig,
}

/// Embedded cache settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StandaloneCacheConfig {
    /// Back the resource store with the embedded cache and persist it to disk
    pub persistence: bool,
    pub data_dir: PathBuf,
}

impl Default for StandaloneCacheConfig {
    fn default() -> Self {
        Self {
            persistence: false,
            data_dir: PathBuf::from(".weft/cache"),
        }
    }
}

/// Field-by-field overlay for [`StandaloneCacheConfig`].
#[derive(Debug, Clone, Default)]
pub struct StandaloneCacheOverride {
    pub persistence: Option<bool>,
    pub data_dir: Option<PathBuf>,
}

impl StandaloneCacheOverride {
    /// Override requesting persistence under `data_dir`.
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            persistence: Some(true),
            data_dir: Some(data_dir.into()),
        }
    }

    /// Apply the overlay onto `base`.
    pub fn apply_to(&self, base: &mut StandaloneCacheConfig) {
        if let Some(persistence) = self.persistence {
            base.persistence = persistence;
        }
        if let Some(dir) = &self.data_dir
            && !dir.as_os_str().is_empty()
        {
            base.data_dir = dir.clone();
        }
    }
}

/// Redis connection details, used when the cache section has none.
#[derive(Debug, Clone, Default)]
pub struct RedisConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
}

impl Config {
    /// Connection URL for the external cache.
    ///
    /// Resolution order: `cache.url`, then `cache.host` + `cache.port`, then
    /// `redis.host` + `redis.port`. `None` if none of them is complete.
    pub fn cache_url(&self) -> Option<String> {
        if let Some(url) = non_empty(&self.cache.url) {
            return Some(url.to_string());
        }
        if let (Some(host), Some(port)) = (non_empty(&self.cache.host), self.cache.port)
            && port != 0
        {
            return Some(redis_url(
                host,
                port,
                non_empty(&self.cache.password),
                self.cache.db,
            ));
        }
        if let (Some(host), Some(port)) = (non_empty(&self.redis.host), self.redis.port)
            && port != 0
        {
            return Some(redis_url(
                host,
                port,
                non_empty(&self.redis.password),
                self.cache.db,
            ));
        }
        None
    }

    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset ones keep their defaults.
    ///
    /// - `WEFT_MODE`: `standalone` (default) or `distributed`
    /// - `WEFT_SERVER_HOST`, `WEFT_SERVER_PORT` (default: 127.0.0.1:5001)
    /// - `WEFT_HTTP_READ_TIMEOUT_MS`, `WEFT_HTTP_WRITE_TIMEOUT_MS`,
    ///   `WEFT_HTTP_IDLE_TIMEOUT_MS`, `WEFT_HTTP_READ_HEADER_TIMEOUT_MS`
    /// - `WEFT_SHUTDOWN_TIMEOUT_MS` (`0` falls back to the embedded start timeout)
    /// - `WEFT_WORKFLOW_HOST_PORT`, `WEFT_WORKFLOW_NAMESPACE`,
    ///   `WEFT_WORKFLOW_REACHABILITY_TIMEOUT_MS`
    /// - `WEFT_WORKFLOW_DATABASE_FILE`, `WEFT_WORKFLOW_FRONTEND_PORT`,
    ///   `WEFT_WORKFLOW_BIND_IP`, `WEFT_WORKFLOW_CLUSTER_NAME`,
    ///   `WEFT_WORKFLOW_ENABLE_UI`, `WEFT_WORKFLOW_UI_PORT`,
    ///   `WEFT_WORKFLOW_LOG_LEVEL`, `WEFT_WORKFLOW_START_TIMEOUT_MS`
    /// - `WEFT_CACHE_URL`, `WEFT_CACHE_HOST`, `WEFT_CACHE_PORT`,
    ///   `WEFT_CACHE_PASSWORD`, `WEFT_CACHE_DB`
    /// - `WEFT_CACHE_PERSISTENCE`, `WEFT_CACHE_DATA_DIR`
    /// - `WEFT_REDIS_HOST`, `WEFT_REDIS_PORT`, `WEFT_REDIS_PASSWORD`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(mode) = env_string("WEFT_MODE") {
            config.mode = mode.parse()?;
        }

        // Server
        if let Some(host) = env_string("WEFT_SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("WEFT_SERVER_PORT", "must be a valid port number")? {
            config.server.port = port;
        }
        let timeouts = &mut config.server.timeouts;
        if let Some(d) = env_millis("WEFT_HTTP_READ_TIMEOUT_MS")? {
            timeouts.http_read = d;
        }
        if let Some(d) = env_millis("WEFT_HTTP_WRITE_TIMEOUT_MS")? {
            timeouts.http_write = d;
        }
        if let Some(d) = env_millis("WEFT_HTTP_IDLE_TIMEOUT_MS")? {
            timeouts.http_idle = d;
        }
        if let Some(d) = env_millis("WEFT_HTTP_READ_HEADER_TIMEOUT_MS")? {
            timeouts.http_read_header = d;
        }
        if let Some(d) = env_millis("WEFT_SHUTDOWN_TIMEOUT_MS")? {
            timeouts.server_shutdown = (!d.is_zero()).then_some(d);
        }

        // Workflow engine
        let workflow = &mut config.workflow_engine;
        if let Some(host_port) = env_string("WEFT_WORKFLOW_HOST_PORT") {
            workflow.host_port = host_port;
        }
        if let Some(namespace) = env_string("WEFT_WORKFLOW_NAMESPACE") {
            workflow.namespace = namespace.clone();
            workflow.standalone.namespace = namespace;
        }
        if let Some(d) = env_millis("WEFT_WORKFLOW_REACHABILITY_TIMEOUT_MS")? {
            workflow.reachability_timeout = d;
        }
        let standalone = &mut workflow.standalone;
        if let Some(file) = env_string("WEFT_WORKFLOW_DATABASE_FILE") {
            standalone.database_file = file;
        }
        if let Some(port) =
            env_parse::<u16>("WEFT_WORKFLOW_FRONTEND_PORT", "must be a valid port number")?
        {
            standalone.frontend_port = port;
        }
        if let Some(ip) = env_string("WEFT_WORKFLOW_BIND_IP") {
            standalone.bind_ip = ip;
        }
        if let Some(cluster) = env_string("WEFT_WORKFLOW_CLUSTER_NAME") {
            standalone.cluster_name = cluster;
        }
        if let Some(enable) = env_bool("WEFT_WORKFLOW_ENABLE_UI")? {
            standalone.enable_ui = enable;
        }
        if let Some(port) = env_parse::<u16>("WEFT_WORKFLOW_UI_PORT", "must be a valid port number")? {
            standalone.ui_port = port;
        }
        if let Some(level) = env_string("WEFT_WORKFLOW_LOG_LEVEL") {
            standalone.log_level = level;
        }
        if let Some(d) = env_millis("WEFT_WORKFLOW_START_TIMEOUT_MS")? {
            standalone.start_timeout = d;
        }

        // Cache
        config.cache.url = env_string("WEFT_CACHE_URL");
        config.cache.host = env_string("WEFT_CACHE_HOST");
        config.cache.port = env_parse::<u16>("WEFT_CACHE_PORT", "must be a valid port number")?;
        config.cache.password = env_string("WEFT_CACHE_PASSWORD");
        if let Some(db) = env_parse::<u32>("WEFT_CACHE_DB", "must be a non-negative integer")? {
            config.cache.db = db;
        }
        if let Some(persistence) = env_bool("WEFT_CACHE_PERSISTENCE")? {
            config.cache.standalone.persistence = persistence;
        }
        if let Some(dir) = env_string("WEFT_CACHE_DATA_DIR") {
            config.cache.standalone.data_dir = PathBuf::from(dir);
        }

        // Redis fallback
        config.redis.host = env_string("WEFT_REDIS_HOST");
        config.redis.port = env_parse::<u16>("WEFT_REDIS_PORT", "must be a valid port number")?;
        config.redis.password = env_string("WEFT_REDIS_PASSWORD");

        Ok(config)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn redis_url(host: &str, port: u16, password: Option<&str>, db: u32) -> String {
    match password {
        Some(password) => format!("redis://:{password}@{host}:{port}/{db}"),
        None => format!("redis://{host}:{port}/{db}"),
    }
}

fn env_string(key: &'static str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(
    key: &'static str,
    message: &'static str,
) -> Result<Option<T>, ConfigError> {
    env_string(key)
        .map(|v| v.parse().map_err(|_| ConfigError::Invalid(key, message)))
        .transpose()
}

fn env_millis(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_parse::<u64>(key, "must be a duration in milliseconds")?.map(Duration::from_millis))
}

fn env_bool(key: &'static str) -> Result<Option<bool>, ConfigError> {
    env_string(key)
        .map(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(key, "must be a boolean")),
        })
        .transpose()
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    /// A dependency needed by the selected mode is not configured.
    #[error("{dependency} is required: {hint}")]
    MissingDependency {
        /// What is missing.
        dependency: &'static str,
        /// Which settings provide it.
        hint: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    const CACHE_VARS: &[&str] = &[
        "WEFT_CACHE_URL",
        "WEFT_CACHE_HOST",
        "WEFT_CACHE_PORT",
        "WEFT_CACHE_PASSWORD",
        "WEFT_CACHE_DB",
        "WEFT_REDIS_HOST",
        "WEFT_REDIS_PORT",
        "WEFT_REDIS_PASSWORD",
    ];

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for key in ["WEFT_MODE", "WEFT_SERVER_PORT", "WEFT_SHUTDOWN_TIMEOUT_MS"]
            .iter()
            .chain(CACHE_VARS)
        {
            guard.remove(key);
        }

        let config = Config::from_env().unwrap();

        assert_eq!(config.mode, Mode::Standalone);
        assert_eq!(config.server.port, 5001);
        assert_eq!(
            config.server.timeouts.server_shutdown,
            Some(Duration::from_secs(10))
        );
        assert_eq!(config.workflow_engine.standalone.database_file, ":memory:");
        assert_eq!(config.workflow_engine.standalone.frontend_port, 7233);
        assert!(config.cache_url().is_none());
    }

    #[test]
    fn test_config_from_env_distributed() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for key in CACHE_VARS {
            guard.remove(key);
        }

        guard.set("WEFT_MODE", "Distributed");
        guard.set("WEFT_WORKFLOW_HOST_PORT", "temporal:7233");
        guard.set("WEFT_REDIS_HOST", "redis");
        guard.set("WEFT_REDIS_PORT", "6380");
        guard.set("WEFT_SHUTDOWN_TIMEOUT_MS", "0");

        let config = Config::from_env().unwrap();

        assert_eq!(config.mode, Mode::Distributed);
        assert_eq!(config.workflow_engine.host_port, "temporal:7233");
        assert_eq!(config.server.timeouts.server_shutdown, None);
        assert_eq!(config.cache_url().as_deref(), Some("redis://redis:6380/0"));
    }

    #[test]
    fn test_config_invalid_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("WEFT_SERVER_PORT", "99999");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("WEFT_SERVER_PORT", _))
        ));
        guard.remove("WEFT_SERVER_PORT");

        guard.set("WEFT_WORKFLOW_ENABLE_UI", "maybe");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("WEFT_WORKFLOW_ENABLE_UI", _))
        ));
        guard.remove("WEFT_WORKFLOW_ENABLE_UI");

        guard.set("WEFT_MODE", "cluster");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("WEFT_MODE", _))
        ));
    }

    #[test]
    fn test_cache_url_resolution_order() {
        let mut config = Config::default();
        config.redis.host = Some("fallback".into());
        config.redis.port = Some(6379);
        config.redis.password = Some("pw".into());
        assert_eq!(
            config.cache_url().as_deref(),
            Some("redis://:pw@fallback:6379/0")
        );

        config.cache.host = Some("cache".into());
        config.cache.port = Some(6400);
        config.cache.db = 2;
        assert_eq!(config.cache_url().as_deref(), Some("redis://cache:6400/2"));

        config.cache.url = Some("redis://explicit:1/0".into());
        assert_eq!(config.cache_url().as_deref(), Some("redis://explicit:1/0"));

        config.cache.url = Some("  ".into());
        config.cache.port = None;
        config.redis.port = Some(0);
        assert!(config.cache_url().is_none());
    }

    #[test]
    fn test_workflow_override_applies_only_set_fields() {
        let mut base = StandaloneWorkflowConfig::default();
        let overlay = StandaloneWorkflowOverride {
            database_file: Some("/tmp/wf.db".into()),
            frontend_port: Some(0),
            namespace: Some("  ".into()),
            enable_ui: Some(true),
            ui_port: Some(9000),
            start_timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        overlay.apply_to(&mut base);

        assert_eq!(base.database_file, "/tmp/wf.db");
        assert_eq!(base.frontend_port, 7233);
        assert_eq!(base.namespace, "default");
        assert!(base.enable_ui);
        assert_eq!(base.ui_port, 9000);
        assert_eq!(base.start_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_cache_override() {
        let mut base = StandaloneCacheConfig::default();
        StandaloneCacheOverride::default().apply_to(&mut base);
        assert_eq!(base, StandaloneCacheConfig::default());

        StandaloneCacheOverride::persistent("/var/weft").apply_to(&mut base);
        assert!(base.persistence);
        assert_eq!(base.data_dir, PathBuf::from("/var/weft"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingDependency {
            dependency: "cache connection",
            hint: "set cache.url, cache.host/cache.port or redis.host/redis.port",
        };
        assert_eq!(
            err.to_string(),
            "cache connection is required: set cache.url, cache.host/cache.port or redis.host/redis.port"
        );
    }
}
