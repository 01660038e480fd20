//! TOML configuration for the Reflex server.

use serde::Deserialize;

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct ReflexConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// HTTP server bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Graceful shutdown timeout in seconds: the maximum time to wait for
    /// in-flight runs to finish before the process exits.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    /// Reverse proxies whose `X-Forwarded-For` header is trusted, as exact
    /// addresses or CIDR ranges. When the peer is not listed here the header
    /// is ignored and the socket peer address is used, so clients cannot
    /// spoof their way past rule IP allowlists. Empty = trust no proxy.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            trusted_proxies: Vec::new(),
        }
    }
}

/// Engine tuning knobs.
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Bounded run-queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum runs executing at once.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Seconds between schedule dispatcher ticks.
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_seconds: u64,
    /// Signing secret for outbound webhooks of rules without their own.
    ///
    /// When unset, a random secret is generated on startup (outbound
    /// signatures will not survive server restarts).
    pub signing_secret: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_concurrent_runs: default_max_concurrent_runs(),
            dispatch_interval_seconds: default_dispatch_interval(),
            signing_secret: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_concurrent_runs() -> usize {
    16
}

fn default_dispatch_interval() -> u64 {
    60
}
