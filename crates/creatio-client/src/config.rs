//! Transport configuration.

use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE: usize = 10;

/// Settings applied when the underlying `reqwest::Client` is built.
///
/// One Creatio environment is served by one pooled client; the defaults
/// suit interactive API use (a 30s overall deadline, small idle pool).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Overall per-request deadline.
    pub timeout: Duration,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// How long idle pooled connections are kept.
    pub pool_idle_timeout: Duration,
    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// User-Agent header value.
    pub user_agent: String,
    /// Emit request/response tracing events.
    pub enable_tracing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigBuilder::default().build()
    }
}

impl ClientConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`]. Unset fields keep their defaults.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: Option<usize>,
    user_agent: Option<String>,
    enable_tracing: Option<bool>,
}

impl ClientConfigBuilder {
    /// Overall per-request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deadline for establishing a connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// How long idle pooled connections are kept.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Idle connections kept per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = Some(max);
        self
    }

    /// Custom User-Agent value.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Emit request/response tracing events.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = Some(enabled);
        self
    }

    /// Finish, filling unset fields with the defaults.
    pub fn build(self) -> ClientConfig {
        ClientConfig {
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(DEFAULT_POOL_IDLE_TIMEOUT),
            pool_max_idle_per_host: self.pool_max_idle_per_host.unwrap_or(DEFAULT_POOL_MAX_IDLE),
            user_agent: self.user_agent.unwrap_or_else(|| crate::USER_AGENT.to_string()),
            enable_tracing: self.enable_tracing.unwrap_or(true),
        }
    }
}
