//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum number of occupied worker slots.
    pub max_concurrent: usize,
    /// How long `acquire` waits for an aborted execution to tear down
    /// before repurposing its slot.
    pub teardown_grace: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Port for the HTTP/WebSocket control surface.
    pub http_port: u16,
    /// Name reported as `agentName` on interaction requests.
    pub agent_name: String,
    /// Endpoint of the remote agent engine.
    pub agent_endpoint: Option<String>,
    /// Base URL the remote agent uses to call back for interactions.
    /// Defaults to the local control port.
    pub callback_base: Option<String>,
    /// Start the scheduler immediately on boot.
    pub autostart: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            teardown_grace: Duration::from_millis(500),
            event_capacity: 256,
            http_port: 8080,
            agent_name: "agent".to_string(),
            agent_endpoint: None,
            callback_base: None,
            autostart: true,
        }
    }
}

impl CoordinatorConfig {
    /// Build from `TASK_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            max_concurrent: env_parse("TASK_MAX_CONCURRENT", defaults.max_concurrent)?,
            teardown_grace: Duration::from_millis(env_parse(
                "TASK_TEARDOWN_GRACE_MS",
                defaults.teardown_grace.as_millis() as u64,
            )?),
            event_capacity: env_parse("TASK_EVENT_CAPACITY", defaults.event_capacity)?,
            http_port: env_parse("TASK_HTTP_PORT", defaults.http_port)?,
            agent_name: std::env::var("TASK_AGENT_NAME").unwrap_or(defaults.agent_name),
            agent_endpoint: std::env::var("TASK_AGENT_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            callback_base: std::env::var("TASK_CALLBACK_BASE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            autostart: env_parse("TASK_AUTOSTART", defaults.autostart)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the type system can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrent".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "event_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Callback base for the remote agent, falling back to loopback on
    /// `http_port`.
    pub fn callback_base(&self) -> String {
        self.callback_base
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.http_port))
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}
