//! Environment configuration for the clients
//!
//! Provides trait-based access to environment variables, enabling
//! dependency injection and mocking for tests.

use std::time::Duration;

use tracing::warn;

use crate::bootstrap::ConfigClient;
use crate::mtls::ClientMtlsConfig;
use crate::node_config::NodeConfig;
use crate::task::TaskClient;
use crate::{Error, Result, DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT};

/// Address of the configuration service
pub const ENV_CONFIG_ADDR: &str = "TEE_CLIENT_CONFIG_ADDR";
/// Per-call sub-deadline in milliseconds
pub const ENV_CALL_TIMEOUT_MS: &str = "TEE_CLIENT_CALL_TIMEOUT_MS";
/// Channel establishment timeout in milliseconds
pub const ENV_CONNECT_TIMEOUT_MS: &str = "TEE_CLIENT_CONNECT_TIMEOUT_MS";
/// Server name expected in the trusted execution node's certificate
pub const ENV_SERVER_DOMAIN: &str = "TEE_CLIENT_SERVER_DOMAIN";

/// Default TLS server name for the trusted execution node
pub const DEFAULT_SERVER_DOMAIN: &str = "localhost";

/// Trait for reading environment configuration
///
/// This abstracts reading from environment variables, enabling
/// proper unit testing without manipulating global state.
#[cfg_attr(test, mockall::automock)]
pub trait EnvConfig: Send + Sync {
    /// Value of the environment variable `name`, if set
    fn var(&self, name: &str) -> Option<String>;
}

/// Default implementation that reads from environment variables
#[derive(Clone, Debug, Default)]
pub struct OsEnvConfig;

impl EnvConfig for OsEnvConfig {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Client settings resolved from the environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSettings {
    /// Configuration service address
    pub config_addr: Option<String>,
    /// Sub-deadline for `get_config` and `sign`
    pub call_timeout: Duration,
    /// Channel establishment timeout
    pub connect_timeout: Duration,
    /// TLS server name of the trusted execution node
    pub server_domain: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            config_addr: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            server_domain: DEFAULT_SERVER_DOMAIN.to_string(),
        }
    }
}

impl ClientSettings {
    /// Read settings, falling back to defaults for unset or invalid values
    pub fn from_env(env: &dyn EnvConfig) -> Self {
        let defaults = Self::default();

        Self {
            config_addr: env.var(ENV_CONFIG_ADDR).filter(|addr| !addr.is_empty()),
            call_timeout: millis_or(env, ENV_CALL_TIMEOUT_MS, defaults.call_timeout),
            connect_timeout: millis_or(env, ENV_CONNECT_TIMEOUT_MS, defaults.connect_timeout),
            server_domain: env
                .var(ENV_SERVER_DOMAIN)
                .filter(|domain| !domain.is_empty())
                .unwrap_or(defaults.server_domain),
        }
    }

    /// Bootstrap client configured with these settings
    pub fn config_client(&self) -> Result<ConfigClient> {
        let addr = self.config_addr.as_ref().ok_or_else(|| {
            Error::configuration(format!("{} is not set", ENV_CONFIG_ADDR))
        })?;

        let mut client = ConfigClient::new(addr.clone()).with_connect_timeout(self.connect_timeout);
        client.set_timeout(self.call_timeout);
        Ok(client)
    }

    /// Task client for `config` configured with these settings
    pub fn task_client(&self, config: NodeConfig) -> TaskClient {
        let mut client = TaskClient::new(config).with_connect_timeout(self.connect_timeout);
        client.set_timeout(self.call_timeout);
        client
    }

    /// mTLS material for `config` using the configured server name
    pub fn mtls_config(&self, config: &NodeConfig) -> Result<ClientMtlsConfig> {
        Ok(ClientMtlsConfig::from_node_config(
            config,
            self.server_domain.clone(),
        )?)
    }
}

fn millis_or(env: &dyn EnvConfig, name: &str, default: Duration) -> Duration {
    match env.var(name) {
        None => default,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => {
                warn!(variable = %name, value = %raw, "Invalid duration, using default");
                default
            }
        },
    }
}
