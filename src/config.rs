//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::ScopePolicy;

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limit policy for the protected scope
    #[serde(default)]
    pub policy: ScopePolicy,

    /// Enforcement bypass configuration
    #[serde(default)]
    pub bypass: BypassConfig,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            policy: ScopePolicy::default(),
            bypass: BypassConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Seconds between expiry sweeps of the rate limit store
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_sweep_interval() -> u64 {
    30
}

/// Runtime environment marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl FromStr for Environment {
    type Err = FloodgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(FloodgateError::Config(format!(
                "unknown environment: {}",
                other
            ))),
        }
    }
}

/// Enforcement bypass for test and QA traffic.
///
/// Activation requires BOTH the explicit opt-in flag AND a
/// non-production environment marker. The environment defaults to
/// production, so an absent or partial configuration leaves
/// enforcement on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassConfig {
    /// Explicit opt-in for skipping rate limit accounting
    #[serde(default)]
    pub allow_test_bypass: bool,

    /// Which environment this process runs in
    #[serde(default = "default_environment")]
    pub environment: Environment,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            allow_test_bypass: false,
            environment: default_environment(),
        }
    }
}

fn default_environment() -> Environment {
    Environment::Production
}

impl BypassConfig {
    /// Whether accounting should be skipped entirely.
    pub fn active(&self) -> bool {
        self.allow_test_bypass && self.environment != Environment::Production
    }
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| FloodgateError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = FloodgateConfig::default();
        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert_eq!(config.server.sweep_interval_secs, 30);
        assert_eq!(config.policy.scope, "login");
        assert_eq!(config.policy.origin_limit, 30);
        assert_eq!(config.policy.identity_limit, 5);
        assert!(!config.bypass.allow_test_bypass);
        assert_eq!(config.bypass.environment, Environment::Production);
    }

    #[test]
    fn test_parse_partial_yaml_fills_defaults() {
        let yaml = r#"
policy:
  scope: signup
  identity_limit: 3
"#;
        let config: FloodgateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.policy.scope, "signup");
        assert_eq!(config.policy.identity_limit, 3);
        assert_eq!(config.policy.origin_limit, 30);
        assert_eq!(config.server.sweep_interval_secs, 30);
    }

    #[test]
    fn test_bypass_requires_both_conditions() {
        let mut bypass = BypassConfig::default();
        assert!(!bypass.active());

        bypass.allow_test_bypass = true;
        assert!(!bypass.active());

        bypass.environment = Environment::Development;
        assert!(bypass.active());

        bypass.allow_test_bypass = false;
        assert!(!bypass.active());

        bypass.allow_test_bypass = true;
        bypass.environment = Environment::Test;
        assert!(bypass.active());
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!(
            "development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_parse_bypass_yaml() {
        let yaml = r#"
bypass:
  allow_test_bypass: true
  environment: development
"#;
        let config: FloodgateConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.bypass.active());
    }
}
