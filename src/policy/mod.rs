//! Serializable rate limit configuration.
//!
//! ```toml
//! [default]
//! permits = 10
//! period = "1s"
//!
//! [hosts."api.example.org"]
//! permits = 2
//! period = "500ms"
//! ```

use crate::backend::{Quota, DEFAULT_PERIOD};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Rate limit for {scope} must permit at least one request")]
    ZeroPermits { scope: String },
    #[error("Rate limit period for {scope} must be non-zero")]
    ZeroPeriod { scope: String },
}

/// A quota as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// The total requests to be allowed within the period.
    pub permits: u32,
    /// The sliding window length.
    #[serde(default = "default_period", with = "humantime_serde")]
    pub period: Duration,
}

const fn default_period() -> Duration {
    DEFAULT_PERIOD
}

impl Policy {
    fn validate(&self, scope: &str) -> Result<(), ConfigError> {
        if self.permits == 0 {
            return Err(ConfigError::ZeroPermits {
                scope: scope.to_owned(),
            });
        }
        if self.period.is_zero() {
            return Err(ConfigError::ZeroPeriod {
                scope: scope.to_owned(),
            });
        }
        Ok(())
    }

    /// Convert into a [Quota].
    ///
    /// # Errors
    ///
    /// Returns an error if the policy permits no requests or has a zero period.
    pub fn quota(&self) -> Result<Quota, ConfigError> {
        self.validate("policy")?;
        Ok(Quota::new(self.permits, self.period))
    }
}

/// Per-host rate limits with an optional fallback for every other host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Applied to hosts without an entry in `hosts`; such hosts are not limited if unset.
    #[serde(default)]
    pub default: Option<Policy>,
    /// Overrides keyed by host name.
    #[serde(default)]
    pub hosts: HashMap<String, Policy>,
}

impl RateLimitConfig {
    /// # Errors
    ///
    /// Returns the first policy that permits no requests or has a zero period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(default) = &self.default {
            default.validate("default")?;
        }
        for (host, policy) in &self.hosts {
            policy.validate(host)?;
        }
        Ok(())
    }

    /// The policy that applies to `host`, if any.
    pub fn policy_for(&self, host: &str) -> Option<&Policy> {
        self.hosts
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(host))
            .map(|(_, policy)| policy)
            .or(self.default.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize() {
        let config: RateLimitConfig = toml::from_str(
            r#"
            [default]
            permits = 10

            [hosts."api.example.org"]
            permits = 2
            period = "500ms"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let default = config.default.unwrap();
        assert_eq!(default.permits, 10);
        // Period falls back to one second
        assert_eq!(default.period, Duration::from_secs(1));

        let host = config.policy_for("API.example.org").unwrap();
        assert_eq!(host.permits, 2);
        assert_eq!(host.period, Duration::from_millis(500));

        assert_eq!(config.policy_for("cdn.example.org"), Some(&default));
    }

    #[test]
    fn test_no_default() {
        let config: RateLimitConfig = toml::from_str(
            r#"
            [hosts."api.example.org"]
            permits = 2
            "#,
        )
        .unwrap();
        assert!(config.policy_for("cdn.example.org").is_none());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = toml::from_str::<RateLimitConfig>(
            r#"
            [default]
            permits = 2
            burst = 4
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = RateLimitConfig::default();
        config.hosts.insert(
            "api.example.org".to_string(),
            Policy {
                permits: 0,
                period: Duration::from_secs(1),
            },
        );
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroPermits {
                scope: "api.example.org".to_string()
            })
        );

        let config = RateLimitConfig {
            default: Some(Policy {
                permits: 1,
                period: Duration::ZERO,
            }),
            hosts: HashMap::new(),
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroPeriod {
                scope: "default".to_string()
            })
        );
    }

    #[test]
    fn test_policy_quota() {
        let policy = Policy {
            permits: 3,
            period: Duration::from_secs(2),
        };
        assert_eq!(policy.quota(), Ok(Quota::new(3, Duration::from_secs(2))));
        let policy = Policy {
            permits: 0,
            period: Duration::from_secs(2),
        };
        assert!(policy.quota().is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = RateLimitConfig {
            default: Some(Policy {
                permits: 5,
                period: Duration::from_millis(250),
            }),
            hosts: HashMap::new(),
        };
        let toml = toml::to_string(&config).unwrap();
        let deserialized: RateLimitConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config, deserialized);
    }
}
