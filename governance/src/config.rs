//! Engine configuration with TOML file support.

use crate::GovernanceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tally_utils::LogFormat;

/// Policy knobs for a [`GovernanceEngine`](crate::GovernanceEngine).
///
/// Can be loaded from a TOML file via [`GovernanceConfig::from_toml_file`]
/// or built programmatically (e.g. for tests). Every key is optional.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Minimum effective weight a proposer needs. Zero keeps proposal
    /// creation open to every account.
    #[serde(default)]
    pub proposal_threshold: u64,

    /// Shortest accepted voting period, in seconds.
    #[serde(default = "default_min_voting_period")]
    pub min_voting_period_secs: u64,

    /// Longest accepted voting period, in seconds. Unbounded when absent.
    #[serde(default)]
    pub max_voting_period_secs: Option<u64>,

    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_min_voting_period() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl GovernanceConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, GovernanceError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| GovernanceError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, GovernanceError> {
        let config: Self = toml::from_str(s).map_err(|e| GovernanceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, GovernanceError> {
        toml::to_string_pretty(self).map_err(|e| GovernanceError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), GovernanceError> {
        if self.min_voting_period_secs == 0 {
            return Err(GovernanceError::Config(
                "min_voting_period_secs must be at least 1".into(),
            ));
        }
        if let Some(max) = self.max_voting_period_secs {
            if max < self.min_voting_period_secs {
                return Err(GovernanceError::Config(format!(
                    "max_voting_period_secs ({max}) is below min_voting_period_secs ({})",
                    self.min_voting_period_secs
                )));
            }
        }
        Ok(())
    }

    /// Whether `secs` is an acceptable voting period under this policy.
    pub fn accepts_period(&self, secs: u64) -> bool {
        secs > 0
            && secs >= self.min_voting_period_secs
            && self.max_voting_period_secs.map_or(true, |max| secs <= max)
    }

    /// Initialise global logging from this configuration.
    pub fn init_logging(&self) {
        tally_utils::init_logging(self.log_format, &self.log_level);
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            proposal_threshold: 0,
            min_voting_period_secs: default_min_voting_period(),
            max_voting_period_secs: None,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = GovernanceConfig {
            max_voting_period_secs: Some(86_400),
            ..GovernanceConfig::default()
        };
        let toml_str = config.to_toml_string().unwrap();
        let parsed = GovernanceConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = GovernanceConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config, GovernanceConfig::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            proposal_threshold = 500
            max_voting_period_secs = 604800
            log_format = "json"
        "#;
        let config = GovernanceConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.proposal_threshold, 500);
        assert_eq!(config.max_voting_period_secs, Some(604_800));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.min_voting_period_secs, 1);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let toml = r#"
            min_voting_period_secs = 100
            max_voting_period_secs = 10
        "#;
        let err = GovernanceConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, GovernanceError::Config(_)));
        assert!(GovernanceConfig::from_toml_str("min_voting_period_secs = 0").is_err());
    }

    #[test]
    fn period_bounds() {
        let config = GovernanceConfig {
            min_voting_period_secs: 60,
            max_voting_period_secs: Some(3600),
            ..GovernanceConfig::default()
        };
        assert!(!config.accepts_period(0));
        assert!(!config.accepts_period(59));
        assert!(config.accepts_period(60));
        assert!(config.accepts_period(3600));
        assert!(!config.accepts_period(3601));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "proposal_threshold = 42").unwrap();
        let config = GovernanceConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.proposal_threshold, 42);
    }

    #[test]
    fn missing_file_returns_config_error() {
        let err = GovernanceConfig::from_toml_file("/nonexistent/tally.toml").unwrap_err();
        assert!(matches!(err, GovernanceError::Config(_)));
    }
}
