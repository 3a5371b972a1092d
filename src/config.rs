//! Runtime configuration for the engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::graph::spectral::SpectralConfig;
use crate::guardrails::MissingRulePolicy;

/// What happens to a relationship with a critical violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriticalPolicy {
    /// Keep the edge pending until the violation is overridden.
    #[default]
    Block,
    /// Record the violation and commit the edge anyway.
    Record,
}

/// Configuration for the ontoguard engine.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix of every minted URI.
    pub uri_namespace: String,
    /// Bound on each graph-storage call made during disambiguation.
    pub storage_timeout_ms: u64,
    /// Bound on each embeddings call made during quality evaluation.
    pub embed_timeout_ms: u64,
    /// Wall-clock budget for one spectral analysis.
    pub analysis_budget_ms: u64,
    /// Lanczos steps per eigenvalue.
    pub lanczos_max_iterations: usize,
    /// Lanczos convergence tolerance.
    pub lanczos_tolerance: f64,
    pub missing_rule_policy: MissingRulePolicy,
    pub critical_policy: CriticalPolicy,
    /// Directory of the durable audit ledger. `None` keeps it in memory.
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uri_namespace: "kg://entity".into(),
            storage_timeout_ms: 2_000,
            embed_timeout_ms: 5_000,
            analysis_budget_ms: 30_000,
            lanczos_max_iterations: 300,
            lanczos_tolerance: 1e-10,
            missing_rule_policy: MissingRulePolicy::FailOpen,
            critical_policy: CriticalPolicy::Block,
            data_dir: None,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML configuration.
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::ConfigParse {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    /// Load a TOML configuration file.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| EngineError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.uri_namespace.trim().is_empty() {
            return Err(EngineError::InvalidConfig {
                message: "uri_namespace must not be empty".into(),
            });
        }
        if self.storage_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig {
                message: "storage_timeout_ms must be > 0; external calls need a bound".into(),
            });
        }
        if self.embed_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig {
                message: "embed_timeout_ms must be > 0; external calls need a bound".into(),
            });
        }
        if self.lanczos_max_iterations == 0 {
            return Err(EngineError::InvalidConfig {
                message: "lanczos_max_iterations must be > 0".into(),
            });
        }
        if self.lanczos_tolerance.is_nan() || self.lanczos_tolerance <= 0.0 {
            return Err(EngineError::InvalidConfig {
                message: "lanczos_tolerance must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn spectral(&self) -> SpectralConfig {
        SpectralConfig {
            max_iterations: self.lanczos_max_iterations,
            tolerance: self.lanczos_tolerance,
            time_budget: Duration::from_millis(self.analysis_budget_ms),
            ..SpectralConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
uri_namespace = "https://kg.example.org/id"
critical_policy = "record"
missing_rule_policy = "fail-closed"
"#,
        )
        .unwrap();
        assert_eq!(cfg.uri_namespace, "https://kg.example.org/id");
        assert_eq!(cfg.critical_policy, CriticalPolicy::Record);
        assert_eq!(cfg.missing_rule_policy, MissingRulePolicy::FailClosed);
        assert_eq!(cfg.storage_timeout_ms, 2_000);
        assert!(cfg.data_dir.is_none());
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("critical_policy = \"ignore\"").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse { .. }));
    }

    #[test]
    fn validate_rejects_empty_namespace() {
        let cfg = EngineConfig {
            uri_namespace: " ".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidConfig { .. })));
    }

    #[test]
    fn validate_rejects_unbounded_timeouts() {
        for cfg in [
            EngineConfig {
                storage_timeout_ms: 0,
                ..Default::default()
            },
            EngineConfig {
                embed_timeout_ms: 0,
                ..Default::default()
            },
        ] {
            let err = cfg.validate().unwrap_err();
            assert!(err.to_string().contains("timeout_ms"), "{err}");
        }
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn spectral_config_follows_fields() {
        let cfg = EngineConfig {
            analysis_budget_ms: 10,
            lanczos_max_iterations: 7,
            ..Default::default()
        };
        let s = cfg.spectral();
        assert_eq!(s.max_iterations, 7);
        assert_eq!(s.time_budget, Duration::from_millis(10));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ontoguard.toml");
        std::fs::write(&path, "storage_timeout_ms = 50\n").unwrap();
        assert_eq!(EngineConfig::from_path(&path).unwrap().storage_timeout_ms, 50);
    }
}
