// SPDX-License-Identifier: PMPL-1.0-or-later
//! Notebook configuration.
//!
//! Defaults:
//! - auto_nest: true
//! - max_stages: 64

use serde::{Deserialize, Serialize};

use crate::error::StepError;

/// Configuration for step derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookConfig {
    /// Open an empty follow-up stage after a stage with breakouts, so the
    /// summarized rows can be filtered and sorted.
    pub auto_nest: bool,
    /// Upper bound on the number of stages a query may have.
    pub max_stages: usize,
}

impl NotebookConfig {
    /// Reject settings that cannot derive anything.
    pub fn validate(&self) -> Result<(), StepError> {
        if self.max_stages == 0 {
            return Err(StepError::InvalidConfig(
                "max_stages must be at least 1".to_string(),
            ));
        }
        if self.auto_nest && self.max_stages < 2 {
            return Err(StepError::InvalidConfig(
                "auto_nest needs room for a second stage (max_stages >= 2)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            auto_nest: true,
            max_stages: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NotebookConfig::default();
        assert!(config.auto_nest);
        assert_eq!(config.max_stages, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_stages() {
        let config = NotebookConfig {
            auto_nest: false,
            max_stages: 0,
        };
        assert!(matches!(
            config.validate(),
            Err(StepError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_auto_nest_needs_two_stages() {
        let config = NotebookConfig {
            auto_nest: true,
            max_stages: 1,
        };
        assert!(config.validate().is_err());
        let config = NotebookConfig {
            auto_nest: false,
            max_stages: 1,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = NotebookConfig {
            auto_nest: false,
            max_stages: 8,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: NotebookConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NotebookConfig = serde_json::from_str(r#"{"auto_nest": false}"#).unwrap();
        assert!(!config.auto_nest);
        assert_eq!(config.max_stages, 64);
    }
}
