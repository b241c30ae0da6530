//! Scoring weight table
//!
//! Reason strings map to integer base scores in [0,100]. The table ships
//! with built-in defaults and can be replaced by a TOML file of flat
//! `Reason = score` pairs so users can tune scores without recompiling.
//! Duplicate keys and out-of-range values are fatal configuration errors
//! and are rejected before any cluster call.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, SmartError};

#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: BTreeMap<String, u8>,
}

impl Default for WeightTable {
    fn default() -> Self {
        let defaults = [
            ("CrashLoopBackOff", 90),
            ("ImagePullBackOff", 85),
            ("ErrImagePull", 85),
            ("OOMKilled", 90),
            ("FailedScheduling", 80),
            ("FailedMount", 75),
            ("FailedAttachVolume", 75),
            ("Unhealthy", 60),
            ("BackOff", 55),
            ("Evicted", 85),
            ("NodeNotReady", 85),
            ("NetworkNotReady", 85),
            ("FailedCreatePodSandBox", 70),
        ];
        Self {
            weights: defaults
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

impl WeightTable {
    /// Parse a TOML weight table. The TOML parser itself rejects duplicate
    /// keys; ranges and value types are checked here.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = content
            .parse()
            .map_err(|e| SmartError::Config(format!("invalid weights table: {e}")))?;

        let mut weights = BTreeMap::new();
        for (reason, value) in table {
            let score = value.as_integer().ok_or_else(|| {
                SmartError::Config(format!("weight for '{reason}' must be an integer"))
            })?;
            if !(0..=100).contains(&score) {
                return Err(SmartError::Config(format!(
                    "weight for '{reason}' out of range: {score} (must be 0..=100)"
                )));
            }
            weights.insert(reason, score as u8);
        }
        if weights.is_empty() {
            return Err(SmartError::Config("weights table is empty".into()));
        }
        Ok(Self { weights })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SmartError::Config(format!("failed to read weights file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Base score for a reason; `None` when the reason is unknown.
    pub fn base_score(&self, reason: &str) -> Option<u8> {
        self.weights.get(reason).copied()
    }

    pub fn knows(&self, reason: &str) -> bool {
        self.weights.contains_key(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_documented_scores() {
        let table = WeightTable::default();
        assert_eq!(table.base_score("CrashLoopBackOff"), Some(90));
        assert_eq!(table.base_score("ImagePullBackOff"), Some(85));
        assert_eq!(table.base_score("OOMKilled"), Some(90));
        assert_eq!(table.base_score("FailedScheduling"), Some(80));
        assert_eq!(table.base_score("BackOff"), Some(55));
        assert_eq!(table.base_score("NoSuchReason"), None);
    }

    #[test]
    fn custom_table_replaces_defaults() {
        let table = WeightTable::from_toml_str("CrashLoopBackOff = 70\nMyReason = 42\n").unwrap();
        assert_eq!(table.base_score("CrashLoopBackOff"), Some(70));
        assert_eq!(table.base_score("MyReason"), Some(42));
        assert_eq!(table.base_score("BackOff"), None);
    }

    #[test]
    fn duplicate_keys_are_fatal() {
        let err = WeightTable::from_toml_str("BackOff = 55\nBackOff = 60\n").unwrap_err();
        assert!(matches!(err, SmartError::Config(_)));
    }

    #[test]
    fn out_of_range_values_are_fatal() {
        assert!(WeightTable::from_toml_str("BackOff = 101\n").is_err());
        assert!(WeightTable::from_toml_str("BackOff = -1\n").is_err());
        assert!(WeightTable::from_toml_str("BackOff = \"high\"\n").is_err());
    }
}
