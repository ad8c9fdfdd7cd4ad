// Builder configuration.
// Reads from environment variables with defaults; CLI flags override on top.

use clap::ValueEnum;
use serde::Serialize;
use std::env;
use std::sync::OnceLock;
use tracing::warn;

static CONFIG: OnceLock<BuilderConfig> = OnceLock::new();

/// What the orphan audit does with nodes left without edges.
#[derive(ValueEnum, Serialize, Clone, Copy, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Attach them to the `Detached` sentinel.
    #[default]
    Debug,
    /// Remove them together with the sentinel.
    Prune,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// SRCGRAPH_ORPHAN_POLICY
    pub orphan_policy: OrphanPolicy,

    /// Run the per-file pass on the rayon pool (SRCGRAPH_PARALLEL)
    pub parallel: bool,

    /// Extra top-level packages classified as third-party (SRCGRAPH_THIRD_PARTY)
    pub third_party: Vec<String>,

    /// Treat every non-stdlib, non-project import as third-party
    /// (SRCGRAPH_ASSUME_THIRD_PARTY)
    pub assume_third_party: bool,

    /// Byte limit for literal text in constant labels (SRCGRAPH_CONST_LABEL_MAX)
    pub const_label_max: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            orphan_policy: OrphanPolicy::Debug,
            parallel: true,
            third_party: Vec::new(),
            assume_third_party: false,
            const_label_max: 48,
        }
    }
}

impl BuilderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = BuilderConfig::default();

        if let Some(val) = lookup("SRCGRAPH_ORPHAN_POLICY") {
            match OrphanPolicy::from_str(val.trim(), true) {
                Ok(policy) => config.orphan_policy = policy,
                Err(_) => warn!(
                    value = %val,
                    "invalid SRCGRAPH_ORPHAN_POLICY, using default: debug"
                ),
            }
        }

        if let Some(val) = lookup("SRCGRAPH_PARALLEL") {
            match parse_bool(&val) {
                Some(parsed) => config.parallel = parsed,
                None => warn!(
                    value = %val,
                    "invalid SRCGRAPH_PARALLEL, using default: {}", config.parallel
                ),
            }
        }

        if let Some(val) = lookup("SRCGRAPH_THIRD_PARTY") {
            config.third_party = split_list(&val);
        }

        if let Some(val) = lookup("SRCGRAPH_ASSUME_THIRD_PARTY") {
            match parse_bool(&val) {
                Some(parsed) => config.assume_third_party = parsed,
                None => warn!(
                    value = %val,
                    "invalid SRCGRAPH_ASSUME_THIRD_PARTY, using default: {}",
                    config.assume_third_party
                ),
            }
        }

        if let Some(val) = lookup("SRCGRAPH_CONST_LABEL_MAX") {
            match val.trim().parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.const_label_max = parsed,
                _ => warn!(
                    value = %val,
                    "invalid SRCGRAPH_CONST_LABEL_MAX, using default: {}",
                    config.const_label_max
                ),
            }
        }

        config
    }

    /// Process-wide configuration read once from the environment.
    pub fn get() -> &'static BuilderConfig {
        CONFIG.get_or_init(BuilderConfig::from_env)
    }
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BuilderConfig::default();
        assert_eq!(config.orphan_policy, OrphanPolicy::Debug);
        assert!(config.parallel);
        assert!(config.third_party.is_empty());
        assert!(!config.assume_third_party);
        assert_eq!(config.const_label_max, 48);
    }

    #[test]
    fn reads_overrides() {
        let config = BuilderConfig::from_lookup(lookup(&[
            ("SRCGRAPH_ORPHAN_POLICY", "Prune"),
            ("SRCGRAPH_PARALLEL", "0"),
            ("SRCGRAPH_THIRD_PARTY", "requests, numpy,,"),
            ("SRCGRAPH_ASSUME_THIRD_PARTY", "yes"),
            ("SRCGRAPH_CONST_LABEL_MAX", "12"),
        ]));
        assert_eq!(config.orphan_policy, OrphanPolicy::Prune);
        assert!(!config.parallel);
        assert_eq!(config.third_party, vec!["requests", "numpy"]);
        assert!(config.assume_third_party);
        assert_eq!(config.const_label_max, 12);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = BuilderConfig::from_lookup(lookup(&[
            ("SRCGRAPH_ORPHAN_POLICY", "delete-everything"),
            ("SRCGRAPH_PARALLEL", "maybe"),
            ("SRCGRAPH_CONST_LABEL_MAX", "0"),
        ]));
        assert_eq!(config, BuilderConfig::default());
    }
}
