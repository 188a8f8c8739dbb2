//! ImportConfiguration: which object domains are active for an operation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Builtin domain names, in merge order.
pub const CORE_DOMAIN: &str = "stix-core";
pub const OBSERVABLES_DOMAIN: &str = "stix-observables";
pub const ATTACK_DOMAIN: &str = "mitre-attack";
pub const OS_THREAT_DOMAIN: &str = "os-threat";

/// Version of the core object model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreVersion {
    #[default]
    #[serde(rename = "2.1")]
    V2_1,
}

/// ATT&CK matrix selecting the sub-domain of the ATT&CK extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackMatrix {
    Enterprise,
    Mobile,
    Ics,
}

/// How colliding registrations from different domains are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// A key registered twice with different definitions is an error.
    #[default]
    Strict,
    /// The later domain in merge order overwrites the earlier definition.
    LastWriterWins,
}

/// Immutable selection of active domains. Fully determines the merged
/// `MappingTable`, and doubles as its cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfiguration {
    pub core: CoreVersion,
    /// Cyber-observable objects (files, addresses, processes, ...).
    pub observables: bool,
    pub attack: Option<AttackMatrix>,
    /// Incident-response objects and the incident extension.
    pub os_threat: bool,
    /// Additional domains registered on the `Registry` by name.
    pub extensions: BTreeSet<String>,
    pub merge_policy: MergePolicy,
}

impl Default for ImportConfiguration {
    fn default() -> Self {
        Self {
            core: CoreVersion::V2_1,
            observables: true,
            attack: None,
            os_threat: false,
            extensions: BTreeSet::new(),
            merge_policy: MergePolicy::Strict,
        }
    }
}

impl ImportConfiguration {
    /// Core objects only.
    pub fn core_only() -> Self {
        Self { observables: false, ..Self::default() }
    }

    pub fn with_attack(mut self, matrix: AttackMatrix) -> Self {
        self.attack = Some(matrix);
        self
    }

    pub fn with_os_threat(mut self) -> Self {
        self.os_threat = true;
        self
    }

    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.insert(name.into());
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Active domain names in deterministic merge order.
    pub fn domains(&self) -> Vec<&str> {
        let mut names = vec![CORE_DOMAIN];
        if self.observables {
            names.push(OBSERVABLES_DOMAIN);
        }
        if self.attack.is_some() {
            names.push(ATTACK_DOMAIN);
        }
        if self.os_threat {
            names.push(OS_THREAT_DOMAIN);
        }
        names.extend(self.extensions.iter().map(String::as_str));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_order() {
        let config = ImportConfiguration::default()
            .with_extension("zeta")
            .with_os_threat()
            .with_attack(AttackMatrix::Ics)
            .with_extension("alpha");
        assert_eq!(
            config.domains(),
            vec!["stix-core", "stix-observables", "mitre-attack", "os-threat", "alpha", "zeta"]
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ImportConfiguration =
            serde_json::from_str(r#"{"attack": "enterprise", "observables": false}"#).unwrap();
        assert_eq!(config.attack, Some(AttackMatrix::Enterprise));
        assert!(!config.observables);
        assert_eq!(config.merge_policy, MergePolicy::Strict);
        assert_eq!(config.domains(), vec!["stix-core", "mitre-attack"]);
    }
}
