//! # Pattern Manifests
//!
//! The authored half of a pattern: id, weights, rule, sub-patterns and the
//! routing table. Manifests are YAML (`.yaml`/`.yml`) or JSON (anything
//! else) and are validated in full before any fitting starts.
//!
//! ```yaml
//! id: zheng_guan_strong
//! name: Strong Officer
//! version: "1.0"
//! weights:
//!   zheng_guan: [1.0, 0.5, 0, 0, 0]
//!   qi_sha:     [0, 0, 0, 1.0, 0]
//! rule: {">": [{"var": "ten_gods.zheng_guan"}, 1]}
//! sub_patterns:
//!   - id: pure
//!     name: Pure Officer
//!     rule: {"==": [{"var": "ten_gods.qi_sha"}, 0]}
//! routing:
//!   - priority: 10
//!     target: pure
//!     gate_rules: [{axis: S, comparator: "<", value: 0.5}]
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use pcal_core::PcalError;
use pcal_rules::Rule;
use pcal_tensor::WeightMatrix;

use crate::pattern::{is_valid_id, Pattern, SubPattern};
use crate::router::{validate_table, RoutingStrategy};

/// Authored sub-pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubPatternManifest {
    /// Identifier, unique within the pattern.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Extra selection rule.
    #[serde(default)]
    pub rule: Option<Rule>,
    /// Projection override.
    #[serde(default)]
    pub weights: Option<WeightMatrix>,
    /// Risk label.
    #[serde(default)]
    pub risk: Option<String>,
    /// Priority metadata.
    #[serde(default)]
    pub priority: Option<i64>,
}

/// Authored pattern definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Pattern identifier.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Authored version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Category → `[E, O, M, S, R]`.
    pub weights: WeightMatrix,
    /// Boolean definition.
    pub rule: Rule,
    /// Refinements.
    #[serde(default)]
    pub sub_patterns: Vec<SubPatternManifest>,
    /// Routing table.
    #[serde(default, alias = "router")]
    pub routing: Vec<RoutingStrategy>,
}

fn default_version() -> String {
    "0".to_string()
}

/// A validated manifest and the digest of the bytes it was read from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    /// The definition.
    pub manifest: Manifest,
    /// Lowercase hex SHA-256 of the file contents.
    pub digest: String,
}

impl Manifest {
    /// Read, parse and validate a manifest file.
    pub fn load(path: &Path) -> Result<LoadedManifest, PcalError> {
        if !path.is_file() {
            return Err(PcalError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path)?;
        let manifest = if is_yaml(path) {
            Self::from_yaml_bytes(&bytes)?
        } else {
            Self::from_json_bytes(&bytes)?
        };
        manifest.validate()?;

        let digest = hex_digest(&bytes);
        tracing::debug!(
            path = %path.display(),
            pattern = %manifest.id,
            digest = %digest,
            "manifest loaded"
        );
        Ok(LoadedManifest { manifest, digest })
    }

    /// Parse YAML without validating.
    pub fn from_yaml_bytes(bytes: &[u8]) -> Result<Self, PcalError> {
        serde_yaml::from_slice(bytes).map_err(|e| PcalError::InvalidManifest(e.to_string()))
    }

    /// Parse JSON without validating.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, PcalError> {
        serde_json::from_slice(bytes).map_err(|e| PcalError::InvalidManifest(e.to_string()))
    }

    /// Identifier and cross-reference checks.
    pub fn validate(&self) -> Result<(), PcalError> {
        if !is_valid_id(&self.id) {
            return Err(PcalError::InvalidManifest(format!(
                "invalid pattern id \"{}\": use ASCII letters, digits, '_', '-', '.'",
                self.id
            )));
        }
        let mut seen = BTreeSet::new();
        for sub in &self.sub_patterns {
            if !is_valid_id(&sub.id) {
                return Err(PcalError::InvalidManifest(format!(
                    "pattern {}: invalid sub-pattern id \"{}\"",
                    self.id, sub.id
                )));
            }
            if !seen.insert(sub.id.as_str()) {
                return Err(PcalError::InvalidManifest(format!(
                    "pattern {}: duplicate sub-pattern id \"{}\"",
                    self.id, sub.id
                )));
            }
        }
        validate_table(&self.to_pattern(None))
    }

    /// Build an unfitted pattern.
    pub fn to_pattern(&self, digest: Option<String>) -> Pattern {
        Pattern {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            version: self.version.clone(),
            weight_matrix: self.weights,
            rule: self.rule.clone(),
            manifold: None,
            fit_stats: None,
            base_abundance: None,
            threshold: None,
            sub_patterns: self
                .sub_patterns
                .iter()
                .map(|s| SubPattern {
                    id: s.id.clone(),
                    name: s.name.clone().unwrap_or_else(|| s.id.clone()),
                    rule: s.rule.clone(),
                    weight_override: s.weights,
                    manifold: None,
                    fit_stats: None,
                    risk: s.risk.clone(),
                    priority: s.priority,
                })
                .collect(),
            router: self.routing.clone(),
            revision: 0,
            manifest_digest: digest,
        }
    }
}

impl LoadedManifest {
    /// Unfitted pattern stamped with this manifest's digest.
    pub fn into_pattern(self) -> Pattern {
        self.manifest.to_pattern(Some(self.digest))
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("yaml" | "yml")
    )
}

/// Lowercase hex SHA-256.
pub fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
