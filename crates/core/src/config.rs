//! Composition configuration via `mortise.toml`
//!
//! Controls the generic member export policy table and how much of a
//! catalog the graph builder composes. Every field has a default, so an
//! empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::definition::MemberKind;
use crate::error::ConfigError;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "mortise.toml";

/// Compatibility surface the policy table is preset for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityMode {
    /// Attributed model: member exports on open generic parts are rejected
    #[default]
    V1,
    /// Convention model: as V1, and fields are never exportable
    V2,
}

/// Whether a kind of member export is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportRule {
    /// Export is allowed
    Allow,
    /// Export is an `InvalidConfiguration` error
    Reject,
}

impl ExportRule {
    /// Whether exports of this kind are accepted
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, ExportRule::Allow)
    }
}

/// Per-member-kind overrides for exports declared on open generic parts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericExportOverrides {
    /// Property exports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<ExportRule>,
    /// Field exports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<ExportRule>,
    /// Method exports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<ExportRule>,
}

impl GenericExportOverrides {
    fn get(&self, kind: MemberKind) -> Option<ExportRule> {
        match kind {
            MemberKind::Property => self.property,
            MemberKind::Field => self.field,
            MemberKind::Method => self.method,
            MemberKind::Type | MemberKind::Constructor => None,
        }
    }
}

/// Which parts the graph builder composes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildScope {
    /// Every concrete part in the catalog, plus whatever the roots need
    #[default]
    Everything,
    /// Only parts reachable from the root contracts
    RootsOnly,
}

/// Composition configuration loaded from `mortise.toml`
///
/// # Example
///
/// ```toml
/// # "v1" (default) or "v2"
/// compatibility = "v1"
///
/// # "everything" (default) or "roots-only"
/// scope = "everything"
///
/// [generic_member_exports]
/// property = "reject"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionConfig {
    /// Preset for the generic member export policy table
    #[serde(default)]
    pub compatibility: CompatibilityMode,
    /// Overrides for exports on open generic parts
    #[serde(default)]
    pub generic_member_exports: GenericExportOverrides,
    /// Composition scope
    #[serde(default)]
    pub scope: BuildScope,
}

impl CompositionConfig {
    /// Config with a compatibility preset and no overrides
    pub fn with_compatibility(compatibility: CompatibilityMode) -> Self {
        CompositionConfig {
            compatibility,
            ..Self::default()
        }
    }

    /// Override the rule for one member kind on open generic parts
    pub fn with_generic_export_rule(mut self, kind: MemberKind, rule: ExportRule) -> Self {
        match kind {
            MemberKind::Property => self.generic_member_exports.property = Some(rule),
            MemberKind::Field => self.generic_member_exports.field = Some(rule),
            MemberKind::Method => self.generic_member_exports.method = Some(rule),
            MemberKind::Type | MemberKind::Constructor => {}
        }
        self
    }

    /// Set the composition scope
    pub fn with_scope(mut self, scope: BuildScope) -> Self {
        self.scope = scope;
        self
    }

    /// Rule for an export of `kind` declared on a part
    ///
    /// Whole-part exports are always allowed and constructor exports never
    /// are. For other kinds, open generic parts consult the overrides and
    /// then the preset; closed parts only consult the preset.
    pub fn export_rule(&self, kind: MemberKind, open_generic: bool) -> ExportRule {
        match kind {
            MemberKind::Type => return ExportRule::Allow,
            MemberKind::Constructor => return ExportRule::Reject,
            _ => {}
        }
        if self.compatibility == CompatibilityMode::V2 && kind == MemberKind::Field {
            return ExportRule::Reject;
        }
        if !open_generic {
            return ExportRule::Allow;
        }
        self.generic_member_exports
            .get(kind)
            .unwrap_or(ExportRule::Reject)
    }

    // =========================================================================
    // TOML
    // =========================================================================

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Mortise composition configuration
#
# Compatibility surface: "v1" (default) or "v2"
#   "v1" = member exports on open generic parts are rejected
#   "v2" = as v1, and field exports are rejected on every part
compatibility = "v1"

# Composition scope: "everything" (default) or "roots-only"
#   "everything" = compose every concrete part in the catalog
#   "roots-only" = compose only what the root contracts reach
scope = "everything"

# Per-member-kind rules for exports on open generic parts.
# Each may be "allow" or "reject"; unset kinds use the preset.
[generic_member_exports]
# property = "reject"
# field = "reject"
# method = "reject"
"#
    }

    /// Parse config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CompositionConfig::default();
        assert_eq!(config.compatibility, CompatibilityMode::V1);
        assert_eq!(config.scope, BuildScope::Everything);
        assert_eq!(config.generic_member_exports, GenericExportOverrides::default());
    }

    #[test]
    fn test_default_toml_parses() {
        let config = CompositionConfig::from_toml_str(CompositionConfig::default_toml()).unwrap();
        assert_eq!(config, CompositionConfig::default());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = CompositionConfig::from_toml_str("").unwrap();
        assert_eq!(config, CompositionConfig::default());
    }

    #[test]
    fn test_parse_overrides() {
        let config = CompositionConfig::from_toml_str(
            "compatibility = \"v2\"\nscope = \"roots-only\"\n\
             [generic_member_exports]\nmethod = \"allow\"\n",
        )
        .unwrap();
        assert_eq!(config.compatibility, CompatibilityMode::V2);
        assert_eq!(config.scope, BuildScope::RootsOnly);
        assert_eq!(config.generic_member_exports.method, Some(ExportRule::Allow));
    }

    #[test]
    fn test_parse_invalid_mode() {
        let err = CompositionConfig::from_toml_str("compatibility = \"v3\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_policy_table_presets() {
        for mode in [CompatibilityMode::V1, CompatibilityMode::V2] {
            let config = CompositionConfig::with_compatibility(mode);
            assert!(config.export_rule(MemberKind::Type, true).is_allowed());
            assert!(!config.export_rule(MemberKind::Constructor, false).is_allowed());
            assert!(!config.export_rule(MemberKind::Property, true).is_allowed());
            assert!(!config.export_rule(MemberKind::Field, true).is_allowed());
            assert!(!config.export_rule(MemberKind::Method, true).is_allowed());
            assert!(config.export_rule(MemberKind::Property, false).is_allowed());
        }
        let v1 = CompositionConfig::with_compatibility(CompatibilityMode::V1);
        let v2 = CompositionConfig::with_compatibility(CompatibilityMode::V2);
        assert!(v1.export_rule(MemberKind::Field, false).is_allowed());
        assert!(!v2.export_rule(MemberKind::Field, false).is_allowed());
    }

    #[test]
    fn test_override_allows_kind() {
        let config = CompositionConfig::default()
            .with_generic_export_rule(MemberKind::Property, ExportRule::Allow);
        assert!(config.export_rule(MemberKind::Property, true).is_allowed());
        assert!(!config.export_rule(MemberKind::Field, true).is_allowed());
    }

    #[test]
    fn test_v2_field_override_does_not_reenable() {
        let config = CompositionConfig::with_compatibility(CompatibilityMode::V2)
            .with_generic_export_rule(MemberKind::Field, ExportRule::Allow);
        assert!(!config.export_rule(MemberKind::Field, true).is_allowed());
    }

    #[test]
    fn test_write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        CompositionConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        let config = CompositionConfig::from_file(&path).unwrap();
        assert_eq!(config, CompositionConfig::default());
    }

    #[test]
    fn test_write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "compatibility = \"v2\"\n").unwrap();
        CompositionConfig::write_default_if_missing(&path).unwrap();

        let config = CompositionConfig::from_file(&path).unwrap();
        assert_eq!(config.compatibility, CompatibilityMode::V2);
    }

    #[test]
    fn test_write_to_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = CompositionConfig::default()
            .with_scope(BuildScope::RootsOnly)
            .with_generic_export_rule(MemberKind::Method, ExportRule::Allow);

        config.write_to_file(&path).unwrap();
        assert_eq!(CompositionConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = CompositionConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
