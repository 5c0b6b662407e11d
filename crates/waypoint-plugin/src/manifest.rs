// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin manifest validation and compatibility checks.
//!
//! Manifests arrive from the backend (inside a `PluginSummary`) and from the
//! module itself (its `manifest` export). Both go through [`validate_manifest`]
//! before the loader trusts them.

use semver::{Version, VersionReq};
use waypoint_core::{PluginManifest, PluginSummary, WaypointError};

/// Parse a manifest from JSON and validate it.
pub fn parse_manifest_json(json: &str) -> Result<PluginManifest, WaypointError> {
    let manifest: PluginManifest = serde_json::from_str(json)
        .map_err(|e| WaypointError::Config(format!("invalid plugin manifest: {e}")))?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Check the structural rules every manifest must satisfy.
///
/// The id must be non-empty and use only ASCII letters, digits, `-`, `_` or
/// `.`, because it becomes a URL path segment. The version and every
/// dependency requirement must parse as semver.
pub fn validate_manifest(manifest: &PluginManifest) -> Result<(), WaypointError> {
    let contract = |message: String| WaypointError::Contract {
        plugin_id: manifest.id.clone(),
        message,
    };

    if manifest.id.is_empty() {
        return Err(contract("manifest id must not be empty".to_string()));
    }
    if let Some(bad) = manifest
        .id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(contract(format!(
            "manifest id '{}' contains invalid character '{bad}'",
            manifest.id
        )));
    }
    if manifest.name.trim().is_empty() {
        return Err(contract("manifest name must not be empty".to_string()));
    }
    Version::parse(&manifest.version).map_err(|e| {
        contract(format!(
            "manifest version '{}' is not semver: {e}",
            manifest.version
        ))
    })?;
    for (dependency, requirement) in &manifest.dependencies {
        VersionReq::parse(requirement).map_err(|e| {
            contract(format!(
                "dependency '{dependency}' has invalid requirement '{requirement}': {e}"
            ))
        })?;
    }
    if let Some(min) = &manifest.min_host_version {
        Version::parse(min)
            .map_err(|e| contract(format!("minHostVersion '{min}' is not semver: {e}")))?;
    }
    Ok(())
}

/// Fail when the manifest needs a newer host than `host_version`.
pub fn check_host_compatibility(
    manifest: &PluginManifest,
    host_version: &Version,
) -> Result<(), WaypointError> {
    let Some(min) = &manifest.min_host_version else {
        return Ok(());
    };
    let min = Version::parse(min).map_err(|e| WaypointError::Contract {
        plugin_id: manifest.id.clone(),
        message: format!("minHostVersion '{min}' is not semver: {e}"),
    })?;
    if host_version < &min {
        return Err(WaypointError::Incompatible {
            plugin_id: manifest.id.clone(),
            message: format!("requires host {min} or newer, running {host_version}"),
        });
    }
    Ok(())
}

/// Fail unless every declared dependency is installed, enabled, and at a
/// version matching its requirement.
pub fn check_dependencies(
    manifest: &PluginManifest,
    installed: &[PluginSummary],
) -> Result<(), WaypointError> {
    let mut unmet = Vec::new();
    for (dependency, requirement) in &manifest.dependencies {
        let Ok(req) = VersionReq::parse(requirement) else {
            unmet.push(format!("{dependency} (invalid requirement '{requirement}')"));
            continue;
        };
        match installed.iter().find(|p| &p.plugin_id == dependency) {
            None => unmet.push(format!("{dependency} {requirement} (not installed)")),
            Some(p) if !p.enabled => unmet.push(format!("{dependency} (disabled)")),
            Some(p) => match Version::parse(&p.plugin_version) {
                Ok(v) if req.matches(&v) => {}
                _ => unmet.push(format!(
                    "{dependency} {requirement} (installed {})",
                    p.plugin_version
                )),
            },
        }
    }

    if unmet.is_empty() {
        Ok(())
    } else {
        Err(WaypointError::Incompatible {
            plugin_id: manifest.id.clone(),
            message: format!("unmet dependencies: {}", unmet.join(", ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_test_utils::fixtures;

    #[test]
    fn parse_valid_manifest() {
        let json = r#"{
            "id": "mileage",
            "name": "Mileage",
            "version": "1.4.2",
            "capabilities": {"frontend": true, "backend": true},
            "requiredPermissions": ["mileage.view", "mileage.edit"],
            "providedPermissions": [{"code": "mileage.admin", "description": "Manage rates"}],
            "dependencies": {"vehicles": "^2.0"},
            "minHostVersion": "0.1.0"
        }"#;
        let manifest = parse_manifest_json(json).unwrap();
        assert_eq!(manifest.id, "mileage");
        assert!(manifest.capabilities.frontend);
        assert!(!manifest.capabilities.config);
        assert_eq!(manifest.required_permissions.len(), 2);
        assert_eq!(manifest.provided_permissions[0].code, "mileage.admin");
        assert_eq!(manifest.dependencies["vehicles"], "^2.0");
    }

    #[test]
    fn reject_bad_id_characters() {
        let mut manifest = fixtures::manifest("mileage", "1.0.0");
        manifest.id = "../etc".to_string();
        let err = validate_manifest(&manifest).unwrap_err().to_string();
        assert!(err.contains("invalid character '/'"), "got {err}");
    }

    #[test]
    fn reject_non_semver_version() {
        let manifest = fixtures::manifest("mileage", "v1");
        let err = validate_manifest(&manifest).unwrap_err().to_string();
        assert!(err.contains("not semver"));
    }

    #[test]
    fn reject_bad_dependency_requirement() {
        let mut manifest = fixtures::manifest("mileage", "1.0.0");
        manifest
            .dependencies
            .insert("vehicles".into(), "around two".into());
        assert!(validate_manifest(&manifest).is_err());
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = parse_manifest_json("{\"id\": 7}").unwrap_err();
        assert!(matches!(err, WaypointError::Config(_)));
    }

    #[test]
    fn host_version_gate() {
        let mut manifest = fixtures::manifest("mileage", "1.0.0");
        manifest.min_host_version = Some("2.0.0".into());

        let err = check_host_compatibility(&manifest, &Version::new(1, 9, 0)).unwrap_err();
        assert!(matches!(err, WaypointError::Incompatible { .. }));
        assert!(check_host_compatibility(&manifest, &Version::new(2, 0, 0)).is_ok());

        manifest.min_host_version = None;
        assert!(check_host_compatibility(&manifest, &Version::new(0, 0, 1)).is_ok());
    }

    #[test]
    fn dependencies_must_be_installed_enabled_and_matching() {
        let mut manifest = fixtures::manifest("mileage", "1.0.0");
        manifest.dependencies.insert("vehicles".into(), "^1".into());

        assert!(check_dependencies(&manifest, &[]).is_err());

        let mut vehicles = fixtures::summary("vehicles", false);
        assert!(check_dependencies(&manifest, std::slice::from_ref(&vehicles)).is_ok());

        vehicles.enabled = false;
        let err = check_dependencies(&manifest, std::slice::from_ref(&vehicles)).unwrap_err();
        assert!(err.to_string().contains("disabled"));

        vehicles.enabled = true;
        vehicles.plugin_version = "2.1.0".into();
        let err = check_dependencies(&manifest, &[vehicles]).unwrap_err();
        assert!(err.to_string().contains("installed 2.1.0"), "got {err}");
    }
}
