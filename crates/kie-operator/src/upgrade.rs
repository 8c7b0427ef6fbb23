//! Decides which product version a [`KieApp`] is rendered with.
//!
//! The requested version comes from `spec.version`, the applied one from `status.version`.
//! Upgrades are opt-in: `spec.upgrades.enabled` allows micro upgrades within a minor line and
//! `spec.upgrades.minor` additionally allows moving to a newer minor line of the same major.

use std::collections::BTreeSet;

use snafu::{ResultExt, Snafu, ensure};
use tracing::{info, warn};

use crate::{
    constants::{CURRENT_VERSION, OPERATOR_VERSION, SUPPORTED_VERSIONS},
    crd::KieApp,
    fragment::FragmentSource,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "product version {version} is not allowed in operator version {OPERATOR_VERSION}, the following versions are allowed: {supported}"
    ))]
    UnsupportedVersion { version: String, supported: String },

    #[snafu(display("failed to parse product version {version:?}"))]
    ParseVersion {
        source: semver::Error,
        version: String,
    },

    #[snafu(display("can't upgrade, potential configuration conflicts in your {from} ConfigMap(s)"))]
    ConfigurationConflicts {
        from: String,
        conflicts: BTreeSet<String>,
    },
}

/// The product versions this operator can render.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionCatalog {
    pub current: String,
    pub supported: Vec<String>,
}

impl Default for VersionCatalog {
    fn default() -> Self {
        Self::new(CURRENT_VERSION, SUPPORTED_VERSIONS.iter().copied())
    }
}

impl VersionCatalog {
    pub fn new<'a>(current: &str, supported: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            current: current.to_owned(),
            supported: supported.into_iter().map(str::to_owned).collect(),
        }
    }

    pub fn is_supported(&self, version: &str) -> bool {
        self.supported.iter().any(|supported| supported == version)
    }
}

/// Upgrades allowed by the resource's settings, relative to the applied version.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpgradeCheck {
    pub minor: bool,
    pub micro: bool,
}

/// The outcome of [`resolve_version`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedVersion {
    /// Version to render.
    pub version: String,
    /// Set when the resource is being upgraded from this version.
    pub upgraded_from: Option<String>,
}

/// Splits a version into major, minor and micro, padding missing parts with `"0"`.
pub fn major_minor_micro(version: &str) -> (String, String, String) {
    let mut parts = version.split('.').map(str::to_owned);
    let mut next = || parts.next().unwrap_or_else(|| "0".to_owned());
    let major = next();
    let minor = next();
    let micro = next();
    (major, minor, micro)
}

/// The `{major}{minor}` suffix used by image tags, `7.8.0` yields `78`.
pub fn minor_image_version(version: &str) -> String {
    let (major, minor, _) = major_minor_micro(version);
    format!("{major}{minor}")
}

fn parse_version(version: &str) -> Result<semver::Version> {
    let (major, minor, micro) = major_minor_micro(version);
    semver::Version::parse(&format!("{major}.{minor}.{micro}")).context(ParseVersionSnafu {
        version: version.to_owned(),
    })
}

/// The version asked for, defaulting to the newest supported one.
pub fn requested_version(kieapp: &KieApp, catalog: &VersionCatalog) -> String {
    kieapp
        .spec
        .version
        .clone()
        .unwrap_or_else(|| catalog.current.clone())
}

pub fn check_upgrade(kieapp: &KieApp, catalog: &VersionCatalog) -> Result<UpgradeCheck> {
    let requested = requested_version(kieapp, catalog);
    ensure!(
        catalog.is_supported(&requested),
        UnsupportedVersionSnafu {
            version: requested,
            supported: catalog.supported.join(", "),
        }
    );

    let upgrades = kieapp.spec.upgrades;
    match kieapp.applied_version() {
        Some(applied) if applied != requested && upgrades.enabled => Ok(UpgradeCheck {
            minor: upgrades.minor,
            micro: true,
        }),
        _ => Ok(UpgradeCheck::default()),
    }
}

/// Picks the version to render. A refused upgrade keeps the applied version.
pub fn resolve_version(kieapp: &KieApp, catalog: &VersionCatalog) -> Result<ResolvedVersion> {
    let check = check_upgrade(kieapp, catalog)?;
    let requested = requested_version(kieapp, catalog);

    let applied = match kieapp.applied_version() {
        Some(applied) if applied != requested => applied,
        _ => {
            return Ok(ResolvedVersion {
                version: requested,
                upgraded_from: None,
            });
        }
    };

    let from = parse_version(applied)?;
    let to = parse_version(&requested)?;
    let same_minor = from.major == to.major && from.minor == to.minor;
    let allowed = to > from
        && ((check.micro && same_minor)
            || (check.minor && !same_minor && from.major == to.major));

    if allowed {
        info!(from = applied, to = %requested, "upgrading product version");
        Ok(ResolvedVersion {
            version: requested,
            upgraded_from: Some(applied.to_owned()),
        })
    } else {
        warn!(
            applied,
            requested = %requested,
            upgrades.enabled = kieapp.spec.upgrades.enabled,
            upgrades.minor = kieapp.spec.upgrades.minor,
            "upgrade not allowed, keeping the applied version"
        );
        Ok(ResolvedVersion {
            version: applied.to_owned(),
            upgraded_from: None,
        })
    }
}

/// Fragment names present in both catalogs whose text differs.
fn fragment_diffs(
    from_source: &dyn FragmentSource,
    from: &str,
    to_source: &dyn FragmentSource,
    to: &str,
) -> BTreeSet<String> {
    let to_names = to_source.names(to);
    from_source
        .names(from)
        .into_iter()
        .filter(|name| to_names.contains(name))
        .filter(|name| from_source.read(from, name) != to_source.read(to, name))
        .collect()
}

/// Fragments that changed between two versions of the same catalog. An empty set means the
/// upgrade needs no fragment-level changes.
pub fn config_diffs(source: &dyn FragmentSource, from: &str, to: &str) -> BTreeSet<String> {
    fragment_diffs(source, from, source, to)
}

/// Refuses an upgrade when the fragments published in the cluster were edited in a way the
/// bundled upgrade would overwrite.
pub fn verify_config_maps(
    bundled: &dyn FragmentSource,
    live: &dyn FragmentSource,
    from: &str,
    to: &str,
) -> Result<()> {
    let expected = config_diffs(bundled, from, to);
    let actual = fragment_diffs(live, from, bundled, to);
    ensure!(
        expected == actual,
        ConfigurationConflictsSnafu {
            from,
            conflicts: actual
                .symmetric_difference(&expected)
                .cloned()
                .collect::<BTreeSet<_>>(),
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        crd::{KieAppSpec, KieAppStatus, KieAppUpgrades},
        fragment::StaticSource,
    };

    fn catalog() -> VersionCatalog {
        VersionCatalog::new("7.4.0", ["7.4.0", "7.3.1", "7.3.0"])
    }

    fn kieapp(requested: Option<&str>, applied: Option<&str>, enabled: bool, minor: bool) -> KieApp {
        let mut kieapp = KieApp::new("app", KieAppSpec {
            version: requested.map(str::to_owned),
            upgrades: KieAppUpgrades { enabled, minor },
            ..KieAppSpec::default()
        });
        kieapp.status = applied.map(|version| KieAppStatus {
            version: Some(version.to_owned()),
            ..KieAppStatus::default()
        });
        kieapp
    }

    #[test]
    fn same_version_needs_no_upgrade() {
        let check = check_upgrade(&kieapp(Some("7.3.0"), Some("7.3.0"), false, false), &catalog())
            .expect("version is supported");
        assert_eq!(check, UpgradeCheck::default());
    }

    #[test]
    fn enabled_upgrades_imply_micro() {
        let check = check_upgrade(&kieapp(Some("7.4.0"), Some("7.3.0"), true, false), &catalog())
            .expect("version is supported");
        assert_eq!(check, UpgradeCheck {
            minor: false,
            micro: true
        });

        let check = check_upgrade(&kieapp(Some("7.4.0"), Some("7.3.0"), false, true), &catalog())
            .expect("version is supported");
        assert_eq!(check, UpgradeCheck::default());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let error = check_upgrade(&kieapp(Some("6.5.0"), None, true, true), &catalog())
            .expect_err("version is not supported");
        let message = error.to_string();
        assert!(message.starts_with("product version 6.5.0 is not allowed"));
        assert!(message.ends_with("7.4.0, 7.3.1, 7.3.0"));
    }

    #[rstest]
    #[case::first_reconcile(None, None, false, false, "7.4.0", None)]
    #[case::pinned(Some("7.3.0"), None, false, false, "7.3.0", None)]
    #[case::unchanged(Some("7.3.0"), Some("7.3.0"), true, true, "7.3.0", None)]
    #[case::disabled(Some("7.3.1"), Some("7.3.0"), false, false, "7.3.0", None)]
    #[case::micro(Some("7.3.1"), Some("7.3.0"), true, false, "7.3.1", Some("7.3.0"))]
    #[case::minor_refused(Some("7.4.0"), Some("7.3.0"), true, false, "7.3.0", None)]
    #[case::minor(Some("7.4.0"), Some("7.3.1"), true, true, "7.4.0", Some("7.3.1"))]
    #[case::downgrade(Some("7.3.0"), Some("7.4.0"), true, true, "7.4.0", None)]
    fn resolve(
        #[case] requested: Option<&str>,
        #[case] applied: Option<&str>,
        #[case] enabled: bool,
        #[case] minor: bool,
        #[case] version: &str,
        #[case] upgraded_from: Option<&str>,
    ) {
        let resolved = resolve_version(&kieapp(requested, applied, enabled, minor), &catalog())
            .expect("version resolves");
        assert_eq!(resolved.version, version);
        assert_eq!(resolved.upgraded_from.as_deref(), upgraded_from);
    }

    #[rstest]
    #[case("7.8.0", ("7", "8", "0"), "78")]
    #[case("7.8", ("7", "8", "0"), "78")]
    #[case("8", ("8", "0", "0"), "80")]
    fn version_parts(
        #[case] version: &str,
        #[case] expected: (&str, &str, &str),
        #[case] minor_image: &str,
    ) {
        let (major, minor, micro) = major_minor_micro(version);
        assert_eq!((major.as_str(), minor.as_str(), micro.as_str()), expected);
        assert_eq!(minor_image_version(version), minor_image);
    }

    fn versioned_source() -> StaticSource {
        StaticSource::new()
            .with("7.3.0", "common.yaml", "console: {}")
            .with("7.3.0", "envs/rhpam-trial.yaml", "servers: []")
            .with("7.3.0", "dbs/h2.yaml", "databases: []")
            .with("7.4.0", "common.yaml", "console: {omit: false}")
            .with("7.4.0", "envs/rhpam-trial.yaml", "servers: []")
            .with("7.4.0", "pim/pim.yaml", "processMigration: {}")
    }

    #[test]
    fn diffs_cover_changed_fragments_present_in_both_versions() {
        let source = versioned_source();

        assert_eq!(
            config_diffs(&source, "7.3.0", "7.4.0"),
            BTreeSet::from(["common.yaml".to_owned()])
        );
        assert!(config_diffs(&source, "7.4.0", "7.4.0").is_empty());
    }

    #[test]
    fn bundled_catalog_differs_between_versions() {
        let source = StaticSource::bundled();
        assert!(!config_diffs(&source, "7.7.1", "7.8.0").is_empty());
    }

    #[test]
    fn edited_config_maps_block_upgrades() {
        let bundled = versioned_source();

        let untouched = versioned_source();
        verify_config_maps(&bundled, &untouched, "7.3.0", "7.4.0").expect("nothing was edited");

        let edited = versioned_source().with("7.3.0", "envs/rhpam-trial.yaml", "servers: [{}]");
        let error = verify_config_maps(&bundled, &edited, "7.3.0", "7.4.0")
            .expect_err("the environment fragment was edited");
        assert_eq!(
            error.to_string(),
            "can't upgrade, potential configuration conflicts in your 7.3.0 ConfigMap(s)"
        );
        assert!(matches!(
            error,
            Error::ConfigurationConflicts { conflicts, .. }
                if conflicts.contains("envs/rhpam-trial.yaml")
        ));
    }
}
