//! Loads configuration fragments: YAML documents describing part of an [`Environment`],
//! parameterized with an [`EnvTemplate`].
//!
//! Fragments are addressed by a logical name such as `common.yaml` or `envs/rhpam-trial.yaml`
//! and by product version. They are rendered with minijinja before they are parsed, using
//! `[[ ... ]]` for variables, `[% ... %]` for blocks and `[# ... #]` for comments so the
//! delimiters never collide with YAML flow syntax.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};
use minijinja::{UndefinedBehavior, syntax::SyntaxConfig};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::{
    constants::{CONFIG_MAP_PREFIX, GROUP_ANNOTATION, OPERATOR_VERSION},
    context::EnvTemplate,
    objects::Environment,
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to configure the fragment template syntax"))]
    ConfigureSyntax { source: minijinja::Error },

    #[snafu(display("product version {version} is not available in the fragment catalog"))]
    VersionUnavailable { version: String },

    #[snafu(display("{version}/{name} does not exist, '{application}' KieApp not deployed"))]
    FragmentNotFound {
        version: String,
        name: String,
        application: String,
    },

    #[snafu(display("failed to render fragment {version}/{name}"))]
    RenderFragment {
        source: minijinja::Error,
        version: String,
        name: String,
    },

    #[snafu(display("failed to parse rendered fragment {version}/{name}"))]
    ParseFragment {
        source: serde_yaml::Error,
        version: String,
        name: String,
    },
}

/// A read-only, versioned catalog of fragment texts.
pub trait FragmentSource: Send + Sync {
    fn has_version(&self, version: &str) -> bool;

    fn read(&self, version: &str, name: &str) -> Option<String>;

    /// Logical names of every fragment of `version`.
    fn names(&self, version: &str) -> BTreeSet<String>;
}

/// Fragments held in memory, keyed by version and then by name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StaticSource {
    fragments: BTreeMap<String, BTreeMap<String, String>>,
}

macro_rules! bundled_fragments {
    ($source:ident, $version:literal) => {
        for (name, text) in bundled_fragments!(@files $version, [
            "common.yaml",
            "envs/rhpam-trial.yaml",
            "envs/rhpam-production.yaml",
            "envs/rhpam-production-immutable.yaml",
            "envs/rhpam-authoring.yaml",
            "envs/rhpam-authoring-ha.yaml",
            "envs/rhdm-trial.yaml",
            "envs/rhdm-authoring.yaml",
            "envs/rhdm-authoring-ha.yaml",
            "envs/rhdm-production-immutable.yaml",
            "dbs/h2.yaml",
            "dbs/mysql.yaml",
            "dbs/postgresql.yaml",
            "dbs/external.yaml",
            "jms/activemq-jms-config.yaml",
            "pim/pim.yaml",
            "dashbuilder/dashbuilder.yaml",
        ]) {
            $source.insert($version, name, text);
        }
    };
    (@files $version:literal, [$($name:literal),* $(,)?]) => {
        [$((
            $name,
            include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/", $version, "/", $name)),
        )),*]
    };
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog compiled into the operator binary.
    pub fn bundled() -> Self {
        let mut source = Self::new();
        bundled_fragments!(source, "7.8.0");
        bundled_fragments!(source, "7.7.1");
        source
    }

    pub fn insert(
        &mut self,
        version: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.fragments
            .entry(version.into())
            .or_default()
            .insert(name.into(), text.into());
    }

    pub fn with(
        mut self,
        version: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.insert(version, name, text);
        self
    }
}

impl FragmentSource for StaticSource {
    fn has_version(&self, version: &str) -> bool {
        self.fragments.contains_key(version)
    }

    fn read(&self, version: &str, name: &str) -> Option<String> {
        self.fragments.get(version)?.get(name).cloned()
    }

    fn names(&self, version: &str) -> BTreeSet<String> {
        self.fragments
            .get(version)
            .map(|fragments| fragments.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Fragments read from `<root>/<version>/<name>`.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FragmentSource for DirectorySource {
    fn has_version(&self, version: &str) -> bool {
        self.root.join(version).is_dir()
    }

    fn read(&self, version: &str, name: &str) -> Option<String> {
        fs::read_to_string(self.root.join(version).join(name)).ok()
    }

    fn names(&self, version: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_names(&self.root.join(version), "", &mut names);
        names
    }
}

fn collect_names(dir: &Path, prefix: &str, names: &mut BTreeSet<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let name = if prefix.is_empty() {
            file_name
        } else {
            format!("{prefix}/{file_name}")
        };
        if entry.path().is_dir() {
            collect_names(&entry.path(), &name, names);
        } else {
            names.insert(name);
        }
    }
}

/// Fragments published as `kieconfigs-<version>[-<dir>]` ConfigMaps, one data key per file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigMapSource {
    fragments: StaticSource,
}

impl ConfigMapSource {
    pub fn from_config_maps<'a>(config_maps: impl IntoIterator<Item = &'a ConfigMap>) -> Self {
        let mut fragments = StaticSource::new();
        for config_map in config_maps {
            let Some((version, dir)) = config_map
                .metadata
                .name
                .as_deref()
                .and_then(parse_config_map_name)
            else {
                continue;
            };
            for (key, text) in config_map.data.iter().flatten() {
                let name = match &dir {
                    Some(dir) => format!("{dir}/{key}"),
                    None => key.clone(),
                };
                fragments.insert(version.clone(), name, text.clone());
            }
        }
        Self { fragments }
    }
}

impl FragmentSource for ConfigMapSource {
    fn has_version(&self, version: &str) -> bool {
        self.fragments.has_version(version)
    }

    fn read(&self, version: &str, name: &str) -> Option<String> {
        self.fragments.read(version, name)
    }

    fn names(&self, version: &str) -> BTreeSet<String> {
        self.fragments.names(version)
    }
}

/// Returns the ConfigMap name and data key holding the fragment `name` of `version`.
pub fn config_map_name(version: &str, name: &str) -> (String, String) {
    match name.rsplit_once('/') {
        Some((dir, file)) => (
            format!("{CONFIG_MAP_PREFIX}-{version}-{}", dir.replace('/', "-")),
            file.to_owned(),
        ),
        None => (format!("{CONFIG_MAP_PREFIX}-{version}"), name.to_owned()),
    }
}

/// Splits `kieconfigs-7.8.0-envs` into the version and the fragment directory.
fn parse_config_map_name(name: &str) -> Option<(String, Option<String>)> {
    let rest = name.strip_prefix(CONFIG_MAP_PREFIX)?.strip_prefix('-')?;
    match rest.split_once('-') {
        Some((version, dir)) => Some((version.to_owned(), Some(dir.to_owned()))),
        None => Some((rest.to_owned(), None)),
    }
}

/// Builds the ConfigMaps publishing the catalog of `version`, annotated with the operator
/// version that wrote them.
pub fn catalog_config_maps(source: &dyn FragmentSource, version: &str) -> Vec<ConfigMap> {
    let mut data: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for name in source.names(version) {
        let Some(text) = source.read(version, &name) else {
            continue;
        };
        let (config_map, key) = config_map_name(version, &name);
        data.entry(config_map).or_default().insert(key, text);
    }

    data.into_iter()
        .map(|(name, data)| ConfigMap {
            metadata: ObjectMeta {
                name: Some(name),
                annotations: Some(BTreeMap::from([(
                    GROUP_ANNOTATION.to_owned(),
                    OPERATOR_VERSION.to_owned(),
                )])),
                ..ObjectMeta::default()
            },
            data: Some(data),
            ..ConfigMap::default()
        })
        .collect()
}

/// Renders and parses fragments from a [`FragmentSource`].
pub struct Loader {
    source: Arc<dyn FragmentSource>,
    env: minijinja::Environment<'static>,
}

impl Loader {
    pub fn new(source: Arc<dyn FragmentSource>) -> Result<Self> {
        let syntax = SyntaxConfig::builder()
            .variable_delimiters("[[", "]]")
            .block_delimiters("[%", "%]")
            .comment_delimiters("[#", "#]")
            .build()
            .context(ConfigureSyntaxSnafu)?;

        let mut env = minijinja::Environment::new();
        env.set_syntax(syntax);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        Ok(Self { source, env })
    }

    /// Returns the text of fragment `name` with every parameter substituted.
    pub fn render(&self, name: &str, version: &str, ctx: &EnvTemplate) -> Result<String> {
        ensure!(
            self.source.has_version(version),
            VersionUnavailableSnafu { version }
        );
        let text = self
            .source
            .read(version, name)
            .with_context(|| FragmentNotFoundSnafu {
                version,
                name,
                application: &ctx.common_config.application_name,
            })?;

        self.env
            .render_str(&text, ctx)
            .context(RenderFragmentSnafu { version, name })
    }

    /// Renders fragment `name` and parses the result. Substitution always happens on the raw
    /// text, parameters must be quoted by the fragment where YAML requires it.
    pub fn load(&self, name: &str, version: &str, ctx: &EnvTemplate) -> Result<Environment> {
        let rendered = self.render(name, version, ctx)?;
        if rendered.trim().is_empty() {
            return Ok(Environment::default());
        }
        serde_yaml::from_str(&rendered).context(ParseFragmentSnafu { version, name })
    }
}
