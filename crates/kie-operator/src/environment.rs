//! Synthesizes the [`Environment`] of a KieApp from its fragments.
//!
//! The environment fragment is merged over `common.yaml`, then the add-ons a resource asks for
//! (databases, messaging, process migration and dashbuilder) are merged over the result.

use k8s_openapi::{DeepMerge, api::core::v1::Container};
use snafu::{ResultExt, Snafu};
use tracing::debug;

use crate::{
    context::EnvTemplate,
    crd::{DatabaseType, KieApp, KieAppObject, KieAppSpec},
    defaults::{self, ImageOverrides, get_server_set},
    fragment::{self, Loader},
    merge::{self, env_override, merge_custom_object, merge_environment},
    objects::{CustomObject, Environment},
    upgrade::{self, ResolvedVersion, VersionCatalog},
};

pub const COMMON_FRAGMENT: &str = "common.yaml";
pub const JMS_FRAGMENT: &str = "jms/activemq-jms-config.yaml";
pub const PROCESS_MIGRATION_FRAGMENT: &str = "pim/pim.yaml";
pub const DASHBUILDER_FRAGMENT: &str = "dashbuilder/dashbuilder.yaml";

/// Variables pointing KIE servers at the smart router.
const ROUTER_ENV: &[&str] = &[
    "KIE_SERVER_ROUTER_SERVICE",
    "KIE_SERVER_ROUTER_PORT",
    "KIE_SERVER_ROUTER_PROTOCOL",
];

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to resolve the product version"))]
    ResolveVersion { source: upgrade::Error },

    #[snafu(display("failed to apply defaults"))]
    ApplyDefaults { source: defaults::Error },

    #[snafu(display("failed to load fragment"))]
    LoadFragment { source: fragment::Error },

    #[snafu(display("failed to merge fragment {name}"))]
    MergeFragment { source: merge::Error, name: String },
}

/// The outcome of synthesizing one KieApp.
#[derive(Clone, Debug)]
pub struct Synthesis {
    pub environment: Environment,
    pub context: EnvTemplate,
    /// A copy of the resource with every default applied.
    pub kieapp: KieApp,
    pub version: ResolvedVersion,
}

/// Turns KieApps into environments using one fragment catalog.
pub struct Synthesizer {
    loader: Loader,
    catalog: VersionCatalog,
    overrides: ImageOverrides,
}

impl Synthesizer {
    pub fn new(loader: Loader, catalog: VersionCatalog, overrides: ImageOverrides) -> Self {
        Self {
            loader,
            catalog,
            overrides,
        }
    }

    fn load(&self, name: &str, version: &str, context: &EnvTemplate) -> Result<Environment> {
        debug!(fragment = name, version, "loading fragment");
        self.loader
            .load(name, version, context)
            .context(LoadFragmentSnafu)
    }

    pub fn get_environment(&self, kieapp: &KieApp) -> Result<Synthesis> {
        let resolved = upgrade::resolve_version(kieapp, &self.catalog).context(ResolveVersionSnafu)?;
        let version = resolved.version.as_str();
        let mut working = kieapp.clone();
        let context = defaults::build_context(&mut working, version, &self.overrides)
            .context(ApplyDefaultsSnafu)?;
        let spec = &working.spec;

        let common = self.load(COMMON_FRAGMENT, version, &context)?;
        let environment_name = spec.environment.fragment_name();
        let mut overwrite = self.load(&environment_name, version, &context)?;
        if spec.objects.smart_router.is_none() {
            overwrite.smart_router.omit = true;
        }
        let mut environment = merge_environment(common, overwrite).context(MergeFragmentSnafu {
            name: environment_name,
        })?;

        if environment.smart_router.omit {
            for server in &mut environment.servers {
                strip_router_env(server);
            }
        }
        self.merge_databases(&mut environment, &context, version)?;
        if context.servers.iter().any(|server| server.jms.is_some()) {
            let jms = self.load(JMS_FRAGMENT, version, &context)?;
            merge_server_addons(&mut environment, jms, JMS_FRAGMENT)?;
        }

        environment.process_migration = if spec.objects.process_migration.is_some() {
            let migration = self.load(PROCESS_MIGRATION_FRAGMENT, version, &context)?;
            merge_component(
                environment.process_migration,
                migration.process_migration,
                PROCESS_MIGRATION_FRAGMENT,
            )?
        } else {
            omitted(environment.process_migration)
        };
        environment.dashbuilder = if spec.objects.dashbuilder.is_some() {
            let dashbuilder = self.load(DASHBUILDER_FRAGMENT, version, &context)?;
            merge_component(
                environment.dashbuilder,
                dashbuilder.dashbuilder,
                DASHBUILDER_FRAGMENT,
            )?
        } else {
            omitted(environment.dashbuilder)
        };

        Ok(Synthesis {
            environment,
            context,
            kieapp: working,
            version: resolved,
        })
    }

    /// Merges the database fragment of every database type in use, each loaded once.
    fn merge_databases(
        &self,
        environment: &mut Environment,
        context: &EnvTemplate,
        version: &str,
    ) -> Result<()> {
        let mut types: Vec<DatabaseType> = Vec::new();
        let in_use = context
            .servers
            .iter()
            .filter_map(|server| server.database.as_ref())
            .map(|database| database.type_);
        for type_ in in_use {
            if !types.contains(&type_) {
                types.push(type_);
            }
        }

        for type_ in types {
            let name = type_.fragment_name();
            let databases = self.load(&name, version, context)?;
            merge_server_addons(environment, databases, &name)?;
        }
        Ok(())
    }
}

fn omitted(object: CustomObject) -> CustomObject {
    CustomObject {
        omit: true,
        ..object
    }
}

fn merge_component(
    baseline: CustomObject,
    overwrite: CustomObject,
    name: &str,
) -> Result<CustomObject> {
    merge_custom_object(baseline, overwrite).context(MergeFragmentSnafu { name })
}

/// Merges every server of `addon` into the server whose first DeploymentConfig has the same
/// name. Add-on servers without a match are ignored.
fn merge_server_addons(environment: &mut Environment, addon: Environment, name: &str) -> Result<()> {
    for patch in addon.servers {
        let Some(patch_name) = patch.first_deployment_config_name().map(str::to_owned) else {
            continue;
        };
        let server = environment
            .servers
            .iter_mut()
            .find(|server| server.first_deployment_config_name() == Some(patch_name.as_str()));
        if let Some(server) = server {
            *server = merge_component(std::mem::take(server), patch, name)?;
        }
    }
    Ok(())
}

fn dc_containers(object: &mut CustomObject) -> impl Iterator<Item = &mut Container> {
    object
        .deployment_configs
        .iter_mut()
        .filter_map(|dc| dc.spec.template.as_mut())
        .filter_map(|template| template.spec.as_mut())
        .flat_map(|pod| pod.containers.iter_mut())
}

fn strip_router_env(server: &mut CustomObject) {
    for container in dc_containers(server) {
        if let Some(env) = container.env.as_mut() {
            env.retain(|var| !ROUTER_ENV.contains(&var.name.as_str()));
        }
    }
}

/// Applies the env vars and resources a resource sets on a component to every container of
/// the component's DeploymentConfigs.
pub fn construct_object(object: &mut CustomObject, config: &KieAppObject) {
    for container in dc_containers(object) {
        if !config.env.is_empty() {
            env_override(container.env.get_or_insert_with(Vec::new), config.env.clone());
        }
        if let Some(resources) = &config.resources {
            container
                .resources
                .get_or_insert_with(Default::default)
                .merge_from(resources.clone());
        }
    }
}

/// Applies [`construct_object`] to the console, smart router, dashbuilder and every server.
/// `spec` is the defaulted spec the environment was synthesized from.
pub fn consolidate_objects(environment: &mut Environment, spec: &KieAppSpec) {
    let objects = &spec.objects;
    construct_object(&mut environment.console, &objects.console.object);
    if let Some(router) = &objects.smart_router {
        construct_object(&mut environment.smart_router, &router.object);
    }
    if let Some(dashbuilder) = &objects.dashbuilder {
        construct_object(&mut environment.dashbuilder, &dashbuilder.object);
    }

    let application_name = &spec.common_config.application_name;
    for (index, server) in environment.servers.iter_mut().enumerate() {
        if let Some((set, _)) = get_server_set(spec, application_name, index) {
            construct_object(server, &set.object);
        }
    }
}
