//! Derives the [`EnvTemplate`] a KieApp's fragments are rendered with.
//!
//! Defaulting works on a copy of the resource. Every value filled in here, generated passwords
//! and webhook secrets included, ends up in that copy's spec, which is persisted as
//! `status.applied` so the next reconcile reuses it.

use kube::ResourceExt;
use snafu::{OptionExt, Snafu};
use tracing::warn;

use crate::{
    constants::{
        BROKER_IMAGE_VAR, DASHBUILDER_IMAGE_VAR, DATABASE_VOLUME_SUFFIX, DATAGRID_IMAGE_VAR,
        DEFAULT_ADMIN_USER, DEFAULT_REPLICAS, EnvironmentConstants, GIT_HOOKS_DEFAULT_DIR,
        GIT_HOOKS_VOLUME, KEYSTORE_VOLUME_SUFFIX, MYSQL_IMAGE_VAR, OSE_CLI_IMAGE_VAR,
        POSTGRESQL_IMAGE_VAR, PROCESS_MIGRATION_IMAGE_VAR, ROLE_MAPPER_VOLUME,
        ReplicaPolicy, SMART_ROUTER_IMAGE_VAR, SMART_ROUTER_PROTOCOL, environment_constants,
        keystore_secret_name, version_constants,
    },
    context::{
        ConsoleTemplate, DashbuilderTemplate, EnvTemplate, GitHooksTemplate,
        ProcessMigrationTemplate, SmartRouterTemplate, TemplateConstants,
    },
    crd::{DatabaseObject, KieApp, KieAppObject, KieAppSpec},
    upgrade::major_minor_micro,
};

pub mod auth;
pub mod images;
pub mod passwords;
pub mod servers;

pub use self::{
    auth::configure_hostname,
    images::{ImageOverrides, ImageResolver, parse_image},
    passwords::{generate_password, set_passwords},
    servers::get_server_set,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("no image constants for product version {version}"))]
    MissingVersionConstants { version: String },

    #[snafu(display("duplicate kieserver name {name}"))]
    DuplicateServerName { name: String },

    #[snafu(display("cannot request {deployments} deployments for a build"))]
    BuildDeployments { deployments: u32 },

    #[snafu(display("external database configuration is mandatory for external database type"))]
    MissingExternalDatabase,

    #[snafu(display("multiple authentication types not supported"))]
    MultipleAuthTypes,

    #[snafu(display("roleMapper configuration must be declared together with SSO or LDAP"))]
    RoleMapperWithoutAuth,

    #[snafu(display("neither url nor realm can be empty"))]
    MissingSsoSettings,

    #[snafu(display("the url must not be empty"))]
    MissingLdapUrl,

    #[snafu(display(
        "the number of sso clients ({given}) must match the number of kie server deployments ({expected})"
    ))]
    SsoClientCount { given: usize, expected: usize },
}

/// Fills the version, application name and admin user of `kieapp`.
pub fn set_defaults(kieapp: &mut KieApp, version: &str) {
    let name = kieapp.name_any();
    let spec = &mut kieapp.spec;
    spec.version = Some(version.to_owned());
    if spec.common_config.application_name.is_empty() {
        spec.common_config.application_name = name;
    }
    if spec.common_config.admin_user.is_empty() {
        DEFAULT_ADMIN_USER.clone_into(&mut spec.common_config.admin_user);
    }
}

/// The replica count of a component. Environments that deny scaling overrule the requested
/// count and write their own back.
pub fn resolve_replicas(replicas: &mut Option<i32>, policy: ReplicaPolicy) -> i32 {
    match *replicas {
        Some(requested) if policy.deny_scale && requested != policy.replicas => {
            warn!(
                requested,
                replicas = policy.replicas,
                "scaling is not allowed in this environment, using its replica count"
            );
            *replicas = Some(policy.replicas);
            policy.replicas
        }
        Some(requested) => requested,
        None if policy.replicas > 0 => policy.replicas,
        None => DEFAULT_REPLICAS,
    }
}

pub(crate) fn router_protocol(protocol: Option<&str>) -> String {
    protocol
        .filter(|protocol| !protocol.is_empty())
        .unwrap_or(SMART_ROUTER_PROTOCOL)
        .to_owned()
}

fn keystore_secret(object: &KieAppObject, component: &str) -> String {
    object
        .keystore_secret
        .clone()
        .filter(|secret| !secret.is_empty())
        .unwrap_or_else(|| keystore_secret_name(component))
}

/// Defaults `kieapp` for `version` and derives the template context from it.
///
/// `kieapp` is expected to be a working copy. Its spec is left in the defaulted state.
pub fn build_context(
    kieapp: &mut KieApp,
    version: &str,
    overrides: &ImageOverrides,
) -> Result<EnvTemplate> {
    set_defaults(kieapp, version);
    let applied = kieapp.applied_spec().cloned();
    let application_name = kieapp.application_name();
    let spec = &mut kieapp.spec;
    let environment = environment_constants(spec.environment);

    set_passwords(
        &mut spec.common_config,
        applied.as_ref().map(|applied| &applied.common_config),
        spec.environment.is_trial(),
    );

    let images = ImageResolver {
        version,
        use_image_tags: spec.use_image_tags,
        overrides,
    };
    let constants = template_constants(&environment, version, &images)?;
    let console = console_template(spec, &application_name, &environment, &images);
    let smart_router = smart_router_template(spec, &application_name, &environment, &images);
    let process_migration = process_migration_template(spec, &application_name, &images)?;
    let dashbuilder = dashbuilder_template(spec, &application_name, &environment, &images);
    let servers = servers::servers_config(spec, &servers::ServerDefaults {
        application_name: &application_name,
        environment: &environment,
        images: &images,
        applied: applied
            .as_ref()
            .map(|applied| applied.objects.servers.as_slice())
            .unwrap_or_default(),
    })?;

    let mut template = EnvTemplate {
        common_config: spec.common_config.clone(),
        console,
        servers,
        smart_router,
        process_migration,
        dashbuilder,
        constants,
        ..EnvTemplate::default()
    };
    auth::configure_auth(spec, &application_name, &mut template)?;
    Ok(template)
}

fn template_constants(
    environment: &EnvironmentConstants,
    version: &str,
    images: &ImageResolver,
) -> Result<TemplateConstants> {
    let images_of_version = version_constants(version).context(MissingVersionConstantsSnafu {
        version: version.to_owned(),
    })?;
    let url = |image_var: &str, default: &str| -> String {
        images
            .overridden(image_var)
            .map_or_else(|| default.to_owned(), str::to_owned)
    };
    let (major, minor, micro) = major_minor_micro(version);

    let broker_image_url = url(BROKER_IMAGE_VAR, images_of_version.broker_image_url);
    let (broker_image, broker_image_tag, _) = parse_image(&broker_image_url);
    let datagrid_image_url = url(DATAGRID_IMAGE_VAR, images_of_version.datagrid_image_url);
    let (datagrid_image, datagrid_image_tag, _) = parse_image(&datagrid_image_url);

    Ok(TemplateConstants {
        product: environment.app.product.to_owned(),
        major,
        minor,
        micro,
        maven_repo: environment.app.maven_repo.to_owned(),
        keystore_volume_suffix: KEYSTORE_VOLUME_SUFFIX.to_owned(),
        database_volume_suffix: DATABASE_VOLUME_SUFFIX.to_owned(),
        broker_image,
        broker_image_tag,
        broker_image_url,
        datagrid_image,
        datagrid_image_tag,
        datagrid_image_url,
        mysql_image_url: url(MYSQL_IMAGE_VAR, images_of_version.mysql_image_url),
        postgresql_image_url: url(POSTGRESQL_IMAGE_VAR, images_of_version.postgresql_image_url),
        ose_cli_image_url: url(OSE_CLI_IMAGE_VAR, images_of_version.ose_cli_image_url),
        role_mapper_volume: ROLE_MAPPER_VOLUME.to_owned(),
        git_hooks_volume: GIT_HOOKS_VOLUME.to_owned(),
    })
}

fn console_template(
    spec: &mut KieAppSpec,
    application_name: &str,
    environment: &EnvironmentConstants,
    images: &ImageResolver,
) -> ConsoleTemplate {
    let app = environment.app;
    let console = &mut spec.objects.console;
    let git_hooks = console
        .git_hooks
        .as_ref()
        .map(|hooks| GitHooksTemplate {
            mount_path: if hooks.mount_path.is_empty() {
                GIT_HOOKS_DEFAULT_DIR.to_owned()
            } else {
                hooks.mount_path.clone()
            },
            from: hooks.from.as_ref().map(servers::object_template),
        })
        .unwrap_or_default();

    ConsoleTemplate {
        name: format!("{application_name}-{}", app.prefix),
        replicas: resolve_replicas(&mut console.object.replicas, environment.replicas.console),
        image: images.resolve(
            images::default_image_url(app.product, app.image_name, images.version),
            app.image_var,
            console.object.image.as_deref(),
            console.object.image_tag.as_deref(),
        ),
        keystore_secret: keystore_secret(
            &console.object,
            &format!("{application_name}-{}", app.image_name),
        ),
        git_hooks,
        jvm: console.jvm.clone().unwrap_or_default(),
        ..ConsoleTemplate::default()
    }
}

fn smart_router_template(
    spec: &mut KieAppSpec,
    application_name: &str,
    environment: &EnvironmentConstants,
    images: &ImageResolver,
) -> SmartRouterTemplate {
    let Some(router) = spec.objects.smart_router.as_mut() else {
        return SmartRouterTemplate::default();
    };
    let name = format!("{application_name}-smartrouter");

    SmartRouterTemplate {
        replicas: resolve_replicas(&mut router.object.replicas, environment.replicas.smart_router),
        image: images.resolve(
            images::default_image_url("rhpam", "smartrouter", images.version),
            SMART_ROUTER_IMAGE_VAR,
            router.object.image.as_deref(),
            router.object.image_tag.as_deref(),
        ),
        keystore_secret: keystore_secret(&router.object, &name),
        protocol: router_protocol(router.protocol.as_deref()),
        use_external_route: router.use_external_route,
        name,
    }
}

fn process_migration_template(
    spec: &KieAppSpec,
    application_name: &str,
    images: &ImageResolver,
) -> Result<ProcessMigrationTemplate> {
    let Some(migration) = &spec.objects.process_migration else {
        return Ok(ProcessMigrationTemplate::default());
    };

    Ok(ProcessMigrationTemplate {
        name: format!("{application_name}-process-migration"),
        image: images.resolve(
            images::default_image_url("rhpam", "process-migration", images.version),
            PROCESS_MIGRATION_IMAGE_VAR,
            migration.image.as_deref(),
            migration.image_tag.as_deref(),
        ),
        database: servers::database_config(
            Some(&DatabaseObject::default()),
            migration.database.as_ref(),
        )?,
    })
}

fn dashbuilder_template(
    spec: &mut KieAppSpec,
    application_name: &str,
    environment: &EnvironmentConstants,
    images: &ImageResolver,
) -> DashbuilderTemplate {
    let Some(dashbuilder) = spec.objects.dashbuilder.as_mut() else {
        return DashbuilderTemplate::default();
    };
    let name = format!("{application_name}-dashbuilder");

    DashbuilderTemplate {
        replicas: resolve_replicas(
            &mut dashbuilder.object.replicas,
            environment.replicas.dashbuilder,
        ),
        image: images.resolve(
            images::default_image_url("rhpam", "dashbuilder", images.version),
            DASHBUILDER_IMAGE_VAR,
            dashbuilder.object.image.as_deref(),
            dashbuilder.object.image_tag.as_deref(),
        ),
        keystore_secret: keystore_secret(&dashbuilder.object, &name),
        name,
    }
}
