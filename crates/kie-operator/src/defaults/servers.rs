use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::ObjectReference;
use snafu::ensure;
use tracing::debug;

use super::{
    BuildDeploymentsSnafu, DuplicateServerNameSnafu, MissingExternalDatabaseSnafu, Result,
    images::{ImageResolver, default_image_url},
    passwords::{PASSWORD_LENGTH, generate_string},
    resolve_replicas,
};
use crate::{
    constants::{
        DEFAULT_EXTENSION_IMAGE_INSTALL_DIR, DEFAULT_KIE_DEPLOYMENTS, DM_KIESERVER_IMAGE_VAR,
        EnvironmentConstants, IMAGE_STREAM_NAMESPACE, PAM_KIESERVER_IMAGE_VAR,
        keystore_secret_name,
    },
    context::{BuildTemplate, ObjectTemplate, ServerSmartRouterTemplate, ServerTemplate},
    crd::{
        DatabaseObject, DatabaseType, KieAppBuildObject, KieAppJmsObject, KieAppSpec, KieServerSet,
        WebhookSecret, WebhookType,
    },
};

const QUEUE_EXECUTOR: &str = "queue/KIE.SERVER.EXECUTOR";
const QUEUE_REQUEST: &str = "queue/KIE.SERVER.REQUEST";
const QUEUE_RESPONSE: &str = "queue/KIE.SERVER.RESPONSE";
const QUEUE_SIGNAL: &str = "queue/KIE.SERVER.SIGNAL";
const QUEUE_AUDIT: &str = "queue/KIE.SERVER.AUDIT";

/// Inputs shared by every server set.
pub struct ServerDefaults<'a> {
    pub application_name: &'a str,
    pub environment: &'a EnvironmentConstants,
    pub images: &'a ImageResolver<'a>,
    /// Server sets applied by the previous reconcile, in the same order.
    pub applied: &'a [KieServerSet],
}

fn is_unnamed(set: &KieServerSet) -> bool {
    set.name.as_deref().is_none_or(str::is_empty)
}

/// Name of the unnamed set at `unnamed_index`.
fn set_name(application_name: &str, unnamed_index: usize) -> String {
    if unnamed_index == 0 {
        format!("{application_name}-kieserver")
    } else {
        format!("{application_name}-kieserver{}", unnamed_index + 1)
    }
}

fn deployment_name(set_name: &str, deployment_index: u32) -> String {
    if deployment_index == 0 {
        set_name.to_owned()
    } else {
        format!("{set_name}-{}", deployment_index + 1)
    }
}

pub fn object_template(reference: &ObjectReference) -> ObjectTemplate {
    ObjectTemplate {
        kind: reference.kind.clone().unwrap_or_default(),
        name: reference.name.clone().unwrap_or_default(),
        namespace: reference.namespace.clone().unwrap_or_default(),
    }
}

/// Expands the server sets into one template per deployment.
///
/// Sets without a name are moved behind the named ones and named after the application.
/// Missing deployment counts, names, JMS credentials and webhook secrets are written back
/// into `spec`.
pub fn servers_config(spec: &mut KieAppSpec, defaults: &ServerDefaults) -> Result<Vec<ServerTemplate>> {
    let (named, unnamed): (Vec<_>, Vec<_>) = std::mem::take(&mut spec.objects.servers)
        .into_iter()
        .partition(|set| !is_unnamed(set));
    spec.objects.servers = named.into_iter().chain(unnamed).collect();
    if spec.objects.servers.is_empty() {
        spec.objects.servers.push(KieServerSet::default());
    }

    let router_protocol = spec
        .objects
        .smart_router
        .as_ref()
        .map(|router| super::router_protocol(router.protocol.as_deref()))
        .unwrap_or_default();
    let set_count = spec.objects.servers.len();
    let mut used_names = BTreeSet::new();
    let mut unset_names = 0;
    let mut templates = Vec::new();

    for (index, set) in spec.objects.servers.iter_mut().enumerate() {
        let deployments = *set.deployments.get_or_insert(DEFAULT_KIE_DEPLOYMENTS);
        if is_unnamed(set) {
            for _ in 0..set_count {
                let name = set_name(defaults.application_name, unset_names);
                if !used_names.contains(&name) {
                    set.name = Some(name);
                    break;
                }
                unset_names += 1;
            }
        }
        ensure!(
            set.build.is_none() || deployments <= 1,
            BuildDeploymentsSnafu { deployments }
        );
        let base_name = set
            .name
            .clone()
            .unwrap_or_else(|| set_name(defaults.application_name, unset_names));

        let set_template = set_template(set, defaults.applied.get(index), defaults, &router_protocol)?;
        for deployment in 0..deployments {
            let name = deployment_name(&base_name, deployment);
            ensure!(
                used_names.insert(name.clone()),
                DuplicateServerNameSnafu { name }
            );

            templates.push(ServerTemplate {
                kie_server_id: set
                    .id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| name.clone()),
                keystore_secret: set
                    .object
                    .keystore_secret
                    .clone()
                    .filter(|secret| !secret.is_empty())
                    .unwrap_or_else(|| keystore_secret_name(&name)),
                kie_name: name,
                ..set_template.clone()
            });
        }
    }
    Ok(templates)
}

/// The part of a server template shared by all deployments of a set.
fn set_template(
    set: &mut KieServerSet,
    applied: Option<&KieServerSet>,
    defaults: &ServerDefaults,
    router_protocol: &str,
) -> Result<ServerTemplate> {
    let product = defaults.environment.app.product;
    let replicas = resolve_replicas(&mut set.object.replicas, defaults.environment.replicas.server);

    let (image_from, omit_image_stream, image_url) = server_image(set, product, defaults.images);
    let build = build_template(
        set.build.as_mut(),
        applied.and_then(|applied| applied.build.as_ref()),
        image_from.clone(),
    );
    let from = if build.is_some() {
        ObjectTemplate {
            kind: "ImageStreamTag".to_owned(),
            name: format!("{}-kieserver:latest", defaults.application_name),
            namespace: String::new(),
        }
    } else {
        image_from
    };

    Ok(ServerTemplate {
        replicas,
        omit_image_stream: build.is_none() && omit_image_stream,
        image_url: if build.is_some() { String::new() } else { image_url },
        from,
        build,
        database: database_config(defaults.environment.database.as_ref(), set.database.as_ref())?,
        jms: jms_config(
            set.jms.as_mut(),
            applied.and_then(|applied| applied.jms.as_ref()),
        ),
        smart_router: ServerSmartRouterTemplate {
            protocol: router_protocol.to_owned(),
        },
        jvm: set.jvm.clone().unwrap_or_default(),
        ..ServerTemplate::default()
    })
}

/// The image a server set runs: its explicit `from`, else the product's KIE server image.
fn server_image(
    set: &KieServerSet,
    product: &str,
    images: &ImageResolver,
) -> (ObjectTemplate, bool, String) {
    if let Some(from) = &set.from {
        return (object_template(from), false, String::new());
    }

    let image_var = if product == "rhdm" {
        DM_KIESERVER_IMAGE_VAR
    } else {
        PAM_KIESERVER_IMAGE_VAR
    };
    let image = images.resolve(
        default_image_url(product, "kieserver", images.version),
        image_var,
        set.object.image.as_deref(),
        set.object.image_tag.as_deref(),
    );
    let from = ObjectTemplate {
        kind: "ImageStreamTag".to_owned(),
        name: format!("{}:{}", image.image, image.image_tag),
        namespace: IMAGE_STREAM_NAMESPACE.to_owned(),
    };
    (from, image.omit_image_stream, image.image_url)
}

fn webhook_secret(
    build: &mut KieAppBuildObject,
    applied: Option<&KieAppBuildObject>,
    type_: WebhookType,
) -> String {
    if let Some(webhook) = build.webhooks.iter().find(|webhook| webhook.type_ == type_) {
        return webhook.secret.clone();
    }
    let secret = applied
        .and_then(|applied| applied.webhooks.iter().find(|webhook| webhook.type_ == type_))
        .map_or_else(|| generate_string(PASSWORD_LENGTH), |webhook| webhook.secret.clone());
    build.webhooks.push(WebhookSecret {
        type_,
        secret: secret.clone(),
    });
    secret
}

fn build_template(
    build: Option<&mut KieAppBuildObject>,
    applied: Option<&KieAppBuildObject>,
    default_from: ObjectTemplate,
) -> Option<BuildTemplate> {
    let build = build?;

    let template = if build.extension_image_stream_tag.is_empty() {
        BuildTemplate {
            git_source: build.git_source.clone(),
            github_webhook_secret: webhook_secret(build, applied, WebhookType::GitHub),
            generic_webhook_secret: webhook_secret(build, applied, WebhookType::Generic),
            kie_server_container_deployment: build.kie_server_container_deployment.clone(),
            maven_mirror_url: build.maven_mirror_url.clone(),
            artifact_dir: build.artifact_dir.clone(),
            ..BuildTemplate::default()
        }
    } else {
        if build.extension_image_stream_tag_namespace.is_empty() {
            debug!(
                namespace = IMAGE_STREAM_NAMESPACE,
                "extension image stream tag has no namespace, using the default"
            );
            IMAGE_STREAM_NAMESPACE.clone_into(&mut build.extension_image_stream_tag_namespace);
        }
        if build.extension_image_install_dir.is_empty() {
            DEFAULT_EXTENSION_IMAGE_INSTALL_DIR.clone_into(&mut build.extension_image_install_dir);
        }
        BuildTemplate {
            extension_image_stream_tag: build.extension_image_stream_tag.clone(),
            extension_image_stream_tag_namespace: build.extension_image_stream_tag_namespace.clone(),
            extension_image_install_dir: build.extension_image_install_dir.clone(),
            ..BuildTemplate::default()
        }
    };

    Some(BuildTemplate {
        from: build.from.as_ref().map_or(default_from, object_template),
        ..template
    })
}

/// The database of a server set, falling back to the environment's database and size.
pub fn database_config(
    environment: Option<&DatabaseObject>,
    database: Option<&DatabaseObject>,
) -> Result<Option<DatabaseObject>> {
    let Some(database) = database else {
        return Ok(environment.cloned());
    };
    ensure!(
        database.type_ != DatabaseType::External || database.external_config.is_some(),
        MissingExternalDatabaseSnafu
    );

    let mut database = database.clone();
    if let Some(environment) = environment.filter(|_| database.size.is_empty()) {
        database.size.clone_from(&environment.size);
    }
    Ok(Some(database))
}

/// Completes the JMS settings of an integration enabled set. Values set on the resource are
/// kept, generated credentials are taken over from the previous reconcile.
pub fn jms_config(
    jms: Option<&mut KieAppJmsObject>,
    applied: Option<&KieAppJmsObject>,
) -> Option<KieAppJmsObject> {
    let jms = jms.filter(|jms| jms.enable_integration)?;

    jms.amq_enable_ssl = [
        &jms.amq_secret_name,
        &jms.amq_keystore_name,
        &jms.amq_keystore_password,
        &jms.amq_truststore_name,
        &jms.amq_truststore_password,
    ]
    .iter()
    .all(|value| !value.is_empty());
    let executor = *jms.executor.get_or_insert(true);
    jms.audit_transacted.get_or_insert(true);

    let queues = [
        (executor, &mut jms.queue_executor, QUEUE_EXECUTOR),
        (true, &mut jms.queue_request, QUEUE_REQUEST),
        (true, &mut jms.queue_response, QUEUE_RESPONSE),
        (jms.enable_signal, &mut jms.queue_signal, QUEUE_SIGNAL),
        (jms.enable_audit, &mut jms.queue_audit, QUEUE_AUDIT),
    ];
    let mut enabled = Vec::new();
    for (is_enabled, queue, default) in queues {
        if queue.is_empty() {
            default.clone_into(queue);
        }
        if is_enabled {
            enabled.push(queue.clone());
        }
    }
    if jms.amq_queues.is_empty() {
        jms.amq_queues = enabled.join(", ");
    }

    let applied = applied.cloned().unwrap_or_default();
    if jms.username.is_empty() {
        jms.username = if applied.username.is_empty() {
            format!("user{}", generate_string(4))
        } else {
            applied.username
        };
    }
    if jms.password.is_empty() {
        jms.password = if applied.password.is_empty() {
            generate_string(PASSWORD_LENGTH)
        } else {
            applied.password
        };
    }
    Some(jms.clone())
}

/// Maps a flat server index back to its set and deployment name.
pub fn get_server_set<'a>(
    spec: &'a KieAppSpec,
    application_name: &str,
    index: usize,
) -> Option<(&'a KieServerSet, String)> {
    let mut count = 0;
    let mut unnamed_sets = 0;
    for set in &spec.objects.servers {
        let deployments = set.deployments.unwrap_or(DEFAULT_KIE_DEPLOYMENTS);
        for deployment in 0..deployments {
            if count == index {
                let base_name = set
                    .name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| set_name(application_name, unnamed_sets));
                return Some((set, deployment_name(&base_name, deployment)));
            }
            count += 1;
        }
        if is_unnamed(set) {
            unnamed_sets += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::{
        constants::environment_constants,
        defaults::{Error, images::ImageOverrides},
    };

    fn expand(spec: &mut KieAppSpec) -> Result<Vec<ServerTemplate>> {
        let environment = environment_constants(spec.environment);
        let overrides = ImageOverrides::default();
        let images = ImageResolver {
            version: "7.8.0",
            use_image_tags: false,
            overrides: &overrides,
        };
        servers_config(spec, &ServerDefaults {
            application_name: "app",
            environment: &environment,
            images: &images,
            applied: &[],
        })
    }

    fn spec(yaml: &str) -> KieAppSpec {
        serde_yaml::from_str(yaml).expect("invalid test input")
    }

    fn names(templates: &[ServerTemplate]) -> Vec<&str> {
        templates
            .iter()
            .map(|template| template.kie_name.as_str())
            .collect()
    }

    #[test]
    fn empty_servers_yield_one_default_deployment() {
        let mut spec = KieAppSpec::default();

        let templates = expand(&mut spec).expect("servers expand");

        assert_eq!(names(&templates), ["app-kieserver"]);
        let server = &templates[0];
        assert_eq!(server.kie_server_id, "app-kieserver");
        assert_eq!(server.keystore_secret, "app-kieserver-app-secret");
        assert_eq!(server.from.name, "rhpam-kieserver-rhel8:7.8.0");
        assert_eq!(server.from.namespace, "openshift");
        assert_eq!(server.replicas, 1);
        assert_eq!(spec.objects.servers[0].deployments, Some(1));
        assert_eq!(spec.objects.servers[0].name.as_deref(), Some("app-kieserver"));
    }

    #[test]
    fn named_sets_come_first() {
        let mut spec = spec(indoc! {"
            objects:
              servers:
                - deployments: 2
                - name: named
                  deployments: 3
                  id: custom-id
                - {}
        "});

        let templates = expand(&mut spec).expect("servers expand");

        assert_eq!(
            names(&templates),
            [
                "named",
                "named-2",
                "named-3",
                "app-kieserver",
                "app-kieserver-2",
                "app-kieserver2"
            ]
        );
        assert!(templates[..3].iter().all(|server| server.kie_server_id == "custom-id"));

        let (set, name) = get_server_set(&spec, "app", 4).expect("index is in range");
        assert_eq!(name, "app-kieserver-2");
        assert_eq!(set.deployments, Some(2));
        let (_, name) = get_server_set(&spec, "app", 5).expect("index is in range");
        assert_eq!(name, "app-kieserver2");
        assert!(get_server_set(&spec, "app", 6).is_none());
    }

    #[rstest]
    #[case::same_name("[{name: dup}, {name: dup}]", "duplicate kieserver name dup")]
    #[case::deployment_collision(
        "[{name: a, deployments: 2}, {name: a-2}]",
        "duplicate kieserver name a-2"
    )]
    #[case::build(
        "[{deployments: 2, build: {gitSource: {uri: 'https://example.com/repo.git'}}}]",
        "cannot request 2 deployments for a build"
    )]
    fn invalid_server_sets(#[case] servers: &str, #[case] message: &str) {
        let mut spec = spec(&format!("objects:\n  servers: {servers}\n"));

        let error = expand(&mut spec).expect_err("server sets are invalid");

        assert_eq!(error.to_string(), message);
    }

    #[test]
    fn build_servers_use_the_built_image() {
        let mut spec = spec(indoc! {"
            objects:
              servers:
                - build:
                    kieServerContainerDeployment: rhpam-kieserver-library=org.openshift.quickstarts:rhpam-kieserver-library:1.6.0-SNAPSHOT
                    gitSource:
                      uri: https://github.com/jboss-container-images/rhpam-7-openshift-image.git
                      reference: main
                      contextDir: quickstarts/library-process/library
                    webhooks:
                      - type: GitHub
                        secret: s3cr3t
        "});

        let templates = expand(&mut spec).expect("servers expand");

        let server = &templates[0];
        assert_eq!(server.from.name, "app-kieserver:latest");
        assert!(!server.omit_image_stream);
        let build = server.build.as_ref().expect("build is set");
        assert_eq!(build.from.name, "rhpam-kieserver-rhel8:7.8.0");
        assert_eq!(build.github_webhook_secret, "s3cr3t");
        assert_eq!(build.generic_webhook_secret.len(), PASSWORD_LENGTH);

        let webhooks = &spec.objects.servers[0]
            .build
            .as_ref()
            .expect("build is set")
            .webhooks;
        assert_eq!(webhooks.len(), 2);
        assert_eq!(webhooks[1].secret, build.generic_webhook_secret);
    }

    #[test]
    fn extension_images_get_defaults() {
        let mut build = KieAppBuildObject {
            extension_image_stream_tag: "jboss-kie-db2-extension-openshift-image:11.1.4.4".to_owned(),
            ..KieAppBuildObject::default()
        };

        let template = build_template(Some(&mut build), None, ObjectTemplate::default())
            .expect("build is set");

        assert_eq!(template.extension_image_stream_tag_namespace, "openshift");
        assert_eq!(template.extension_image_install_dir, "/extensions");
        assert!(template.github_webhook_secret.is_empty());
        assert!(build.webhooks.is_empty());
    }

    #[test]
    fn jms_defaults() {
        let mut jms = KieAppJmsObject {
            enable_integration: true,
            enable_audit: true,
            queue_request: "queue/CUSTOM.REQUEST".to_owned(),
            password: "configured".to_owned(),
            ..KieAppJmsObject::default()
        };
        let applied = KieAppJmsObject {
            username: "userAbCd".to_owned(),
            ..KieAppJmsObject::default()
        };

        let jms = jms_config(Some(&mut jms), Some(&applied)).expect("integration is enabled");

        assert_eq!(jms.executor, Some(true));
        assert_eq!(jms.audit_transacted, Some(true));
        assert_eq!(
            jms.amq_queues,
            "queue/KIE.SERVER.EXECUTOR, queue/CUSTOM.REQUEST, queue/KIE.SERVER.RESPONSE, queue/KIE.SERVER.AUDIT"
        );
        assert_eq!(jms.queue_signal, QUEUE_SIGNAL);
        assert_eq!(jms.username, "userAbCd");
        assert_eq!(jms.password, "configured");
        assert!(!jms.amq_enable_ssl);
    }

    #[test]
    fn jms_generates_credentials_and_detects_ssl() {
        let mut jms = KieAppJmsObject {
            enable_integration: true,
            executor: Some(false),
            amq_secret_name: "broker-secret".to_owned(),
            amq_keystore_name: "broker.ks".to_owned(),
            amq_keystore_password: "changeme".to_owned(),
            amq_truststore_name: "broker.ts".to_owned(),
            amq_truststore_password: "changeme".to_owned(),
            ..KieAppJmsObject::default()
        };

        let jms = jms_config(Some(&mut jms), None).expect("integration is enabled");

        assert_eq!(
            jms.amq_queues,
            "queue/KIE.SERVER.REQUEST, queue/KIE.SERVER.RESPONSE"
        );
        assert!(jms.username.starts_with("user"));
        assert_eq!(jms.username.len(), 8);
        assert_eq!(jms.password.len(), PASSWORD_LENGTH);
        assert!(jms.amq_enable_ssl);

        let mut disabled = KieAppJmsObject::default();
        assert!(jms_config(Some(&mut disabled), None).is_none());
    }

    #[test]
    fn database_defaults_and_validation() {
        let environment = DatabaseObject {
            type_: DatabaseType::Mysql,
            size: "1Gi".to_owned(),
            external_config: None,
        };

        assert_eq!(
            database_config(Some(&environment), None).expect("database is valid"),
            Some(environment.clone())
        );

        let requested = DatabaseObject {
            type_: DatabaseType::Postgresql,
            ..DatabaseObject::default()
        };
        let database = database_config(Some(&environment), Some(&requested))
            .expect("database is valid")
            .expect("database is set");
        assert_eq!(database.type_, DatabaseType::Postgresql);
        assert_eq!(database.size, "1Gi");

        let external = DatabaseObject {
            type_: DatabaseType::External,
            ..DatabaseObject::default()
        };
        let error = database_config(None, Some(&external)).expect_err("external config missing");
        assert!(matches!(error, Error::MissingExternalDatabase));
        assert_eq!(
            error.to_string(),
            "external database configuration is mandatory for external database type"
        );
    }

    #[test]
    fn production_servers_default_to_the_environment_database() {
        let mut spec = spec(indoc! {"
            environment: rhpam-production
            objects:
              servers:
                - replicas: 5
        "});

        let templates = expand(&mut spec).expect("servers expand");

        assert_eq!(templates[0].replicas, 5);
        let database = templates[0].database.as_ref().expect("environment database");
        assert_eq!(database.type_, DatabaseType::Postgresql);
    }
}
