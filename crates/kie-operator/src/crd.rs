//! The [`KieApp`] custom resource.
//!
//! Types that are rendered into fragments (auth, database, messaging, JVM and build sources)
//! serialize every field, including empty ones, so the strict template engine can test them.

use k8s_openapi::api::core::v1::{EnvVar, ObjectReference, ResourceRequirements};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

use crate::{
    constants::TRIAL_ENV_SUFFIX,
    status::{Condition, ConditionBuffer, ConditionType},
};

/// Provisions a KIE business automation environment: a console, a set of KIE servers and the
/// optional smart router, process migration and dashbuilder services.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "app.kiegroup.org",
    version = "v2",
    kind = "KieApp",
    plural = "kieapps",
    singular = "kieapp",
    shortname = "kieapp",
    status = "KieAppStatus",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#,
    printcolumn = r#"{"name":"Environment","type":"string","jsonPath":".spec.environment"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(default, rename_all = "camelCase")]
pub struct KieAppSpec {
    /// The name of the environment used as a baseline.
    pub environment: EnvironmentType,

    /// The registry missing image stream tags are imported from.
    pub image_registry: Option<KieAppRegistry>,

    /// Per component overrides.
    pub objects: KieAppObjects,

    pub common_config: CommonConfig,

    pub auth: KieAppAuthObject,

    pub upgrades: KieAppUpgrades,

    /// The product version to deploy. Defaults to the newest supported version.
    pub version: Option<String>,

    /// Use image tags from the registry instead of image streams.
    pub use_image_tags: bool,
}

impl KieApp {
    /// The application name used as the prefix of every derived object.
    pub fn application_name(&self) -> String {
        if self.spec.common_config.application_name.is_empty() {
            self.name_any()
        } else {
            self.spec.common_config.application_name.clone()
        }
    }

    /// The version recorded after the last successful reconcile.
    pub fn applied_version(&self) -> Option<&str> {
        self.status.as_ref()?.version.as_deref()
    }

    /// The defaulted spec persisted after the last successful reconcile.
    pub fn applied_spec(&self) -> Option<&KieAppSpec> {
        self.status.as_ref()?.applied.as_ref()
    }
}

#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    EnumIter,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EnvironmentType {
    #[default]
    RhpamTrial,
    RhpamProduction,
    RhpamProductionImmutable,
    RhpamAuthoring,
    RhpamAuthoringHa,
    RhdmTrial,
    RhdmAuthoring,
    RhdmAuthoringHa,
    RhdmProductionImmutable,
}

impl EnvironmentType {
    pub fn is_trial(self) -> bool {
        self.as_ref().ends_with(TRIAL_ENV_SUFFIX)
    }

    /// Fragment name of the environment specific overrides.
    pub fn fragment_name(self) -> String {
        format!("envs/{self}.yaml")
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KieAppRegistry {
    /// Registry to use, for example `registry.redhat.io`.
    pub registry: Option<String>,

    /// Whether the registry is insecure.
    pub insecure: bool,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KieAppObjects {
    /// Business Central or Decision Central configuration.
    pub console: ConsoleObject,

    /// KIE server sets. An empty list deploys a single default set.
    pub servers: Vec<KieServerSet>,

    /// Deploys a smart router when set.
    pub smart_router: Option<SmartRouterObject>,

    /// Deploys the process instance migration service when set.
    pub process_migration: Option<ProcessMigrationObject>,

    /// Deploys dashbuilder when set.
    pub dashbuilder: Option<DashbuilderObject>,
}

/// Settings shared by every component.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KieAppObject {
    /// Environment variables added to, or replacing the ones of, the component's container.
    pub env: Vec<EnvVar>,

    /// Number of pods. Environments that deny scaling ignore this.
    pub replicas: Option<i32>,

    /// Resource requests and limits of the component's container.
    pub resources: Option<ResourceRequirements>,

    /// Name of the secret holding the component's keystore.
    pub keystore_secret: Option<String>,

    pub image: Option<String>,

    pub image_tag: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsoleObject {
    #[serde(flatten)]
    pub object: KieAppObject,

    pub sso_client: Option<SsoAuthClient>,

    /// Git hooks mounted into the console.
    pub git_hooks: Option<GitHooksVolume>,

    pub jvm: Option<JvmObject>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KieServerSet {
    /// Number of KIE server DeploymentConfigs of this set. Defaults to 1.
    pub deployments: Option<u32>,

    /// Name of the set, used as the DeploymentConfig name.
    pub name: Option<String>,

    /// KIE server id, defaults to the DeploymentConfig name.
    pub id: Option<String>,

    /// Image the servers run, takes precedence over every other image setting.
    pub from: Option<ObjectReference>,

    /// S2I build of the server image.
    pub build: Option<KieAppBuildObject>,

    pub sso_client: Option<SsoAuthClient>,

    #[serde(flatten)]
    pub object: KieAppObject,

    pub database: Option<DatabaseObject>,

    pub jms: Option<KieAppJmsObject>,

    pub jvm: Option<JvmObject>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmartRouterObject {
    #[serde(flatten)]
    pub object: KieAppObject,

    /// `http` or `https`, defaults to `http`.
    pub protocol: Option<String>,

    pub use_external_route: bool,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessMigrationObject {
    pub image: Option<String>,

    pub image_tag: Option<String>,

    pub database: Option<DatabaseObject>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DashbuilderObject {
    #[serde(flatten)]
    pub object: KieAppObject,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KieAppBuildObject {
    pub kie_server_container_deployment: String,

    pub git_source: GitSource,

    #[serde(rename = "mavenMirrorURL")]
    pub maven_mirror_url: String,

    pub artifact_dir: String,

    /// Webhook secrets, generated when missing.
    pub webhooks: Vec<WebhookSecret>,

    /// Builder image, defaults to the KIE server image.
    pub from: Option<ObjectReference>,

    /// Extension image stream tag, such as a JDBC driver image.
    pub extension_image_stream_tag: String,

    pub extension_image_stream_tag_namespace: String,

    pub extension_image_install_dir: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GitSource {
    pub uri: String,
    pub reference: String,
    pub context_dir: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum WebhookType {
    GitHub,
    Generic,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct WebhookSecret {
    #[serde(rename = "type")]
    pub type_: WebhookType,
    pub secret: String,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GitHooksVolume {
    /// Defaults to `/opt/kie/data/git/hooks`.
    pub mount_path: String,

    /// ConfigMap, Secret or PersistentVolumeClaim holding the hooks.
    pub from: Option<ObjectReference>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KieAppAuthObject {
    pub sso: Option<SsoAuthConfig>,
    pub ldap: Option<LdapAuthConfig>,
    pub role_mapper: Option<RoleMapperAuthConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SsoAuthConfig {
    pub url: String,
    pub realm: String,
    pub admin_user: String,
    pub admin_password: String,
    #[serde(rename = "disableSSLCertValidation")]
    pub disable_ssl_cert_validation: bool,
    /// Defaults to `preferred_username`.
    pub principal_attribute: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SsoAuthClient {
    pub name: String,
    pub secret: String,
    #[serde(rename = "hostnameHTTP")]
    pub hostname_http: String,
    #[serde(rename = "hostnameHTTPS")]
    pub hostname_https: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LdapAuthConfig {
    pub url: String,
    #[serde(rename = "bindDN")]
    pub bind_dn: String,
    pub bind_credential: String,
    pub jaas_security_domain: String,
    #[serde(rename = "baseCtxDN")]
    pub base_ctx_dn: String,
    pub base_filter: String,
    /// One of `SUBTREE_SCOPE`, `OBJECT_SCOPE` or `ONELEVEL_SCOPE`.
    pub search_scope: String,
    pub search_time_limit: Option<i32>,
    pub distinguished_name_attribute: String,
    pub parse_username: bool,
    pub username_begin_string: String,
    pub username_end_string: String,
    #[serde(rename = "roleAttributeID")]
    pub role_attribute_id: String,
    #[serde(rename = "rolesCtxDN")]
    pub roles_ctx_dn: String,
    pub role_filter: String,
    pub role_recursion: Option<i32>,
    pub default_role: String,
    #[serde(rename = "roleNameAttributeID")]
    pub role_name_attribute_id: String,
    #[serde(rename = "parseRoleNameFromDN")]
    pub parse_role_name_from_dn: bool,
    #[serde(rename = "roleAttributeIsDN")]
    pub role_attribute_is_dn: bool,
    #[serde(rename = "referralUserAttributeIDToCheck")]
    pub referral_user_attribute_id_to_check: String,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoleMapperAuthConfig {
    /// Path of the roles properties file, a bare file name is placed in the default directory.
    pub roles_properties: String,
    pub replace_role: bool,
    /// ConfigMap, Secret or PersistentVolumeClaim holding the properties file.
    pub from: Option<ObjectReference>,
}

#[derive(
    AsRefStr, Clone, Copy, Debug, Default, Deserialize, Display, Eq, JsonSchema, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    H2,
    Mysql,
    Postgresql,
    External,
}

impl DatabaseType {
    /// Fragment name of the database add-on.
    pub fn fragment_name(self) -> String {
        format!("dbs/{self}.yaml")
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseObject {
    #[serde(rename = "type")]
    pub type_: DatabaseType,

    /// Size of the persistent volume, defaults to the environment's database size.
    pub size: String,

    /// Mandatory for the `external` type.
    pub external_config: Option<ExternalDatabaseObject>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExternalDatabaseObject {
    pub driver: String,
    pub dialect: String,
    pub name: String,
    pub host: String,
    pub port: String,
    #[serde(rename = "jdbcURL")]
    pub jdbc_url: String,
    #[serde(rename = "nonXA")]
    pub non_xa: String,
    pub username: String,
    pub password: String,
    pub min_pool_size: String,
    pub max_pool_size: String,
    pub connection_checker: String,
    pub exception_sorter: String,
    pub background_validation: String,
    pub background_validation_millis: String,
}

/// JMS integration of a KIE server set.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct KieAppJmsObject {
    pub enable_integration: bool,
    /// Defaults to true.
    pub executor: Option<bool>,
    pub executor_transacted: bool,
    pub queue_request: String,
    pub queue_response: String,
    pub queue_executor: String,
    pub enable_signal: bool,
    pub queue_signal: String,
    pub enable_audit: bool,
    pub queue_audit: String,
    /// Defaults to true.
    pub audit_transacted: Option<bool>,
    pub username: String,
    pub password: String,
    /// Comma separated list of the enabled queues, computed.
    pub amq_queues: String,
    pub amq_secret_name: String,
    pub amq_truststore_name: String,
    pub amq_truststore_password: String,
    pub amq_keystore_name: String,
    pub amq_keystore_password: String,
    /// Set when every AMQ SSL parameter is present, computed.
    #[serde(rename = "amqEnableSSL")]
    pub amq_enable_ssl: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JvmObject {
    pub java_opts_append: String,
    pub java_max_mem_ratio: Option<i32>,
    pub java_initial_mem_ratio: Option<i32>,
    pub java_max_initial_mem: Option<i32>,
    pub java_diagnostics: Option<bool>,
    pub java_debug: Option<bool>,
    pub java_debug_port: Option<i32>,
    pub gc_min_heap_free_ratio: Option<i32>,
    pub gc_max_heap_free_ratio: Option<i32>,
    pub gc_time_ratio: Option<i32>,
    pub gc_adaptive_size_policy_weight: Option<i32>,
    pub gc_max_metaspace_size: Option<i32>,
    pub gc_container_options: String,
}

/// Credentials shared by every component. Empty passwords are generated once and kept.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommonConfig {
    pub application_name: String,
    pub key_store_password: String,
    pub admin_user: String,
    pub admin_password: String,
    pub db_password: String,
    pub amq_password: String,
    pub amq_cluster_password: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KieAppUpgrades {
    /// Allow micro version upgrades, for example 7.7.0 to 7.7.1.
    pub enabled: bool,

    /// Additionally allow minor version upgrades, for example 7.7.x to 7.8.0.
    pub minor: bool,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KieAppStatus {
    /// The most recent conditions, oldest first.
    #[schemars(with = "Vec<Condition>")]
    pub conditions: ConditionBuffer,

    /// URL of the console.
    pub console_host: Option<String>,

    /// Names of the DeploymentConfigs managed for this application.
    pub deployments: Vec<String>,

    pub phase: Option<ConditionType>,

    /// The version that was last applied.
    pub version: Option<String>,

    /// The spec after defaulting, including generated credentials.
    pub applied: Option<KieAppSpec>,
}
