//! Parameters substituted into fragments.
//!
//! Every field is serialized, also when empty or `null`, so fragments can test for it under the
//! strict undefined behavior of the template engine.

use serde::Serialize;

use crate::crd::{
    CommonConfig, DatabaseObject, GitSource, JvmObject, KieAppJmsObject, LdapAuthConfig,
    SsoAuthClient, SsoAuthConfig,
};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvTemplate {
    #[serde(flatten)]
    pub common_config: CommonConfig,
    pub console: ConsoleTemplate,
    pub servers: Vec<ServerTemplate>,
    pub smart_router: SmartRouterTemplate,
    pub process_migration: ProcessMigrationTemplate,
    pub dashbuilder: DashbuilderTemplate,
    pub auth: AuthTemplate,
    pub constants: TemplateConstants,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConstants {
    pub product: String,
    pub major: String,
    pub minor: String,
    pub micro: String,
    pub maven_repo: String,
    pub keystore_volume_suffix: String,
    pub database_volume_suffix: String,
    pub broker_image: String,
    pub broker_image_tag: String,
    #[serde(rename = "brokerImageURL")]
    pub broker_image_url: String,
    pub datagrid_image: String,
    pub datagrid_image_tag: String,
    #[serde(rename = "datagridImageURL")]
    pub datagrid_image_url: String,
    #[serde(rename = "mySQLImageURL")]
    pub mysql_image_url: String,
    #[serde(rename = "postgreSQLImageURL")]
    pub postgresql_image_url: String,
    #[serde(rename = "oseCliImageURL")]
    pub ose_cli_image_url: String,
    pub role_mapper_volume: String,
    pub git_hooks_volume: String,
}

/// Image selection shared by every component template.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageTemplate {
    /// Pull `imageURL` directly instead of tracking an image stream tag.
    pub omit_image_stream: bool,
    pub image: String,
    pub image_tag: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    /// Namespace of the image stream.
    pub image_stream_namespace: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleTemplate {
    pub name: String,
    pub replicas: i32,
    #[serde(flatten)]
    pub image: ImageTemplate,
    pub keystore_secret: String,
    pub sso_auth_client: SsoAuthClient,
    pub git_hooks: GitHooksTemplate,
    pub jvm: JvmObject,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHooksTemplate {
    pub mount_path: String,
    /// Volume source, `null` when no hooks are mounted.
    pub from: Option<ObjectTemplate>,
}

/// An object reference with every field present.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTemplate {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTemplate {
    pub kie_name: String,
    #[serde(rename = "kieServerID")]
    pub kie_server_id: String,
    pub replicas: i32,
    pub omit_image_stream: bool,
    /// Image the server runs.
    pub from: ObjectTemplate,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    /// `null` unless the server image is built from source.
    pub build: Option<BuildTemplate>,
    pub keystore_secret: String,
    pub database: Option<DatabaseObject>,
    pub jms: Option<KieAppJmsObject>,
    pub smart_router: ServerSmartRouterTemplate,
    pub sso_auth_client: SsoAuthClient,
    pub jvm: JvmObject,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSmartRouterTemplate {
    pub protocol: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTemplate {
    /// Builder image.
    pub from: ObjectTemplate,
    pub git_source: GitSource,
    pub github_webhook_secret: String,
    pub generic_webhook_secret: String,
    pub kie_server_container_deployment: String,
    #[serde(rename = "mavenMirrorURL")]
    pub maven_mirror_url: String,
    pub artifact_dir: String,
    pub extension_image_stream_tag: String,
    pub extension_image_stream_tag_namespace: String,
    pub extension_image_install_dir: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartRouterTemplate {
    pub name: String,
    pub replicas: i32,
    #[serde(flatten)]
    pub image: ImageTemplate,
    pub keystore_secret: String,
    pub protocol: String,
    pub use_external_route: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMigrationTemplate {
    pub name: String,
    #[serde(flatten)]
    pub image: ImageTemplate,
    pub database: Option<DatabaseObject>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashbuilderTemplate {
    pub name: String,
    pub replicas: i32,
    #[serde(flatten)]
    pub image: ImageTemplate,
    pub keystore_secret: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTemplate {
    pub sso: Option<SsoAuthConfig>,
    pub ldap: Option<LdapAuthConfig>,
    pub role_mapper: Option<RoleMapperTemplate>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMapperTemplate {
    pub roles_properties: String,
    pub replace_role: bool,
    /// Directory the properties file is mounted into.
    pub mount_path: String,
    pub from: Option<ObjectTemplate>,
}
