//! Product constants shared by the assembler, the fragment catalog and the reconciler.
//!
//! Per-environment and per-version values are looked up through [`environment_constants`] and
//! [`version_constants`] instead of global maps.

use crate::crd::{DatabaseObject, DatabaseType, EnvironmentType};

/// The newest product version this operator ships fragments for.
pub const CURRENT_VERSION: &str = "7.8.0";

/// Every product version with a bundled fragment catalog, newest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["7.8.0", "7.7.1"];

pub const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const OPERATOR_NAME: &str = "kie-operator";

/// Annotation key recording which operator version published an object.
pub const GROUP_ANNOTATION: &str = "app.kiegroup.org";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

pub const DEFAULT_PASSWORD: &str = "RedHat";
pub const DEFAULT_ADMIN_USER: &str = "adminUser";
pub const TRIAL_ENV_SUFFIX: &str = "-trial";

pub const DEFAULT_KIE_DEPLOYMENTS: u32 = 1;
pub const DEFAULT_REPLICAS: i32 = 1;

pub const IMAGE_STREAM_NAMESPACE: &str = "openshift";
pub const DEFAULT_REGISTRY: &str = "registry.redhat.io";
pub const RHEL_VERSION: &str = "-rhel8";

pub const CONFIG_MAP_PREFIX: &str = "kieconfigs";

pub const SSO_DEFAULT_PRINCIPAL_ATTRIBUTE: &str = "preferred_username";
pub const ROLE_MAPPER_DEFAULT_DIR: &str = "/opt/eap/standalone/configuration/rolemapping";
pub const GIT_HOOKS_DEFAULT_DIR: &str = "/opt/kie/data/git/hooks";
pub const DEFAULT_EXTENSION_IMAGE_INSTALL_DIR: &str = "/extensions";
pub const SMART_ROUTER_PROTOCOL: &str = "http";

pub const KEYSTORE_VOLUME_SUFFIX: &str = "keystore-volume";
pub const DATABASE_VOLUME_SUFFIX: &str = "pvol";
pub const ROLE_MAPPER_VOLUME: &str = "rolemapping-volume";
pub const GIT_HOOKS_VOLUME: &str = "githooks-volume";

pub const SMART_ROUTER_IMAGE_VAR: &str = "RELATED_IMAGE_SMARTROUTER_";
pub const PAM_KIESERVER_IMAGE_VAR: &str = "RELATED_IMAGE_KIESERVER_";
pub const DM_KIESERVER_IMAGE_VAR: &str = "RELATED_IMAGE_DM_KIESERVER_";
pub const PROCESS_MIGRATION_IMAGE_VAR: &str = "RELATED_IMAGE_PROCESS_MIGRATION_";
pub const DASHBUILDER_IMAGE_VAR: &str = "RELATED_IMAGE_DASHBUILDER_";
pub const MYSQL_IMAGE_VAR: &str = "RELATED_IMAGE_MYSQL_";
pub const POSTGRESQL_IMAGE_VAR: &str = "RELATED_IMAGE_POSTGRESQL_";
pub const BROKER_IMAGE_VAR: &str = "RELATED_IMAGE_BROKER_";
pub const DATAGRID_IMAGE_VAR: &str = "RELATED_IMAGE_DATAGRID_";
pub const OSE_CLI_IMAGE_VAR: &str = "RELATED_IMAGE_OSE_CLI_";

/// Returns the name of the keystore secret a component mounts unless one is configured.
pub fn keystore_secret_name(component: &str) -> String {
    format!("{component}-app-secret")
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AppConstants {
    pub product: &'static str,
    pub prefix: &'static str,
    pub image_name: &'static str,
    pub image_var: &'static str,
    pub maven_repo: &'static str,
    pub friendly_name: &'static str,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReplicaPolicy {
    pub replicas: i32,
    /// The environment pins `replicas`, user supplied counts are overruled.
    pub deny_scale: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReplicaConstants {
    pub console: ReplicaPolicy,
    pub server: ReplicaPolicy,
    pub smart_router: ReplicaPolicy,
    pub dashbuilder: ReplicaPolicy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentConstants {
    pub app: AppConstants,
    pub replicas: ReplicaConstants,
    pub database: Option<DatabaseObject>,
}

const RHPAM_CONSOLE: AppConstants = AppConstants {
    product: "rhpam",
    prefix: "rhpamcentr",
    image_name: "businesscentral",
    image_var: "RELATED_IMAGE_BC_",
    maven_repo: "RHPAMCENTR",
    friendly_name: "Business Central",
};

const RHPAM_MONITORING_CONSOLE: AppConstants = AppConstants {
    product: "rhpam",
    prefix: "rhpamcentrmon",
    image_name: "businesscentral-monitoring",
    image_var: "RELATED_IMAGE_BC_MONITORING_",
    maven_repo: "RHPAMCENTR",
    friendly_name: "Business Central Monitoring",
};

const RHDM_CONSOLE: AppConstants = AppConstants {
    product: "rhdm",
    prefix: "rhdmcentr",
    image_name: "decisioncentral",
    image_var: "RELATED_IMAGE_DC_",
    maven_repo: "RHDMCENTR",
    friendly_name: "Decision Central",
};

const fn replicas(replicas: i32, deny_scale: bool) -> ReplicaPolicy {
    ReplicaPolicy {
        replicas,
        deny_scale,
    }
}

fn database(type_: DatabaseType, size: &str) -> Option<DatabaseObject> {
    Some(DatabaseObject {
        type_,
        size: size.to_owned(),
        external_config: None,
    })
}

pub fn environment_constants(environment: EnvironmentType) -> EnvironmentConstants {
    match environment {
        EnvironmentType::RhpamTrial => EnvironmentConstants {
            app: RHPAM_CONSOLE,
            replicas: ReplicaConstants {
                console: replicas(1, true),
                server: replicas(1, false),
                smart_router: replicas(1, false),
                dashbuilder: replicas(1, false),
            },
            database: None,
        },
        EnvironmentType::RhpamAuthoring => EnvironmentConstants {
            app: RHPAM_CONSOLE,
            replicas: ReplicaConstants {
                console: replicas(1, true),
                server: replicas(1, false),
                smart_router: replicas(1, false),
                dashbuilder: replicas(1, false),
            },
            database: database(DatabaseType::H2, "1Gi"),
        },
        EnvironmentType::RhpamAuthoringHa => EnvironmentConstants {
            app: RHPAM_CONSOLE,
            replicas: ReplicaConstants {
                console: replicas(2, false),
                server: replicas(2, false),
                smart_router: replicas(1, false),
                dashbuilder: replicas(1, false),
            },
            database: database(DatabaseType::Mysql, "1Gi"),
        },
        EnvironmentType::RhpamProduction | EnvironmentType::RhpamProductionImmutable => {
            EnvironmentConstants {
                app: RHPAM_MONITORING_CONSOLE,
                replicas: ReplicaConstants {
                    console: replicas(1, false),
                    server: replicas(2, false),
                    smart_router: replicas(2, false),
                    dashbuilder: replicas(1, false),
                },
                database: database(DatabaseType::Postgresql, "1Gi"),
            }
        }
        EnvironmentType::RhdmTrial | EnvironmentType::RhdmAuthoring => EnvironmentConstants {
            app: RHDM_CONSOLE,
            replicas: ReplicaConstants {
                console: replicas(1, true),
                server: replicas(1, false),
                smart_router: replicas(1, false),
                dashbuilder: replicas(1, false),
            },
            database: None,
        },
        EnvironmentType::RhdmAuthoringHa => EnvironmentConstants {
            app: RHDM_CONSOLE,
            replicas: ReplicaConstants {
                console: replicas(2, false),
                server: replicas(2, false),
                smart_router: replicas(1, false),
                dashbuilder: replicas(1, false),
            },
            database: None,
        },
        EnvironmentType::RhdmProductionImmutable => EnvironmentConstants {
            app: RHDM_CONSOLE,
            replicas: ReplicaConstants {
                console: replicas(1, false),
                server: replicas(2, false),
                smart_router: replicas(2, false),
                dashbuilder: replicas(1, false),
            },
            database: None,
        },
    }
}

/// Images of the supporting components that differ per product version.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VersionConstants {
    pub broker_image: &'static str,
    pub broker_image_tag: &'static str,
    pub broker_image_url: &'static str,
    pub datagrid_image: &'static str,
    pub datagrid_image_tag: &'static str,
    pub datagrid_image_url: &'static str,
    pub mysql_image_url: &'static str,
    pub postgresql_image_url: &'static str,
    pub ose_cli_image_url: &'static str,
}

pub fn version_constants(version: &str) -> Option<VersionConstants> {
    match version {
        "7.8.0" => Some(VersionConstants {
            broker_image: "amq-broker",
            broker_image_tag: "7.7",
            broker_image_url: "registry.redhat.io/amq7/amq-broker:7.7",
            datagrid_image: "datagrid73-openshift",
            datagrid_image_tag: "1.5",
            datagrid_image_url: "registry.redhat.io/jboss-datagrid-7/datagrid73-openshift:1.5",
            mysql_image_url: "registry.redhat.io/rhscl/mysql-80-rhel7:latest",
            postgresql_image_url: "registry.redhat.io/rhscl/postgresql-10-rhel7:latest",
            ose_cli_image_url: "registry.redhat.io/openshift4/ose-cli:v4.5",
        }),
        "7.7.1" => Some(VersionConstants {
            broker_image: "amq-broker",
            broker_image_tag: "7.6",
            broker_image_url: "registry.redhat.io/amq7/amq-broker:7.6",
            datagrid_image: "datagrid73-openshift",
            datagrid_image_tag: "1.4",
            datagrid_image_url: "registry.redhat.io/jboss-datagrid-7/datagrid73-openshift:1.4",
            mysql_image_url: "registry.redhat.io/rhscl/mysql-57-rhel7:latest",
            postgresql_image_url: "registry.redhat.io/rhscl/postgresql-10-rhel7:latest",
            ose_cli_image_url: "registry.redhat.io/openshift4/ose-cli:v4.4",
        }),
        _ => None,
    }
}
