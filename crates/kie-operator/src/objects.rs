//! The desired state of one [`KieApp`](crate::crd::KieApp), as parsed from rendered fragments.

use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount},
    rbac::v1::{Role, RoleBinding},
};
use serde::{Deserialize, Serialize};

use crate::openshift::{BuildConfig, DeploymentConfig, ImageStream, Route};

/// Every object derived from one KieApp, grouped by component.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Environment {
    pub console: CustomObject,
    pub smart_router: CustomObject,
    pub process_migration: CustomObject,
    pub dashbuilder: CustomObject,
    /// One entry per KIE server deployment, in server template order.
    pub servers: Vec<CustomObject>,
    pub databases: Vec<CustomObject>,
    pub others: Vec<CustomObject>,
}

/// A bundle of typed object collections. Names are unique within a collection.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomObject {
    /// Excluded from materialization.
    pub omit: bool,
    pub persistent_volume_claims: Vec<PersistentVolumeClaim>,
    pub service_accounts: Vec<ServiceAccount>,
    pub secrets: Vec<Secret>,
    pub roles: Vec<Role>,
    pub role_bindings: Vec<RoleBinding>,
    pub deployment_configs: Vec<DeploymentConfig>,
    pub stateful_sets: Vec<StatefulSet>,
    pub build_configs: Vec<BuildConfig>,
    pub image_streams: Vec<ImageStream>,
    pub services: Vec<Service>,
    pub routes: Vec<Route>,
    pub config_maps: Vec<ConfigMap>,
}

impl CustomObject {
    /// Name of the first DeploymentConfig, which identifies server and database objects.
    pub fn first_deployment_config_name(&self) -> Option<&str> {
        self.deployment_configs
            .first()
            .and_then(|dc| dc.metadata.name.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.persistent_volume_claims.is_empty()
            && self.service_accounts.is_empty()
            && self.secrets.is_empty()
            && self.roles.is_empty()
            && self.role_bindings.is_empty()
            && self.deployment_configs.is_empty()
            && self.stateful_sets.is_empty()
            && self.build_configs.is_empty()
            && self.image_streams.is_empty()
            && self.services.is_empty()
            && self.routes.is_empty()
            && self.config_maps.is_empty()
    }
}

impl Environment {
    /// Components to materialize: console, servers, smart router, process migration,
    /// dashbuilder, databases and others, leaving out omitted ones.
    pub fn custom_objects(&self) -> Vec<&CustomObject> {
        std::iter::once(&self.console)
            .chain(&self.servers)
            .chain([
                &self.smart_router,
                &self.process_migration,
                &self.dashbuilder,
            ])
            .chain(&self.databases)
            .chain(&self.others)
            .filter(|object| !object.omit)
            .collect()
    }

    /// Names of every DeploymentConfig that will be materialized.
    pub fn deployment_names(&self) -> Vec<String> {
        self.custom_objects()
            .into_iter()
            .flat_map(|object| &object.deployment_configs)
            .filter_map(|dc| dc.metadata.name.clone())
            .collect()
    }
}
