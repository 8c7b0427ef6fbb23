//! Merges rendered fragments into one [`Environment`].
//!
//! Objects of a collection are matched by name. Matched objects are merged in place with the
//! overwrite taking precedence, unmatched baseline objects are kept and new overwrite objects are
//! appended. An overwrite object annotated with `delete: "true"` removes its baseline
//! counterpart instead.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use k8s_openapi::{
    DeepMerge,
    api::{
        apps::v1::StatefulSet,
        core::v1::{
            ConfigMap, EnvVar, PersistentVolumeClaim, Secret, Service, ServiceAccount,
        },
        rbac::v1::{Role, RoleBinding},
    },
};
use kube::{Resource, ResourceExt};
use snafu::{Snafu, ensure};

use crate::{
    objects::{CustomObject, Environment},
    openshift::{BuildConfig, ImageStream, Route},
};

mod deployment_config;

/// Annotation marking an overwrite object for removal.
pub const DELETE_ANNOTATION: &str = "delete";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "{kind} {name:?} has {baseline} and {overwrite} containers, only one container per pod can be merged"
    ))]
    MultipleContainers {
        kind: String,
        name: String,
        baseline: usize,
        overwrite: usize,
    },

    #[snafu(display("incompatible objects with {baseline} and {overwrite} kie servers"))]
    IncompatibleServers { baseline: usize, overwrite: usize },

    #[snafu(display("incompatible {collection} with {baseline} and {overwrite} objects"))]
    IncompatibleObjects {
        collection: &'static str,
        baseline: usize,
        overwrite: usize,
    },
}

/// An object that can be overlaid by another object of the same name.
pub trait MergeObject: Resource + DeepMerge + Sized {
    fn merge_object(&mut self, overwrite: Self) -> Result<()> {
        self.merge_from(overwrite);
        Ok(())
    }
}

impl MergeObject for PersistentVolumeClaim {}
impl MergeObject for ServiceAccount {}
impl MergeObject for Secret {}
impl MergeObject for Role {}
impl MergeObject for StatefulSet {}
impl MergeObject for BuildConfig {}
impl MergeObject for ImageStream {}
impl MergeObject for Route {}
impl MergeObject for ConfigMap {}

impl MergeObject for RoleBinding {
    fn merge_object(&mut self, mut overwrite: Self) -> Result<()> {
        let role_ref = &mut overwrite.role_ref;
        inherit_required(&mut role_ref.api_group, &self.role_ref.api_group);
        inherit_required(&mut role_ref.kind, &self.role_ref.kind);
        inherit_required(&mut role_ref.name, &self.role_ref.name);
        self.merge_from(overwrite);
        Ok(())
    }
}

impl MergeObject for Service {
    fn merge_object(&mut self, mut overwrite: Self) -> Result<()> {
        let ports = overwrite.spec.as_mut().and_then(|spec| spec.ports.take());
        let current_ports = self.spec.as_mut().and_then(|spec| spec.ports.take());

        self.merge_from(overwrite);

        if let Some(spec) = self.spec.as_mut() {
            spec.ports = current_ports;
            k8s_openapi::merge_strategies::list::map(
                &mut spec.ports,
                ports,
                &[|lhs, rhs| lhs.name == rhs.name],
                |current_item, mut other_item| {
                    inherit_required(&mut other_item.port, &current_item.port);
                    DeepMerge::merge_from(current_item, other_item);
                },
            );
        }
        Ok(())
    }
}

/// Copies a required field of the baseline into an overwrite that leaves it at its default,
/// so the following `merge_from` does not blank it.
fn inherit_required<T: Clone + Default + PartialEq>(overwrite: &mut T, current: &T) {
    if *overwrite == T::default() {
        overwrite.clone_from(current);
    }
}

pub fn is_marked_for_deletion<T: Resource>(object: &T) -> bool {
    object
        .annotations()
        .get(DELETE_ANNOTATION)
        .is_some_and(|value| value == "true")
}

/// Number of objects [`merge_objects`] returns: the baseline, minus deletions, plus new
/// overwrite objects.
fn combined_size<T: Resource>(baseline: &[T], overwrite: &IndexMap<String, T>) -> usize {
    let baseline_names: BTreeSet<String> = baseline.iter().map(ResourceExt::name_any).collect();
    let deleted = overwrite
        .iter()
        .filter(|(name, object)| baseline_names.contains(*name) && is_marked_for_deletion(*object))
        .count();
    let added = overwrite
        .iter()
        .filter(|(name, object)| !baseline_names.contains(*name) && !is_marked_for_deletion(*object))
        .count();
    baseline.len() - deleted + added
}

/// Merges two collections of objects keyed by name.
pub fn merge_objects<T: MergeObject>(baseline: Vec<T>, overwrite: Vec<T>) -> Result<Vec<T>> {
    if overwrite.is_empty() {
        return Ok(baseline);
    }
    if baseline.is_empty() {
        return Ok(overwrite
            .into_iter()
            .filter(|object| !is_marked_for_deletion(object))
            .collect());
    }

    let mut pending: IndexMap<String, T> = overwrite
        .into_iter()
        .map(|object| (object.name_any(), object))
        .collect();
    let mut merged = Vec::with_capacity(combined_size(&baseline, &pending));

    for mut object in baseline {
        match pending.shift_remove(&object.name_any()) {
            Some(overwrite) if is_marked_for_deletion(&overwrite) => {}
            Some(overwrite) => {
                object.merge_object(overwrite)?;
                merged.push(object);
            }
            None => merged.push(object),
        }
    }
    merged.extend(
        pending
            .into_values()
            .filter(|object| !is_marked_for_deletion(object)),
    );

    Ok(merged)
}

pub fn merge_custom_object(baseline: CustomObject, overwrite: CustomObject) -> Result<CustomObject> {
    Ok(CustomObject {
        omit: baseline.omit || overwrite.omit,
        persistent_volume_claims: merge_objects(
            baseline.persistent_volume_claims,
            overwrite.persistent_volume_claims,
        )?,
        service_accounts: merge_objects(baseline.service_accounts, overwrite.service_accounts)?,
        secrets: merge_objects(baseline.secrets, overwrite.secrets)?,
        roles: merge_objects(baseline.roles, overwrite.roles)?,
        role_bindings: merge_objects(baseline.role_bindings, overwrite.role_bindings)?,
        deployment_configs: merge_objects(
            baseline.deployment_configs,
            overwrite.deployment_configs,
        )?,
        stateful_sets: merge_objects(baseline.stateful_sets, overwrite.stateful_sets)?,
        build_configs: merge_objects(baseline.build_configs, overwrite.build_configs)?,
        image_streams: merge_objects(baseline.image_streams, overwrite.image_streams)?,
        services: merge_objects(baseline.services, overwrite.services)?,
        routes: merge_objects(baseline.routes, overwrite.routes)?,
        config_maps: merge_objects(baseline.config_maps, overwrite.config_maps)?,
    })
}

/// Merges two lists of custom objects by position.
fn merge_by_index(
    collection: &'static str,
    baseline: Vec<CustomObject>,
    overwrite: Vec<CustomObject>,
) -> Result<Vec<CustomObject>> {
    if overwrite.is_empty() {
        return Ok(baseline);
    }
    if baseline.is_empty() {
        return Ok(overwrite);
    }
    ensure!(
        baseline.len() == overwrite.len(),
        IncompatibleObjectsSnafu {
            collection,
            baseline: baseline.len(),
            overwrite: overwrite.len(),
        }
    );
    baseline
        .into_iter()
        .zip(overwrite)
        .map(|(baseline, overwrite)| merge_custom_object(baseline, overwrite))
        .collect()
}

/// Merges `overwrite` into `baseline`. Both must describe the same number of KIE servers.
pub fn merge_environment(baseline: Environment, overwrite: Environment) -> Result<Environment> {
    ensure!(
        baseline.servers.len() == overwrite.servers.len(),
        IncompatibleServersSnafu {
            baseline: baseline.servers.len(),
            overwrite: overwrite.servers.len(),
        }
    );

    Ok(Environment {
        console: merge_custom_object(baseline.console, overwrite.console)?,
        smart_router: merge_custom_object(baseline.smart_router, overwrite.smart_router)?,
        process_migration: merge_custom_object(
            baseline.process_migration,
            overwrite.process_migration,
        )?,
        dashbuilder: merge_custom_object(baseline.dashbuilder, overwrite.dashbuilder)?,
        servers: baseline
            .servers
            .into_iter()
            .zip(overwrite.servers)
            .map(|(baseline, overwrite)| merge_custom_object(baseline, overwrite))
            .collect::<Result<_>>()?,
        databases: merge_by_index("databases", baseline.databases, overwrite.databases)?,
        others: merge_by_index("others", baseline.others, overwrite.others)?,
    })
}

/// Replaces variables of `dst` by name in place and appends the ones it lacks.
pub fn env_override(dst: &mut Vec<EnvVar>, src: Vec<EnvVar>) {
    for var in src {
        match dst.iter_mut().find(|existing| existing.name == var.name) {
            Some(existing) => *existing = var,
            None => dst.push(var),
        }
    }
}
