use k8s_openapi::{
    DeepMerge,
    api::core::v1::{Container, PodSpec, PodTemplateSpec},
};
use kube::ResourceExt;
use snafu::ensure;

use super::{MergeObject, MultipleContainersSnafu, Result, env_override, inherit_required};
use crate::openshift::{DeploymentConfig, DeploymentConfigSpec};

impl MergeObject for DeploymentConfig {
    fn merge_object(&mut self, overwrite: Self) -> Result<()> {
        let name = self.name_any();
        DeepMerge::merge_from(&mut self.metadata, overwrite.metadata);
        merge_spec(&mut self.spec, overwrite.spec, &name)
    }
}

fn merge_spec(
    spec: &mut DeploymentConfigSpec,
    mut overwrite: DeploymentConfigSpec,
    name: &str,
) -> Result<()> {
    let template = overwrite.template.take();
    DeepMerge::merge_from(spec, overwrite);

    if let Some(template) = template {
        match spec.template.as_mut() {
            Some(current) => merge_pod_template(current, template, name)?,
            None => spec.template = Some(template),
        }
    }
    Ok(())
}

fn merge_pod_template(
    current: &mut PodTemplateSpec,
    overwrite: PodTemplateSpec,
    name: &str,
) -> Result<()> {
    DeepMerge::merge_from(&mut current.metadata, overwrite.metadata);

    if let Some(pod) = overwrite.spec {
        match current.spec.as_mut() {
            Some(current) => merge_pod_spec(current, pod, name)?,
            None => current.spec = Some(pod),
        }
    }
    Ok(())
}

fn merge_pod_spec(current: &mut PodSpec, mut overwrite: PodSpec, name: &str) -> Result<()> {
    ensure!(
        current.containers.len() <= 1 && overwrite.containers.len() <= 1,
        MultipleContainersSnafu {
            kind: "DeploymentConfig",
            name,
            baseline: current.containers.len(),
            overwrite: overwrite.containers.len(),
        }
    );

    let overwrite_containers = std::mem::take(&mut overwrite.containers);
    let overwrite_volumes = overwrite.volumes.take();
    let mut containers = std::mem::take(&mut current.containers);
    let volumes = current.volumes.take();

    DeepMerge::merge_from(current, overwrite);

    if let Some(overwrite) = overwrite_containers.into_iter().next() {
        match containers.first_mut() {
            Some(container) => merge_container(container, overwrite),
            None => containers.push(overwrite),
        }
    }
    current.containers = containers;

    current.volumes = volumes;
    k8s_openapi::merge_strategies::list::map(
        &mut current.volumes,
        overwrite_volumes,
        &[|lhs, rhs| lhs.name == rhs.name],
        |current_item, other_item| {
            *current_item = other_item;
        },
    );
    Ok(())
}

/// Env vars override by name keeping their order, ports merge by name and mounts are replaced
/// by name. Every other field is overlaid.
fn merge_container(current: &mut Container, mut overwrite: Container) {
    inherit_required(&mut overwrite.name, &current.name);
    let env = overwrite.env.take();
    let ports = overwrite.ports.take();
    let mounts = overwrite.volume_mounts.take();
    let mut current_env = current.env.take();
    let current_ports = current.ports.take();
    let current_mounts = current.volume_mounts.take();

    DeepMerge::merge_from(current, overwrite);

    if let Some(env) = env {
        env_override(current_env.get_or_insert_with(Vec::new), env);
    }
    current.env = current_env;

    current.ports = current_ports;
    k8s_openapi::merge_strategies::list::map(
        &mut current.ports,
        ports,
        &[|lhs, rhs| lhs.name == rhs.name],
        |current_item, mut other_item| {
            inherit_required(&mut other_item.container_port, &current_item.container_port);
            DeepMerge::merge_from(current_item, other_item);
        },
    );

    current.volume_mounts = current_mounts;
    k8s_openapi::merge_strategies::list::map(
        &mut current.volume_mounts,
        mounts,
        &[|lhs, rhs| lhs.name == rhs.name],
        |current_item, other_item| {
            *current_item = other_item;
        },
    );
}
