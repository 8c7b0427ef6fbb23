//! OpenShift resources managed by the operator.
//!
//! Only the fields the fragments set are modelled. The types are derived with
//! [`kube::CustomResource`] in their real API groups, their schema is never published.

use std::collections::BTreeMap;

use k8s_openapi::{
    DeepMerge,
    api::core::v1::{EnvVar, ObjectReference, PodTemplateSpec, ResourceRequirements},
    apimachinery::pkg::util::intstr::IntOrString,
};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Replaces `current` when `other` is set.
fn overlay<T>(current: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *current = other;
    }
}

/// Replaces a required field only when `other` sets it. Fields missing from an overwrite
/// deserialize to their default and must not blank the baseline.
fn overlay_required<T: Default + PartialEq>(current: &mut T, other: T) {
    if other != T::default() {
        *current = other;
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[kube(
    group = "apps.openshift.io",
    version = "v1",
    kind = "DeploymentConfig",
    namespaced,
    schema = "disabled",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeploymentStrategy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ready_seconds: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<DeploymentTriggerPolicy>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStrategy {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_params: Option<RollingDeploymentStrategyParams>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recreate_params: Option<RecreateDeploymentStrategyParams>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingDeploymentStrategyParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_period_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<IntOrString>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecreateDeploymentStrategyParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTriggerPolicy {
    /// `ConfigChange` or `ImageChange`.
    #[serde(rename = "type", default)]
    pub type_: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_change_params: Option<DeploymentTriggerImageChangeParams>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTriggerImageChangeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_names: Option<Vec<String>>,

    #[serde(default)]
    pub from: ObjectReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered_image: Option<String>,
}

impl DeepMerge for DeploymentConfig {
    fn merge_from(&mut self, other: Self) {
        DeepMerge::merge_from(&mut self.metadata, other.metadata);
        DeepMerge::merge_from(&mut self.spec, other.spec);
    }
}

impl DeepMerge for DeploymentConfigSpec {
    fn merge_from(&mut self, other: Self) {
        DeepMerge::merge_from(&mut self.strategy, other.strategy);
        DeepMerge::merge_from(&mut self.min_ready_seconds, other.min_ready_seconds);
        k8s_openapi::merge_strategies::list::map(
            &mut self.triggers,
            other.triggers,
            &[|lhs, rhs| lhs.type_ == rhs.type_],
            |current_item, other_item| {
                DeepMerge::merge_from(current_item, other_item);
            },
        );
        DeepMerge::merge_from(&mut self.replicas, other.replicas);
        DeepMerge::merge_from(&mut self.revision_history_limit, other.revision_history_limit);
        DeepMerge::merge_from(&mut self.test, other.test);
        DeepMerge::merge_from(&mut self.paused, other.paused);
        k8s_openapi::merge_strategies::map::granular(
            &mut self.selector,
            other.selector,
            |current_item, other_item| {
                DeepMerge::merge_from(current_item, other_item);
            },
        );
        DeepMerge::merge_from(&mut self.template, other.template);
    }
}

impl DeepMerge for DeploymentStrategy {
    fn merge_from(&mut self, other: Self) {
        DeepMerge::merge_from(&mut self.type_, other.type_);
        overlay(&mut self.rolling_params, other.rolling_params);
        overlay(&mut self.recreate_params, other.recreate_params);
        DeepMerge::merge_from(&mut self.resources, other.resources);
        k8s_openapi::merge_strategies::map::granular(
            &mut self.labels,
            other.labels,
            |current_item, other_item| {
                DeepMerge::merge_from(current_item, other_item);
            },
        );
        k8s_openapi::merge_strategies::map::granular(
            &mut self.annotations,
            other.annotations,
            |current_item, other_item| {
                DeepMerge::merge_from(current_item, other_item);
            },
        );
        DeepMerge::merge_from(
            &mut self.active_deadline_seconds,
            other.active_deadline_seconds,
        );
    }
}

impl DeepMerge for DeploymentTriggerPolicy {
    fn merge_from(&mut self, other: Self) {
        overlay_required(&mut self.type_, other.type_);
        DeepMerge::merge_from(&mut self.image_change_params, other.image_change_params);
    }
}

impl DeepMerge for DeploymentTriggerImageChangeParams {
    fn merge_from(&mut self, other: Self) {
        DeepMerge::merge_from(&mut self.automatic, other.automatic);
        overlay(&mut self.container_names, other.container_names);
        DeepMerge::merge_from(&mut self.from, other.from);
        DeepMerge::merge_from(&mut self.last_triggered_image, other.last_triggered_image);
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    namespaced,
    schema = "disabled",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Generated by the router when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default)]
    pub to: RouteTargetReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_backends: Option<Vec<RouteTargetReference>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard_policy: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    pub target_port: IntOrString,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// `edge`, `passthrough` or `reencrypt`.
    #[serde(default)]
    pub termination: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ca_certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<String>,
}

impl Route {
    /// The route terminates TLS, the console is reachable through `https`.
    pub fn is_secure(&self) -> bool {
        self.spec.tls.is_some()
    }
}

impl DeepMerge for Route {
    fn merge_from(&mut self, other: Self) {
        DeepMerge::merge_from(&mut self.metadata, other.metadata);
        DeepMerge::merge_from(&mut self.spec, other.spec);
    }
}

impl DeepMerge for RouteSpec {
    fn merge_from(&mut self, other: Self) {
        DeepMerge::merge_from(&mut self.host, other.host);
        DeepMerge::merge_from(&mut self.path, other.path);
        DeepMerge::merge_from(&mut self.to, other.to);
        overlay(&mut self.alternate_backends, other.alternate_backends);
        overlay(&mut self.port, other.port);
        DeepMerge::merge_from(&mut self.tls, other.tls);
        DeepMerge::merge_from(&mut self.wildcard_policy, other.wildcard_policy);
    }
}

impl DeepMerge for RouteTargetReference {
    fn merge_from(&mut self, other: Self) {
        overlay_required(&mut self.kind, other.kind);
        overlay_required(&mut self.name, other.name);
        DeepMerge::merge_from(&mut self.weight, other.weight);
    }
}

impl DeepMerge for TlsConfig {
    fn merge_from(&mut self, other: Self) {
        overlay_required(&mut self.termination, other.termination);
        DeepMerge::merge_from(&mut self.certificate, other.certificate);
        DeepMerge::merge_from(&mut self.key, other.key);
        DeepMerge::merge_from(&mut self.ca_certificate, other.ca_certificate);
        DeepMerge::merge_from(
            &mut self.destination_ca_certificate,
            other.destination_ca_certificate,
        );
        DeepMerge::merge_from(
            &mut self.insecure_edge_termination_policy,
            other.insecure_edge_termination_policy,
        );
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[kube(
    group = "build.openshift.io",
    version = "v1",
    kind = "BuildConfig",
    namespaced,
    schema = "disabled",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<BuildTriggerPolicy>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BuildSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<BuildStrategy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<BuildOutput>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTriggerPolicy {
    /// `GitHub`, `Generic`, `ImageChange` or `ConfigChange`.
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<WebHookTrigger>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic: Option<WebHookTrigger>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_change: Option<ImageChangeTrigger>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebHookTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageChangeTrigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ObjectReference>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSource {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitBuildSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageSource>>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitBuildSource {
    pub uri: String,

    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub ref_: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSource {
    pub from: ObjectReference,

    #[serde(default)]
    pub paths: Vec<ImageSourcePath>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSourcePath {
    pub source_path: String,
    pub destination_dir: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStrategy {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_strategy: Option<SourceBuildStrategy>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBuildStrategy {
    pub from: ObjectReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_pull: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ObjectReference>,
}

impl DeepMerge for BuildConfig {
    fn merge_from(&mut self, other: Self) {
        DeepMerge::merge_from(&mut self.metadata, other.metadata);
        DeepMerge::merge_from(&mut self.spec, other.spec);
    }
}

impl DeepMerge for BuildConfigSpec {
    fn merge_from(&mut self, other: Self) {
        k8s_openapi::merge_strategies::list::map(
            &mut self.triggers,
            other.triggers,
            &[|lhs, rhs| lhs.type_ == rhs.type_],
            |current_item, other_item| {
                *current_item = other_item;
            },
        );
        DeepMerge::merge_from(&mut self.run_policy, other.run_policy);
        overlay(&mut self.source, other.source);
        overlay(&mut self.strategy, other.strategy);
        overlay(&mut self.output, other.output);
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[kube(
    group = "image.openshift.io",
    version = "v1",
    kind = "ImageStream",
    namespaced,
    schema = "disabled",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_policy: Option<ImageLookupPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image_repository: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagReference>>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLookupPolicy {
    pub local: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagReference {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_policy: Option<TagImportPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_policy: Option<TagReferencePolicy>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagImportPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagReferencePolicy {
    /// `Source` or `Local`.
    #[serde(rename = "type")]
    pub type_: String,
}

impl DeepMerge for ImageStream {
    fn merge_from(&mut self, other: Self) {
        DeepMerge::merge_from(&mut self.metadata, other.metadata);
        DeepMerge::merge_from(&mut self.spec, other.spec);
    }
}

impl DeepMerge for ImageStreamSpec {
    fn merge_from(&mut self, other: Self) {
        overlay(&mut self.lookup_policy, other.lookup_policy);
        DeepMerge::merge_from(
            &mut self.docker_image_repository,
            other.docker_image_repository,
        );
        k8s_openapi::merge_strategies::list::map(
            &mut self.tags,
            other.tags,
            &[|lhs, rhs| lhs.name == rhs.name],
            |current_item, other_item| {
                *current_item = other_item;
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn deployment_config_triggers_merge_by_type() {
        let mut base: DeploymentConfig = serde_yaml::from_str(indoc! {"
            apiVersion: apps.openshift.io/v1
            kind: DeploymentConfig
            metadata:
              name: app-rhpamcentr
              labels:
                app: app
            spec:
              replicas: 1
              selector:
                deploymentConfig: app-rhpamcentr
              triggers:
                - type: ImageChange
                  imageChangeParams:
                    automatic: true
                    containerNames:
                      - app-rhpamcentr
                    from:
                      kind: ImageStreamTag
                      namespace: openshift
                      name: rhpam-businesscentral-rhel8:7.8.0
                - type: ConfigChange
        "})
        .expect("invalid test input");

        let other: DeploymentConfig = serde_yaml::from_str(indoc! {"
            apiVersion: apps.openshift.io/v1
            kind: DeploymentConfig
            metadata:
              name: app-rhpamcentr
              labels:
                service: app-rhpamcentr
            spec:
              replicas: 3
              selector:
                app: app
              triggers:
                - type: ImageChange
                  imageChangeParams:
                    from:
                      kind: ImageStreamTag
                      name: custom:1.0
        "})
        .expect("invalid test input");

        base.merge_from(other);

        assert_eq!(base.spec.replicas, Some(3));
        let labels = base.metadata.labels.as_ref().expect("labels are set");
        assert_eq!(labels.len(), 2);
        assert_eq!(base.spec.selector.as_ref().map(BTreeMap::len), Some(2));

        let triggers = base.spec.triggers.as_ref().expect("triggers are set");
        assert_eq!(triggers.len(), 2);
        let params = triggers[0]
            .image_change_params
            .as_ref()
            .expect("image change params are set");
        assert_eq!(params.from.name.as_deref(), Some("custom:1.0"));
        assert_eq!(params.from.namespace.as_deref(), Some("openshift"));
        assert_eq!(params.automatic, Some(true));
    }

    #[test]
    fn route_overlay_keeps_unset_fields() {
        let mut base: Route = serde_yaml::from_str(indoc! {"
            apiVersion: route.openshift.io/v1
            kind: Route
            metadata:
              name: app-rhpamcentr
            spec:
              to:
                kind: Service
                name: app-rhpamcentr
              port:
                targetPort: https
              tls:
                termination: passthrough
        "})
        .expect("invalid test input");

        let other: Route = serde_yaml::from_str(indoc! {"
            apiVersion: route.openshift.io/v1
            kind: Route
            metadata:
              name: app-rhpamcentr
            spec:
              host: console.example.com
              to:
                kind: Service
                name: app-rhpamcentr
              tls:
                termination: reencrypt
        "})
        .expect("invalid test input");

        base.merge_from(other);

        assert_eq!(base.spec.host.as_deref(), Some("console.example.com"));
        assert_eq!(
            base.spec.port.as_ref().map(|port| port.target_port.clone()),
            Some(IntOrString::String("https".to_owned()))
        );
        assert!(base.is_secure());
        assert_eq!(
            base.spec.tls.as_ref().map(|tls| tls.termination.as_str()),
            Some("reencrypt")
        );
    }

    #[test]
    fn partial_route_overwrite_keeps_target_and_termination() {
        let mut base: Route = serde_yaml::from_str(indoc! {"
            apiVersion: route.openshift.io/v1
            kind: Route
            metadata:
              name: app-rhpamcentr
            spec:
              to:
                kind: Service
                name: app-rhpamcentr
              tls:
                termination: passthrough
        "})
        .expect("invalid test input");

        let other: Route = serde_yaml::from_str(indoc! {"
            apiVersion: route.openshift.io/v1
            kind: Route
            metadata:
              name: app-rhpamcentr
              annotations:
                haproxy.router.openshift.io/timeout: 60s
            spec:
              host: console.example.com
              tls:
                insecureEdgeTerminationPolicy: Redirect
        "})
        .expect("invalid test input");

        base.merge_from(other);

        assert_eq!(base.spec.host.as_deref(), Some("console.example.com"));
        assert_eq!(base.spec.to.kind, "Service");
        assert_eq!(base.spec.to.name, "app-rhpamcentr");
        let tls = base.spec.tls.as_ref().expect("tls is set");
        assert_eq!(tls.termination, "passthrough");
        assert_eq!(
            tls.insecure_edge_termination_policy.as_deref(),
            Some("Redirect")
        );
    }

    #[test]
    fn trigger_without_type_keeps_the_baseline_type() {
        let mut trigger = DeploymentTriggerPolicy {
            type_: "ImageChange".to_owned(),
            image_change_params: None,
        };

        trigger.merge_from(DeploymentTriggerPolicy {
            image_change_params: Some(DeploymentTriggerImageChangeParams {
                automatic: Some(false),
                ..DeploymentTriggerImageChangeParams::default()
            }),
            ..DeploymentTriggerPolicy::default()
        });

        assert_eq!(trigger.type_, "ImageChange");
        assert_eq!(
            trigger.image_change_params.and_then(|params| params.automatic),
            Some(false)
        );
    }
}
