//! Materializes an [`Environment`] in the cluster.
//!
//! Every object is stamped with the owning [`KieApp`], created when missing and replaced only
//! when a field the operator manages differs from the live object. Image stream tags the
//! deployments follow are imported into the application namespace when no namespace holds
//! them. Once everything is applied, stamped objects of the same owner that the environment
//! no longer contains are deleted. Claims are kept so removing a component never drops data.
//! The first failure stops the pass, the next reconciliation picks up where it left off.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::{
    api::{
        apps::v1::StatefulSet,
        core::v1::{
            ConfigMap, Container, EnvVar, ObjectReference, PersistentVolumeClaim, Secret, Service,
            ServiceAccount,
        },
        rbac::v1::{Role, RoleBinding},
    },
    apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString},
};
use kube::{Resource, ResourceExt};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, info, warn};

use crate::{
    client::{self, Client, NamespacedObject},
    constants::{
        CURRENT_VERSION, DEFAULT_REGISTRY, GROUP_ANNOTATION, MANAGED_BY_LABEL, OPERATOR_NAME,
        OPERATOR_VERSION, environment_constants,
    },
    crd::{KieApp, KieAppRegistry, KieAppSpec},
    defaults::configure_hostname,
    objects::{CustomObject, Environment},
    openshift::{
        BuildConfig, DeploymentConfig, ImageStream, ImageStreamSpec, Route, TagImportPolicy,
        TagReference, TagReferencePolicy,
    },
};

const IMAGE_CHANGE_TRIGGER: &str = "ImageChange";
const IMAGE_STREAM_TAG: &str = "ImageStreamTag";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("KieApp {name:?} has no namespace"))]
    MissingNamespace { name: String },

    #[snafu(display("KieApp {name:?} has no uid yet, cannot own objects"))]
    MissingOwnerReference { name: String },

    #[snafu(display("failed to look up {kind} {name:?}"))]
    LookupDependency {
        source: client::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("{kind} {name:?} does not exist in namespace {namespace:?}"))]
    MissingDependency {
        kind: String,
        name: String,
        namespace: String,
    },

    #[snafu(display("failed to apply {kind} {name:?}"))]
    ApplyObject {
        source: client::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to list the {kind} objects managed for KieApp {owner:?}"))]
    ListManaged {
        source: client::Error,
        kind: String,
        owner: String,
    },

    #[snafu(display("failed to delete {kind} {name:?}"))]
    PruneObject {
        source: client::Error,
        kind: String,
        name: String,
    },
}

impl Error {
    /// A referenced object the operator does not manage is absent.
    pub fn is_missing_dependency(&self) -> bool {
        matches!(self, Self::MissingDependency { .. })
    }
}

/// Decides whether a live object has drifted from the desired one and how to replace it.
pub trait ManagedObject: NamespacedObject {
    /// Whether `live` lacks a value `self` asks for. Values the server defaults or assigns
    /// are not compared.
    fn needs_update(&self, live: &Self) -> bool {
        metadata_changed(self.meta(), live.meta())
    }

    /// Carries the fields of `live` a replace must keep over to `self`.
    fn prepare_update(&mut self, live: &Self) {
        self.meta_mut()
            .resource_version
            .clone_from(&live.meta().resource_version);
    }
}

fn contains_all(desired: Option<&BTreeMap<String, String>>, live: Option<&BTreeMap<String, String>>) -> bool {
    desired
        .into_iter()
        .flatten()
        .all(|(key, value)| live.and_then(|live| live.get(key)) == Some(value))
}

fn metadata_changed(desired: &ObjectMeta, live: &ObjectMeta) -> bool {
    !contains_all(desired.labels.as_ref(), live.labels.as_ref())
        || !contains_all(desired.annotations.as_ref(), live.annotations.as_ref())
}

impl ManagedObject for ServiceAccount {}
impl ManagedObject for Role {}
impl ManagedObject for RoleBinding {}
impl ManagedObject for StatefulSet {}
impl ManagedObject for BuildConfig {}
impl ManagedObject for ImageStream {
    fn needs_update(&self, live: &Self) -> bool {
        let live_tags = tag_names(live);
        metadata_changed(self.meta(), live.meta())
            || tag_names(self).iter().any(|tag| !live_tags.contains(tag))
    }

    // Tags imported or added outside the operator stay on the stream.
    fn prepare_update(&mut self, live: &Self) {
        self.metadata
            .resource_version
            .clone_from(&live.metadata.resource_version);
        let desired = tag_names(self).into_iter().map(ToOwned::to_owned).collect::<BTreeSet<_>>();
        let kept = live
            .spec
            .tags
            .iter()
            .flatten()
            .filter(|tag| !desired.contains(&tag.name))
            .cloned();
        self.spec.tags.get_or_insert_with(Vec::new).extend(kept);
    }
}

fn tag_names(stream: &ImageStream) -> BTreeSet<&str> {
    stream
        .spec
        .tags
        .iter()
        .flatten()
        .map(|tag| tag.name.as_str())
        .collect()
}

impl ManagedObject for ConfigMap {
    fn needs_update(&self, live: &Self) -> bool {
        metadata_changed(self.meta(), live.meta()) || self.data != live.data
    }
}

impl ManagedObject for PersistentVolumeClaim {
    // The claim spec is immutable once bound.
    fn prepare_update(&mut self, live: &Self) {
        self.metadata
            .resource_version
            .clone_from(&live.metadata.resource_version);
        self.spec.clone_from(&live.spec);
    }
}

fn secret_keys(secret: &Secret) -> BTreeSet<&str> {
    let data = secret.data.iter().flatten().map(|(key, _)| key.as_str());
    let string_data = secret
        .string_data
        .iter()
        .flatten()
        .map(|(key, _)| key.as_str());
    data.chain(string_data).collect()
}

impl ManagedObject for Secret {
    // Generated values differ on every render, only the key sets are compared.
    fn needs_update(&self, live: &Self) -> bool {
        metadata_changed(self.meta(), live.meta()) || secret_keys(self) != secret_keys(live)
    }

    fn prepare_update(&mut self, live: &Self) {
        self.metadata
            .resource_version
            .clone_from(&live.metadata.resource_version);
        let Some(live_data) = &live.data else {
            return;
        };
        let keys: BTreeSet<String> = secret_keys(self).into_iter().map(ToOwned::to_owned).collect();
        let data = self.data.get_or_insert_with(BTreeMap::new);
        for (key, value) in live_data {
            if keys.contains(key) {
                data.insert(key.clone(), value.clone());
            }
        }
        if let Some(string_data) = &mut self.string_data {
            string_data.retain(|key, _| !live_data.contains_key(key));
        }
    }
}

fn service_ports(service: &Service) -> Vec<(Option<&str>, i32, IntOrString)> {
    service
        .spec
        .iter()
        .flat_map(|spec| spec.ports.iter().flatten())
        .map(|port| {
            let target = port
                .target_port
                .clone()
                .unwrap_or(IntOrString::Int(port.port));
            (port.name.as_deref(), port.port, target)
        })
        .collect()
}

impl ManagedObject for Service {
    fn needs_update(&self, live: &Self) -> bool {
        let selector = |service: &Self| service.spec.as_ref().and_then(|spec| spec.selector.clone());
        metadata_changed(self.meta(), live.meta())
            || service_ports(self) != service_ports(live)
            || selector(self) != selector(live)
    }

    // The cluster IP is assigned by the server and cannot be changed.
    fn prepare_update(&mut self, live: &Self) {
        self.metadata
            .resource_version
            .clone_from(&live.metadata.resource_version);
        if let (Some(spec), Some(live_spec)) = (&mut self.spec, &live.spec) {
            spec.cluster_ip.clone_from(&live_spec.cluster_ip);
            spec.cluster_ips.clone_from(&live_spec.cluster_ips);
        }
    }
}

impl ManagedObject for Route {
    fn needs_update(&self, live: &Self) -> bool {
        let host_changed = self.spec.host.is_some() && self.spec.host != live.spec.host;
        metadata_changed(self.meta(), live.meta())
            || host_changed
            || self.spec.to != live.spec.to
            || self.spec.tls != live.spec.tls
    }

    // Keeps the host the router generated.
    fn prepare_update(&mut self, live: &Self) {
        self.metadata
            .resource_version
            .clone_from(&live.metadata.resource_version);
        if self.spec.host.is_none() {
            self.spec.host.clone_from(&live.spec.host);
        }
    }
}

fn containers(dc: &DeploymentConfig) -> &[Container] {
    dc.spec
        .template
        .as_ref()
        .and_then(|template| template.spec.as_ref())
        .map_or(&[], |pod| pod.containers.as_slice())
}

fn image_change_triggers(dc: &DeploymentConfig) -> impl Iterator<Item = &ObjectReference> {
    dc.spec
        .triggers
        .iter()
        .flatten()
        .filter(|trigger| trigger.type_ == IMAGE_CHANGE_TRIGGER)
        .filter_map(|trigger| trigger.image_change_params.as_ref())
        .map(|params| &params.from)
}

fn sorted_env(container: &Container) -> Vec<&EnvVar> {
    let mut env: Vec<&EnvVar> = container.env.iter().flatten().collect();
    env.sort_by(|a, b| a.name.cmp(&b.name));
    env
}

fn container_changed(desired: &Container, live: &Container, compare_image: bool) -> bool {
    sorted_env(desired) != sorted_env(live)
        || (desired.resources.is_some() && desired.resources != live.resources)
        || (compare_image && desired.image != live.image)
}

impl ManagedObject for DeploymentConfig {
    // With an image change trigger the image is resolved by the server, so only the
    // trigger's tag is compared.
    fn needs_update(&self, live: &Self) -> bool {
        let triggered = image_change_triggers(self).next().is_some();
        let trigger_names = |dc: &Self| -> Vec<Option<String>> {
            image_change_triggers(dc).map(|from| from.name.clone()).collect()
        };
        let replicas_changed =
            self.spec.replicas.is_some() && self.spec.replicas != live.spec.replicas;
        let containers_changed = containers(self).iter().any(|desired| {
            containers(live)
                .iter()
                .find(|live| live.name == desired.name)
                .is_none_or(|live| container_changed(desired, live, !triggered))
        });

        metadata_changed(self.meta(), live.meta())
            || replicas_changed
            || containers_changed
            || trigger_names(self) != trigger_names(live)
    }
}

/// Sets namespace, owner reference, managed-by label and operator version annotation.
pub fn stamp<T: Resource<DynamicType = ()>>(object: &mut T, owner: &KieApp) -> Result<()> {
    let namespace = owner.namespace().with_context(|| MissingNamespaceSnafu {
        name: owner.name_any(),
    })?;
    let owner_reference = owner
        .controller_owner_ref(&())
        .with_context(|| MissingOwnerReferenceSnafu {
            name: owner.name_any(),
        })?;

    let meta = object.meta_mut();
    meta.namespace = Some(namespace);
    meta.owner_references = Some(vec![owner_reference]);
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .insert(MANAGED_BY_LABEL.to_owned(), OPERATOR_NAME.to_owned());
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(GROUP_ANNOTATION.to_owned(), OPERATOR_VERSION.to_owned());
    Ok(())
}

/// The URL users reach the console at. Prefers the first TLS route with a host.
pub fn console_host(routes: &[Route], application_name: &str) -> String {
    let secure_host = routes
        .iter()
        .filter(|route| route.spec.tls.is_some())
        .find_map(|route| route.spec.host.as_deref().filter(|host| !host.is_empty()));
    match secure_host {
        Some(host) => format!("https://{host}"),
        None => format!("http://{application_name}"),
    }
}

/// ConfigMaps the resource mounts without the operator managing them.
pub fn referenced_config_maps(spec: &KieAppSpec) -> Vec<&str> {
    let role_mapper = spec
        .auth
        .role_mapper
        .as_ref()
        .and_then(|config| config.from.as_ref());
    let git_hooks = spec
        .objects
        .console
        .git_hooks
        .as_ref()
        .and_then(|hooks| hooks.from.as_ref());

    role_mapper
        .into_iter()
        .chain(git_hooks)
        .filter(|reference| reference.kind.as_deref() == Some("ConfigMap"))
        .filter_map(|reference| reference.name.as_deref())
        .collect()
}

/// Splits an image stream tag reference into stream and tag. The tag defaults to `latest`.
pub fn split_stream_tag(name: &str) -> (&str, &str) {
    name.split_once(':').unwrap_or((name, "latest"))
}

/// Image streams the environment either creates or follows, in any namespace.
pub fn image_stream_names(environment: &Environment) -> BTreeSet<&str> {
    let components = environment.custom_objects();
    let owned = components
        .iter()
        .copied()
        .flat_map(|object| &object.image_streams)
        .filter_map(|stream| stream.metadata.name.as_deref());
    let followed = components
        .iter()
        .copied()
        .flat_map(|object| &object.deployment_configs)
        .flat_map(image_change_triggers)
        .filter(|from| from.kind.as_deref() == Some(IMAGE_STREAM_TAG))
        .filter_map(|from| from.name.as_deref())
        .map(|name| split_stream_tag(name).0);
    owned.chain(followed).collect()
}

/// The registry image an imported tag pulls. Supporting images always come from the default
/// registry.
pub fn import_source(stream: &str, tag: &str, registry: &str, product: &str, version: &str) -> String {
    if stream.contains("datagrid") {
        return format!("{DEFAULT_REGISTRY}/jboss-datagrid-7/{stream}:{tag}");
    }
    if stream.contains("amq-broker-7") {
        let context = if stream.contains("scaledown") {
            "amq-broker-7-tech-preview"
        } else {
            "amq-broker-7"
        };
        return format!("{DEFAULT_REGISTRY}/{context}/{stream}:{tag}");
    }
    if matches!(stream, "postgresql" | "mysql") {
        let release: String = tag.chars().filter(char::is_ascii_digit).collect();
        return format!("{DEFAULT_REGISTRY}/rhscl/{stream}-{release}-rhel7:latest");
    }
    let major = version.split('.').next().unwrap_or(version);
    format!("{registry}/{product}-{major}/{stream}:{tag}")
}

/// An image stream importing `stream:tag` from `registry`, resolved locally by deployments.
pub fn image_import(stream: &str, tag: &str, registry: &KieAppRegistry, product: &str, version: &str) -> ImageStream {
    let host = registry
        .registry
        .as_deref()
        .filter(|host| !host.is_empty())
        .unwrap_or(DEFAULT_REGISTRY);
    let reference = TagReference {
        name: tag.to_owned(),
        from: Some(ObjectReference {
            kind: Some("DockerImage".to_owned()),
            name: Some(import_source(stream, tag, host, product, version)),
            ..ObjectReference::default()
        }),
        import_policy: registry.insecure.then_some(TagImportPolicy {
            insecure: Some(true),
            scheduled: None,
        }),
        reference_policy: Some(TagReferencePolicy {
            type_: "Local".to_owned(),
        }),
        ..TagReference::default()
    };
    ImageStream::new(stream, ImageStreamSpec {
        tags: Some(vec![reference]),
        ..ImageStreamSpec::default()
    })
}

/// Live objects stamped for the owner `owner_uid` whose names the environment no longer has.
pub fn stale_objects<'a, T: Resource>(live: &'a [T], desired: &BTreeSet<&str>, owner_uid: &str) -> Vec<&'a T> {
    live.iter()
        .filter(|object| {
            object
                .labels()
                .get(MANAGED_BY_LABEL)
                .is_some_and(|manager| manager == OPERATOR_NAME)
        })
        .filter(|object| {
            object
                .owner_references()
                .iter()
                .any(|reference| reference.uid == owner_uid)
        })
        .filter(|object| {
            object
                .meta()
                .name
                .as_deref()
                .is_some_and(|name| !desired.contains(name))
        })
        .collect()
}

fn object_names<'a, T: Resource + 'a>(objects: impl IntoIterator<Item = &'a T>) -> BTreeSet<&'a str> {
    objects
        .into_iter()
        .filter_map(|object| object.meta().name.as_deref())
        .collect()
}

/// What a successful pass produced.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Materialized {
    pub console_host: String,
    pub deployments: Vec<String>,
}

/// Applies the objects of one KieApp in its namespace.
pub struct Materializer<'a> {
    client: &'a Client,
    owner: &'a KieApp,
    namespace: String,
    owner_uid: String,
}

impl<'a> Materializer<'a> {
    pub fn new(client: &'a Client, owner: &'a KieApp) -> Result<Self> {
        let namespace = owner.namespace().with_context(|| MissingNamespaceSnafu {
            name: owner.name_any(),
        })?;
        let owner_uid = owner.uid().with_context(|| MissingOwnerReferenceSnafu {
            name: owner.name_any(),
        })?;
        Ok(Self {
            client,
            owner,
            namespace,
            owner_uid,
        })
    }

    /// Creates `desired` or brings the live object in line with it.
    pub async fn apply<T: ManagedObject>(&self, mut desired: T) -> Result<T> {
        stamp(&mut desired, self.owner)?;
        let kind = T::kind(&()).into_owned();
        let name = desired.name_any();
        let apply_context = || ApplyObjectSnafu {
            kind: kind.clone(),
            name: name.clone(),
        };

        let live = self
            .client
            .get_opt::<T>(&name, &self.namespace)
            .await
            .with_context(|_| apply_context())?;
        match live {
            None => {
                info!(%kind, %name, "creating object");
                self.client
                    .create(&desired)
                    .await
                    .with_context(|_| apply_context())
            }
            Some(live) if desired.needs_update(&live) => {
                info!(%kind, %name, "updating object");
                desired.prepare_update(&live);
                self.client
                    .update(&desired)
                    .await
                    .with_context(|_| apply_context())
            }
            Some(live) => {
                debug!(%kind, %name, "object is up to date");
                Ok(live)
            }
        }
    }

    async fn apply_all<T: ManagedObject>(&self, objects: &[T]) -> Result<Vec<T>> {
        let mut applied = Vec::with_capacity(objects.len());
        for object in objects {
            applied.push(self.apply(object.clone()).await?);
        }
        Ok(applied)
    }

    async fn require<T: NamespacedObject>(&self, name: &str) -> Result<()> {
        let kind = T::kind(&()).into_owned();
        let found = self
            .client
            .get_opt::<T>(name, &self.namespace)
            .await
            .with_context(|_| LookupDependencySnafu {
                kind: kind.clone(),
                name,
            })?;
        if found.is_none() {
            return MissingDependencySnafu {
                kind,
                name,
                namespace: &self.namespace,
            }
            .fail();
        }
        Ok(())
    }

    /// Fails if a ConfigMap the resource mounts, but the operator does not create, is absent.
    pub async fn verify_external_references(&self, spec: &KieAppSpec) -> Result<()> {
        for name in referenced_config_maps(spec) {
            self.require::<ConfigMap>(name).await?;
        }
        Ok(())
    }

    async fn has_image_tag(&self, stream: &str, tag: &str, namespace: &str) -> Result<bool> {
        let live = self
            .client
            .get_opt::<ImageStream>(stream, namespace)
            .await
            .with_context(|_| LookupDependencySnafu {
                kind: ImageStream::kind(&()).into_owned(),
                name: stream,
            })?;
        Ok(live.is_some_and(|live| tag_names(&live).contains(tag)))
    }

    /// The namespace holding the image stream tag `name`. Unless a registry is configured the
    /// referenced namespace is tried first, then the application namespace. A tag found in
    /// neither is imported into the application namespace.
    async fn ensure_image_stream(&self, name: &str, namespace: &str, spec: &KieAppSpec) -> Result<String> {
        let (stream, tag) = split_stream_tag(name);
        if spec.image_registry.is_none()
            && !namespace.is_empty()
            && self.has_image_tag(stream, tag, namespace).await?
        {
            return Ok(namespace.to_owned());
        }
        if self.has_image_tag(stream, tag, &self.namespace).await? {
            return Ok(self.namespace.clone());
        }

        let registry = spec.image_registry.clone().unwrap_or_default();
        let product = environment_constants(spec.environment).app.product;
        let version = spec.version.as_deref().unwrap_or(CURRENT_VERSION);
        warn!(stream, tag, namespace, "image stream tag not found, importing it");
        self.apply(image_import(stream, tag, &registry, product, version))
            .await?;
        Ok(self.namespace.clone())
    }

    /// Points the image change triggers of `dc` at a namespace holding their tag. Streams the
    /// environment builds itself are left alone.
    async fn resolve_image_triggers(&self, dc: &mut DeploymentConfig, owned: &BTreeSet<&str>, spec: &KieAppSpec) -> Result<()> {
        let triggers = dc
            .spec
            .triggers
            .iter_mut()
            .flatten()
            .filter(|trigger| trigger.type_ == IMAGE_CHANGE_TRIGGER)
            .filter_map(|trigger| trigger.image_change_params.as_mut())
            .map(|params| &mut params.from)
            .filter(|from| from.kind.as_deref() == Some(IMAGE_STREAM_TAG));
        for from in triggers {
            let Some(name) = from.name.clone() else {
                continue;
            };
            if owned.contains(split_stream_tag(&name).0) {
                continue;
            }
            let namespace = from.namespace.clone().unwrap_or_default();
            from.namespace = Some(self.ensure_image_stream(&name, &namespace, spec).await?);
        }
        Ok(())
    }

    /// Applies one component. Deployments go last so SSO clients learn their route's host.
    async fn apply_component(&self, object: &CustomObject, owned_streams: &BTreeSet<&str>, spec: &KieAppSpec) -> Result<Vec<Route>> {
        self.apply_all(&object.service_accounts).await?;
        self.apply_all(&object.roles).await?;
        self.apply_all(&object.role_bindings).await?;
        self.apply_all(&object.secrets).await?;
        self.apply_all(&object.persistent_volume_claims).await?;
        self.apply_all(&object.config_maps).await?;
        self.apply_all(&object.image_streams).await?;
        self.apply_all(&object.build_configs).await?;
        self.apply_all(&object.services).await?;
        let routes = self.apply_all(&object.routes).await?;

        let mut workloads = CustomObject {
            deployment_configs: object.deployment_configs.clone(),
            ..CustomObject::default()
        };
        if let Some(host) = routes.iter().find_map(|route| route.spec.host.as_deref()) {
            configure_hostname(&mut workloads, spec, host);
        }
        for dc in &mut workloads.deployment_configs {
            self.resolve_image_triggers(dc, owned_streams, spec).await?;
        }
        self.apply_all(&workloads.deployment_configs).await?;
        self.apply_all(&object.stateful_sets).await?;
        Ok(routes)
    }

    /// Deletes the objects of kind `T` this owner has in the namespace that are not `desired`.
    async fn prune<T: NamespacedObject>(&self, desired: &BTreeSet<&str>) -> Result<()> {
        let kind = T::kind(&()).into_owned();
        let selector = format!("{MANAGED_BY_LABEL}={OPERATOR_NAME}");
        let live = self
            .client
            .list_labeled::<T>(&self.namespace, &selector)
            .await
            .with_context(|_| ListManagedSnafu {
                kind: kind.clone(),
                owner: self.owner.name_any(),
            })?;

        for object in stale_objects(&live, desired, &self.owner_uid) {
            let name = object.name_any();
            info!(%kind, %name, "deleting object the environment no longer contains");
            self.client
                .delete(object)
                .await
                .with_context(|_| PruneObjectSnafu {
                    kind: kind.clone(),
                    name: &name,
                })?;
        }
        Ok(())
    }

    /// Removes what earlier passes created for components that are gone or omitted now.
    async fn prune_all(&self, environment: &Environment) -> Result<()> {
        let components = environment.custom_objects();
        let desired = |select: fn(&CustomObject) -> BTreeSet<&str>| {
            components
                .iter()
                .copied()
                .flat_map(select)
                .collect::<BTreeSet<_>>()
        };

        self.prune::<StatefulSet>(&desired(|object| object_names(&object.stateful_sets)))
            .await?;
        self.prune::<DeploymentConfig>(&desired(|object| object_names(&object.deployment_configs)))
            .await?;
        self.prune::<BuildConfig>(&desired(|object| object_names(&object.build_configs)))
            .await?;
        self.prune::<Route>(&desired(|object| object_names(&object.routes)))
            .await?;
        self.prune::<Service>(&desired(|object| object_names(&object.services)))
            .await?;
        self.prune::<ImageStream>(&image_stream_names(environment))
            .await?;
        self.prune::<ConfigMap>(&desired(|object| object_names(&object.config_maps)))
            .await?;
        self.prune::<Secret>(&desired(|object| object_names(&object.secrets)))
            .await?;
        self.prune::<RoleBinding>(&desired(|object| object_names(&object.role_bindings)))
            .await?;
        self.prune::<Role>(&desired(|object| object_names(&object.roles)))
            .await?;
        self.prune::<ServiceAccount>(&desired(|object| object_names(&object.service_accounts)))
            .await
    }

    /// Applies every component of `environment` that is not omitted, console first, then
    /// prunes what the environment dropped.
    pub async fn materialize(&self, environment: &Environment, spec: &KieAppSpec) -> Result<Materialized> {
        self.verify_external_references(spec).await?;

        let owned_streams = object_names(
            environment
                .custom_objects()
                .into_iter()
                .flat_map(|object| &object.image_streams),
        );
        let mut console_routes = Vec::new();
        for (index, object) in environment.custom_objects().into_iter().enumerate() {
            let routes = self.apply_component(object, &owned_streams, spec).await?;
            if index == 0 {
                console_routes = routes;
            }
        }
        self.prune_all(environment).await?;

        let application_name = self.owner.application_name();
        Ok(Materialized {
            console_host: console_host(&console_routes, &application_name),
            deployments: environment.deployment_names(),
        })
    }
}

#[cfg(test)]
mod tests {
    use indoc::{formatdoc, indoc};
    use rstest::rstest;

    use super::*;

    fn from_yaml<T: serde::de::DeserializeOwned>(yaml: &str) -> T {
        serde_yaml::from_str(yaml).expect("invalid test input")
    }

    fn deployment_config(server_id: &str, triggered: bool) -> DeploymentConfig {
        let mut dc: DeploymentConfig = from_yaml(&formatdoc! {"
            apiVersion: apps.openshift.io/v1
            kind: DeploymentConfig
            metadata:
              name: app-kieserver
              labels:
                app: app
            spec:
              replicas: 2
              template:
                spec:
                  containers:
                    - name: app-kieserver
                      image: registry.example.com/kieserver:1
                      env:
                        - name: KIE_SERVER_ID
                          value: {server_id}
                        - name: KIE_ADMIN_USER
                          value: admin
            ",
            server_id = server_id,
        });
        if triggered {
            dc.spec.triggers = Some(from_yaml(indoc! {"
                - type: ImageChange
                  imageChangeParams:
                    automatic: true
                    from:
                      kind: ImageStreamTag
                      namespace: openshift
                      name: rhpam-kieserver-rhel8:7.8.0
            "}));
        }
        dc
    }

    fn owner() -> KieApp {
        from_yaml(indoc! {"
            apiVersion: app.kiegroup.org/v2
            kind: KieApp
            metadata:
              name: app
              namespace: tenant
              uid: 5b8b3c1e-0000-4000-8000-000000000001
            spec:
              environment: rhpam-trial
        "})
    }

    #[test]
    fn stamp_sets_owner_and_operator_metadata() {
        let mut secret: Secret = from_yaml(indoc! {"
            apiVersion: v1
            kind: Secret
            metadata:
              name: app-credentials
              labels:
                app: app
        "});
        stamp(&mut secret, &owner()).expect("owner has a namespace and uid");

        assert_eq!(secret.metadata.namespace.as_deref(), Some("tenant"));
        let owner_references = secret.metadata.owner_references.expect("owner reference set");
        assert_eq!(owner_references.len(), 1);
        assert_eq!(owner_references[0].name, "app");
        assert_eq!(owner_references[0].controller, Some(true));
        let labels = secret.metadata.labels.expect("labels set");
        assert_eq!(labels["app"], "app");
        assert_eq!(labels[MANAGED_BY_LABEL], OPERATOR_NAME);
        assert_eq!(
            secret.metadata.annotations.expect("annotations set")[GROUP_ANNOTATION],
            OPERATOR_VERSION
        );
    }

    #[test]
    fn stamp_requires_a_namespace() {
        let mut owner = owner();
        owner.metadata.namespace = None;
        let mut secret = Secret::default();
        assert!(matches!(
            stamp(&mut secret, &owner),
            Err(Error::MissingNamespace { .. })
        ));
    }

    #[test]
    fn server_assigned_metadata_is_not_drift() {
        let desired = deployment_config("app-kieserver", false);
        let mut live = desired.clone();
        live.metadata.resource_version = Some("42".to_owned());
        live.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert("openshift.io/generated-by".to_owned(), "server".to_owned());
        assert!(!desired.needs_update(&live));

        live.metadata.labels = None;
        assert!(desired.needs_update(&live));
    }

    #[rstest]
    #[case::same(false)]
    #[case::reordered(true)]
    fn env_order_does_not_matter(#[case] reorder: bool) {
        let desired = deployment_config("app-kieserver", false);
        let mut live = desired.clone();
        if reorder {
            let container = &mut live
                .spec
                .template
                .as_mut()
                .and_then(|template| template.spec.as_mut())
                .expect("pod spec present")
                .containers[0];
            container.env.as_mut().expect("env present").reverse();
        }
        assert!(!desired.needs_update(&live));
    }

    #[test]
    fn changed_env_value_is_drift() {
        let desired = deployment_config("app-kieserver", false);
        let live = deployment_config("other", false);
        assert!(desired.needs_update(&live));
    }

    #[rstest]
    #[case::plain(false, true)]
    #[case::image_change_trigger(true, false)]
    fn image_is_compared_without_trigger(#[case] triggered: bool, #[case] expected: bool) {
        let desired = deployment_config("app-kieserver", triggered);
        let mut live = desired.clone();
        let container = &mut live
            .spec
            .template
            .as_mut()
            .and_then(|template| template.spec.as_mut())
            .expect("pod spec present")
            .containers[0];
        container.image = Some("image-registry.svc:5000/openshift/kieserver@sha256:abc".to_owned());
        assert_eq!(desired.needs_update(&live), expected);
    }

    #[test]
    fn replica_change_is_drift() {
        let desired = deployment_config("app-kieserver", true);
        let mut live = desired.clone();
        live.spec.replicas = Some(1);
        assert!(desired.needs_update(&live));
    }

    #[test]
    fn secrets_compare_keys_and_keep_live_values() {
        let mut desired: Secret = from_yaml(indoc! {"
            apiVersion: v1
            kind: Secret
            metadata:
              name: app-credentials
            stringData:
              password: fresh
        "});
        let live: Secret = from_yaml(indoc! {"
            apiVersion: v1
            kind: Secret
            metadata:
              name: app-credentials
              resourceVersion: \"7\"
            data:
              password: b2xk
        "});
        assert!(!desired.needs_update(&live));

        desired.prepare_update(&live);
        assert_eq!(desired.metadata.resource_version.as_deref(), Some("7"));
        assert!(desired.string_data.expect("string data kept").is_empty());
        assert_eq!(desired.data, live.data);
    }

    #[test]
    fn services_keep_cluster_ip_and_default_target_port() {
        let mut desired: Service = from_yaml(indoc! {"
            apiVersion: v1
            kind: Service
            metadata:
              name: app-kieserver
            spec:
              selector:
                deploymentConfig: app-kieserver
              ports:
                - name: http
                  port: 8080
        "});
        let live: Service = from_yaml(indoc! {"
            apiVersion: v1
            kind: Service
            metadata:
              name: app-kieserver
              resourceVersion: \"3\"
            spec:
              clusterIP: 172.30.0.10
              selector:
                deploymentConfig: app-kieserver
              ports:
                - name: http
                  port: 8080
                  targetPort: 8080
                  protocol: TCP
        "});
        assert!(!desired.needs_update(&live));

        desired.prepare_update(&live);
        assert_eq!(
            desired.spec.expect("spec present").cluster_ip.as_deref(),
            Some("172.30.0.10")
        );
    }

    #[test]
    fn route_host_generated_by_router_is_kept() {
        let mut desired: Route = from_yaml(indoc! {"
            apiVersion: route.openshift.io/v1
            kind: Route
            metadata:
              name: app-rhpamcentr
            spec:
              to:
                kind: Service
                name: app-rhpamcentr
        "});
        let mut live = desired.clone();
        live.spec.host = Some("app-rhpamcentr-tenant.apps.example.com".to_owned());
        assert!(!desired.needs_update(&live));

        desired.prepare_update(&live);
        assert_eq!(live.spec.host, desired.spec.host);

        live.spec.to.name = "elsewhere".to_owned();
        assert!(desired.needs_update(&live));
    }

    #[rstest]
    #[case::secure_route(Some("app.apps.example.com"), true, "https://app.apps.example.com")]
    #[case::plain_route(Some("app.apps.example.com"), false, "http://app")]
    #[case::no_host(None, true, "http://app")]
    fn console_host_prefers_secure_routes(
        #[case] host: Option<&str>,
        #[case] tls: bool,
        #[case] expected: &str,
    ) {
        let mut route: Route = from_yaml(indoc! {"
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
        "});
        route.spec.host = host.map(ToOwned::to_owned);
        if !tls {
            route.spec.tls = None;
        }
        assert_eq!(console_host(&[route], "app"), expected);
    }

    #[test]
    fn only_config_map_references_are_checked() {
        let spec: KieAppSpec = from_yaml(indoc! {"
            environment: rhpam-authoring
            auth:
              roleMapper:
                rolesProperties: roles.properties
                from:
                  kind: ConfigMap
                  name: role-mapping
            objects:
              console:
                gitHooks:
                  from:
                    kind: PersistentVolumeClaim
                    name: hooks-claim
        "});
        assert_eq!(referenced_config_maps(&spec), ["role-mapping"]);
    }

    #[test]
    fn built_and_followed_image_streams_are_named() {
        let environment: Environment = from_yaml(indoc! {"
            servers:
              - imageStreams:
                  - apiVersion: image.openshift.io/v1
                    kind: ImageStream
                    metadata:
                      name: app-kieserver
                deploymentConfigs:
                  - apiVersion: apps.openshift.io/v1
                    kind: DeploymentConfig
                    metadata:
                      name: app-kieserver
                    spec:
                      triggers:
                        - type: ImageChange
                          imageChangeParams:
                            from:
                              kind: ImageStreamTag
                              namespace: tenant
                              name: app-kieserver:latest
              - deploymentConfigs:
                  - apiVersion: apps.openshift.io/v1
                    kind: DeploymentConfig
                    metadata:
                      name: app-kieserver-2
                    spec:
                      triggers:
                        - type: ConfigChange
                        - type: ImageChange
                          imageChangeParams:
                            from:
                              kind: ImageStreamTag
                              namespace: openshift
                              name: rhpam-kieserver-rhel8:7.8.0
                        - type: ImageChange
                          imageChangeParams:
                            from:
                              kind: DockerImage
                              name: registry.example.com/custom:1.0
        "});
        assert_eq!(
            image_stream_names(&environment),
            BTreeSet::from(["app-kieserver", "rhpam-kieserver-rhel8"])
        );
    }

    #[rstest]
    #[case::product("rhpam-kieserver-rhel8", "7.8.0", "registry.example.com/rhpam-7/rhpam-kieserver-rhel8:7.8.0")]
    #[case::datagrid("datagrid73-openshift", "1.5", "registry.redhat.io/jboss-datagrid-7/datagrid73-openshift:1.5")]
    #[case::broker("amq-broker-7-scaledown-rhel7", "1.0", "registry.redhat.io/amq-broker-7-tech-preview/amq-broker-7-scaledown-rhel7:1.0")]
    #[case::database("postgresql", "10", "registry.redhat.io/rhscl/postgresql-10-rhel7:latest")]
    fn imports_pull_from_the_product_context(#[case] stream: &str, #[case] tag: &str, #[case] expected: &str) {
        assert_eq!(
            import_source(stream, tag, "registry.example.com", "rhpam", "7.8.0"),
            expected
        );
    }

    #[test]
    fn missing_stream_tag_becomes_an_import() {
        let registry = KieAppRegistry {
            registry: Some("registry.example.com:5000".to_owned()),
            insecure: true,
        };
        let (stream, tag) = split_stream_tag("rhpam-kieserver-rhel8:7.8.0");
        let import = image_import(stream, tag, &registry, "rhpam", "7.8.0");

        assert_eq!(import.metadata.name.as_deref(), Some("rhpam-kieserver-rhel8"));
        let tags = import.spec.tags.expect("tags set");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "7.8.0");
        let from = tags[0].from.as_ref().expect("import source set");
        assert_eq!(from.kind.as_deref(), Some("DockerImage"));
        assert_eq!(
            from.name.as_deref(),
            Some("registry.example.com:5000/rhpam-7/rhpam-kieserver-rhel8:7.8.0")
        );
        assert_eq!(tags[0].import_policy.and_then(|policy| policy.insecure), Some(true));
        assert_eq!(
            tags[0].reference_policy.as_ref().map(|policy| policy.type_.as_str()),
            Some("Local")
        );
    }

    #[test]
    fn secure_default_registry_is_used_without_configuration() {
        let (stream, tag) = split_stream_tag("rhdm-decisioncentral-rhel8");
        let import = image_import(stream, tag, &KieAppRegistry::default(), "rhdm", "7.7.1");

        let tags = import.spec.tags.expect("tags set");
        assert_eq!(tags[0].name, "latest");
        assert_eq!(
            tags[0].from.as_ref().and_then(|from| from.name.as_deref()),
            Some("registry.redhat.io/rhdm-7/rhdm-decisioncentral-rhel8:latest")
        );
        assert_eq!(tags[0].import_policy, None);
    }

    #[test]
    fn image_stream_update_keeps_live_tags() {
        let mut desired = image_import("custom-kieserver", "2.0", &KieAppRegistry::default(), "rhpam", "7.8.0");
        let mut live = image_import("custom-kieserver", "1.0", &KieAppRegistry::default(), "rhpam", "7.8.0");
        live.metadata.resource_version = Some("9".to_owned());
        assert!(desired.needs_update(&live));

        desired.prepare_update(&live);
        assert_eq!(desired.metadata.resource_version.as_deref(), Some("9"));
        let names: Vec<_> = desired.spec.tags.iter().flatten().map(|tag| tag.name.as_str()).collect();
        assert_eq!(names, ["2.0", "1.0"]);
        assert!(!desired.needs_update(&desired.clone()));
    }

    #[test]
    fn removed_server_set_is_pruned() {
        let environment: Environment = from_yaml(indoc! {"
            servers:
              - deploymentConfigs:
                  - apiVersion: apps.openshift.io/v1
                    kind: DeploymentConfig
                    metadata:
                      name: app-kieserver
              - deploymentConfigs:
                  - apiVersion: apps.openshift.io/v1
                    kind: DeploymentConfig
                    metadata:
                      name: app-kieserver-2
        "});
        let desired = object_names(
            environment
                .custom_objects()
                .into_iter()
                .flat_map(|object| &object.deployment_configs),
        );

        let live_dc = |name: &str, owner: &KieApp| {
            let mut dc = deployment_config("app-kieserver", false);
            dc.metadata.name = Some(name.to_owned());
            stamp(&mut dc, owner).expect("owner has a namespace and uid");
            dc
        };
        let mut other_owner = owner();
        other_owner.metadata.uid = Some("5b8b3c1e-0000-4000-8000-000000000002".to_owned());
        let mut unmanaged = deployment_config("app-kieserver", false);
        unmanaged.metadata.name = Some("app-custom".to_owned());
        let live = [
            live_dc("app-kieserver", &owner()),
            live_dc("app-kieserver-2", &owner()),
            live_dc("app-kieserver-3", &owner()),
            live_dc("other-kieserver", &other_owner),
            unmanaged,
        ];

        let stale: Vec<_> = stale_objects(&live, &desired, "5b8b3c1e-0000-4000-8000-000000000001")
            .into_iter()
            .map(ResourceExt::name_any)
            .collect();
        assert_eq!(stale, ["app-kieserver-3"]);
    }

    #[test]
    fn omitted_components_are_pruned() {
        let environment: Environment = from_yaml(indoc! {"
            console:
              services:
                - apiVersion: v1
                  kind: Service
                  metadata:
                    name: app-rhpamcentr
            smartRouter:
              omit: true
              services:
                - apiVersion: v1
                  kind: Service
                  metadata:
                    name: app-smartrouter
        "});
        let desired = object_names(
            environment
                .custom_objects()
                .into_iter()
                .flat_map(|object| &object.services),
        );
        let live: Vec<Service> = ["app-rhpamcentr", "app-smartrouter"]
            .into_iter()
            .map(|name| {
                let mut service = Service {
                    metadata: ObjectMeta {
                        name: Some(name.to_owned()),
                        ..ObjectMeta::default()
                    },
                    ..Service::default()
                };
                stamp(&mut service, &owner()).expect("owner has a namespace and uid");
                service
            })
            .collect();

        let stale = stale_objects(&live, &desired, "5b8b3c1e-0000-4000-8000-000000000001");
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].metadata.name.as_deref(), Some("app-smartrouter"));
    }
}
