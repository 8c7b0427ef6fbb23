//! A thin wrapper around [`kube::Client`] for the namespaced objects the operator manages.

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::{
    Api, Resource, ResourceExt,
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::constants::OPERATOR_NAME;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to get {kind} {name:?}"))]
    GetObject {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to list {kind} objects in namespace {namespace:?}"))]
    ListObjects {
        source: kube::Error,
        kind: String,
        namespace: String,
    },

    #[snafu(display("failed to create {kind} {name:?}"))]
    CreateObject {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to update {kind} {name:?}"))]
    UpdateObject {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to delete {kind} {name:?}"))]
    DeleteObject {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to patch the status of {kind} {name:?}"))]
    PatchStatus {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("{kind} {name:?} has no namespace"))]
    MissingNamespace { kind: String, name: String },
}

/// Bounds shared by every namespaced object this client reads or writes.
pub trait NamespacedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
{
}

impl<T> NamespacedObject for T where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
{
}

fn kind<T: NamespacedObject>() -> String {
    T::kind(&()).into_owned()
}

/// Wraps a [`kube::Client`] and writes with the operator as field manager.
#[derive(Clone)]
pub struct Client {
    client: kube::Client,
    post_params: PostParams,
    status_patch_params: PatchParams,
}

impl Client {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            post_params: PostParams {
                field_manager: Some(OPERATOR_NAME.to_owned()),
                ..PostParams::default()
            },
            status_patch_params: PatchParams {
                field_manager: Some(OPERATOR_NAME.to_owned()),
                ..PatchParams::default()
            },
        }
    }

    /// Returns the wrapped [`kube::Client`].
    pub fn as_kube_client(&self) -> kube::Client {
        self.client.clone()
    }

    pub fn namespaced_api<T: NamespacedObject>(&self, namespace: &str) -> Api<T> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn api_for<T: NamespacedObject>(&self, object: &T) -> Result<Api<T>> {
        let namespace = object.namespace().with_context(|| MissingNamespaceSnafu {
            kind: kind::<T>(),
            name: object.name_any(),
        })?;
        Ok(self.namespaced_api(&namespace))
    }

    /// Retrieves the object `name`, `None` if it does not exist.
    pub async fn get_opt<T: NamespacedObject>(&self, name: &str, namespace: &str) -> Result<Option<T>> {
        self.namespaced_api::<T>(namespace)
            .get_opt(name)
            .await
            .with_context(|_| GetObjectSnafu {
                kind: kind::<T>(),
                name,
            })
    }

    pub async fn list<T: NamespacedObject>(&self, namespace: &str) -> Result<Vec<T>> {
        self.list_with(namespace, &ListParams::default()).await
    }

    /// Lists the objects in `namespace` matching the label selector `selector`.
    pub async fn list_labeled<T: NamespacedObject>(&self, namespace: &str, selector: &str) -> Result<Vec<T>> {
        self.list_with(namespace, &ListParams::default().labels(selector))
            .await
    }

    async fn list_with<T: NamespacedObject>(&self, namespace: &str, params: &ListParams) -> Result<Vec<T>> {
        Ok(self
            .namespaced_api::<T>(namespace)
            .list(params)
            .await
            .with_context(|_| ListObjectsSnafu {
                kind: kind::<T>(),
                namespace,
            })?
            .items)
    }

    pub async fn create<T: NamespacedObject>(&self, object: &T) -> Result<T> {
        self.api_for(object)?
            .create(&self.post_params, object)
            .await
            .with_context(|_| CreateObjectSnafu {
                kind: kind::<T>(),
                name: object.name_any(),
            })
    }

    /// Replaces an existing object. `object` must carry the live `resourceVersion`.
    pub async fn update<T: NamespacedObject>(&self, object: &T) -> Result<T> {
        let name = object.name_any();
        self.api_for(object)?
            .replace(&name, &self.post_params, object)
            .await
            .with_context(|_| UpdateObjectSnafu {
                kind: kind::<T>(),
                name: &name,
            })
    }

    /// Deletes `object`. Objects that are already gone are not an error.
    pub async fn delete<T: NamespacedObject>(&self, object: &T) -> Result<()> {
        let name = object.name_any();
        match self
            .api_for(object)?
            .delete(&name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(source) => Err(source).with_context(|_| DeleteObjectSnafu {
                kind: kind::<T>(),
                name: &name,
            }),
        }
    }

    /// Merge patches the status subresource of `object` with `status`.
    pub async fn update_status<T, S>(&self, object: &T, status: &S) -> Result<T>
    where
        T: NamespacedObject,
        S: Debug + Serialize,
    {
        let name = object.name_any();
        let patch = serde_json::json!({ "status": status });
        self.api_for(object)?
            .patch_status(&name, &self.status_patch_params, &Patch::Merge(&patch))
            .await
            .with_context(|_| PatchStatusSnafu {
                kind: kind::<T>(),
                name: &name,
            })
    }
}
