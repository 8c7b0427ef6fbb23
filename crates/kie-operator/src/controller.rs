//! Reconciles [`KieApp`] resources.
//!
//! A pass synthesizes the environment from the fragment catalog, materializes it and records
//! the outcome as conditions on the resource's status.

use std::{sync::Arc, time::Duration};

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{ResourceExt, runtime::controller::Action};
use snafu::{ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};
use tracing::{debug, info, warn};

use crate::{
    client::{self, Client},
    constants::{GROUP_ANNOTATION, OPERATOR_VERSION},
    crd::{KieApp, KieAppStatus},
    defaults::ImageOverrides,
    environment::{self, Synthesis, Synthesizer, consolidate_objects},
    fragment::{self, ConfigMapSource, FragmentSource, Loader, catalog_config_maps},
    logging::{controller::ReconcilerError, error_chain},
    reconciler::{self, Materialized, Materializer},
    status::ReasonType,
    upgrade::{self, VersionCatalog, requested_version},
};

pub const CONTROLLER_NAME: &str = "kieapp";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("failed to list the fragment ConfigMaps in namespace {namespace:?}"))]
    ListCatalog {
        source: client::Error,
        namespace: String,
    },

    #[snafu(display("failed to publish the fragment ConfigMap {name:?}"))]
    PublishCatalog { source: client::Error, name: String },

    #[snafu(display("failed to set up the fragment loader"))]
    CreateLoader { source: fragment::Error },

    #[snafu(display("failed to synthesize the environment"))]
    SynthesizeEnvironment { source: environment::Error },

    #[snafu(display("failed to verify the published fragments before upgrading"))]
    VerifyCatalog { source: upgrade::Error },

    #[snafu(display("failed to materialize the environment"))]
    Materialize { source: reconciler::Error },

    #[snafu(display("failed to update the status of KieApp {name:?}"))]
    UpdateStatus { source: client::Error, name: String },
}

impl Error {
    /// The condition reason recorded when a reconciliation fails with this error.
    pub fn reason(&self) -> ReasonType {
        match self {
            Self::CreateLoader { .. }
            | Self::SynthesizeEnvironment { .. }
            | Self::VerifyCatalog { .. } => ReasonType::ConfigurationError,
            Self::Materialize { source } if source.is_missing_dependency() => {
                ReasonType::MissingDependencies
            }
            Self::Materialize { .. } => ReasonType::DeploymentFailed,
            Self::ListCatalog { .. } | Self::PublishCatalog { .. } | Self::UpdateStatus { .. } => {
                ReasonType::Unknown
            }
        }
    }
}

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }
}

/// State shared by every reconciliation.
pub struct Ctx {
    pub client: Client,
    /// The catalog shipped with the operator, or read from the configured directory.
    pub bundled: Arc<dyn FragmentSource>,
    /// Namespace holding the published fragment ConfigMaps.
    pub operator_namespace: String,
    pub catalog: VersionCatalog,
    pub overrides: ImageOverrides,
    /// Delay before a failed reconciliation is retried.
    pub requeue: Duration,
}

/// Publishes the catalog of every supported version as ConfigMaps in `namespace`.
///
/// ConfigMaps written by this operator version are left alone so edits survive restarts.
/// ConfigMaps written by another version are replaced.
pub async fn publish_catalog(
    client: &Client,
    source: &dyn FragmentSource,
    catalog: &VersionCatalog,
    namespace: &str,
) -> Result<()> {
    for version in catalog.supported.iter().filter(|version| source.has_version(version)) {
        for mut config_map in catalog_config_maps(source, version) {
            config_map.metadata.namespace = Some(namespace.to_owned());
            let name = config_map.name_any();
            let live = client
                .get_opt::<ConfigMap>(&name, namespace)
                .await
                .context(PublishCatalogSnafu { name: &name })?;

            match live {
                None => {
                    info!(config_map = %name, "publishing fragments");
                    client
                        .create(&config_map)
                        .await
                        .context(PublishCatalogSnafu { name: &name })?;
                }
                Some(live)
                    if live.annotations().get(GROUP_ANNOTATION).map(String::as_str)
                        == Some(OPERATOR_VERSION) =>
                {
                    debug!(config_map = %name, "fragments already published");
                }
                Some(live) => {
                    info!(config_map = %name, "replacing fragments published by another operator version");
                    config_map.metadata.resource_version = live.metadata.resource_version;
                    client
                        .update(&config_map)
                        .await
                        .context(PublishCatalogSnafu { name: &name })?;
                }
            }
        }
    }
    Ok(())
}

/// The fragments a pass renders: the published ConfigMaps when they hold the current version,
/// the bundled catalog otherwise. The flag tells whether the published ones were picked.
async fn fragment_source(ctx: &Ctx) -> Result<(Arc<dyn FragmentSource>, bool)> {
    let config_maps = ctx
        .client
        .list::<ConfigMap>(&ctx.operator_namespace)
        .await
        .context(ListCatalogSnafu {
            namespace: &ctx.operator_namespace,
        })?;
    let published = ConfigMapSource::from_config_maps(&config_maps);
    if published.has_version(&ctx.catalog.current) {
        Ok((Arc::new(published), true))
    } else {
        debug!(
            namespace = %ctx.operator_namespace,
            "no published fragments found, using the bundled catalog"
        );
        Ok((Arc::clone(&ctx.bundled), false))
    }
}

async fn synthesize(kieapp: &KieApp, ctx: &Ctx) -> Result<Synthesis> {
    let (source, published) = fragment_source(ctx).await?;
    let loader = Loader::new(Arc::clone(&source)).context(CreateLoaderSnafu)?;
    let synthesizer = Synthesizer::new(loader, ctx.catalog.clone(), ctx.overrides.clone());
    let mut synthesis = synthesizer
        .get_environment(kieapp)
        .context(SynthesizeEnvironmentSnafu)?;

    if let (Some(from), true) = (&synthesis.version.upgraded_from, published) {
        upgrade::verify_config_maps(
            ctx.bundled.as_ref(),
            source.as_ref(),
            from,
            &synthesis.version.version,
        )
        .context(VerifyCatalogSnafu)?;
    }
    consolidate_objects(&mut synthesis.environment, &synthesis.kieapp.spec);
    Ok(synthesis)
}

async fn deploy(kieapp: &KieApp, ctx: &Ctx) -> Result<(Synthesis, Materialized)> {
    let synthesis = synthesize(kieapp, ctx).await?;
    let materialized = Materializer::new(&ctx.client, kieapp)
        .context(MaterializeSnafu)?
        .materialize(&synthesis.environment, &synthesis.kieapp.spec)
        .await
        .context(MaterializeSnafu)?;
    Ok((synthesis, materialized))
}

async fn patch_status(kieapp: &KieApp, status: &KieAppStatus, ctx: &Ctx) -> Result<()> {
    ctx.client
        .update_status(kieapp, status)
        .await
        .context(UpdateStatusSnafu {
            name: kieapp.name_any(),
        })?;
    Ok(())
}

pub async fn reconcile(kieapp: Arc<KieApp>, ctx: Arc<Ctx>) -> Result<Action> {
    info!(kieapp.name = %kieapp.name_any(), "starting reconcile");
    let mut status = kieapp.status.clone().unwrap_or_default();
    let version = status
        .version
        .clone()
        .unwrap_or_else(|| requested_version(&kieapp, &ctx.catalog));

    if status.conditions.is_empty() && status.set_provisioning(&version) {
        patch_status(&kieapp, &status, &ctx).await?;
    }

    match deploy(&kieapp, &ctx).await {
        Ok((synthesis, materialized)) => {
            let version = synthesis.version.version;
            status.console_host = Some(materialized.console_host);
            status.deployments = materialized.deployments;
            status.version = Some(version.clone());
            status.applied = Some(synthesis.kieapp.spec);
            status.set_deployed(&version);
            patch_status(&kieapp, &status, &ctx).await?;
            Ok(Action::await_change())
        }
        Err(error) => {
            let recorded = status.set_failed(error.reason(), error_chain(&error), &version);
            if !recorded {
                debug!("failure already recorded, leaving the status untouched");
            } else if let Err(patch_error) = patch_status(&kieapp, &status, &ctx).await {
                warn!(
                    error = &patch_error as &dyn std::error::Error,
                    "failed to record the failed condition"
                );
            }
            Err(error)
        }
    }
}

pub fn error_policy(_kieapp: Arc<KieApp>, _error: &Error, ctx: Arc<Ctx>) -> Action {
    Action::requeue(ctx.requeue)
}
