use std::{sync::Arc, time::Duration};

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Secret, Service};
use kie_operator::{
    cli::{Command, Opts, RunArguments},
    client::Client,
    constants::{OPERATOR_NAME, OPERATOR_VERSION},
    controller::{self, CONTROLLER_NAME, Ctx},
    crd::KieApp,
    defaults::ImageOverrides,
    fragment::{DirectorySource, FragmentSource, StaticSource},
    logging::{self, LOG_ENV, controller::report_controller_reconciled},
    openshift::{DeploymentConfig, Route},
    upgrade::VersionCatalog,
};
use kube::{
    CustomResourceExt,
    runtime::{Controller, watcher},
};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to print the CRD"))]
    PrintCrd { source: serde_yaml::Error },

    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to create the Kubernetes client"))]
    CreateClient { source: kube::Error },

    #[snafu(display("failed to publish the fragment catalog"))]
    PublishCatalog { source: controller::Error },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();
    match opts.command {
        Command::Crd => {
            serde_yaml::to_writer(std::io::stdout(), &KieApp::crd()).context(PrintCrdSnafu)?;
        }
        Command::Run(args) => run(args).await?,
    }
    Ok(())
}

async fn run(args: RunArguments) -> Result<(), Error> {
    logging::initialize_logging(LOG_ENV, OPERATOR_NAME).context(InitializeLoggingSnafu)?;
    tracing::info!(
        operator.version = OPERATOR_VERSION,
        watch_namespace = ?args.watch_namespace,
        "starting operator"
    );

    let kube_client = kube::Client::try_default().await.context(CreateClientSnafu)?;
    let client = Client::new(kube_client.clone());

    let bundled: Arc<dyn FragmentSource> = match &args.config_dir {
        Some(dir) => Arc::new(DirectorySource::new(dir)),
        None => Arc::new(StaticSource::bundled()),
    };
    let catalog = VersionCatalog::default();
    controller::publish_catalog(&client, bundled.as_ref(), &catalog, &args.operator_namespace)
        .await
        .context(PublishCatalogSnafu)?;

    let ctx = Arc::new(Ctx {
        client: client.clone(),
        bundled,
        operator_namespace: args.operator_namespace,
        catalog,
        overrides: ImageOverrides::from_env(),
        requeue: Duration::from_secs(args.requeue_seconds),
    });

    let controller_name = format!("{CONTROLLER_NAME}.{}", args.operator_name);
    let namespace = &args.watch_namespace;
    Controller::new(
        namespace.get_api::<KieApp>(kube_client.clone()),
        watcher::Config::default(),
    )
    .owns(
        namespace.get_api::<DeploymentConfig>(kube_client.clone()),
        watcher::Config::default(),
    )
    .owns(
        namespace.get_api::<Service>(kube_client.clone()),
        watcher::Config::default(),
    )
    .owns(
        namespace.get_api::<Route>(kube_client.clone()),
        watcher::Config::default(),
    )
    .owns(
        namespace.get_api::<Secret>(kube_client),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(controller::reconcile, controller::error_policy, ctx)
    .for_each(|result| {
        report_controller_reconciled(&client, &controller_name, &result);
        futures::future::ready(())
    })
    .await;

    Ok(())
}
