//! Facilities for reporting Kubernetes controller outcomes
//!
//! The primary entry point is [`report_controller_reconciled`].

use std::error::Error;

use kube::{
    Resource,
    runtime::{
        controller::{self, Action},
        reflector::ObjectRef,
    },
};

use crate::{client::Client, logging::k8s_events::publish_controller_error_as_k8s_event};

/// [`Error`] extensions that help report reconciliation errors
pub trait ReconcilerError: Error {
    /// `PascalCase`d name for the error category
    ///
    /// This can typically be implemented by delegating to [`strum::EnumDiscriminants`] and
    /// [`strum::IntoStaticStr`].
    fn category(&self) -> &'static str;
}

/// Reports the controller reconciliation result to all relevant targets
///
/// Currently this means that the result is reported to:
/// * The current [`tracing::Subscriber`], typically at least stdout
/// * Kubernetes events on the failing KieApp, if there is an error
pub fn report_controller_reconciled<K, ReconcileErr, QueueErr>(
    client: &Client,
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<ReconcileErr, QueueErr>>,
) where
    K: Resource,
    ReconcileErr: ReconcilerError + 'static,
    QueueErr: Error + 'static,
{
    match result {
        Ok((object, _)) => {
            tracing::info!(
                controller.name = controller_name,
                object = %object,
                "Reconciled object"
            );
        }
        Err(error) => {
            tracing::error!(
                controller.name = controller_name,
                error = error as &dyn Error,
                "Failed to reconcile object",
            );
            publish_controller_error_as_k8s_event(client, controller_name, error);
        }
    }
}
