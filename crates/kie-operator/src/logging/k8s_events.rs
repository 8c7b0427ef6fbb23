//! Utilities for publishing Kubernetes events

use std::error::Error;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::{
    controller,
    events::{Event, EventType, Recorder, Reporter},
};
use tracing::Instrument;

use super::{controller::ReconcilerError, error_chain};
use crate::client::Client;

/// Longest note the events API accepts.
const MAX_NOTE_LENGTH: usize = 1024;

/// Converts an [`Error`] into a publishable Kubernetes [`Event`]
fn error_to_event<E: ReconcilerError>(err: &E) -> Event {
    let mut note = error_chain(err);
    message::truncate_with_ellipsis(&mut note, MAX_NOTE_LENGTH);
    Event {
        type_: EventType::Warning,
        reason: err.category().to_owned(),
        note: Some(note),
        action: "Reconcile".to_owned(),
        secondary: None,
    }
}

/// Reports an error coming from a controller to Kubernetes
///
/// This is intended to be executed on the log entries returned by
/// [`Controller::run`](kube::runtime::Controller::run)
#[tracing::instrument(skip(client, controller_error))]
pub fn publish_controller_error_as_k8s_event<ReconcileErr, QueueErr>(
    client: &Client,
    controller: &str,
    controller_error: &controller::Error<ReconcileErr, QueueErr>,
) where
    ReconcileErr: ReconcilerError + 'static,
    QueueErr: Error + 'static,
{
    let controller::Error::ReconcilerFailed(error, object) = controller_error else {
        // queue and watch errors concern the operator, not a KieApp
        return;
    };
    let recorder = Recorder::new(client.as_kube_client(), Reporter {
        controller: controller.to_owned(),
        instance: None,
    });
    let reference = ObjectReference::from(object.clone());
    let event = error_to_event(error);
    // Run in the background
    tokio::spawn(
        async move {
            if let Err(err) = recorder.publish(&event, &reference).await {
                tracing::error!(
                    error = &err as &dyn Error,
                    "Failed to report error as K8s event"
                );
            }
        }
        .in_current_span(),
    );
}

mod message {
    /// Ensures that `msg` is at most `max_len` _bytes_ long
    ///
    /// If `msg` is longer than `max_len` then the extra text is replaced with an ellipsis.
    pub fn truncate_with_ellipsis(msg: &mut String, max_len: usize) {
        const ELLIPSIS: char = '…';
        const ELLIPSIS_LEN: usize = ELLIPSIS.len_utf8();
        if msg.len() > max_len {
            let end = floor_char_boundary(msg, max_len.saturating_sub(ELLIPSIS_LEN));
            msg.truncate(end);
            if ELLIPSIS_LEN <= max_len {
                msg.push(ELLIPSIS);
            }
        }
        debug_assert!(msg.len() <= max_len);
    }

    fn floor_char_boundary(s: &str, mut pos: usize) -> usize {
        while !s.is_char_boundary(pos) {
            pos -= 1;
        }
        pos
    }

}
