//! Provisions KIE business automation environments (Business Central, KIE servers, smart
//! router, databases and messaging) from `KieApp` custom resources.
//!
//! A [`KieApp`](crd::KieApp) is turned into an [`Environment`](objects::Environment) by
//! rendering versioned YAML fragments ([`fragment`]) with a context derived from the resource
//! ([`defaults`]) and merging them ([`merge`]). The [`reconciler`] applies the result to the
//! cluster and [`status`] records the outcome.

pub mod cli;
pub mod client;
pub mod constants;
pub mod context;
pub mod controller;
pub mod crd;
pub mod defaults;
pub mod environment;
pub mod fragment;
pub mod logging;
pub mod merge;
pub mod objects;
pub mod openshift;
pub mod reconciler;
pub mod status;
pub mod upgrade;
