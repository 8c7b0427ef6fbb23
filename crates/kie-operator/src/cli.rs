//! Command line of the operator binary.
//!
//! Every run argument can also be given as an environment variable, which is how the
//! operator Deployment configures it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Resource};

use crate::constants::OPERATOR_NAME;

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(
    name = "kie-operator",
    version,
    about = "Provisions KIE business automation environments from KieApp resources"
)]
pub struct Opts {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the KieApp CRD.
    Crd,

    /// Run the operator.
    Run(RunArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct RunArguments {
    /// Provides a specific namespace to watch (instead of watching all namespaces)
    #[arg(long, env, default_value = "")]
    pub watch_namespace: WatchNamespace,

    /// The namespace the operator is running in. The fragment catalog is published here.
    ///
    /// When running on Kubernetes, project it with the downward API.
    #[arg(long, env)]
    pub operator_namespace: String,

    /// Name reported as the source of events.
    #[arg(long, env, default_value = OPERATOR_NAME)]
    pub operator_name: String,

    /// Reads fragments from `<dir>/<version>/` instead of the catalog built into the binary.
    #[arg(long, env = "KIE_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Seconds to wait before retrying a failed reconciliation.
    #[arg(long, env, default_value_t = 10)]
    pub requeue_seconds: u64,
}

/// The namespaces whose KieApps are reconciled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchNamespace {
    All,
    One(String),
}

impl From<&str> for WatchNamespace {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::All
        } else {
            Self::One(s.to_owned())
        }
    }
}

impl WatchNamespace {
    /// Gets an API object for the namespace in question or for all namespaces,
    /// depending on which variant we are.
    pub fn get_api<T>(&self, client: kube::Client) -> Api<T>
    where
        T: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        match self {
            Self::All => Api::all(client),
            Self::One(namespace) => Api::namespaced(client, namespace),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::CommandFactory;
    use rstest::rstest;

    use super::*;

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn run_arguments_have_defaults() {
        let opts = Opts::parse_from(["kie-operator", "run", "--operator-namespace", "kie-system"]);
        let Command::Run(args) = opts.command else {
            panic!("expected the run command");
        };
        assert_eq!(args.operator_namespace, "kie-system");
        assert_eq!(args.operator_name, OPERATOR_NAME);
        assert_eq!(args.requeue_seconds, 10);
    }

    #[test]
    fn config_dir_is_optional() {
        let opts = Opts::parse_from([
            "kie-operator",
            "run",
            "--operator-namespace",
            "kie-system",
            "--config-dir",
            "/etc/kie/config",
            "--requeue-seconds",
            "30",
        ]);
        let Command::Run(args) = opts.command else {
            panic!("expected the run command");
        };
        assert_eq!(args.config_dir.as_deref(), Some(Path::new("/etc/kie/config")));
        assert_eq!(args.requeue_seconds, 30);
    }

    #[rstest]
    #[case("", WatchNamespace::All)]
    #[case("tenant", WatchNamespace::One("tenant".to_owned()))]
    fn watch_namespace_from_str(#[case] input: &str, #[case] expected: WatchNamespace) {
        assert_eq!(WatchNamespace::from(input), expected);
    }

    #[test]
    fn crd_takes_no_arguments() {
        assert_eq!(
            Opts::parse_from(["kie-operator", "crd"]).command,
            Command::Crd
        );
    }
}
