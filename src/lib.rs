use thiserror::Error;

/// Expose all controller components used by main
pub mod config;
pub mod operator;
pub mod resources;

/// Convergence of the dependent resources of an addon
pub mod reconcilers;

/// Access to cluster objects
pub mod store;

// Desired shapes of the dependent resources
mod manifests;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;

#[cfg(test)]
mod fixtures;

use store::{ManagedResourceRef, StoreAction};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("could not {action} {target}: {source}")]
    Store {
        action: StoreAction,
        target: ManagedResourceRef,
        #[source]
        source: kube::Error,
    },

    #[error("{target} is misconfigured: {reason}")]
    Misconfiguration {
        target: ManagedResourceRef,
        reason: String,
    },

    #[error("{} dependent resource(s) failed to converge: {}", .0.len(), summarize(.0))]
    PartialFailure(Vec<Error>),

    #[error("IllegalAddon: {0}")]
    IllegalAddon(String),

    #[error("MetricsError: {0}")]
    MetricsError(#[from] prometheus::Error),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn store(action: StoreAction, target: &ManagedResourceRef, source: kube::Error) -> Self {
        Error::Store {
            action,
            target: target.clone(),
            source,
        }
    }

    pub(crate) fn misconfigured(target: &ManagedResourceRef, reason: impl Into<String>) -> Self {
        Error::Misconfiguration {
            target: target.clone(),
            reason: reason.into(),
        }
    }

    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(_) => "kube".into(),
            Error::Store { action, target, .. } => format!("{action}_{}", target.kind).to_lowercase(),
            Error::Misconfiguration { target, .. } => format!("misconfigured_{}", target.kind).to_lowercase(),
            Error::PartialFailure(_) => "partial_failure".into(),
            Error::IllegalAddon(_) => "illegal_addon".into(),
            Error::MetricsError(_) => "metrics".into(),
        }
    }
}

fn summarize(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
