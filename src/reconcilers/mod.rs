use std::sync::Arc;

use async_trait::async_trait;
use kube::{runtime::controller::Action, Client, CustomResourceExt, ResourceExt};
use tokio::sync::RwLock;

use crate::{operator::Diagnostics, store::KubeStore, Error, Metrics};

mod addon;
mod convergence;

pub use addon::Reconciler;
pub use convergence::{
    AddonRequest, AfterCreate, ConvergenceStep, ManagedObject, OnFailure, Progress, ReconcileOutcome,
    StepPolicy,
};

/// The context passed around
pub struct Context {
    /// Kubernetes client
    pub client: Client,

    /// The convergence core, backed by the cluster
    pub reconciler: Reconciler<KubeStore>,

    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,

    /// Prometheus metrics
    pub metrics: Metrics,
}

/// A resource that can be reconciled by a controller
#[async_trait]
pub(crate) trait Reconcile
where
    Self: CustomResourceExt + ResourceExt,
{
    type Context;

    /// Attempt to reconcile a resource
    async fn reconcile(&self, context: Arc<Self::Context>) -> Result<Action, Error>;
}
