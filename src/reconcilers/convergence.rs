use std::{fmt, time::Duration};

use k8s_openapi::api::{batch::v1::CronJob, core::v1::Secret};
use tracing::{debug, info, warn};

use crate::{
    resources::{Addon, ClusterVersion, Prometheus, PrometheusRule, ServiceMonitor},
    store::{ClusterStore, ManagedResourceRef, ResourceKind, StoreAction},
    Error, Result,
};

/// Identifies one addon to reconcile. Built fresh for every trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddonRequest {
    pub namespace: String,
    pub name: String,
}

impl AddonRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn reference(&self) -> ManagedResourceRef {
        ManagedResourceRef::namespaced(ResourceKind::Addon, &self.namespace, &self.name)
    }
}

impl fmt::Display for AddonRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Why a pass asked to be triggered again without an error
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Progress {
    /// A resource later steps depend on was just created and must be re-observed
    Created(ManagedResourceRef),

    /// The user parameters are not provisioned (yet)
    AwaitingParameters,

    /// Creating a resource later steps depend on failed, it is retried shortly
    Blocked(ManagedResourceRef),

    /// Every dependent resource exists
    Converged,
}

/// The result of a single step, and of a whole pass once it is not `Continue`
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Proceed with the next step
    Continue,

    /// Stop, and trigger again after the delay
    RequeueAfter { after: Duration, reason: Progress },

    /// Stop, and trigger again following the error backoff
    RequeueWithError(Error),

    /// Stop without forcing a retry: retrying cannot fix the error, an external change must
    Stalled(Error),

    /// Nothing to reconcile
    Done,
}

impl ReconcileOutcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, ReconcileOutcome::Continue)
    }

    /// Short label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Continue => "continue",
            ReconcileOutcome::RequeueAfter {
                reason: Progress::Converged,
                ..
            } => "converged",
            ReconcileOutcome::RequeueAfter {
                reason: Progress::Blocked(_),
                ..
            } => "blocked",
            ReconcileOutcome::RequeueAfter { .. } => "progressing",
            ReconcileOutcome::RequeueWithError(_) => "error",
            ReconcileOutcome::Stalled(_) => "stalled",
            ReconcileOutcome::Done => "done",
        }
    }
}

/// What to do when looking up, building or creating a resource fails
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnFailure {
    /// End the pass with the error, so it is retried
    Requeue,

    /// End the pass after logging the error, and trigger again after the short delay
    Retry,

    /// End the pass with the error, without retrying
    Stall,

    /// Record the error and carry on with the next step
    Isolate,
}

/// What to do once a missing resource was created
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterCreate {
    /// End the pass so the next one observes the new resource first
    Requeue,

    /// Carry on with the next step
    Continue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepPolicy {
    pub on_lookup_error: OnFailure,
    pub on_build_error: OnFailure,
    pub on_create_error: OnFailure,
    pub after_create: AfterCreate,
}

impl StepPolicy {
    /// Later steps need this resource, so nothing after it runs until it is observed
    pub const GATE: Self = Self {
        on_lookup_error: OnFailure::Requeue,
        on_build_error: OnFailure::Stall,
        on_create_error: OnFailure::Requeue,
        after_create: AfterCreate::Requeue,
    };

    /// Every later sibling depends on this resource
    pub const ANCHOR: Self = Self {
        on_lookup_error: OnFailure::Requeue,
        on_build_error: OnFailure::Stall,
        on_create_error: OnFailure::Retry,
        after_create: AfterCreate::Requeue,
    };

    /// No sibling depends on this resource
    pub const ISOLATED: Self = Self {
        on_lookup_error: OnFailure::Isolate,
        on_build_error: OnFailure::Isolate,
        on_create_error: OnFailure::Isolate,
        after_create: AfterCreate::Continue,
    };
}

/// A dependent resource in its desired shape, ready to be created
#[derive(Clone, Debug)]
pub enum ManagedObject {
    Secret(Secret),
    Prometheus(Prometheus),
    ServiceMonitor(ServiceMonitor),
    PrometheusRule(PrometheusRule),
    CronJob(CronJob),
}

impl ManagedObject {
    pub fn reference(&self) -> ManagedResourceRef {
        match self {
            ManagedObject::Secret(o) => ManagedResourceRef::of(o),
            ManagedObject::Prometheus(o) => ManagedResourceRef::of(o),
            ManagedObject::ServiceMonitor(o) => ManagedResourceRef::of(o),
            ManagedObject::PrometheusRule(o) => ManagedResourceRef::of(o),
            ManagedObject::CronJob(o) => ManagedResourceRef::of(o),
        }
    }

    async fn create_in<S: ClusterStore>(&self, store: &S) -> kube::Result<()> {
        match self {
            ManagedObject::Secret(o) => store.create(o).await,
            ManagedObject::Prometheus(o) => store.create(o).await,
            ManagedObject::ServiceMonitor(o) => store.create(o).await,
            ManagedObject::PrometheusRule(o) => store.create(o).await,
            ManagedObject::CronJob(o) => store.create(o).await,
        }
    }
}

/// Whether the referenced object exists, whatever its contents
async fn exists<S: ClusterStore>(store: &S, reference: &ManagedResourceRef) -> kube::Result<bool> {
    let meta = match reference.kind {
        ResourceKind::Addon => store.get_metadata::<Addon>(reference).await?,
        ResourceKind::ClusterVersion => store.get_metadata::<ClusterVersion>(reference).await?,
        ResourceKind::Secret => store.get_metadata::<Secret>(reference).await?,
        ResourceKind::Prometheus => store.get_metadata::<Prometheus>(reference).await?,
        ResourceKind::ServiceMonitor => store.get_metadata::<ServiceMonitor>(reference).await?,
        ResourceKind::PrometheusRule => store.get_metadata::<PrometheusRule>(reference).await?,
        ResourceKind::CronJob => store.get_metadata::<CronJob>(reference).await?,
    };

    Ok(meta.is_some())
}

type Factory<'a> = Box<dyn Fn() -> Result<ManagedObject> + Send + Sync + 'a>;

/// Look up a resource, and build and create it when absent
pub struct ConvergenceStep<'a> {
    pub reference: ManagedResourceRef,
    pub policy: StepPolicy,
    factory: Factory<'a>,
}

impl<'a> ConvergenceStep<'a> {
    pub fn new(
        reference: ManagedResourceRef,
        policy: StepPolicy,
        factory: impl Fn() -> Result<ManagedObject> + Send + Sync + 'a,
    ) -> Self {
        Self {
            reference,
            policy,
            factory: Box::new(factory),
        }
    }

    /// Run the step against the store.
    ///
    /// Existing resources are never touched. Errors isolated by the policy are pushed
    /// onto `failures` and the step yields `Continue`.
    pub async fn run<S: ClusterStore>(
        &self,
        store: &S,
        short_requeue: Duration,
        failures: &mut Vec<Error>,
    ) -> ReconcileOutcome {
        let reference = &self.reference;

        match exists(store, reference).await {
            Ok(true) => {
                debug!("{reference} exists");
                return ReconcileOutcome::Continue;
            }
            Ok(false) => info!("{reference} not found, creating"),
            Err(source) => {
                let error = Error::store(StoreAction::Get, reference, source);
                return self.fail(self.policy.on_lookup_error, error, short_requeue, failures);
            }
        }

        let object = match (self.factory)() {
            Ok(object) => object,
            Err(error) => return self.fail(self.policy.on_build_error, error, short_requeue, failures),
        };
        debug_assert_eq!(&object.reference(), reference);

        match object.create_in(store).await {
            Ok(()) => info!("created {reference}"),
            // an earlier pass created it, but reads do not reflect it yet
            Err(kube::Error::Api(response)) if response.reason == "AlreadyExists" => {
                info!("{reference} already exists");
            }
            Err(source) => {
                let error = Error::store(StoreAction::Create, reference, source);
                return self.fail(self.policy.on_create_error, error, short_requeue, failures);
            }
        }

        match self.policy.after_create {
            AfterCreate::Requeue => ReconcileOutcome::RequeueAfter {
                after: short_requeue,
                reason: Progress::Created(reference.clone()),
            },
            AfterCreate::Continue => ReconcileOutcome::Continue,
        }
    }

    fn fail(
        &self,
        policy: OnFailure,
        error: Error,
        short_requeue: Duration,
        failures: &mut Vec<Error>,
    ) -> ReconcileOutcome {
        match policy {
            OnFailure::Requeue => ReconcileOutcome::RequeueWithError(error),
            OnFailure::Retry => {
                warn!("{error}, retrying in {}s", short_requeue.as_secs());
                ReconcileOutcome::RequeueAfter {
                    after: short_requeue,
                    reason: Progress::Blocked(self.reference.clone()),
                }
            }
            OnFailure::Stall => ReconcileOutcome::Stalled(error),
            OnFailure::Isolate => {
                warn!("{error}, continuing with the remaining resources");
                failures.push(error);
                ReconcileOutcome::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, MemoryStore};

    const SHORT: Duration = Duration::from_secs(5);

    fn secret_step(name: &'static str, policy: StepPolicy) -> ConvergenceStep<'static> {
        ConvergenceStep::new(
            ManagedResourceRef::namespaced(ResourceKind::Secret, fixtures::NAMESPACE, name),
            policy,
            move || Ok(ManagedObject::Secret(fixtures::secret(name, &[("key", "value")]))),
        )
    }

    #[tokio::test]
    async fn gate_requeues_after_creating() {
        let store = MemoryStore::default();
        let step = secret_step("gate", StepPolicy::GATE);
        let mut failures = vec![];

        let outcome = step.run(&store, SHORT, &mut failures).await;

        assert!(matches!(
            outcome,
            ReconcileOutcome::RequeueAfter { after: SHORT, reason: Progress::Created(ref r) } if r == &step.reference
        ));
        assert_eq!(store.take_created(), vec![step.reference.clone()]);
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn existing_resources_are_left_alone() {
        let store = MemoryStore::default();
        store.insert(fixtures::secret("gate", &[("contents", "from someone else")]));
        let step = secret_step("gate", StepPolicy::GATE);

        let outcome = step.run(&store, SHORT, &mut vec![]).await;

        assert!(outcome.is_continue());
        assert!(store.take_created().is_empty());
        let secret: Secret = store.object(&step.reference).unwrap();
        assert!(secret.data.unwrap().contains_key("contents"));
    }

    #[tokio::test]
    async fn gate_create_failure_requeues_with_error() {
        let store = MemoryStore::default();
        let step = secret_step("gate", StepPolicy::GATE);
        store.fail_create(step.reference.clone());

        let outcome = step.run(&store, SHORT, &mut vec![]).await;

        assert!(matches!(
            outcome,
            ReconcileOutcome::RequeueWithError(Error::Store { action: StoreAction::Create, .. })
        ));
    }

    #[tokio::test]
    async fn anchor_create_failure_retries_shortly() {
        let store = MemoryStore::default();
        let step = secret_step("anchor", StepPolicy::ANCHOR);
        store.fail_create(step.reference.clone());
        let mut failures = vec![];

        let outcome = step.run(&store, SHORT, &mut failures).await;

        assert!(matches!(
            outcome,
            ReconcileOutcome::RequeueAfter { after: SHORT, reason: Progress::Blocked(ref r) } if r == &step.reference
        ));
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn isolated_failures_are_collected() {
        let store = MemoryStore::default();
        let step = secret_step("sibling", StepPolicy::ISOLATED);
        store.fail_get(step.reference.clone());
        let mut failures = vec![];

        let outcome = step.run(&store, SHORT, &mut failures).await;

        assert!(outcome.is_continue());
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], Error::Store { action: StoreAction::Get, .. }));
    }

    #[tokio::test]
    async fn build_failures_follow_the_policy() {
        let store = MemoryStore::default();
        let reference = ManagedResourceRef::namespaced(ResourceKind::Secret, fixtures::NAMESPACE, "broken");
        let step = ConvergenceStep::new(reference.clone(), StepPolicy::GATE, || {
            Err(Error::IllegalAddon("no inputs".into()))
        });

        let outcome = step.run(&store, SHORT, &mut vec![]).await;

        assert!(matches!(outcome, ReconcileOutcome::Stalled(Error::IllegalAddon(_))));
        assert!(store.take_created().is_empty());
    }

    #[tokio::test]
    async fn stale_reads_do_not_fail_creation() {
        let store = MemoryStore::default().lagging();
        let step = secret_step("gate", StepPolicy::GATE);

        let first = step.run(&store, SHORT, &mut vec![]).await;
        // the created secret is not visible yet, so the step tries again
        let second = step.run(&store, SHORT, &mut vec![]).await;

        assert!(matches!(first, ReconcileOutcome::RequeueAfter { .. }));
        assert!(matches!(second, ReconcileOutcome::RequeueAfter { .. }));
        assert_eq!(store.take_created().len(), 1);
    }
}
