use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Patch, PatchParams},
    runtime::{
        controller::Action,
        events::{Event, EventType},
    },
    Api, ResourceExt as _,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use super::{
    convergence::{ConvergenceStep, ManagedObject, Progress, ReconcileOutcome, StepPolicy},
    AddonRequest, Context, Reconcile,
};
use crate::{
    config::AddonConfig,
    manifests::{self, ManifestInputs, RemoteWrite},
    resources::{Addon, AddonPhase, AddonStatus, ClusterVersion},
    store::{ClusterStore, ManagedResourceRef, ResourceKind, StoreAction, FIELD_MANAGER},
    Error, Result,
};

/// Drives the dependents of an addon towards their desired state.
///
/// Holds no state of its own beyond its configuration, so one instance can serve
/// any number of addons concurrently. Every pass starts from fresh store reads.
pub struct Reconciler<S> {
    store: S,
    config: AddonConfig,
}

impl<S: ClusterStore> Reconciler<S> {
    pub fn new(store: S, config: AddonConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AddonConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one convergence pass for the addon identified by `request`
    #[instrument(skip(self, request), fields(addon = %request))]
    pub async fn reconcile(&self, request: &AddonRequest) -> ReconcileOutcome {
        let config = &self.config;

        // The addon itself gone means there is nothing left to do
        let addon_ref = request.reference();
        let addon = match self.store.get::<Addon>(&addon_ref).await {
            Ok(Some(addon)) => addon,
            Ok(None) => {
                info!("{addon_ref} not found, probably deleted");
                return ReconcileOutcome::Done;
            }
            Err(source) => {
                return ReconcileOutcome::RequeueWithError(Error::store(StoreAction::Get, &addon_ref, source))
            }
        };

        let version_ref = ManagedResourceRef::cluster(ResourceKind::ClusterVersion, &config.cluster_version);
        let version = match self.store.get::<ClusterVersion>(&version_ref).await {
            Ok(Some(version)) => version,
            Ok(None) => {
                info!("{version_ref} not found");
                return ReconcileOutcome::Done;
            }
            Err(source) => {
                return ReconcileOutcome::RequeueWithError(Error::store(StoreAction::Get, &version_ref, source))
            }
        };

        // Parameters are provisioned by someone else, possibly after the addon
        let parameters_ref =
            ManagedResourceRef::namespaced(ResourceKind::Secret, &request.namespace, &config.parameters_secret);
        let parameters = match self.store.get::<Secret>(&parameters_ref).await {
            Ok(Some(parameters)) => parameters,
            Ok(None) => {
                info!("{parameters_ref} not found, waiting for it to be provisioned");
                return self.awaiting_parameters();
            }
            Err(source) => {
                let error = Error::store(StoreAction::Get, &parameters_ref, source);
                warn!("{error}");
                return self.awaiting_parameters();
            }
        };

        let inputs = match ManifestInputs::new(config, &addon) {
            Ok(inputs) => inputs,
            Err(error) => return ReconcileOutcome::Stalled(error),
        };

        let mut failures = Vec::new();

        let license = self.license_step(&inputs, &parameters, &parameters_ref);
        let outcome = license.run(&self.store, config.short_requeue(), &mut failures).await;
        if !outcome.is_continue() {
            return outcome;
        }

        // Never created here: without it the remote write cannot be configured
        let integration_ref =
            ManagedResourceRef::namespaced(ResourceKind::Secret, &request.namespace, &config.integration_secret);
        let remote_write = match self.store.get::<Secret>(&integration_ref).await {
            Ok(Some(secret)) => match remote_write_from(&secret, &integration_ref) {
                Ok(remote_write) => remote_write,
                Err(error) => return ReconcileOutcome::Stalled(error),
            },
            Ok(None) => {
                return ReconcileOutcome::Stalled(Error::misconfigured(&integration_ref, "secret not found"))
            }
            Err(source) => {
                return ReconcileOutcome::RequeueWithError(Error::store(
                    StoreAction::Get,
                    &integration_ref,
                    source,
                ))
            }
        };

        let cluster_id = version.spec.cluster_id.as_str();
        if cluster_id.is_empty() {
            return ReconcileOutcome::Stalled(Error::misconfigured(&version_ref, "spec.clusterID is empty"));
        }

        for step in self.monitoring_steps(&inputs, &remote_write, cluster_id) {
            let outcome = step.run(&self.store, config.short_requeue(), &mut failures).await;
            if !outcome.is_continue() {
                return outcome;
            }
        }

        if failures.is_empty() {
            ReconcileOutcome::RequeueAfter {
                after: config.steady_requeue(),
                reason: Progress::Converged,
            }
        } else {
            ReconcileOutcome::RequeueWithError(Error::PartialFailure(failures))
        }
    }

    fn awaiting_parameters(&self) -> ReconcileOutcome {
        ReconcileOutcome::RequeueAfter {
            after: self.config.short_requeue(),
            reason: Progress::AwaitingParameters,
        }
    }

    /// The licence secret, built from the parameters
    fn license_step<'a>(
        &'a self,
        inputs: &'a ManifestInputs<'a>,
        parameters: &'a Secret,
        parameters_ref: &'a ManagedResourceRef,
    ) -> ConvergenceStep<'a> {
        let config = &self.config;
        let reference =
            ManagedResourceRef::namespaced(ResourceKind::Secret, &inputs.addon_namespace, &config.license_secret);

        ConvergenceStep::new(reference, StepPolicy::GATE, move || {
            let license = secret_value(parameters, parameters_ref, &config.license_parameter)?;
            Ok(ManagedObject::Secret(manifests::license_secret(inputs, &license)))
        })
    }

    /// The monitoring stack followed by everything depending on it, in creation order
    fn monitoring_steps<'a>(
        &'a self,
        inputs: &'a ManifestInputs<'a>,
        remote_write: &'a RemoteWrite,
        cluster_id: &'a str,
    ) -> Vec<ConvergenceStep<'a>> {
        let config = &self.config;
        let namespace = &inputs.target_namespace;
        let reference = |kind, name: &str| ManagedResourceRef::namespaced(kind, namespace, name);

        vec![
            ConvergenceStep::new(
                reference(ResourceKind::Prometheus, &config.resource_name),
                StepPolicy::ANCHOR,
                move || {
                    Ok(ManagedObject::Prometheus(manifests::prometheus(
                        inputs,
                        remote_write,
                        cluster_id,
                    )))
                },
            ),
            ConvergenceStep::new(
                reference(ResourceKind::ServiceMonitor, &config.resource_name),
                StepPolicy::ISOLATED,
                move || Ok(ManagedObject::ServiceMonitor(manifests::service_monitor(inputs))),
            ),
            ConvergenceStep::new(
                reference(ResourceKind::ServiceMonitor, &config.federation_name()),
                StepPolicy::ISOLATED,
                move || {
                    Ok(ManagedObject::ServiceMonitor(manifests::federation_service_monitor(
                        inputs,
                    )))
                },
            ),
            ConvergenceStep::new(
                reference(ResourceKind::PrometheusRule, &config.resource_name),
                StepPolicy::ISOLATED,
                move || Ok(ManagedObject::PrometheusRule(manifests::prometheus_rule(inputs))),
            ),
            ConvergenceStep::new(
                reference(ResourceKind::CronJob, &config.resource_name),
                StepPolicy::ISOLATED,
                move || Ok(ManagedObject::CronJob(manifests::cron_job(inputs))),
            ),
        ]
    }
}

/// Read a UTF-8 value from a secret's data
fn secret_value(secret: &Secret, reference: &ManagedResourceRef, key: &str) -> Result<String> {
    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| Error::misconfigured(reference, format!("missing key {key:?}")))?;

    String::from_utf8(value.0.clone())
        .map_err(|_| Error::misconfigured(reference, format!("key {key:?} is not valid UTF-8")))
}

fn remote_write_from(secret: &Secret, reference: &ManagedResourceRef) -> Result<RemoteWrite> {
    Ok(RemoteWrite {
        url: secret_value(secret, reference, "remote-write-url")?,
        token_url: secret_value(secret, reference, "token-url")?,
    })
}

/// The status to record on the addon for an outcome, if any
pub(crate) fn status_for(outcome: &ReconcileOutcome) -> Option<(AddonPhase, String)> {
    let status = match outcome {
        ReconcileOutcome::Continue | ReconcileOutcome::Done => return None,
        ReconcileOutcome::RequeueAfter {
            reason: Progress::Converged,
            ..
        } => (AddonPhase::Ready, "all dependent resources exist".to_string()),
        ReconcileOutcome::RequeueAfter {
            reason: Progress::Created(reference),
            ..
        } => (AddonPhase::Progressing, format!("created {reference}")),
        ReconcileOutcome::RequeueAfter {
            reason: Progress::AwaitingParameters,
            ..
        } => (AddonPhase::Progressing, "waiting for the addon parameters".to_string()),
        ReconcileOutcome::RequeueAfter {
            reason: Progress::Blocked(reference),
            ..
        } => (AddonPhase::Degraded, format!("could not create {reference}, retrying")),
        ReconcileOutcome::RequeueWithError(error) => (AddonPhase::Degraded, error.to_string()),
        ReconcileOutcome::Stalled(error) => (AddonPhase::Misconfigured, error.to_string()),
    };

    Some(status)
}

#[async_trait]
impl Reconcile for Addon {
    type Context = Context;

    async fn reconcile(&self, context: Arc<Self::Context>) -> Result<Action, Error> {
        let name = self.name_any();
        let namespace = self
            .namespace()
            .ok_or_else(|| Error::IllegalAddon(format!("{name} has no namespace")))?;

        let reconciler = &context.reconciler;
        let config = reconciler.config();
        let outcome = reconciler.reconcile(&AddonRequest::new(&namespace, &name)).await;
        context.metrics.reconcile_outcome(&outcome);

        if let Some((phase, message)) = status_for(&outcome) {
            // The status only mirrors the outcome, failing to write it changes nothing
            if let Err(e) = self.patch_status(context.clone(), phase, message).await {
                warn!("could not update status of {namespace}/{name}: {e}");
            }
        }

        match outcome {
            ReconcileOutcome::RequeueAfter { after, .. } => Ok(Action::requeue(after)),
            ReconcileOutcome::Continue | ReconcileOutcome::Done => Ok(Action::requeue(config.steady_requeue())),
            ReconcileOutcome::RequeueWithError(error) => Err(error),
            ReconcileOutcome::Stalled(error) => {
                error!("reconcile stalled: {error}");
                context.metrics.reconcile_failure(self, &error);
                let recorder = context
                    .diagnostics
                    .read()
                    .await
                    .recorder(context.client.clone(), self);
                let event = Event {
                    type_: EventType::Warning,
                    reason: "Misconfigured".into(),
                    note: Some(error.to_string()),
                    action: "Reconciling".into(),
                    secondary: None,
                };
                if let Err(e) = recorder.publish(event).await {
                    warn!("could not publish event for {namespace}/{name}: {e}");
                }

                // Inputs we do not watch may get fixed, only the steady timer notices
                Ok(Action::requeue(config.steady_requeue()))
            }
        }
    }
}

impl Addon {
    async fn patch_status(&self, context: Arc<Context>, phase: AddonPhase, message: String) -> Result<()> {
        let namespace = self.namespace().unwrap_or_default();
        let status = AddonStatus {
            phase,
            message: Some(message),
            observed_generation: self.metadata.generation,
        };
        if self.status.as_ref() == Some(&status) {
            return Ok(());
        }

        let new_status = Patch::Apply(json!({
            "apiVersion": "addon.redhat.com/v1alpha1",
            "kind": "Addon",
            "status": status,
        }));
        let ps = PatchParams::apply(FIELD_MANAGER).force();
        Api::<Addon>::namespaced(context.client.clone(), &namespace)
            .patch_status(&self.name_any(), &ps, &new_status)
            .await
            .map_err(Error::KubeError)?;

        Ok(())
    }
}
