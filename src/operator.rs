use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::{batch::v1::CronJob, core::v1::Secret};
use kube::{
    api::ListParams,
    runtime::{
        controller::Action,
        events::{Recorder, Reporter},
        watcher::Config,
        Controller,
    },
    Api, Client, Resource,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, field, info, instrument, Span};

use crate::{
    config::AddonConfig,
    manifests::MANAGED_BY,
    reconcilers::{Context, Reconcile, Reconciler},
    resources::{Addon, Prometheus, PrometheusRule, ServiceMonitor},
    store::KubeStore,
    telemetry, Error, Metrics, Result,
};

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: MANAGED_BY.into(),
        }
    }
}
impl Diagnostics {
    pub fn recorder(&self, client: Client, addon: &Addon) -> Recorder {
        Recorder::new(client, self.reporter.clone(), addon.object_ref(&()))
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub(crate) fn to_context(&self, client: Client, config: AddonConfig) -> Result<Arc<Context>> {
        Ok(Arc::new(Context {
            reconciler: Reconciler::new(KubeStore::new(client.clone()), config),
            client,
            metrics: Metrics::new()?.register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
        }))
    }
}

pub struct AddonController {
    state: State,
}

impl AddonController {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    /// Initialize the controller and shared state (given the crd is installed)
    pub async fn run(self, config: AddonConfig) -> Result<(), anyhow::Error> {
        // Error handler for failed reconciliations
        fn error_policy(addon: Arc<Addon>, error: &Error, ctx: Arc<Context>) -> Action {
            error!("reconcile failed: {error}");
            ctx.metrics.reconcile_failure(&addon, error);
            Action::requeue(ctx.reconciler.config().error_requeue())
        }

        // Get a k8s client for communicating with the cluster
        let client = Client::try_default().await?;
        let addons = Api::<Addon>::all(client.clone());

        // Test that we can actually query for our CRD (a.k.a. it is installed)
        if let Err(e) = addons.list(&ListParams::default().limit(1)).await {
            info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            anyhow::bail!("CRD is not queryable; {e}. Is the CRD installed?");
        }

        // Only dependents we created are watched, creation is what triggers the next pass
        let watching_config = Config::default().any_semantic();
        let owned = watching_config
            .clone()
            .labels(&format!("app.kubernetes.io/managed-by={MANAGED_BY}"));

        Controller::new(addons, watching_config)
            .owns(Api::<Secret>::all(client.clone()), owned.clone())
            .owns(Api::<Prometheus>::all(client.clone()), owned.clone())
            .owns(Api::<ServiceMonitor>::all(client.clone()), owned.clone())
            .owns(Api::<PrometheusRule>::all(client.clone()), owned.clone())
            .owns(Api::<CronJob>::all(client.clone()), owned)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.state.to_context(client, config)?)
            .filter_map(|x| async move { Result::ok(x) })
            .for_each(|_| futures::future::ready(()))
            .await;

        Ok(())
    }
}

/// Controller entrypoint for a single addon
#[instrument(skip(ctx, addon), fields(trace_id))]
async fn reconcile(addon: Arc<Addon>, ctx: Arc<Context>) -> Result<Action> {
    // Add some tracing for debugging's sake
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", &field::display(&trace_id));

    // Take some metrics to see the average reconcile time
    let _timer = ctx.metrics.count_and_measure();
    ctx.diagnostics.write().await.last_event = Utc::now();

    addon.reconcile(ctx.clone()).await
}
