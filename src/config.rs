use std::time::Duration;

use envconfig::Envconfig;

/// Naming and timing for one kind of managed addon.
///
/// Handed to the reconciler at construction so several addon instances, each with
/// their own namespaces, can be driven by the same process.
#[derive(Envconfig, Clone, Debug)]
pub struct AddonConfig {
    /// Name shared by the monitoring stack, its scrape endpoints, rules and job.
    #[envconfig(from = "ADDON_RESOURCE_NAME", default = "starburst")]
    pub resource_name: String,

    /// Namespace for the monitoring resources and the job.
    ///
    /// Falls back to the namespace of the watched addon when unset.
    #[envconfig(from = "ADDON_TARGET_NAMESPACE")]
    pub target_namespace: Option<String>,

    /// User supplied secret holding the addon parameters.
    #[envconfig(from = "ADDON_PARAMETERS_SECRET", default = "addon-managed-starburst-parameters")]
    pub parameters_secret: String,

    /// Key of the licence inside the parameters secret.
    #[envconfig(from = "ADDON_LICENSE_PARAMETER", default = "starburst-license")]
    pub license_parameter: String,

    /// Secret derived from the licence parameter.
    #[envconfig(from = "ADDON_LICENSE_SECRET", default = "starburst-license")]
    pub license_secret: String,

    /// Key of the licence inside the derived secret.
    #[envconfig(from = "ADDON_LICENSE_KEY", default = "starburstdata.license")]
    pub license_key: String,

    /// Pre-existing secret with the remote write credentials.
    #[envconfig(from = "ADDON_INTEGRATION_SECRET", default = "addon")]
    pub integration_secret: String,

    /// Name of the cluster-scoped ClusterVersion carrying the cluster id.
    #[envconfig(from = "ADDON_CLUSTER_VERSION", default = "version")]
    pub cluster_version: String,

    #[envconfig(from = "ADDON_SHORT_REQUEUE_SECS", default = "5")]
    pub short_requeue_secs: u64,

    #[envconfig(from = "ADDON_STEADY_REQUEUE_SECS", default = "60")]
    pub steady_requeue_secs: u64,

    #[envconfig(from = "ADDON_ERROR_REQUEUE_SECS", default = "5")]
    pub error_requeue_secs: u64,

    #[envconfig(from = "ADDON_JOB_IMAGE", default = "cmwylie19/kube-argo-base")]
    pub job_image: String,

    #[envconfig(from = "ADDON_JOB_SCHEDULE", default = "*/1 * * * *")]
    pub job_schedule: String,

    #[envconfig(from = "ADDON_JOB_SERVICE_ACCOUNT", default = "addon-operator-controller-manager")]
    pub job_service_account: String,

    #[envconfig(
        from = "ADDON_PROMETHEUS_SERVICE_ACCOUNT",
        default = "starburst-enterprise-helm-operator-controller-manager"
    )]
    pub prometheus_service_account: String,

    /// Port of the diagnostics web server
    #[envconfig(from = "HTTP_PORT", default = "8080")]
    pub http_port: u16,
}

impl AddonConfig {
    /// Namespace the dependents of an addon in `addon_namespace` are placed in
    pub fn namespace_for(&self, addon_namespace: &str) -> String {
        self.target_namespace
            .clone()
            .unwrap_or_else(|| addon_namespace.to_string())
    }

    pub fn federation_name(&self) -> String {
        format!("{}-federation", self.resource_name)
    }

    /// Delay used to re-observe freshly created or not yet provisioned resources
    pub fn short_requeue(&self) -> Duration {
        Duration::from_secs(self.short_requeue_secs)
    }

    /// Level-triggered resync interval once everything exists
    pub fn steady_requeue(&self) -> Duration {
        Duration::from_secs(self.steady_requeue_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}
