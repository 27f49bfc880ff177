use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a managed Starburst addon instance
///
/// The addon itself carries no configuration: everything it needs is read from
/// the parameters and integration secrets living next to it. Deleting the addon
/// cascades to every dependent resource created on its behalf.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "Addon",
    group = "addon.redhat.com",
    version = "v1alpha1",
    status = "AddonStatus",
    doc = "A managed Starburst addon instance",
    namespaced,
    printcolumn = r#"{ "name": "phase", "type": "string", "description": "last reconcile outcome", "jsonPath": ".status.phase" }"#,
    printcolumn = r#"{ "name": "message", "type": "string", "description": "details on the outcome", "jsonPath": ".status.message" }"#
)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {}

/// The status of an addon, as last observed by the operator.
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonStatus {
    /// The outcome of the last reconciliation
    pub phase: AddonPhase,

    /// Human readable details about the outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The generation of the addon that was reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// The possible phases of an `Addon`
#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, JsonSchema, PartialEq, Eq)]
pub enum AddonPhase {
    /// Dependent resources are still being created.
    #[default]
    Progressing,

    /// Every dependent resource exists.
    Ready,

    /// A store operation failed and is being retried.
    Degraded,

    /// An externally provided resource is missing or malformed.
    Misconfigured,
}
