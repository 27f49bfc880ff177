use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The OpenShift cluster version singleton.
///
/// Only the fields read by the operator are modelled.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(kind = "ClusterVersion", group = "config.openshift.io", version = "v1")]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionSpec {
    /// Unique identifier of the cluster, stamped onto exported metrics.
    #[serde(rename = "clusterID", default)]
    pub cluster_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}
