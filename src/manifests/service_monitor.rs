use std::collections::BTreeMap;

use super::ManifestInputs;
use crate::resources::{Endpoint, NamespaceSelector, ServiceMonitor, ServiceMonitorSpec, TlsConfig};

/// Series pulled from the cluster monitoring stack, restricted to the addon namespace
const FEDERATED_SERIES: &[&str] = &[
    "container_memory_working_set_bytes",
    "node_namespace_pod_container:container_cpu_usage_seconds_total:sum_irate",
    "namespace_workload_pod:kube_pod_owner:relabel",
    "kube_pod_container_info",
    "kube_pod_status_ready",
    "kube_pod_container_status_last_terminated_reason",
    "kube_pod_container_status_waiting",
    "kube_namespace_status_phase",
    "node_namespace_pod:kube_pod_info:",
    "kube_service_info",
    "cluster:namespace:pod_memory:active:kube_pod_container_resource_limits",
    "container_cpu_cfs_throttled_seconds_total",
    "container_fs_usage_bytes",
    "container_network_receive_bytes_total",
    "container_network_transmit_bytes_total",
    "kube_deployment_status_replicas_available",
    "container_memory_usage_bytes",
    "kube_pod_container_resource_requests",
    "kube_deployment_status_replicas_unavailable",
    "kube_persistentvolumeclaim_status_phase",
    "kube_pod_container_resource_limits",
    "cluster:namespace:pod_cpu:active:kube_pod_container_resource_limits",
    "container_network_receive_packets_total",
    "container_network_transmit_packets_total",
    "kube_running_pod_ready",
    "container_cpu_usage_seconds_total",
    "kube_pod_container_status_restarts_total",
    "kube_pod_status_phase",
    "cluster:namespace:pod_memory:active:kube_pod_container_resource_requests",
];

/// Cluster wide series, federated as is
const CLUSTER_SERIES: &[&str] = &["kube_node_status_capacity"];

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Scrapes the metrics port of the starburst workloads
pub fn service_monitor(inputs: &ManifestInputs<'_>) -> ServiceMonitor {
    let config = inputs.config;
    let namespace = &inputs.target_namespace;

    let mut monitor = ServiceMonitor::new(
        &config.resource_name,
        ServiceMonitorSpec {
            job_label: None,
            namespace_selector: NamespaceSelector {
                any: None,
                match_names: vec![namespace.clone()],
            },
            selector: selector! { "app" => "starburst-enterprise" },
            endpoints: vec![Endpoint {
                port: Some("metrics".into()),
                interval: Some("2s".into()),
                ..Default::default()
            }],
        },
    );
    monitor.metadata = meta! {
        owners: inputs.owners_in(namespace),
        name: Some(config.resource_name.clone()),
        namespace: Some(namespace.clone()),
        labels: Some(labels! { part_of: inputs.addon_name })
    };

    monitor
}

/// Federates the cluster monitoring series concerning the addon namespace
pub fn federation_service_monitor(inputs: &ManifestInputs<'_>) -> ServiceMonitor {
    let config = inputs.config;
    let namespace = &inputs.target_namespace;
    let name = config.federation_name();

    let matches = FEDERATED_SERIES
        .iter()
        .map(|series| format!(r#"{series}{{namespace="{namespace}"}}"#))
        .chain(CLUSTER_SERIES.iter().map(|series| series.to_string()))
        .collect();

    let mut monitor = ServiceMonitor::new(
        &name,
        ServiceMonitorSpec {
            job_label: Some("openshift-monitoring-federation".into()),
            namespace_selector: NamespaceSelector {
                any: None,
                match_names: vec!["openshift-monitoring".into()],
            },
            selector: selector! { "app.kubernetes.io/instance" => "k8s" },
            endpoints: vec![Endpoint {
                port: Some("web".into()),
                path: Some("/federate".into()),
                scheme: Some("https".into()),
                interval: Some("30s".into()),
                bearer_token_file: Some(format!("{SERVICE_ACCOUNT_DIR}/token")),
                params: BTreeMap::from([("match[]".into(), matches)]),
                tls_config: Some(TlsConfig {
                    insecure_skip_verify: Some(true),
                    server_name: Some("prometheus-k8s.openshift-monitoring.svc.cluster.local".into()),
                    ca_file: Some(format!("{SERVICE_ACCOUNT_DIR}/service-ca.crt")),
                }),
            }],
        },
    );
    monitor.metadata = meta! {
        owners: inputs.owners_in(namespace),
        name: Some(name),
        namespace: Some(namespace.clone()),
        labels: Some(labels! { part_of: inputs.addon_name })
    };

    monitor
}
