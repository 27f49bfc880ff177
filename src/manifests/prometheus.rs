use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{ResourceRequirements, SecretKeySelector},
    apimachinery::pkg::api::resource::Quantity,
};

use super::ManifestInputs;
use crate::resources::{
    OAuth2, Prometheus, PrometheusSpec, RelabelConfig, RemoteWriteSpec, SecretOrConfigMap, TlsConfig,
};

/// Series forwarded to the remote write endpoint, everything else stays local
const FORWARDED_SERIES: &str = "csv_succeeded$|csv_abnormal$|cluster_version$|ALERTS$|subscription_sync_total|trino_.*$|jvm_heap_memory_used$|node_.*$|namespace_.*$|kube_.*$|cluster.*$|container_.*$";

/// Remote write endpoints read from the integration secret
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteWrite {
    pub url: String,
    pub token_url: String,
}

/// The Prometheus instance scraping the addon and forwarding to remote write
pub fn prometheus(inputs: &ManifestInputs<'_>, remote_write: &RemoteWrite, cluster_id: &str) -> Prometheus {
    let config = inputs.config;
    let namespace = &inputs.target_namespace;
    let credential = |key: &str| SecretKeySelector {
        name: Some(config.integration_secret.clone()),
        key: key.into(),
        optional: None,
    };

    let mut prom = Prometheus::new(
        &config.resource_name,
        PrometheusSpec {
            rule_selector: Some(selector! { "app" => config.resource_name }),
            external_labels: BTreeMap::from([("cluster_id".into(), cluster_id.into())]),
            log_level: Some("debug".into()),
            remote_write: vec![RemoteWriteSpec {
                url: remote_write.url.clone(),
                write_relabel_configs: vec![RelabelConfig {
                    action: Some("keep".into()),
                    regex: Some(FORWARDED_SERIES.into()),
                }],
                tls_config: Some(TlsConfig {
                    insecure_skip_verify: Some(true),
                    ..Default::default()
                }),
                oauth2: Some(OAuth2 {
                    client_id: SecretOrConfigMap {
                        secret: Some(credential("client-id")),
                        config_map: None,
                    },
                    client_secret: credential("client-secret"),
                    token_url: remote_write.token_url.clone(),
                }),
            }],
            service_monitor_namespace_selector: Some(
                selector! { "kubernetes.io/metadata.name" => namespace },
            ),
            service_monitor_selector: Some(Default::default()),
            pod_monitor_selector: Some(Default::default()),
            service_account_name: Some(config.prometheus_service_account.clone()),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([("memory".into(), Quantity("400Mi".into()))])),
                ..Default::default()
            }),
        },
    );
    prom.metadata = meta! {
        owners: inputs.owners_in(namespace),
        name: Some(config.resource_name.clone()),
        namespace: Some(namespace.clone()),
        labels: Some(labels! { part_of: inputs.addon_name })
    };

    prom
}
