use std::collections::BTreeMap;

use indoc::indoc;

use super::ManifestInputs;
use crate::resources::{PrometheusRule, PrometheusRuleSpec, Rule, RuleGroup};

/// (alert, expression, for, summary, severity, description)
type Alert = (&'static str, &'static str, &'static str, &'static str, &'static str, &'static str);

const ALERTS: &[Alert] = &[
    (
        "high_starburst_query_mem",
        "starburst_query_mem >= 45158388108",
        "5m",
        "High Query Memory",
        "page",
        "High average memory used by all queries over a given time period",
    ),
    (
        "high_starburst_heap_mem",
        "starburst_heap_mem >= 45631505600",
        "5m",
        "High Max Heap Memory",
        "warn",
        "The max amount of heap memory configured in the JVM aggregated across the entire cluster",
    ),
    (
        "high_starburst_max_query_mem",
        "starburst_max_query_mem >= 94489280512",
        "5m",
        "High Heap Memory",
        "warn",
        "High amount of heap memory used by the JVMs across all cluster nodes",
    ),
    (
        "trino_node_failure",
        "trino_active_nodes <= 1",
        "5m",
        "Trino node failure",
        "page",
        "An active trino node went down",
    ),
    (
        "high_starburst_max_heap_mem",
        "starburst_max_heap_mem >= 94489280512",
        "5m",
        "High Max Heap Memory Alert",
        "acknowledged",
        "The max amount of heap memory configured in the JVM aggregated across the entire cluster",
    ),
    (
        "starburst_instance_down",
        r#"count(up{endpoint="metrics"}) != 3"#,
        "5m",
        "Starburst instance down",
        "page",
        "The pods churned",
    ),
    (
        "high_thread_count",
        "sum(thread_count) > 400",
        "5m",
        "High Thread Count",
        "page",
        "High Thread Count",
    ),
    (
        "JvmMemoryFillingUp",
        r#"(sum by (instance)(jvm_memory_bytes_used{area="heap"}) / sum by (instance)(jvm_memory_bytes_max{area="heap"})) * 100 > 80"#,
        "2m",
        "JVM memory filling up (instance {{ $labels.instance }})",
        "page",
        indoc! {"
            JVM memory is filling up (> 80%)
              VALUE = {{ $value }}
              LABELS = {{ $labels }}"},
    ),
    (
        "starburst_failed_queries",
        "failed_queries >= 4",
        "5m",
        "Queries are failing",
        "page",
        "In the last 5 mins the failed queries have risen",
    ),
];

const RECORDS: &[(&str, &str)] = &[
    ("starburst_query_mem", r#"avg_over_time(jvm_memory_bytes_used{endpoint="metrics"}[5m])"#),
    ("starburst_max_query_mem", r#"jvm_memory_bytes_max{endpoint="metrics", area="heap"}"#),
    ("starburst_heap_mem", r#"jvm_memory_bytes_used{endpoint="metrics",area="heap"}"#),
    ("starburst_max_heap_mem", r#"jvm_memory_bytes_max{endpoint="metrics",area="heap"}"#),
];

/// Alerting and recording rules for the addon, labelled for the Prometheus rule selector
pub fn prometheus_rule(inputs: &ManifestInputs<'_>) -> PrometheusRule {
    let config = inputs.config;
    let namespace = &inputs.target_namespace;

    let alerts = ALERTS
        .iter()
        .map(|(alert, expr, for_, summary, severity, description)| Rule {
            alert: Some(alert.to_string()),
            expr: expr.to_string(),
            for_: Some(for_.to_string()),
            annotations: BTreeMap::from([
                ("summary".into(), summary.to_string()),
                ("severity".into(), severity.to_string()),
                ("description".into(), description.to_string()),
            ]),
            ..Default::default()
        })
        .collect();
    let records = RECORDS
        .iter()
        .map(|(record, expr)| Rule {
            record: Some(record.to_string()),
            expr: expr.to_string(),
            ..Default::default()
        })
        .collect();

    let mut rule = PrometheusRule::new(
        &config.resource_name,
        PrometheusRuleSpec {
            groups: vec![
                RuleGroup {
                    name: "starburst_alert_rules".into(),
                    rules: alerts,
                },
                RuleGroup {
                    name: "starburst_custom_rules".into(),
                    rules: records,
                },
            ],
        },
    );
    rule.metadata = meta! {
        owners: inputs.owners_in(namespace),
        name: Some(config.resource_name.clone()),
        namespace: Some(namespace.clone()),
        labels: Some(labels! { part_of: inputs.addon_name, "app" => config.resource_name })
    };

    rule
}
