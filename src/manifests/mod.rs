//! Desired shapes of every dependent resource of an addon.
//!
//! Everything in here is a pure function of its inputs: no store access and no
//! randomness, so building the same resource twice yields identical objects.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource as _, ResourceExt as _};

use crate::{config::AddonConfig, resources::Addon, Error, Result};

pub const MANAGED_BY: &str = "starburst-addon-operator";

macro_rules! meta {
    (owners: $owners:expr, $($lhs:ident : $rhs:expr),* $(,)?) => {{
        ::kube::core::ObjectMeta {
            owner_references: $owners,
            $($lhs : $rhs),*,

            ..Default::default()
        }
    }};
}

macro_rules! labels {
    (part_of: $addon:expr) => {{
        ::std::collections::BTreeMap::from_iter([
            ("app.kubernetes.io/managed-by".to_string(), crate::manifests::MANAGED_BY.to_string()),
            ("app.kubernetes.io/part-of".to_string(), $addon.to_string()),
        ])
    }};

    (part_of: $addon:expr, $($lhs:expr => $rhs:expr),* $(,)?) => {{
        ::std::collections::BTreeMap::from_iter([
            ("app.kubernetes.io/managed-by".to_string(), crate::manifests::MANAGED_BY.to_string()),
            ("app.kubernetes.io/part-of".to_string(), $addon.to_string()),
            $(($lhs.to_string(), $rhs.to_string())),*
        ])
    }};
}

macro_rules! selector {
    ($($lhs:expr => $rhs:expr),* $(,)?) => {{
        ::k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector {
            match_labels: Some(::std::collections::BTreeMap::from_iter([
                $(($lhs.to_string(), $rhs.to_string())),*
            ])),
            match_expressions: None,
        }
    }};
}

mod cron_job;
mod license;
mod prometheus;
mod prometheus_rule;
mod service_monitor;

pub use cron_job::cron_job;
pub use license::license_secret;
pub use prometheus::{prometheus, RemoteWrite};
pub use prometheus_rule::prometheus_rule;
pub use service_monitor::{federation_service_monitor, service_monitor};

/// Everything shared by the factories, derived from the watched addon
#[derive(Clone, Debug)]
pub struct ManifestInputs<'a> {
    pub config: &'a AddonConfig,
    pub addon_name: String,
    pub addon_namespace: String,
    pub target_namespace: String,
    owner: OwnerReference,
}

impl<'a> ManifestInputs<'a> {
    pub fn new(config: &'a AddonConfig, addon: &Addon) -> Result<Self> {
        let addon_name = addon.name_any();
        let addon_namespace = addon
            .namespace()
            .ok_or_else(|| Error::IllegalAddon(format!("{addon_name} has no namespace")))?;
        let owner = addon
            .controller_owner_ref(&())
            .ok_or_else(|| Error::IllegalAddon(format!("{addon_name} has no uid")))?;

        Ok(Self {
            config,
            target_namespace: config.namespace_for(&addon_namespace),
            addon_name,
            addon_namespace,
            owner,
        })
    }

    /// Owner references for an object placed in `namespace`.
    ///
    /// Kubernetes garbage collects namespaced dependents whose owner lives in another
    /// namespace, so those are left unowned.
    pub(crate) fn owners_in(&self, namespace: &str) -> Option<Vec<OwnerReference>> {
        (namespace == self.addon_namespace).then(|| vec![self.owner.clone()])
    }
}
