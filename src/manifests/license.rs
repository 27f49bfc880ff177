use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Secret, ByteString};

use super::ManifestInputs;

/// The licence secret, derived from the user supplied parameters.
///
/// Always placed in the addon namespace, next to the parameters it is read from.
pub fn license_secret(inputs: &ManifestInputs<'_>, license: &str) -> Secret {
    let config = inputs.config;
    let namespace = &inputs.addon_namespace;

    Secret {
        metadata: meta! {
            owners: inputs.owners_in(namespace),
            name: Some(config.license_secret.clone()),
            namespace: Some(namespace.clone()),
            labels: Some(labels! { part_of: inputs.addon_name })
        },
        data: Some(BTreeMap::from([(
            config.license_key.clone(),
            ByteString(license.as_bytes().to_vec()),
        )])),

        ..Default::default()
    }
}
