use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::{batch::v1::CronJob, core::v1::Secret};
use kube::{api::PostParams, core::ObjectMeta, Api, Client, Resource, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};

use crate::resources::{Addon, ClusterVersion, Prometheus, PrometheusRule, ServiceMonitor};

/// Field manager recorded on every object the operator creates
pub const FIELD_MANAGER: &str = "starburst-addon-operator";

/// The kinds of objects read or written while reconciling an addon
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Addon,
    ClusterVersion,
    Secret,
    Prometheus,
    ServiceMonitor,
    PrometheusRule,
    CronJob,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ResourceKind::Addon => "Addon",
            ResourceKind::ClusterVersion => "ClusterVersion",
            ResourceKind::Secret => "Secret",
            ResourceKind::Prometheus => "Prometheus",
            ResourceKind::ServiceMonitor => "ServiceMonitor",
            ResourceKind::PrometheusRule => "PrometheusRule",
            ResourceKind::CronJob => "CronJob",
        };
        f.write_str(kind)
    }
}

/// Identifies a single object in the cluster.
///
/// Cluster-scoped objects carry no namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagedResourceRef {
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: String,
}

impl ManagedResourceRef {
    pub fn namespaced(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    /// Reference to an already built object
    pub fn of<K: StoreResource>(object: &K) -> Self {
        Self {
            kind: K::KIND,
            namespace: object.namespace(),
            name: object.name_any(),
        }
    }
}

impl fmt::Display for ManagedResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, r#"{} "{namespace}/{}""#, self.kind, self.name),
            None => write!(f, r#"{} "{}""#, self.kind, self.name),
        }
    }
}

/// The store operation that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreAction {
    Get,
    Create,
}

impl fmt::Display for StoreAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreAction::Get => "get",
            StoreAction::Create => "create",
        })
    }
}

/// A typed object that can be fetched from or persisted to a [`ClusterStore`]
pub trait StoreResource:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: ResourceKind;

    /// Handle to the objects of this kind, scoped to a namespace where applicable
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;
}

macro_rules! namespaced_resources {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl StoreResource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;

            fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
                match namespace {
                    Some(namespace) => Api::namespaced(client, namespace),
                    None => Api::default_namespaced(client),
                }
            }
        }
    )*};
}

namespaced_resources! {
    Addon => Addon,
    Secret => Secret,
    Prometheus => Prometheus,
    ServiceMonitor => ServiceMonitor,
    PrometheusRule => PrometheusRule,
    CronJob => CronJob,
}

impl StoreResource for ClusterVersion {
    const KIND: ResourceKind = ResourceKind::ClusterVersion;

    fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }
}

/// The only I/O boundary of the reconciler.
///
/// A successful `create` is not guaranteed to be visible to an immediately
/// following `get`. Objects are never updated.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch an object, mapping its absence to `None`
    async fn get<K: StoreResource>(&self, reference: &ManagedResourceRef) -> kube::Result<Option<K>>;

    /// Fetch only the metadata of an object, so its contents may take any shape
    async fn get_metadata<K: StoreResource>(
        &self,
        reference: &ManagedResourceRef,
    ) -> kube::Result<Option<ObjectMeta>>;

    /// Persist a new object
    async fn create<K: StoreResource>(&self, object: &K) -> kube::Result<()>;
}

/// [`ClusterStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get<K: StoreResource>(&self, reference: &ManagedResourceRef) -> kube::Result<Option<K>> {
        debug_assert_eq!(reference.kind, K::KIND);

        K::api(self.client.clone(), reference.namespace.as_deref())
            .get_opt(&reference.name)
            .await
    }

    async fn get_metadata<K: StoreResource>(
        &self,
        reference: &ManagedResourceRef,
    ) -> kube::Result<Option<ObjectMeta>> {
        debug_assert_eq!(reference.kind, K::KIND);

        let partial = K::api(self.client.clone(), reference.namespace.as_deref())
            .get_metadata_opt(&reference.name)
            .await?;

        Ok(partial.map(|partial| partial.metadata))
    }

    async fn create<K: StoreResource>(&self, object: &K) -> kube::Result<()> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.into()),
            ..Default::default()
        };

        K::api(self.client.clone(), object.meta().namespace.as_deref())
            .create(&params, object)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::ByteString;
    use serde_json::json;

    use super::*;
    use crate::fixtures::{timeout_after_1s, ApiServerVerifier};

    #[test]
    fn references_display_their_scope() {
        let secret = ManagedResourceRef::namespaced(ResourceKind::Secret, "tenant-a", "addon");
        let version = ManagedResourceRef::cluster(ResourceKind::ClusterVersion, "version");

        assert_eq!(secret.to_string(), r#"Secret "tenant-a/addon""#);
        assert_eq!(version.to_string(), r#"ClusterVersion "version""#);
    }

    #[tokio::test]
    async fn missing_objects_are_none() {
        let (client, verifier) = ApiServerVerifier::pair();
        let server = tokio::spawn(async move {
            verifier
                .expect_get(
                    "/api/v1/namespaces/tenant-a/secrets/addon",
                    ApiServerVerifier::not_found("secrets", "addon"),
                )
                .await
        });

        let store = KubeStore::new(client);
        let reference = ManagedResourceRef::namespaced(ResourceKind::Secret, "tenant-a", "addon");
        let secret = store.get::<Secret>(&reference).await.unwrap();

        assert!(secret.is_none());
        timeout_after_1s(server).await;
    }

    #[tokio::test]
    async fn cluster_scoped_objects_are_fetched_without_namespace() {
        let (client, verifier) = ApiServerVerifier::pair();
        let server = tokio::spawn(async move {
            verifier
                .expect_get(
                    "/apis/config.openshift.io/v1/clusterversions/version",
                    ApiServerVerifier::ok(json!({
                        "apiVersion": "config.openshift.io/v1",
                        "kind": "ClusterVersion",
                        "metadata": { "name": "version" },
                        "spec": { "clusterID": "0f00ba47-0000-4000-8000-000000000000" }
                    })),
                )
                .await
        });

        let store = KubeStore::new(client);
        let reference = ManagedResourceRef::cluster(ResourceKind::ClusterVersion, "version");
        let version = store.get::<ClusterVersion>(&reference).await.unwrap().unwrap();

        assert_eq!(version.spec.cluster_id, "0f00ba47-0000-4000-8000-000000000000");
        timeout_after_1s(server).await;
    }

    #[tokio::test]
    async fn metadata_lookups_ignore_the_object_contents() {
        let (client, verifier) = ApiServerVerifier::pair();
        let server = tokio::spawn(async move {
            verifier
                .expect_get(
                    "/apis/monitoring.coreos.com/v1/namespaces/tenant-a/prometheusrules/starburst",
                    ApiServerVerifier::ok(json!({
                        "apiVersion": "meta.k8s.io/v1",
                        "kind": "PartialObjectMetadata",
                        "metadata": { "name": "starburst", "namespace": "tenant-a" }
                    })),
                )
                .await
        });

        let store = KubeStore::new(client);
        let reference = ManagedResourceRef::namespaced(ResourceKind::PrometheusRule, "tenant-a", "starburst");
        let meta = store
            .get_metadata::<PrometheusRule>(&reference)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(meta.name.as_deref(), Some("starburst"));
        timeout_after_1s(server).await;
    }

    #[tokio::test]
    async fn create_posts_with_field_manager() {
        let secret = Secret {
            metadata: kube::core::ObjectMeta {
                name: Some("starburst-license".into()),
                namespace: Some("tenant-a".into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "starburstdata.license".to_string(),
                ByteString(b"ABC123".to_vec()),
            )])),
            ..Default::default()
        };

        let (client, verifier) = ApiServerVerifier::pair();
        let echoed = serde_json::to_value(&secret).unwrap();
        let server = tokio::spawn(async move {
            verifier
                .expect_create("/api/v1/namespaces/tenant-a/secrets", FIELD_MANAGER, echoed)
                .await
        });

        KubeStore::new(client).create(&secret).await.unwrap();
        timeout_after_1s(server).await;
    }

    #[tokio::test]
    async fn server_errors_are_returned() {
        let (client, verifier) = ApiServerVerifier::pair();
        let server = tokio::spawn(async move {
            verifier
                .expect_get(
                    "/apis/monitoring.coreos.com/v1/namespaces/tenant-a/prometheuses/starburst",
                    ApiServerVerifier::unavailable(),
                )
                .await
        });

        let store = KubeStore::new(client);
        let reference = ManagedResourceRef::namespaced(ResourceKind::Prometheus, "tenant-a", "starburst");
        let err = store.get::<Prometheus>(&reference).await.unwrap_err();

        assert!(matches!(err, kube::Error::Api(ref e) if e.code == 503));
        timeout_after_1s(server).await;
    }
}
