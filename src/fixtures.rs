//! Helper methods only available for tests
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use http::{Request, Response};
use hyper::Body;
use k8s_openapi::{api::core::v1::Secret, ByteString};
use kube::{core::ObjectMeta, error::ErrorResponse, Client, Resource};
use tower_test::mock::SendResponse;
use serde_json::{json, Value};

use crate::{
    config::AddonConfig,
    resources::{Addon, AddonSpec, ClusterVersion, ClusterVersionSpec},
    store::{ClusterStore, ManagedResourceRef, StoreResource},
};

pub const NAMESPACE: &str = "tenant-a";
pub const ADDON: &str = "starburst-addon";

pub fn config() -> AddonConfig {
    use envconfig::Envconfig;

    AddonConfig::init_from_hashmap(&Default::default()).unwrap()
}

pub fn addon() -> Addon {
    let mut addon = Addon::new(ADDON, AddonSpec {});
    addon.meta_mut().namespace = Some(NAMESPACE.into());
    addon.meta_mut().uid = Some("5a1b2c3d-0000-4000-8000-000000000001".into());
    addon.meta_mut().generation = Some(1);
    addon
}

pub fn cluster_version() -> ClusterVersion {
    ClusterVersion::new(
        "version",
        ClusterVersionSpec {
            cluster_id: "0f00ba47-0000-4000-8000-000000000000".into(),
            channel: Some("stable-4.12".into()),
        },
    )
}

pub fn secret(name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(NAMESPACE.into()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn parameters(license: &str) -> Secret {
    secret("addon-managed-starburst-parameters", &[("starburst-license", license)])
}

pub fn integration() -> Secret {
    secret(
        "addon",
        &[
            ("token-url", "https://sso.example.com/token"),
            ("remote-write-url", "https://observatorium.example.com/api/metrics/v1/write"),
            ("client-id", "starburst"),
            ("client-secret", "hunter2"),
        ],
    )
}

/// A store holding every object an addon reads before creating anything
pub fn provisioned_store() -> MemoryStore {
    let store = MemoryStore::default();
    store.insert(addon());
    store.insert(cluster_version());
    store.insert(parameters("ABC123"));
    store.insert(integration());
    store
}

pub fn unavailable() -> kube::Error {
    api_error(503, "ServiceUnavailable", "the server is currently unable to handle the request")
}

pub fn already_exists(reference: &ManagedResourceRef) -> kube::Error {
    api_error(409, "AlreadyExists", &format!("{reference} already exists"))
}

fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
    let response: ErrorResponse = serde_json::from_value(json!({
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    }))
    .unwrap();
    kube::Error::Api(response)
}

/// In-memory [`ClusterStore`] keeping objects as JSON, the way the API server would.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ManagedResourceRef, Value>,
    /// Creations not yet visible to reads
    pending: BTreeMap<ManagedResourceRef, Value>,
    lagging: bool,
    failing_gets: BTreeSet<ManagedResourceRef>,
    failing_creates: BTreeSet<ManagedResourceRef>,
    created: Vec<ManagedResourceRef>,
    reads: Vec<ManagedResourceRef>,
}

impl MemoryStore {
    /// Seed an object without recording it as a creation
    pub fn insert<K: StoreResource>(&self, object: K) {
        let value = serde_json::to_value(&object).unwrap();
        let mut inner = self.inner.lock().unwrap();
        inner.objects.insert(ManagedResourceRef::of(&object), value);
    }

    /// Seed an object as raw JSON, in a shape the typed schemas may not accept
    pub fn insert_raw(&self, reference: ManagedResourceRef, value: Value) {
        self.inner.lock().unwrap().objects.insert(reference, value);
    }

    /// Hold back created objects from reads until [`MemoryStore::settle`] is called
    pub fn lagging(self) -> Self {
        self.inner.lock().unwrap().lagging = true;
        self
    }

    pub fn settle(&self) {
        let mut inner = self.inner.lock().unwrap();
        let pending = std::mem::take(&mut inner.pending);
        inner.objects.extend(pending);
    }

    pub fn fail_get(&self, reference: ManagedResourceRef) {
        self.inner.lock().unwrap().failing_gets.insert(reference);
    }

    pub fn fail_create(&self, reference: ManagedResourceRef) {
        self.inner.lock().unwrap().failing_creates.insert(reference);
    }

    pub fn heal(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing_gets.clear();
        inner.failing_creates.clear();
    }

    pub fn remove(&self, reference: &ManagedResourceRef) {
        self.inner.lock().unwrap().objects.remove(reference);
    }

    /// Drain the log of successful creations
    pub fn take_created(&self) -> Vec<ManagedResourceRef> {
        std::mem::take(&mut self.inner.lock().unwrap().created)
    }

    pub fn take_reads(&self) -> Vec<ManagedResourceRef> {
        std::mem::take(&mut self.inner.lock().unwrap().reads)
    }

    pub fn raw(&self, reference: &ManagedResourceRef) -> Option<Value> {
        self.inner.lock().unwrap().objects.get(reference).cloned()
    }

    pub fn object<K: StoreResource>(&self, reference: &ManagedResourceRef) -> Option<K> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(reference)
            .map(|value| serde_json::from_value(value.clone()).unwrap())
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get<K: StoreResource>(&self, reference: &ManagedResourceRef) -> kube::Result<Option<K>> {
        let mut inner = self.inner.lock().unwrap();
        inner.reads.push(reference.clone());
        if inner.failing_gets.contains(reference) {
            return Err(unavailable());
        }

        inner
            .objects
            .get(reference)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(kube::Error::SerdeError)
    }

    async fn get_metadata<K: StoreResource>(
        &self,
        reference: &ManagedResourceRef,
    ) -> kube::Result<Option<ObjectMeta>> {
        let mut inner = self.inner.lock().unwrap();
        inner.reads.push(reference.clone());
        if inner.failing_gets.contains(reference) {
            return Err(unavailable());
        }

        inner
            .objects
            .get(reference)
            .map(|value| serde_json::from_value(value["metadata"].clone()))
            .transpose()
            .map_err(kube::Error::SerdeError)
    }

    async fn create<K: StoreResource>(&self, object: &K) -> kube::Result<()> {
        let reference = ManagedResourceRef::of(object);
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_creates.contains(&reference) {
            return Err(unavailable());
        }
        if inner.objects.contains_key(&reference) || inner.pending.contains_key(&reference) {
            return Err(already_exists(&reference));
        }

        let value = serde_json::to_value(object).map_err(kube::Error::SerdeError)?;
        inner.created.push(reference.clone());
        if inner.lagging {
            inner.pending.insert(reference, value);
        } else {
            inner.objects.insert(reference, value);
        }

        Ok(())
    }
}

// We wrap tower_test::mock::Handle
type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;
pub struct ApiServerVerifier(ApiServerHandle);

pub async fn timeout_after_1s(handle: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("timeout on mock apiserver")
        .expect("scenario succeeded")
}

impl ApiServerVerifier {
    /// Create a kube client talking to this verifier
    pub fn pair() -> (Client, Self) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let mock_client = Client::new(mock_service, "default");
        (mock_client, Self(handle))
    }

    pub fn ok(body: Value) -> Response<Body> {
        Response::builder()
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    pub fn not_found(plural: &str, name: &str) -> Response<Body> {
        Self::status(404, "NotFound", &format!(r#"{plural} "{name}" not found"#))
    }

    pub fn unavailable() -> Response<Body> {
        Self::status(503, "ServiceUnavailable", "the server is currently unable to handle the request")
    }

    fn status(code: u16, reason: &str, message: &str) -> Response<Body> {
        let body = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code,
        });
        Response::builder()
            .status(code)
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    /// Take the next request, which must match `method` and `path`, along with its JSON body
    pub async fn next(&mut self, method: http::Method, path: &str) -> (Value, SendResponse<Response<Body>>) {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), method);
        assert_eq!(request.uri().path(), path);

        let body = hyper::body::to_bytes(request.into_body()).await.unwrap();
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (body, send)
    }

    /// Answer the next request, which must match `method` and `path`
    pub async fn respond(&mut self, method: http::Method, path: &str, response: Response<Body>) -> Value {
        let (body, send) = self.next(method, path).await;
        send.send_response(response);
        body
    }

    pub async fn expect_get(mut self, path: &str, response: Response<Body>) {
        self.respond(http::Method::GET, path, response).await;
    }

    pub async fn expect_create(mut self, path: &str, field_manager: &str, echoed: Value) {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), http::Method::POST);
        assert_eq!(request.uri().path(), path);
        let query = request.uri().query().unwrap_or_default().to_string();
        assert!(query.contains(&format!("fieldManager={field_manager}")));

        let body = hyper::body::to_bytes(request.into_body()).await.unwrap();
        let posted: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(posted["metadata"], echoed["metadata"]);

        send.send_response(Self::ok(echoed));
    }
}
