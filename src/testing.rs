//! In-memory stand-in for the API server, used by handler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use serde_json::{Map, Value as JsonValue, json};

use crate::identity::CallerIdentity;
use crate::resource::ServedResource;
use crate::routes;
use crate::upstream::{
    ClientError, ClientFactory, ResourceClient, UpstreamError, UpstreamReason,
};

#[derive(Default)]
pub struct MockState {
    pub objects: HashMap<(String, String), JsonValue>,
    pub get_error: Option<UpstreamError>,
    pub write_error: Option<UpstreamError>,
    pub fail_clients: bool,
    pub clients_built: usize,
    pub tokens: Vec<Option<String>>,
    pub gets: Vec<(String, String)>,
    pub replaced: Vec<JsonValue>,
    pub patches: Vec<Bytes>,
}

/// Acts as both the client factory and every client it hands out.
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<MockState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an HTTPRoute with the given resourceVersion.
    pub fn with_route(self, namespace: &str, name: &str, resource_version: &str, spec: JsonValue) -> Self {
        let object = json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "HTTPRoute",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "resourceVersion": resource_version,
            },
            "spec": spec,
        });
        self.state()
            .objects
            .insert((namespace.to_string(), name.to_string()), object);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn fail_gets(&self, err: UpstreamError) {
        self.state().get_error = Some(err);
    }

    pub fn fail_writes(&self, err: UpstreamError) {
        self.state().write_error = Some(err);
    }

    pub fn fail_clients(&self) {
        self.state().fail_clients = true;
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<JsonValue> {
        self.state()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// The full proxy router backed by this cluster, serving HTTPRoutes.
    pub fn app(&self) -> Router {
        routes::router(&[ServedResource::http_route()], Arc::new(self.clone()))
    }

    fn not_found(name: &str) -> UpstreamError {
        UpstreamError::from_status(
            Some(404),
            format!(r#"httproutes.gateway.networking.k8s.io "{}" not found"#, name),
        )
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

fn resource_version(object: &JsonValue) -> Option<&str> {
    object.pointer("/metadata/resourceVersion").and_then(JsonValue::as_str)
}

fn bump_resource_version(object: &mut JsonValue, previous: Option<&str>) {
    let next = previous
        .and_then(|rv| rv.parse::<u64>().ok())
        .map_or(1, |rv| rv + 1);
    object["metadata"]["resourceVersion"] = JsonValue::from(next.to_string());
}

/// RFC 7386 JSON merge patch.
fn merge_patch(target: &mut JsonValue, patch: &JsonValue) {
    let JsonValue::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = JsonValue::Object(Map::new());
    }
    let JsonValue::Object(target) = target else {
        return;
    };
    for (field, value) in patch {
        if value.is_null() {
            target.remove(field);
        } else {
            merge_patch(target.entry(field.clone()).or_insert(JsonValue::Null), value);
        }
    }
}

#[async_trait]
impl ClientFactory for MockCluster {
    async fn client_for(
        &self,
        caller: &CallerIdentity,
        _resource: &ServedResource,
    ) -> Result<Box<dyn ResourceClient>, ClientError> {
        let mut state = self.state();
        state.clients_built += 1;
        state.tokens.push(caller.bearer_token.clone());
        if state.fail_clients {
            return Err(ClientError::NoCredentials);
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl ResourceClient for MockCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<JsonValue, UpstreamError> {
        let mut state = self.state();
        state.gets.push(key(namespace, name));
        if let Some(err) = &state.get_error {
            return Err(err.clone());
        }
        state
            .objects
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| Self::not_found(name))
    }

    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        mut object: JsonValue,
    ) -> Result<JsonValue, UpstreamError> {
        let mut state = self.state();
        state.replaced.push(object.clone());
        if let Some(err) = &state.write_error {
            return Err(err.clone());
        }
        let stored_version = match state.objects.get(&key(namespace, name)) {
            Some(current) => resource_version(current).map(str::to_string),
            None => return Err(Self::not_found(name)),
        };
        if resource_version(&object) != stored_version.as_deref() {
            return Err(UpstreamError::new(
                UpstreamReason::Conflict,
                "the object has been modified; please apply your changes to the latest version and try again",
            ));
        }
        bump_resource_version(&mut object, stored_version.as_deref());
        state.objects.insert(key(namespace, name), object.clone());
        Ok(object)
    }

    async fn merge_patch(
        &self,
        namespace: &str,
        name: &str,
        patch: Bytes,
    ) -> Result<JsonValue, UpstreamError> {
        let mut state = self.state();
        state.patches.push(patch.clone());
        if let Some(err) = &state.write_error {
            return Err(err.clone());
        }
        let patch: JsonValue = serde_json::from_slice(&patch)
            .map_err(|err| UpstreamError::from_status(Some(400), err.to_string()))?;
        let Some(current) = state.objects.get_mut(&key(namespace, name)) else {
            return Err(Self::not_found(name));
        };
        let previous = resource_version(current).map(str::to_string);
        merge_patch(current, &patch);
        bump_resource_version(current, previous.as_deref());
        Ok(current.clone())
    }
}

#[test]
fn test_merge_patch_semantics() {
    let mut target = json!({"a": "b", "c": {"d": "e", "f": "g"}});
    merge_patch(&mut target, &json!({"a": "z", "c": {"f": null}}));
    assert_eq!(target, json!({"a": "z", "c": {"d": "e"}}));

    let mut target = json!({"list": [1, 2]});
    merge_patch(&mut target, &json!({"list": [3]}));
    assert_eq!(target, json!({"list": [3]}));
}
