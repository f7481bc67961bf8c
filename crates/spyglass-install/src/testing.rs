//! In-memory cluster for tests
//!
//! Records every call, assigns resource versions on write, and rejects
//! updates whose `resourceVersion` is stale, like the API server does.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use spyglass_common::ClientError;

use crate::client::{ClusterClient, ListScope};
use crate::object::{ClusterObject, ObjectKey, ObjectKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Get(ObjectKey),
    Create(ObjectKey),
    Update(ObjectKey),
    Delete(ObjectKey),
    List(String),
}

#[derive(Default)]
struct State {
    objects: HashMap<ObjectKey, Value>,
    calls: Vec<Call>,
    next_version: u64,
    failures: HashMap<(&'static str, ObjectKey), ClientError>,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

#[derive(Default)]
pub struct MemoryCluster {
    state: Mutex<State>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a call
    pub fn insert(&self, object: ClusterObject) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        let mut body = object.body;
        body["metadata"]["resourceVersion"] = json!(version);
        state.objects.insert(object.key, body);
    }

    pub fn object(&self, key: &ObjectKey) -> Option<Value> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    /// Change a live object out of band, as another actor would
    pub fn mutate(&self, key: &ObjectKey, f: impl FnOnce(&mut Value)) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        let body = state.objects.get_mut(key).expect("object to mutate exists");
        f(body);
        body["metadata"]["resourceVersion"] = json!(version);
    }

    pub fn fail_create(&self, key: &ObjectKey, err: ClientError) {
        self.fail("create", key, err);
    }

    pub fn fail_delete(&self, key: &ObjectKey, err: ClientError) {
        self.fail("delete", key, err);
    }

    pub fn fail_get(&self, key: &ObjectKey, err: ClientError) {
        self.fail("get", key, err);
    }

    fn fail(&self, op: &'static str, key: &ObjectKey, err: ClientError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, key.clone()), err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn creates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count()
    }

    pub fn updates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Update(_)))
            .count()
    }

    pub fn deletes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Delete(_)))
            .count()
    }

    pub fn created_keys(&self) -> Vec<ObjectKey> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: &'static str, call: Call, key: &ObjectKey) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.get(&(op, key.clone())) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn labels_match(body: &Value, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => body
                .pointer("/metadata/labels")
                .and_then(|labels| labels.get(k))
                .and_then(Value::as_str)
                == Some(v),
            None => false,
        })
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ClusterObject>, ClientError> {
        self.record("get", Call::Get(key.clone()), key)?;
        Ok(self
            .object(key)
            .map(|body| ClusterObject::from_parts(key.clone(), body)))
    }

    async fn create(&self, object: &ClusterObject) -> Result<(), ClientError> {
        let key = &object.key;
        self.record("create", Call::Create(key.clone()), key)?;

        let mut state = self.state.lock().unwrap();
        if state.objects.contains_key(key) {
            return Err(ClientError::conflict(format!("{} already exists", key)));
        }
        let version = state.bump();
        let mut body = object.body.clone();
        body["metadata"]["resourceVersion"] = json!(version);
        body["metadata"]["uid"] = json!(format!("uid-{}", version));
        state.objects.insert(key.clone(), body);
        Ok(())
    }

    async fn update(&self, object: &ClusterObject) -> Result<(), ClientError> {
        let key = &object.key;
        self.record("update", Call::Update(key.clone()), key)?;

        let mut state = self.state.lock().unwrap();
        let live_version = match state.objects.get(key) {
            Some(live) => live["metadata"]["resourceVersion"].clone(),
            None => return Err(ClientError::not_found(format!("{} not found", key))),
        };
        let expected = &object.body["metadata"]["resourceVersion"];
        if !expected.is_null() && *expected != live_version {
            return Err(ClientError::conflict(format!(
                "Operation cannot be fulfilled on {}: the object has been modified",
                key
            )));
        }
        let version = state.bump();
        let mut body = object.body.clone();
        body["metadata"]["resourceVersion"] = json!(version);
        state.objects.insert(key.clone(), body);
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), ClientError> {
        self.record("delete", Call::Delete(key.clone()), key)?;

        let mut state = self.state.lock().unwrap();
        match state.objects.remove(key) {
            Some(_) => Ok(()),
            None => Err(ClientError::not_found(format!("{} not found", key))),
        }
    }

    async fn list_by_label(
        &self,
        kind: &ObjectKind,
        scope: &ListScope,
    ) -> Result<Vec<ClusterObject>, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List(kind.kind.clone()));

        let mut items: Vec<ClusterObject> = state
            .objects
            .iter()
            .filter(|(key, body)| {
                &key.kind == kind
                    && (scope.namespace.is_none() || key.namespace == scope.namespace)
                    && labels_match(body, &scope.selector)
            })
            .map(|(key, body)| ClusterObject::from_parts(key.clone(), body.clone()))
            .collect();
        items.sort_by(|a, b| a.key.name.cmp(&b.key.name));
        Ok(items)
    }
}
