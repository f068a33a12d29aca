//! In-memory backend used by tests and offline previews.
//!
//! Behaves like the real API where the engine can tell: objects get a
//! `Moid`, references submitted as `{ObjectType, Moid}` are stored as such,
//! and every call is recorded for later inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use super::{ApiError, ObservedObject, RemoteApi, Result};
use crate::model::{Fields, RemoteHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub kind: CallKind,
    pub object_type: String,
    /// Object name for create, handle for update and delete, empty for list.
    pub target: String,
}

#[derive(Debug, Default)]
struct State {
    objects: Vec<(String, Fields)>,
    calls: Vec<RemoteCall>,
    failures: HashMap<(CallKind, String), ApiError>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<State>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every mutating call take `delay`, so concurrency is observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds an object as if it had been created out of band.
    pub fn insert(&self, object_type: &str, fields: Fields) -> RemoteHandle {
        let mut state = self.lock();
        store(&mut state, object_type, fields)
    }

    /// Makes calls of `kind` fail for the object named `name` (or the type
    /// name for list calls).
    pub fn fail(&self, kind: CallKind, name: &str, error: ApiError) {
        self.lock().failures.insert((kind, name.to_string()), error);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<RemoteCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Stored objects of one type, in creation order.
    pub fn objects(&self, object_type: &str) -> Vec<Fields> {
        self.lock()
            .objects
            .iter()
            .filter(|(t, _)| t == object_type)
            .map(|(_, f)| f.clone())
            .collect()
    }

    /// Highest number of mutating calls observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    fn record(&self, kind: CallKind, object_type: &str, target: &str) {
        self.lock().calls.push(RemoteCall {
            kind,
            object_type: object_type.to_string(),
            target: target.to_string(),
        });
    }

    fn failure(&self, kind: CallKind, name: &str) -> Option<ApiError> {
        self.lock().failures.get(&(kind, name.to_string())).cloned()
    }

    fn name_of(&self, handle: &RemoteHandle) -> Option<String> {
        self.lock()
            .objects
            .iter()
            .find(|(_, f)| moid(f) == Some(handle.as_str()))
            .and_then(|(_, f)| f.get("Name").and_then(Value::as_str).map(str::to_string))
    }

    /// Simulates the network round trip of a mutating call.
    fn round_trip(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::AcqRel);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn moid(fields: &Fields) -> Option<&str> {
    fields.get("Moid").and_then(Value::as_str)
}

fn store(state: &mut State, object_type: &str, mut fields: Fields) -> RemoteHandle {
    state.next_id += 1;
    let handle = RemoteHandle::new(format!("moid-{:04}", state.next_id));
    fields.insert("ObjectType".to_string(), Value::String(object_type.to_string()));
    fields.insert("ClassId".to_string(), Value::String(object_type.to_string()));
    fields.insert("Moid".to_string(), Value::String(handle.to_string()));
    state.objects.push((object_type.to_string(), fields));
    handle
}

impl RemoteApi for InMemoryRemote {
    fn list_objects(&self, object_type: &str) -> Result<Vec<ObservedObject>> {
        self.record(CallKind::List, object_type, "");
        if let Some(err) = self.failure(CallKind::List, object_type) {
            return Err(err);
        }
        self.objects(object_type)
            .into_iter()
            .map(|f| ObservedObject::from_json(Value::Object(f)))
            .collect()
    }

    fn create_object(&self, object_type: &str, fields: &Fields) -> Result<RemoteHandle> {
        let name = fields
            .get("Name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.record(CallKind::Create, object_type, &name);
        self.round_trip();
        if let Some(err) = self.failure(CallKind::Create, &name) {
            return Err(err);
        }

        let mut state = self.lock();
        let duplicate = state.objects.iter().any(|(t, f)| {
            t == object_type
                && f.get("Name") == fields.get("Name")
                && f.get("Organization") == fields.get("Organization")
        });
        if duplicate {
            return Err(ApiError::new(409, format!("{} '{}' already exists", object_type, name)));
        }
        Ok(store(&mut state, object_type, fields.clone()))
    }

    fn update_object(
        &self,
        object_type: &str,
        handle: &RemoteHandle,
        fields: &Fields,
    ) -> Result<()> {
        self.record(CallKind::Update, object_type, handle.as_str());
        self.round_trip();
        let name = self.name_of(handle).unwrap_or_default();
        if let Some(err) = self.failure(CallKind::Update, &name) {
            return Err(err);
        }

        let mut state = self.lock();
        let Some((_, stored)) = state
            .objects
            .iter_mut()
            .find(|(t, f)| t == object_type && moid(f) == Some(handle.as_str()))
        else {
            return Err(ApiError::new(404, format!("{} {} not found", object_type, handle)));
        };
        let mut replaced = fields.clone();
        for key in ["ObjectType", "ClassId", "Moid"] {
            if let Some(v) = stored.get(key) {
                replaced.insert(key.to_string(), v.clone());
            }
        }
        *stored = replaced;
        Ok(())
    }

    fn delete_object(&self, object_type: &str, handle: &RemoteHandle) -> Result<()> {
        self.record(CallKind::Delete, object_type, handle.as_str());
        self.round_trip();
        let name = self.name_of(handle).unwrap_or_default();
        if let Some(err) = self.failure(CallKind::Delete, &name) {
            return Err(err);
        }

        let mut state = self.lock();
        let before = state.objects.len();
        state
            .objects
            .retain(|(t, f)| !(t == object_type && moid(f) == Some(handle.as_str())));
        if state.objects.len() == before {
            return Err(ApiError::new(404, format!("{} {} not found", object_type, handle)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_create_list_delete() {
        let remote = InMemoryRemote::new();
        let handle = remote
            .create_object("ntp.Policy", &fields(json!({"Name": "ntp1"})))
            .unwrap();
        let listed = remote.list_objects("ntp.Policy").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].handle, handle);
        assert_eq!(listed[0].fields["ObjectType"], json!("ntp.Policy"));

        remote.delete_object("ntp.Policy", &handle).unwrap();
        assert!(remote.list_objects("ntp.Policy").unwrap().is_empty());
        assert_eq!(remote.calls_of(CallKind::Delete).len(), 1);
    }

    #[test]
    fn test_duplicate_create_conflicts() {
        let remote = InMemoryRemote::new();
        let f = fields(json!({"Name": "ntp1"}));
        remote.create_object("ntp.Policy", &f).unwrap();
        assert_eq!(remote.create_object("ntp.Policy", &f).unwrap_err().status, 409);
    }

    #[test]
    fn test_injected_failure() {
        let remote = InMemoryRemote::new();
        remote.fail(CallKind::Create, "bad", ApiError::new(400, "rejected"));
        let err = remote
            .create_object("ntp.Policy", &fields(json!({"Name": "bad"})))
            .unwrap_err();
        assert_eq!(err, ApiError::new(400, "rejected"));
        assert!(remote.objects("ntp.Policy").is_empty());
    }

    #[test]
    fn test_update_replaces_user_fields() {
        let remote = InMemoryRemote::new();
        let handle = remote.insert("ntp.Policy", fields(json!({"Name": "n", "Timezone": "UTC"})));
        remote
            .update_object("ntp.Policy", &handle, &fields(json!({"Name": "n", "Enabled": true})))
            .unwrap();
        let stored = &remote.objects("ntp.Policy")[0];
        assert_eq!(stored.get("Timezone"), None);
        assert_eq!(stored["Enabled"], json!(true));
        assert_eq!(stored["Moid"], json!(handle.as_str()));
    }
}
