//! Test utilities for unit testing the reconciliation core
//!
//! In-memory fakes for every collaborator seam, plus helpers for building
//! test components.

use crate::error::ControllerError;
use crate::intent::Intent;
use crate::restart::RestartState;
use crate::stores::{
    BusinessReconciler, ComponentStore, ReconcileResult, SecretStore, SpecStore, WorkloadProbe,
};
use async_trait::async_trait;
use crds::{
    ComponentKind, ComponentStatus, LedgerComponent, LedgerComponentSpec, PARENT_LABEL,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

/// Builds a node component with the given identity.
pub fn test_component(namespace: &str, name: &str, node_number: Option<u32>) -> LedgerComponent {
    LedgerComponent {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            ..Default::default()
        },
        spec: LedgerComponentSpec {
            component_type: ComponentKind::Peer,
            node_number,
            zone: None,
            region: None,
            fabric_version: "2.2.1".to_string(),
            images: None,
            config_overrides: None,
            msp: None,
            disable_node_ou: None,
            actions: Default::default(),
            prevent_genesis: Some(true),
        },
        status: None,
    }
}

/// Attaches the parent label linking a node to its cluster resource.
pub fn with_parent(mut component: LedgerComponent, parent: &str) -> LedgerComponent {
    component
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(PARENT_LABEL.to_string(), parent.to_string());
    component
}

/// In-memory component store.
#[derive(Debug, Default)]
pub struct InMemoryComponentStore {
    inner: Mutex<HashMap<String, LedgerComponent>>,
}

impl InMemoryComponentStore {
    pub fn insert(&self, component: LedgerComponent) {
        let key = format!(
            "{}/{}",
            component.metadata.namespace.as_deref().unwrap_or("default"),
            component.metadata.name.as_deref().unwrap_or(""),
        );
        self.inner.lock().unwrap().insert(key, component);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<LedgerComponent> {
        self.inner
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{name}"))
            .cloned()
    }
}

#[async_trait]
impl ComponentStore for InMemoryComponentStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LedgerComponent>, ControllerError> {
        Ok(self.stored(namespace, name))
    }

    async fn list(&self, namespace: &str) -> Result<Vec<LedgerComponent>, ControllerError> {
        let prefix = format!("{namespace}/");
        Ok(self
            .inner
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        self.inner
            .lock()
            .unwrap()
            .remove(&format!("{namespace}/{name}"));
        Ok(())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ComponentStatus,
    ) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.get_mut(&format!("{namespace}/{name}")) {
            Some(component) => {
                component.status = Some(status.clone());
                Ok(())
            }
            None => Err(ControllerError::StatusPersist(format!(
                "{namespace}/{name} not found"
            ))),
        }
    }
}

/// In-memory secret store.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    inner: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl InMemorySecretStore {
    pub fn seed(&self, namespace: &str, name: &str, data: BTreeMap<String, Vec<u8>>) {
        self.inner
            .lock()
            .unwrap()
            .insert(format!("{namespace}/{name}"), data);
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, ControllerError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{name}"))
            .cloned())
    }

    async fn put(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<(), ControllerError> {
        self.inner
            .lock()
            .unwrap()
            .insert(format!("{namespace}/{name}"), data);
        Ok(())
    }
}

/// In-memory last-applied-spec store. Saves can be scripted to fail.
#[derive(Debug, Default)]
pub struct InMemorySpecStore {
    inner: Mutex<HashMap<String, LedgerComponentSpec>>,
    save_failures: Mutex<VecDeque<ControllerError>>,
}

impl InMemorySpecStore {
    pub fn seed(&self, namespace: &str, name: &str, spec: LedgerComponentSpec) {
        self.inner
            .lock()
            .unwrap()
            .insert(format!("{namespace}/{name}"), spec);
    }

    pub fn saved(&self, namespace: &str, name: &str) -> Option<LedgerComponentSpec> {
        self.inner
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{name}"))
            .cloned()
    }

    /// Queues an error returned by the next save call.
    pub fn fail_save(&self, err: ControllerError) {
        self.save_failures.lock().unwrap().push_back(err);
    }
}

#[async_trait]
impl SpecStore for InMemorySpecStore {
    async fn load(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LedgerComponentSpec>, ControllerError> {
        Ok(self.saved(namespace, name))
    }

    async fn save(
        &self,
        namespace: &str,
        name: &str,
        spec: &LedgerComponentSpec,
    ) -> Result<(), ControllerError> {
        if let Some(err) = self.save_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.seed(namespace, name, spec.clone());
        Ok(())
    }
}

/// In-memory restart-coordination store with the same optimistic concurrency
/// as the kube-backed one: saves must carry the version they were loaded at,
/// stale writes fail with a conflict.
#[derive(Debug, Default)]
pub struct InMemoryCoordStore {
    inner: Mutex<HashMap<String, (u64, RestartState)>>,
}

impl InMemoryCoordStore {
    pub fn state(&self, namespace: &str, kind: ComponentKind) -> RestartState {
        self.inner
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{kind}"))
            .map(|(_, state)| state.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl crate::stores::CoordStore for InMemoryCoordStore {
    async fn load(
        &self,
        namespace: &str,
        kind: ComponentKind,
    ) -> Result<RestartState, ControllerError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{kind}"))
            .map(|(version, state)| {
                let mut state = state.clone();
                state.resource_version = Some(version.to_string());
                state
            })
            .unwrap_or_default())
    }

    async fn save(
        &self,
        namespace: &str,
        kind: ComponentKind,
        state: &RestartState,
    ) -> Result<(), ControllerError> {
        let mut map = self.inner.lock().unwrap();
        let key = format!("{namespace}/{kind}");
        let current = map.get(&key).map(|(version, _)| *version);
        let loaded_at = state
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok());
        if current != loaded_at {
            return Err(ControllerError::Conflict(format!(
                "stale coordination record for {key}"
            )));
        }
        let next = current.map_or(0, |v| v + 1);
        map.insert(key, (next, state.clone()));
        Ok(())
    }
}

/// Coordination store that fails the first `failures` saves with a conflict
/// before delegating to an inner store.
#[derive(Debug)]
pub struct ConflictingCoordStore {
    inner: InMemoryCoordStore,
    remaining: Mutex<usize>,
}

impl ConflictingCoordStore {
    pub fn failing(failures: usize) -> Self {
        Self {
            inner: InMemoryCoordStore::default(),
            remaining: Mutex::new(failures),
        }
    }

    pub fn state(&self, namespace: &str, kind: ComponentKind) -> RestartState {
        self.inner.state(namespace, kind)
    }
}

#[async_trait]
impl crate::stores::CoordStore for ConflictingCoordStore {
    async fn load(
        &self,
        namespace: &str,
        kind: ComponentKind,
    ) -> Result<RestartState, ControllerError> {
        self.inner.load(namespace, kind).await
    }

    async fn save(
        &self,
        namespace: &str,
        kind: ComponentKind,
        state: &RestartState,
    ) -> Result<(), ControllerError> {
        {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ControllerError::Conflict(
                    "concurrent coordination write".to_string(),
                ));
            }
        }
        self.inner.save(namespace, kind, state).await
    }
}

/// Workload probe returning fixed replica counts.
#[derive(Debug, Default)]
pub struct StaticWorkloadProbe {
    counts: Mutex<(i32, i32)>,
}

impl StaticWorkloadProbe {
    pub fn set(&self, replicas: i32, ready: i32) {
        *self.counts.lock().unwrap() = (replicas, ready);
    }
}

#[async_trait]
impl WorkloadProbe for StaticWorkloadProbe {
    async fn replica_counts(
        &self,
        _component: &LedgerComponent,
    ) -> Result<(i32, i32), ControllerError> {
        Ok(*self.counts.lock().unwrap())
    }
}

/// Business reconciler that records every intent it sees and replays
/// scripted outcomes, defaulting to success.
#[derive(Debug, Default)]
pub struct RecordingReconciler {
    seen: Mutex<Vec<Intent>>,
    script: Mutex<VecDeque<Result<ReconcileResult, ControllerError>>>,
}

impl RecordingReconciler {
    pub fn script(&self, outcome: Result<ReconcileResult, ControllerError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn intents(&self) -> Vec<Intent> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl BusinessReconciler for RecordingReconciler {
    async fn reconcile(
        &self,
        _component: &LedgerComponent,
        intent: &Intent,
    ) -> Result<ReconcileResult, ControllerError> {
        self.seen.lock().unwrap().push(intent.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(ReconcileResult::default()),
        }
    }
}
