//! External collaborator seams.
//!
//! Every store and probe the reconciliation core talks to is behind an
//! async trait, so the dispatcher and arbitrator can be exercised against
//! in-memory fakes. The kube-backed implementations here are the production
//! wiring.

use crate::error::{ControllerError, is_not_found};
use crate::intent::Intent;
use crate::restart::RestartState;
use async_trait::async_trait;
use crds::{ComponentKind, ComponentStatus, LedgerComponent, LedgerComponentSpec, RESTART_COORD_LABEL};
use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of one business reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileResult {
    /// Re-push a copy of the consumed intent and run another pass
    pub requeue: bool,
    /// Delay preference when no immediate requeue is needed
    pub requeue_after: Option<Duration>,
    /// Explicit status override
    pub status: Option<ComponentStatus>,
    /// Persist the override immediately, bypassing readiness and bootstrap
    /// arbitration
    pub force_status: bool,
}

/// Resource-kind-specific logic that turns an intent into workload and
/// credential changes. Implemented outside this crate per component kind.
#[async_trait]
pub trait BusinessReconciler: Send + Sync {
    /// Performs the remediation the intent calls for.
    async fn reconcile(
        &self,
        component: &LedgerComponent,
        intent: &Intent,
    ) -> Result<ReconcileResult, ControllerError>;
}

/// Typed access to the primary resources.
#[async_trait]
pub trait ComponentStore: Send + Sync {
    /// Fetches a component; `None` when it does not exist.
    async fn get(&self, namespace: &str, name: &str)
    -> Result<Option<LedgerComponent>, ControllerError>;

    /// Lists all components in a namespace.
    async fn list(&self, namespace: &str) -> Result<Vec<LedgerComponent>, ControllerError>;

    /// Deletes a component; missing objects are not an error.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;

    /// Merge-patches the status subresource. Conflicts surface as errors;
    /// the arbitrator owns the bounded retry.
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ComponentStatus,
    ) -> Result<(), ControllerError>;
}

/// Key/value secret access for credentials, backups and bootstrap artifacts.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches a secret's data; `None` when the secret does not exist.
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, ControllerError>;

    /// Creates or replaces a secret's data.
    async fn put(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<(), ControllerError>;

    /// Existence probe without fetching the payload.
    async fn exists(&self, namespace: &str, name: &str) -> Result<bool, ControllerError> {
        Ok(self.get(namespace, name).await?.is_some())
    }
}

/// Side store for the last-applied component spec, read by the classifier's
/// creation-time catch-up and written on every arbitration pass.
#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Loads the last-applied spec snapshot, if one was ever persisted.
    async fn load(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LedgerComponentSpec>, ControllerError>;

    /// Durably records the just-applied spec.
    async fn save(
        &self,
        namespace: &str,
        name: &str,
        spec: &LedgerComponentSpec,
    ) -> Result<(), ControllerError>;
}

/// Persistence for the shared restart-coordination record, one per kind.
#[async_trait]
pub trait CoordStore: Send + Sync {
    /// Loads the coordination record; a missing record is an empty state.
    async fn load(
        &self,
        namespace: &str,
        kind: ComponentKind,
    ) -> Result<RestartState, ControllerError>;

    /// Writes the coordination record back. May surface a conflict.
    async fn save(
        &self,
        namespace: &str,
        kind: ComponentKind,
        state: &RestartState,
    ) -> Result<(), ControllerError>;
}

/// Managed-workload readiness probe.
#[async_trait]
pub trait WorkloadProbe: Send + Sync {
    /// Returns `(instances, ready_instances)` for the component's workload.
    async fn replica_counts(
        &self,
        component: &LedgerComponent,
    ) -> Result<(i32, i32), ControllerError>;
}

// ---------------------------------------------------------------------------
// Kube-backed implementations
// ---------------------------------------------------------------------------

/// Component store over the Kubernetes API.
#[derive(Clone)]
pub struct KubeComponentStore {
    client: Client,
}

impl std::fmt::Debug for KubeComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeComponentStore").finish_non_exhaustive()
    }
}

impl KubeComponentStore {
    /// Wraps a kube client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<LedgerComponent> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ComponentStore for KubeComponentStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LedgerComponent>, ControllerError> {
        match self.api(namespace).get(name).await {
            Ok(component) => Ok(Some(component)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }

    async fn list(&self, namespace: &str) -> Result<Vec<LedgerComponent>, ControllerError> {
        let list = self.api(namespace).list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        match self.api(namespace).delete(name, &Default::default()).await {
            Ok(_) => {
                info!("Deleted LedgerComponent {}/{}", namespace, name);
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ComponentStatus,
    ) -> Result<(), ControllerError> {
        let patch = serde_json::json!({ "status": status });
        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!("Patched status of {}/{}", namespace, name);
        Ok(())
    }
}

/// Secret store over the Kubernetes API.
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    /// Wraps a kube client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, ControllerError> {
        match self.api(namespace).get(name).await {
            Ok(secret) => Ok(Some(
                secret
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, ByteString(v))| (k, v))
                    .collect(),
            )),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }

    async fn put(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Result<(), ControllerError> {
        let api = self.api(namespace);
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()),
            ..Default::default()
        };
        match api.get_opt(name).await? {
            Some(_) => {
                api.patch(name, &PatchParams::default(), &Patch::Merge(&secret))
                    .await?;
            }
            None => {
                api.create(&PostParams::default(), &secret).await?;
            }
        }
        Ok(())
    }
}

/// Last-applied-spec store backed by `<name>-spec` config objects.
#[derive(Clone)]
pub struct KubeSpecStore {
    client: Client,
}

impl std::fmt::Debug for KubeSpecStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSpecStore").finish_non_exhaustive()
    }
}

const SPEC_KEY: &str = "spec";

impl KubeSpecStore {
    /// Wraps a kube client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_name(name: &str) -> String {
        format!("{name}-spec")
    }
}

#[async_trait]
impl SpecStore for KubeSpecStore {
    async fn load(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LedgerComponentSpec>, ControllerError> {
        let cm = match self.api(namespace).get(&Self::config_name(name)).await {
            Ok(cm) => cm,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(ControllerError::Kube(e)),
        };
        let Some(raw) = cm.data.as_ref().and_then(|d| d.get(SPEC_KEY)) else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(raw)?))
    }

    async fn save(
        &self,
        namespace: &str,
        name: &str,
        spec: &LedgerComponentSpec,
    ) -> Result<(), ControllerError> {
        let api = self.api(namespace);
        let config_name = Self::config_name(name);
        let mut data = BTreeMap::new();
        data.insert(SPEC_KEY.to_string(), serde_json::to_string(spec)?);
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(config_name.clone()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };
        match api.get_opt(&config_name).await? {
            Some(_) => {
                api.patch(&config_name, &PatchParams::default(), &Patch::Merge(&cm))
                    .await?;
            }
            None => {
                api.create(&PostParams::default(), &cm).await?;
            }
        }
        Ok(())
    }
}

/// Restart-coordination store backed by labeled `restart-<kind>` config
/// objects.
#[derive(Clone)]
pub struct KubeCoordStore {
    client: Client,
}

impl std::fmt::Debug for KubeCoordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCoordStore").finish_non_exhaustive()
    }
}

const COORD_STATE_KEY: &str = "state";

impl KubeCoordStore {
    /// Wraps a kube client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl CoordStore for KubeCoordStore {
    async fn load(
        &self,
        namespace: &str,
        kind: ComponentKind,
    ) -> Result<RestartState, ControllerError> {
        let cm = match self.api(namespace).get(kind.coordination_name()).await {
            Ok(cm) => cm,
            Err(e) if is_not_found(&e) => return Ok(RestartState::default()),
            Err(e) => return Err(ControllerError::Kube(e)),
        };
        let mut state: RestartState = match cm.data.as_ref().and_then(|d| d.get(COORD_STATE_KEY)) {
            Some(raw) => serde_json::from_str(raw)?,
            None => RestartState::default(),
        };
        state.resource_version = cm.metadata.resource_version;
        Ok(state)
    }

    async fn save(
        &self,
        namespace: &str,
        kind: ComponentKind,
        state: &RestartState,
    ) -> Result<(), ControllerError> {
        let api = self.api(namespace);
        let name = kind.coordination_name();
        let mut data = BTreeMap::new();
        data.insert(COORD_STATE_KEY.to_string(), serde_json::to_string(state)?);
        let mut labels = BTreeMap::new();
        labels.insert(RESTART_COORD_LABEL.to_string(), kind.to_string());
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                resource_version: state.resource_version.clone(),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };
        // Replace with the loaded resourceVersion so a concurrent writer
        // surfaces as a 409 for the admission gate's retry; a create of an
        // already-existing record conflicts the same way.
        match state.resource_version {
            Some(_) => {
                api.replace(name, &PostParams::default(), &cm).await?;
            }
            None => {
                api.create(&PostParams::default(), &cm).await?;
            }
        }
        Ok(())
    }
}

/// Readiness probe over the component's Deployment.
#[derive(Clone)]
pub struct KubeWorkloadProbe {
    client: Client,
}

impl std::fmt::Debug for KubeWorkloadProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWorkloadProbe").finish_non_exhaustive()
    }
}

impl KubeWorkloadProbe {
    /// Wraps a kube client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadProbe for KubeWorkloadProbe {
    async fn replica_counts(
        &self,
        component: &LedgerComponent,
    ) -> Result<(i32, i32), ControllerError> {
        let namespace = component.metadata.namespace.as_deref().unwrap_or("default");
        let Some(name) = component.metadata.name.as_deref() else {
            return Ok((0, 0));
        };
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(deployment) => {
                let status = deployment.status.unwrap_or_default();
                Ok((
                    status.replicas.unwrap_or(0),
                    status.ready_replicas.unwrap_or(0),
                ))
            }
            Err(e) if is_not_found(&e) => Ok((0, 0)),
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }
}
