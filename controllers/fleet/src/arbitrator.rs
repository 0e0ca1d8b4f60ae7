//! Status arbitration.
//!
//! Computes the single observable status of a component from four competing
//! signals, in strict precedence: reconciliation error, cluster-resource
//! suppression, business override, workload readiness, bootstrap gate.
//! Persists only when the observable triple actually changed; every persist
//! stamps a heartbeat and retries conflicts a bounded number of times.

use crate::error::ControllerError;
use crate::stores::{ComponentStore, ReconcileResult, SecretStore, SpecStore, WorkloadProbe};
use chrono::Utc;
use crds::{ComponentConditionType, ComponentStatus, LedgerComponent};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reason recorded when the business reconciler errored.
pub const RECONCILE_ERROR_REASON: &str = "errorOccurredDuringReconcile";

/// Bounded retries against a conflict-prone status write.
const PERSIST_RETRIES: usize = 2;

/// Arbitrates and persists component status.
pub struct Arbitrator {
    components: Arc<dyn ComponentStore>,
    secrets: Arc<dyn SecretStore>,
    workloads: Arc<dyn WorkloadProbe>,
    specs: Arc<dyn SpecStore>,
}

impl std::fmt::Debug for Arbitrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbitrator").finish_non_exhaustive()
    }
}

impl Arbitrator {
    /// Creates an arbitrator over the injected collaborators.
    pub fn new(
        components: Arc<dyn ComponentStore>,
        secrets: Arc<dyn SecretStore>,
        workloads: Arc<dyn WorkloadProbe>,
        specs: Arc<dyn SpecStore>,
    ) -> Self {
        Self {
            components,
            secrets,
            workloads,
            specs,
        }
    }

    /// Arbitrates the observable status after one reconciliation pass.
    ///
    /// A status-persistence failure is fatal for the pass and surfaces to
    /// the caller.
    pub async fn arbitrate(
        &self,
        component: &LedgerComponent,
        result: &ReconcileResult,
        err: Option<&ControllerError>,
    ) -> Result<(), ControllerError> {
        let namespace = component.metadata.namespace.as_deref().unwrap_or("default");
        let name = component
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("component missing name".to_string()))?;

        // Side effect independent of status: record the just-applied spec
        // for the classifier's creation-time catch-up. A persistent failure
        // surfaces so the watch backoff retries the pass; otherwise the
        // catch-up snapshot would silently go stale.
        self.save_applied_spec(namespace, name, component).await?;

        // 1. A reconciliation error wins over everything.
        if let Some(err) = err {
            let status = ComponentStatus::error(
                RECONCILE_ERROR_REASON,
                &err.to_string(),
                err.status_code(),
            );
            self.persist(namespace, name, status).await?;
            return Ok(());
        }

        // 2. Cluster resources only converge through aggregation or an
        //    explicit business override carried by the result.
        if component.is_cluster_resource() && result.status.is_none() {
            debug!(
                "Cluster resource {}/{} status left to aggregation",
                namespace, name
            );
            return Ok(());
        }

        let mut current = component.status.clone().unwrap_or_default();
        let mut working = current.clone();

        // 3. Business override.
        if let Some(override_status) = &result.status {
            if result.force_status {
                self.persist(namespace, name, override_status.clone()).await?;
                return Ok(());
            }
            if !override_status.differs_from(&current) {
                return Ok(());
            }
            self.persist(namespace, name, override_status.clone()).await?;
            working = override_status.clone();
            current = override_status.clone();
        }

        if component.is_cluster_resource() {
            // Pod readiness never drives cluster-resource status.
            return Ok(());
        }

        // 4. Workload readiness, once at least one instance exists.
        let (replicas, ready) = self.workloads.replica_counts(component).await?;
        let mut decided = false;
        if replicas > 0 {
            working.condition = if ready == replicas {
                ComponentConditionType::Deployed
            } else {
                ComponentConditionType::Deploying
            };
            working.reason = String::new();
            working.message = String::new();
            working.error_code = None;
            decided = true;
        }

        // 5. Bootstrap gate: a node resource without its genesis artifact
        //    stays precreated. First match wins, so readiness takes priority
        //    once instances exist.
        let bootstrapless = component.spec.prevent_genesis.unwrap_or(false);
        if !decided && !bootstrapless {
            let genesis = format!("{name}-genesis");
            if !self.secrets.exists(namespace, &genesis).await? {
                working.condition = ComponentConditionType::Precreated;
                working.reason = String::new();
                working.message = String::new();
                working.error_code = None;
            }
        }

        // 6. Persist only on an observable change.
        if working.differs_from(&current) {
            self.persist(namespace, name, working).await?;
        }
        Ok(())
    }

    /// Writes the status with a fresh heartbeat, retrying conflicts up to
    /// [`PERSIST_RETRIES`] times before surfacing failure.
    async fn save_applied_spec(
        &self,
        namespace: &str,
        name: &str,
        component: &LedgerComponent,
    ) -> Result<(), ControllerError> {
        let mut attempt = 0;
        loop {
            match self.specs.save(namespace, name, &component.spec).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_conflict() && attempt < PERSIST_RETRIES => {
                    attempt += 1;
                    debug!(
                        "Last-applied-spec write conflict for {}/{} (attempt {}), retrying",
                        namespace, name, attempt
                    );
                }
                Err(e) => {
                    warn!(
                        "Failed to record last-applied spec for {}/{}: {}",
                        namespace, name, e
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn persist(
        &self,
        namespace: &str,
        name: &str,
        mut status: ComponentStatus,
    ) -> Result<(), ControllerError> {
        status.last_heartbeat_time = Some(Utc::now());
        let mut attempt = 0;
        loop {
            match self.components.patch_status(namespace, name, &status).await {
                Ok(()) => {
                    info!(
                        "Persisted status {:?} for {}/{}",
                        status.condition, namespace, name
                    );
                    return Ok(());
                }
                Err(e) if e.is_conflict() && attempt < PERSIST_RETRIES => {
                    attempt += 1;
                    debug!(
                        "Status write conflict for {}/{} (attempt {}), retrying",
                        namespace, name, attempt
                    );
                }
                Err(e) => {
                    return Err(ControllerError::StatusPersist(format!(
                        "{namespace}/{name}: {e}"
                    )));
                }
            }
        }
    }

    /// Forces an Error status outside a reconciliation pass, bypassing the
    /// intent queue. Used when create-admission fails.
    pub async fn force_error(
        &self,
        namespace: &str,
        name: &str,
        reason: &str,
        message: &str,
        code: u32,
    ) -> Result<(), ControllerError> {
        self.persist(namespace, name, ComponentStatus::error(reason, message, code))
            .await
    }
}
