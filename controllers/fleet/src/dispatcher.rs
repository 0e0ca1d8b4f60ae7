//! Reconciliation dispatch.
//!
//! One invocation per resource identity, serialized by the watch runtime.
//! The dispatcher special-cases the reserved restart-coordination objects,
//! validates structural invariants, pops one intent, runs the business
//! reconciler, feeds the outcome to the status arbitrator and decides the
//! requeue.

use crate::arbitrator::Arbitrator;
use crate::backup::{BackupRotator, CredentialKind};
use crate::classifier;
use crate::error::ControllerError;
use crate::intent::Intent;
use crate::queue::IntentQueue;
use crate::restart::{Admission, RestartAdmission};
use crate::stores::{BusinessReconciler, ComponentStore, ReconcileResult, SpecStore};
use chrono::Utc;
use crds::{ComponentKind, LedgerComponent, codes};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Requeue decision for one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Run another pass immediately
    pub requeue: bool,
    /// Delay preference when not requeueing immediately
    pub requeue_after: Option<Duration>,
}

impl DispatchOutcome {
    fn requeue_now() -> Self {
        Self {
            requeue: true,
            requeue_after: None,
        }
    }
}

/// Restart reason recorded for user-requested restarts.
const USER_RESTART_REASON: &str = "user";

/// Longest name accepted for a component (DNS-1123 label bound).
const MAX_NAME_LEN: usize = 63;

/// The reconciliation control loop.
pub struct Dispatcher {
    components: Arc<dyn ComponentStore>,
    specs: Arc<dyn SpecStore>,
    queue: Arc<IntentQueue>,
    restart: Arc<RestartAdmission>,
    business: Arc<dyn BusinessReconciler>,
    arbitrator: Arbitrator,
    backups: BackupRotator,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over the injected collaborators.
    pub fn new(
        components: Arc<dyn ComponentStore>,
        specs: Arc<dyn SpecStore>,
        queue: Arc<IntentQueue>,
        restart: Arc<RestartAdmission>,
        business: Arc<dyn BusinessReconciler>,
        arbitrator: Arbitrator,
        backups: BackupRotator,
    ) -> Self {
        Self {
            components,
            specs,
            queue,
            restart,
            business,
            arbitrator,
            backups,
        }
    }

    /// The shared intent queue, for the classification side.
    #[must_use]
    pub fn queue(&self) -> Arc<IntentQueue> {
        Arc::clone(&self.queue)
    }

    /// Runs one dispatch pass for the identity `namespace/name`.
    pub async fn dispatch(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<DispatchOutcome, ControllerError> {
        // 1. Reserved restart-coordination objects bypass everything else.
        if let Some(kind) = ComponentKind::from_coordination_name(name) {
            let more = self.restart.reconcile(namespace, kind, Utc::now()).await?;
            return Ok(DispatchOutcome {
                requeue: more,
                requeue_after: None,
            });
        }

        // 2. Fetch; a missing resource is already deleted.
        let Some(component) = self.components.get(namespace, name).await? else {
            debug!("Component {}/{} gone, nothing to dispatch", namespace, name);
            return Ok(DispatchOutcome::default());
        };

        // 3. Structural invariants; a violation is terminal.
        if let Err(validation) = validate(&component) {
            warn!("Component {}/{} invalid: {}", namespace, name, validation);
            self.arbitrator
                .arbitrate(&component, &ReconcileResult::default(), Some(&validation))
                .await?;
            return Ok(DispatchOutcome::default());
        }

        // 4. A converged cluster resource is driven by its nodes only.
        if component.is_cluster_resource()
            && component
                .status
                .as_ref()
                .is_some_and(|s| s.condition.is_terminal())
        {
            debug!(
                "Cluster resource {}/{} already terminal, suppressing reconcile",
                namespace, name
            );
            return Ok(DispatchOutcome::default());
        }

        // 5. One intent per pass.
        let key = format!("{namespace}/{name}");
        let mut intent = self.queue.pop(&key);

        // Restart requests pass through the staggered admission gate before
        // any workload disruption is allowed.
        if intent.restart_requested {
            let group = component.parent_name().unwrap_or("").to_string();
            let admission = self
                .restart
                .request_restart(
                    namespace,
                    component.spec.component_type,
                    &group,
                    name,
                    USER_RESTART_REASON,
                    Utc::now(),
                )
                .await?;
            if admission != Admission::Admitted {
                debug!(
                    "Restart of {}/{} not admitted ({:?}), deferring",
                    namespace, name, admission
                );
                intent.restart_requested = false;
            }
        }

        // Outgoing credential material is preserved before any replacement;
        // a failed backup aborts the pass so credentials are never replaced
        // unpreserved.
        self.backup_outgoing(namespace, name, &intent).await?;

        // 6. Business reconciliation.
        let (result, err) = match self.business.reconcile(&component, &intent).await {
            Ok(result) => (result, None),
            Err(e) => (ReconcileResult::default(), Some(e)),
        };

        // 7. Arbitrate; a status-persistence failure is fatal for this pass.
        self.arbitrator
            .arbitrate(&component, &result, err.as_ref())
            .await?;

        // 8. Breaking errors are terminal and already recorded in status;
        //    transient ones surface for the external retry machinery.
        if let Some(e) = err {
            if e.is_breaking() {
                info!(
                    "Breaking error for {}/{} recorded in status, not retrying: {}",
                    namespace, name, e
                );
            } else {
                return Err(e);
            }
        }

        // 9. Requeue while the backlog is non-empty, or when the business
        //    result wants another pass with the same intent. An empty intent
        //    never lands back in the queue, so the preference is honored
        //    independently of queue depth.
        if result.requeue {
            self.queue.push(&key, intent);
            return Ok(DispatchOutcome::requeue_now());
        }
        if !self.queue.is_empty(&key) {
            return Ok(DispatchOutcome::requeue_now());
        }
        Ok(DispatchOutcome {
            requeue: false,
            requeue_after: result.requeue_after,
        })
    }

    /// Rotates the backup history for every credential family the intent is
    /// about to replace.
    async fn backup_outgoing(
        &self,
        namespace: &str,
        name: &str,
        intent: &Intent,
    ) -> Result<(), ControllerError> {
        let tls_replaced =
            intent.reenroll_tls_cert || intent.reenroll_tls_cert_new_key || intent.enroll_tls_cert;
        if tls_replaced {
            self.backups
                .rotate_from_secret(
                    namespace,
                    name,
                    CredentialKind::Tls,
                    &format!("tls-{name}-signcert"),
                    Utc::now(),
                )
                .await?;
        }
        let ecert_replaced =
            intent.reenroll_ecert || intent.reenroll_ecert_new_key || intent.enroll_ecert;
        if ecert_replaced {
            self.backups
                .rotate_from_secret(
                    namespace,
                    name,
                    CredentialKind::Ecert,
                    &format!("ecert-{name}-signcert"),
                    Utc::now(),
                )
                .await?;
        }
        Ok(())
    }

    /// Admission for a freshly created component: enforces name uniqueness,
    /// then recovers intents missed while the controller was down by diffing
    /// against the last-applied spec snapshot.
    pub async fn admit_create(&self, component: &LedgerComponent) -> Result<bool, ControllerError> {
        let namespace = component.metadata.namespace.as_deref().unwrap_or("default");
        let Some(name) = component.metadata.name.as_deref() else {
            return Ok(false);
        };

        let existing = self.components.list(namespace).await?;
        if !classifier::name_is_unique(component, &existing) {
            warn!(
                "Component {}/{} duplicates an existing name, forcing Error",
                namespace, name
            );
            self.arbitrator
                .force_error(
                    namespace,
                    name,
                    "duplicateResourceName",
                    &format!("a component named {name} already exists in {namespace}"),
                    codes::DUPLICATE_NAME,
                )
                .await?;
            return Ok(false);
        }

        let last_applied = self.specs.load(namespace, name).await?;
        let (admit, intent) = classifier::classify_create(component, last_applied.as_ref());
        if admit {
            self.queue.push(&format!("{namespace}/{name}"), intent);
        }
        Ok(admit)
    }

    /// Cascade delete through explicit parent-label queries: removing the
    /// last node of a cluster removes the cluster resource, and removing the
    /// cluster resource removes all of its nodes.
    pub async fn handle_delete(&self, deleted: &LedgerComponent) -> Result<(), ControllerError> {
        let namespace = deleted.metadata.namespace.as_deref().unwrap_or("default");
        let Some(name) = deleted.metadata.name.as_deref() else {
            return Ok(());
        };

        if deleted.is_cluster_resource() {
            let children: Vec<String> = self
                .components
                .list(namespace)
                .await?
                .into_iter()
                .filter(|c| c.parent_name() == Some(name))
                .filter_map(|c| c.metadata.name)
                .collect();
            for child in children {
                info!(
                    "Cascading delete of {}/{} to node {}",
                    namespace, name, child
                );
                self.components.delete(namespace, &child).await?;
            }
            return Ok(());
        }

        if let Some(parent) = deleted.parent_name().map(str::to_string) {
            let siblings_remain = self
                .components
                .list(namespace)
                .await?
                .iter()
                .any(|c| {
                    !c.is_cluster_resource()
                        && c.parent_name() == Some(parent.as_str())
                        && c.metadata.name.as_deref() != Some(name)
                });
            if !siblings_remain {
                info!(
                    "Last node of {}/{} deleted, removing the cluster resource",
                    namespace, parent
                );
                self.components.delete(namespace, &parent).await?;
            }
        }
        Ok(())
    }
}

/// Structural invariants checked before any business logic runs.
fn validate(component: &LedgerComponent) -> Result<(), ControllerError> {
    let name = component
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::Validation("component has no name".to_string()))?;
    if name.len() > MAX_NAME_LEN {
        return Err(ControllerError::Validation(format!(
            "name {name} exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ControllerError::Validation(format!(
            "name {name} is not a valid DNS-1123 label"
        )));
    }
    if let Some(overrides) = &component.spec.config_overrides {
        if !overrides.is_object() {
            return Err(ControllerError::Validation(
                "configOverrides must be a JSON object".to_string(),
            ));
        }
    }
    Ok(())
}
