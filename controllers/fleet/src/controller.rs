//! Main controller implementation.
//!
//! Wires the shared intent queue, the staggered restart admission gate, the
//! status arbitrator and the dispatcher together, then runs the watch loops
//! until one of them exits.

use crate::arbitrator::Arbitrator;
use crate::backup::BackupRotator;
use crate::dispatcher::Dispatcher;
use crate::error::ControllerError;
use crate::queue::IntentQueue;
use crate::restart::RestartAdmission;
use crate::stores::{
    BusinessReconciler, KubeComponentStore, KubeCoordStore, KubeSecretStore, KubeSpecStore,
    KubeWorkloadProbe,
};
use crate::watcher::Watcher;
use chrono::Duration as ChronoDuration;
use crds::LedgerComponent;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for managed ledger components.
pub struct Controller {
    component_watcher: JoinHandle<Result<(), ControllerError>>,
    coordination_watcher: JoinHandle<Result<(), ControllerError>>,
    component_classifier: JoinHandle<Result<(), ControllerError>>,
    secret_classifier: JoinHandle<Result<(), ControllerError>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a new controller instance.
    ///
    /// The business reconciler is injected: per-kind remediation logic
    /// lives outside the reconciliation core.
    pub async fn new(
        namespace: Option<String>,
        cooldown_minutes: i64,
        business: Arc<dyn BusinessReconciler>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing fleet controller");

        let client = Client::try_default().await?;
        let ns = namespace.as_deref().unwrap_or("default");

        let component_api: Api<LedgerComponent> = Api::namespaced(client.clone(), ns);
        let secret_api: Api<Secret> = Api::namespaced(client.clone(), ns);
        let configmap_api: Api<ConfigMap> = Api::namespaced(client.clone(), ns);

        let components = Arc::new(KubeComponentStore::new(client.clone()));
        let secrets = Arc::new(KubeSecretStore::new(client.clone()));
        let specs = Arc::new(KubeSpecStore::new(client.clone()));
        let coordination = Arc::new(KubeCoordStore::new(client.clone()));
        let workloads = Arc::new(KubeWorkloadProbe::new(client));

        let arbitrator = Arbitrator::new(
            components.clone(),
            secrets.clone(),
            workloads,
            specs.clone(),
        );
        let restart = Arc::new(RestartAdmission::new(
            coordination,
            ChronoDuration::minutes(cooldown_minutes),
        ));
        let queue = Arc::new(IntentQueue::new());
        let backups = BackupRotator::new(secrets);
        let dispatcher = Arc::new(Dispatcher::new(
            components,
            specs,
            queue,
            restart,
            business,
            arbitrator,
            backups,
        ));

        let watcher = Arc::new(Watcher::new(
            dispatcher,
            component_api,
            secret_api,
            configmap_api,
        ));

        let component_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_components().await })
        };
        let coordination_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_coordination().await })
        };
        let component_classifier = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.classify_components().await })
        };
        let secret_classifier =
            tokio::spawn(async move { watcher.classify_secrets().await });

        Ok(Self {
            component_watcher,
            coordination_watcher,
            component_classifier,
            secret_classifier,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Fleet controller running");

        // The watch loops run forever; any exit is a failure worth surfacing.
        tokio::select! {
            result = &mut self.component_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("component watcher panicked: {e}")))?
                    .map_err(|e| ControllerError::Watch(format!("component watcher error: {e}")))?;
            }
            result = &mut self.coordination_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("coordination watcher panicked: {e}")))?
                    .map_err(|e| ControllerError::Watch(format!("coordination watcher error: {e}")))?;
            }
            result = &mut self.component_classifier => {
                result.map_err(|e| ControllerError::Watch(format!("component classifier panicked: {e}")))?
                    .map_err(|e| ControllerError::Watch(format!("component classifier error: {e}")))?;
            }
            result = &mut self.secret_classifier => {
                result.map_err(|e| ControllerError::Watch(format!("secret classifier panicked: {e}")))?
                    .map_err(|e| ControllerError::Watch(format!("secret classifier error: {e}")))?;
            }
        }

        Ok(())
    }
}
