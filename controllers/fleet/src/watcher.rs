//! Kubernetes resource watchers.
//!
//! Two layers share the intent queue:
//! - classification streams consume raw watch events, keep the previous
//!   snapshot of every object and feed old/new pairs through the classifier;
//! - a `kube_runtime::Controller` drives the dispatcher, with dependent
//!   secrets mapped back to their owning component and the reserved
//!   restart-coordination objects handled by their own controller.
//!
//! The worker pool behind `Controller` guarantees at most one concurrent
//! dispatch per resource identity.

use crate::classifier;
use crate::dispatcher::Dispatcher;
use crate::error::ControllerError;
use crds::{LedgerComponent, PARENT_LABEL, RESTART_COORD_LABEL};
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Api;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, controller::Action, watcher};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Backoff applied by the error policy before a failed dispatch is retried.
const ERROR_REQUEUE_SECS: u64 = 60;

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    dispatcher: Arc<Dispatcher>,
    component_api: Api<LedgerComponent>,
    secret_api: Api<Secret>,
    configmap_api: Api<ConfigMap>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

fn object_key(namespace: Option<&str>, name: Option<&str>) -> (String, String) {
    (
        namespace.unwrap_or("default").to_string(),
        name.unwrap_or_default().to_string(),
    )
}

fn action_for(outcome: crate::dispatcher::DispatchOutcome) -> Action {
    if outcome.requeue {
        Action::requeue(Duration::ZERO)
    } else if let Some(delay) = outcome.requeue_after {
        Action::requeue(delay)
    } else {
        Action::await_change()
    }
}

impl Watcher {
    /// Creates the watcher set over one namespace's APIs.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        component_api: Api<LedgerComponent>,
        secret_api: Api<Secret>,
        configmap_api: Api<ConfigMap>,
    ) -> Self {
        Self {
            dispatcher,
            component_api,
            secret_api,
            configmap_api,
        }
    }

    /// Dispatch loop for the primary kind. Dependent signing-cert secrets
    /// are mapped back to their owning component so a credential change
    /// triggers the owner's dispatch.
    pub async fn watch_components(&self) -> Result<(), ControllerError> {
        info!("Starting LedgerComponent dispatch controller");

        let dispatcher = Arc::clone(&self.dispatcher);
        let secret_config = watcher::Config::default().labels(PARENT_LABEL);

        let error_policy = |obj: Arc<LedgerComponent>, err: &ControllerError, _ctx: Arc<Dispatcher>| {
            error!("Dispatch error for {:?}: {}", obj.metadata.name, err);
            Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
        };

        let reconcile = |obj: Arc<LedgerComponent>, ctx: Arc<Dispatcher>| async move {
            let (namespace, name) =
                object_key(obj.metadata.namespace.as_deref(), obj.metadata.name.as_deref());
            debug!("Dispatching {}/{}", namespace, name);
            let outcome = ctx.dispatch(&namespace, &name).await?;
            Ok(action_for(outcome))
        };

        Controller::new(self.component_api.clone(), watcher::Config::default())
            .watches(self.secret_api.clone(), secret_config, |secret: Secret| {
                let namespace = secret.metadata.namespace.clone();
                let owner = secret
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(PARENT_LABEL))
                    .cloned();
                owner.map(|owner| {
                    let mut obj_ref = ObjectRef::new(&owner);
                    if let Some(ns) = namespace {
                        obj_ref = obj_ref.within(&ns);
                    }
                    obj_ref
                })
            })
            .run(reconcile, error_policy, dispatcher)
            .for_each(|res| async move {
                if let Err(e) = res {
                    error!("Component controller error: {}", e);
                }
            })
            .await;

        Ok(())
    }

    /// Dispatch loop for the reserved restart-coordination objects. The
    /// dispatcher delegates these entirely to the admission subsystem.
    pub async fn watch_coordination(&self) -> Result<(), ControllerError> {
        info!("Starting restart-coordination controller");

        let dispatcher = Arc::clone(&self.dispatcher);
        let config = watcher::Config::default().labels(RESTART_COORD_LABEL);

        let error_policy = |obj: Arc<ConfigMap>, err: &ControllerError, _ctx: Arc<Dispatcher>| {
            error!("Coordination error for {:?}: {}", obj.metadata.name, err);
            Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
        };

        let reconcile = |obj: Arc<ConfigMap>, ctx: Arc<Dispatcher>| async move {
            let (namespace, name) =
                object_key(obj.metadata.namespace.as_deref(), obj.metadata.name.as_deref());
            let outcome = ctx.dispatch(&namespace, &name).await?;
            Ok(action_for(outcome))
        };

        Controller::new(self.configmap_api.clone(), config)
            .run(reconcile, error_policy, dispatcher)
            .for_each(|res| async move {
                if let Err(e) = res {
                    error!("Coordination controller error: {}", e);
                }
            })
            .await;

        Ok(())
    }

    /// Classification stream for the primary kind: pairs each event with
    /// the previously seen snapshot and queues the resulting intents.
    pub async fn classify_components(&self) -> Result<(), ControllerError> {
        info!("Starting LedgerComponent classification stream");

        let queue = self.dispatcher.queue();
        let mut cache: HashMap<String, LedgerComponent> = HashMap::new();
        let mut stream = watcher(self.component_api.clone(), watcher::Config::default()).boxed();

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(e.to_string()))?
        {
            match event {
                watcher::Event::Apply(component) | watcher::Event::InitApply(component) => {
                    let (namespace, name) = object_key(
                        component.metadata.namespace.as_deref(),
                        component.metadata.name.as_deref(),
                    );
                    let key = format!("{namespace}/{name}");
                    match cache.get(&key) {
                        Some(previous) => {
                            let (admit, intent) = classifier::classify_update(previous, &component);
                            if admit {
                                queue.push(&key, intent);
                            }
                        }
                        None => {
                            // First sighting: creation or operator-restart
                            // catch-up against the last-applied spec.
                            if let Err(e) = self.dispatcher.admit_create(&component).await {
                                error!("Create admission failed for {}: {}", key, e);
                            }
                        }
                    }
                    cache.insert(key, component);
                }
                watcher::Event::Delete(component) => {
                    let (namespace, name) = object_key(
                        component.metadata.namespace.as_deref(),
                        component.metadata.name.as_deref(),
                    );
                    cache.remove(&format!("{namespace}/{name}"));
                    if let Err(e) = self.dispatcher.handle_delete(&component).await {
                        error!("Cascade delete failed for {}/{}: {}", namespace, name, e);
                    }
                }
                watcher::Event::Init | watcher::Event::InitDone => {}
            }
        }

        Ok(())
    }

    /// Classification stream for dependent signing-cert secrets.
    pub async fn classify_secrets(&self) -> Result<(), ControllerError> {
        info!("Starting dependent-secret classification stream");

        let queue = self.dispatcher.queue();
        let config = watcher::Config::default().labels(PARENT_LABEL);
        let mut cache: HashMap<String, Secret> = HashMap::new();
        let mut stream = watcher(self.secret_api.clone(), config).boxed();

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(e.to_string()))?
        {
            match event {
                watcher::Event::Apply(secret) | watcher::Event::InitApply(secret) => {
                    let (namespace, name) = object_key(
                        secret.metadata.namespace.as_deref(),
                        secret.metadata.name.as_deref(),
                    );
                    let cache_key = format!("{namespace}/{name}");
                    let (admit, intent) = match cache.get(&cache_key) {
                        Some(previous) => classifier::classify_secret_update(previous, &secret),
                        None => classifier::classify_secret_create(&secret),
                    };
                    if admit {
                        if let Some(owner) = classifier::secret_owner(&secret) {
                            queue.push(&format!("{namespace}/{owner}"), intent);
                        }
                    }
                    cache.insert(cache_key, secret);
                }
                watcher::Event::Delete(secret) => {
                    let (namespace, name) = object_key(
                        secret.metadata.namespace.as_deref(),
                        secret.metadata.name.as_deref(),
                    );
                    cache.remove(&format!("{namespace}/{name}"));
                }
                watcher::Event::Init | watcher::Event::InitDone => {}
            }
        }

        Ok(())
    }
}
