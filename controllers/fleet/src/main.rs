//! Fleet Controller
//!
//! Reconciliation core for a fleet of managed ledger network components
//! (certificate authorities, peers, orderers, console nodes). The controller
//! classifies change events into remediation intents, serializes them per
//! resource, arbitrates observable status, throttles disruptive restarts
//! and detects version transitions that mandate migration or credential
//! re-issuance.

mod arbitrator;
mod backup;
#[cfg(test)]
mod backup_test;
mod classifier;
#[cfg(test)]
mod classifier_test;
mod controller;
mod dispatcher;
mod error;
mod intent;
mod queue;
mod restart;
mod stores;
#[cfg(test)]
mod stores_test;
#[cfg(test)]
mod test_utils;
mod transition;
mod watcher;

use crate::controller::Controller;
use crate::error::ControllerError;
use crate::intent::Intent;
use crate::stores::{BusinessReconciler, ReconcileResult};
use anyhow::Result;
use async_trait::async_trait;
use crds::LedgerComponent;
use std::env;
use std::sync::Arc;
use tracing::info;

/// Placeholder business reconciler used until the per-kind reconcilers are
/// linked in: acknowledges every intent and logs it.
#[derive(Debug, Default)]
struct AcknowledgingReconciler;

#[async_trait]
impl BusinessReconciler for AcknowledgingReconciler {
    async fn reconcile(
        &self,
        component: &LedgerComponent,
        intent: &Intent,
    ) -> Result<ReconcileResult, ControllerError> {
        info!(
            "Acknowledged intent {:?} for {:?}",
            intent, component.metadata.name
        );
        Ok(ReconcileResult::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting fleet controller");

    // Load configuration from environment variables
    let namespace = env::var("WATCH_NAMESPACE").ok();
    let cooldown_minutes = env::var("RESTART_COOLDOWN_MINUTES")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(crate::restart::DEFAULT_COOLDOWN_MINUTES);

    info!("Configuration:");
    info!(
        "  Namespace: {}",
        namespace.as_deref().unwrap_or("default")
    );
    info!("  Restart cooldown: {} minutes", cooldown_minutes);

    let controller = Controller::new(
        namespace,
        cooldown_minutes,
        Arc::new(AcknowledgingReconciler),
    )
    .await?;
    controller.run().await?;

    Ok(())
}
