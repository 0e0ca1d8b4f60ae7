//! Staggered restart admission.
//!
//! Cross-resource admission gate that prevents restart storms: at most one
//! instance per affinity group is mid-restart at a time, and repeat restarts
//! of the same instance for the same reason are suppressed within a cooldown
//! window. State is persisted as a single shared record per component kind,
//! updated read-modify-write with a bounded conflict retry.

use crate::error::ControllerError;
use crate::stores::CoordStore;
use chrono::{DateTime, Duration, Utc};
use crds::ComponentKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Default cooldown between restarts of one instance for one reason.
pub const DEFAULT_COOLDOWN_MINUTES: i64 = 10;

/// Reasons per instance kept in the log before the oldest is evicted.
const MAX_LOG_REASONS: usize = 10;

/// Reason recorded when an instance is admitted from the queue head rather
/// than from a direct request.
const QUEUED_RESTART_REASON: &str = "restart";

/// Outcome of a restart request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The restart may proceed now
    Admitted,
    /// Another instance in the group is mid-restart; queued for later
    Queued,
    /// Within the cooldown window; recorded as pending, not acted upon
    Denied,
}

/// Status of a logged restart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RestartStatus {
    /// The restart was admitted at `timestamp`
    Admitted,
    /// A repeat request arrived inside the cooldown window and waits for
    /// the instance's next natural reconciliation
    Pending,
}

/// Last restart for one (instance, reason) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartRecord {
    /// When the restart was admitted
    pub timestamp: DateTime<Utc>,
    /// Admitted or pending
    pub status: RestartStatus,
}

/// Shared coordination record for one component kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartState {
    /// Affinity group -> ordered pending instance names
    #[serde(default)]
    pub queues: HashMap<String, Vec<String>>,

    /// Instance -> reason -> last restart
    #[serde(default)]
    pub log: HashMap<String, HashMap<String, RestartRecord>>,

    /// Version of the stored record this state was loaded from. Carried from
    /// load to save so stale writes surface as conflicts instead of
    /// clobbering a concurrent writer. Not part of the record payload.
    #[serde(skip)]
    pub resource_version: Option<String>,
}

impl RestartState {
    /// Applies one restart request to the state. Pure; persistence is the
    /// caller's concern.
    pub fn request(
        &mut self,
        group: &str,
        instance: &str,
        reason: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Admission {
        if let Some(record) = self.log.get(instance).and_then(|by_reason| by_reason.get(reason)) {
            if now - record.timestamp < cooldown {
                // Mark pending so the request is retried on the instance's
                // next natural reconciliation; the cooldown clock keeps
                // running from the admitted restart.
                if let Some(by_reason) = self.log.get_mut(instance) {
                    if let Some(record) = by_reason.get_mut(reason) {
                        record.status = RestartStatus::Pending;
                    }
                }
                return Admission::Denied;
            }
        }

        // The queue head is the instance currently holding the group's
        // restart slot; it is released by the coordination reconcile.
        let queue = self.queues.entry(group.to_string()).or_default();
        match queue.first() {
            None => {
                queue.push(instance.to_string());
                self.record(instance, reason, now);
                Admission::Admitted
            }
            Some(head) if head == instance => {
                self.record(instance, reason, now);
                Admission::Admitted
            }
            Some(_) => {
                if !queue.iter().any(|queued| queued == instance) {
                    queue.push(instance.to_string());
                }
                Admission::Queued
            }
        }
    }

    /// Releases each group's restart slot and admits the next waiter, which
    /// takes the slot in turn. Returns true iff any queue still has entries
    /// afterwards, so the caller knows to requeue the coordination object.
    pub fn reconcile_queues(&mut self, now: DateTime<Utc>) -> bool {
        let mut admitted = Vec::new();
        for queue in self.queues.values_mut() {
            if !queue.is_empty() {
                queue.remove(0);
            }
            if let Some(next) = queue.first() {
                admitted.push(next.clone());
            }
        }
        for instance in admitted {
            // Promote any pending reasons; otherwise log a plain restart.
            let pending: Vec<String> = self
                .log
                .get(&instance)
                .map(|by_reason| {
                    by_reason
                        .iter()
                        .filter(|(_, r)| r.status == RestartStatus::Pending)
                        .map(|(reason, _)| reason.clone())
                        .collect()
                })
                .unwrap_or_default();
            if pending.is_empty() {
                self.record(&instance, QUEUED_RESTART_REASON, now);
            } else {
                for reason in pending {
                    self.record(&instance, &reason, now);
                }
            }
            info!("Admitted queued restart for {}", instance);
        }
        self.queues.values().any(|q| !q.is_empty())
    }

    fn record(&mut self, instance: &str, reason: &str, now: DateTime<Utc>) {
        let by_reason = self.log.entry(instance.to_string()).or_default();
        if by_reason.len() >= MAX_LOG_REASONS && !by_reason.contains_key(reason) {
            // Evict the oldest reason to keep the per-instance history capped.
            if let Some(oldest) = by_reason
                .iter()
                .min_by_key(|(_, r)| r.timestamp)
                .map(|(k, _)| k.clone())
            {
                by_reason.remove(&oldest);
            }
        }
        by_reason.insert(
            reason.to_string(),
            RestartRecord {
                timestamp: now,
                status: RestartStatus::Admitted,
            },
        );
    }
}

/// Store-backed admission gate, one shared record per component kind.
pub struct RestartAdmission {
    store: Arc<dyn CoordStore>,
    cooldown: Duration,
}

impl std::fmt::Debug for RestartAdmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartAdmission")
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

/// Bounded retries for read-modify-write conflicts on the shared record.
const CONFLICT_RETRIES: usize = 2;

impl RestartAdmission {
    /// Creates an admission gate over the given coordination store.
    pub fn new(store: Arc<dyn CoordStore>, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    /// Requests a restart of `instance` within `group`, for `reason`.
    pub async fn request_restart(
        &self,
        namespace: &str,
        kind: ComponentKind,
        group: &str,
        instance: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Admission, ControllerError> {
        let mut attempt = 0;
        loop {
            let mut state = self.store.load(namespace, kind).await?;
            let admission = state.request(group, instance, reason, now, self.cooldown);
            match self.store.save(namespace, kind, &state).await {
                Ok(()) => {
                    debug!(
                        "Restart request {}/{} ({}, reason {}): {:?}",
                        namespace, instance, kind, reason, admission
                    );
                    return Ok(admission);
                }
                Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Admits the head of each group's queue. Returns true iff further work
    /// remains, so the caller knows to requeue the coordination object.
    pub async fn reconcile(
        &self,
        namespace: &str,
        kind: ComponentKind,
        now: DateTime<Utc>,
    ) -> Result<bool, ControllerError> {
        let mut attempt = 0;
        loop {
            let mut state = self.store.load(namespace, kind).await?;
            let more = state.reconcile_queues(now);
            match self.store.save(namespace, kind, &state).await {
                Ok(()) => return Ok(more),
                Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
