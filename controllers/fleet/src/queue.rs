//! Per-resource intent queue.
//!
//! One queue per controller process, shared between the classifier (push)
//! and the dispatcher (pop). A single lock guards the whole map: contention
//! is low and atomicity matters more than throughput here.

use crate::intent::Intent;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, warn};

/// FIFO of deduplicated intents, keyed by `namespace/name`.
///
/// Entries are created lazily and drained to an empty deque rather than
/// removed, which keeps concurrent access simple. Exact-duplicate intents
/// are suppressed, bounding each queue to the number of distinct intent
/// shapes actually encountered.
#[derive(Debug, Default)]
pub struct IntentQueue {
    inner: Mutex<HashMap<String, VecDeque<Intent>>>,
}

impl IntentQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an intent for `key` unless it is empty or an exact-equal
    /// intent is already queued anywhere in the key's sequence.
    pub fn push(&self, key: &str, intent: Intent) {
        if intent.is_empty() {
            return;
        }
        match self.inner.lock() {
            Ok(mut map) => {
                let queue = map.entry(key.to_string()).or_default();
                if queue.contains(&intent) {
                    debug!("Duplicate intent for {} suppressed", key);
                    return;
                }
                queue.push_back(intent);
                debug!("Queued intent for {} (depth {})", key, queue.len());
            }
            Err(e) => warn!("Intent queue lock poisoned, dropping push for {}: {}", key, e),
        }
    }

    /// Removes and returns the oldest intent for `key`, or an empty intent
    /// if none is queued. Never blocks, never errors.
    #[must_use]
    pub fn pop(&self, key: &str) -> Intent {
        match self.inner.lock() {
            Ok(mut map) => map
                .get_mut(key)
                .and_then(VecDeque::pop_front)
                .unwrap_or_default(),
            Err(e) => {
                warn!("Intent queue lock poisoned on pop for {}: {}", key, e);
                Intent::default()
            }
        }
    }

    /// Read-only inspection. Out-of-range indexes return an empty intent.
    #[must_use]
    pub fn peek(&self, key: &str, index: usize) -> Intent {
        match self.inner.lock() {
            Ok(map) => map
                .get(key)
                .and_then(|q| q.get(index))
                .cloned()
                .unwrap_or_default(),
            Err(e) => {
                warn!("Intent queue lock poisoned on peek for {}: {}", key, e);
                Intent::default()
            }
        }
    }

    /// Number of intents currently queued for `key`.
    #[must_use]
    pub fn len(&self, key: &str) -> usize {
        match self.inner.lock() {
            Ok(map) => map.get(key).map_or(0, VecDeque::len),
            Err(_) => 0,
        }
    }

    /// True iff no intent is queued for `key`.
    #[must_use]
    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }
}
