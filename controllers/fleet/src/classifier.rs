//! Change-intent classification.
//!
//! Turns raw watch events (old/new snapshots of a component, or of its
//! dependent secrets) into remediation intents. Every rule is an explicit
//! per-field comparator; which nested fields count as "spec changed" is
//! spelled out here rather than left to deep equality.

use crate::intent::Intent;
use crate::transition;
use crds::{LedgerComponent, LedgerComponentSpec, PARENT_LABEL};
use k8s_openapi::api::core::v1::Secret;
use tracing::{debug, warn};

/// Kind of recognized signing-certificate secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningSecretKind {
    /// `tls-<owner>-signcert`
    Tls,
    /// `ecert-<owner>-signcert`
    Ecert,
}

/// Classifies an update event on the primary resource.
///
/// Returns `(admit, intent)`. A rejected event (`admit == false`) is never
/// queued; immutable-field violations reject regardless of any other flags.
#[must_use]
pub fn classify_update(old: &LedgerComponent, new: &LedgerComponent) -> (bool, Intent) {
    // Zone and region are immutable once set. A change invalidates the
    // whole event, independent of anything else it carries.
    if old.spec.zone != new.spec.zone || old.spec.region != new.spec.region {
        warn!(
            "Rejecting update of {:?}: zone/region are immutable",
            new.metadata.name
        );
        return (false, Intent::default());
    }

    let mut intent = diff_specs(&old.spec, &new.spec, true);

    // Status triple changes are observable; heartbeat-only mutations are not.
    match (&old.status, &new.status) {
        (Some(old_status), Some(new_status)) => {
            if old_status.differs_from(new_status) {
                intent.status_changed = true;
            } else if old_status.heartbeat_only_change(new_status) && intent.is_empty() {
                debug!(
                    "Heartbeat-only status change on {:?}, ignoring",
                    new.metadata.name
                );
                return (false, Intent::default());
            }
        }
        (None, Some(_)) | (Some(_), None) => intent.status_changed = true,
        (None, None) => {}
    }

    let admit = !intent.is_empty();
    (admit, intent)
}

/// Classifies a freshly observed component against the side-persisted
/// last-applied spec, recovering intents missed while the controller was
/// down. With no snapshot to diff against, conservatively forces one full
/// reconciliation with an empty intent.
#[must_use]
pub fn classify_create(
    new: &LedgerComponent,
    last_applied: Option<&LedgerComponentSpec>,
) -> (bool, Intent) {
    let Some(previous) = last_applied else {
        debug!(
            "No last-applied spec for {:?}, forcing reconciliation",
            new.metadata.name
        );
        return (true, Intent::default());
    };

    if previous.zone != new.spec.zone || previous.region != new.spec.region {
        warn!(
            "Rejecting catch-up of {:?}: zone/region are immutable",
            new.metadata.name
        );
        return (false, Intent::default());
    }

    let intent = diff_specs(previous, &new.spec, false);
    (true, intent)
}

/// Explicit per-field spec comparison. `images_unconditional` is false on
/// the creation catch-up path, where the previous image reference must be
/// present before the rule is evaluated (an operator-restart artifact, not
/// a user change).
fn diff_specs(old: &LedgerComponentSpec, new: &LedgerComponentSpec, images_unconditional: bool) -> Intent {
    let mut intent = Intent::default();

    let mut spec_changed = false;
    spec_changed |= old.node_number != new.node_number;
    spec_changed |= old.disable_node_ou != new.disable_node_ou;
    spec_changed |= old.prevent_genesis != new.prevent_genesis;
    spec_changed |= old.fabric_version != new.fabric_version;
    spec_changed |= old.images != new.images;
    spec_changed |= old.msp != new.msp;
    spec_changed |= old.actions != new.actions;
    intent.spec_changed = spec_changed;

    intent.overrides_changed = old.config_overrides != new.config_overrides;

    if images_unconditional || old.images.is_some() {
        intent.images_changed = old.images != new.images;
    }

    if old.fabric_version != new.fabric_version {
        intent.fabric_version_changed = true;
        let previous = (!old.fabric_version.is_empty()).then_some(old.fabric_version.as_str());
        intent.merge(&transition::transition(previous, &new.fabric_version));
    }

    intent.msp_changed = old.msp != new.msp;
    intent.node_ou_updated = old.disable_node_ou != new.disable_node_ou;

    // Restart and enroll requests are level-triggered; re-enroll requests
    // fire on any flip of the flag.
    intent.restart_requested = new.actions.restart;
    intent.enroll_ecert = new.actions.enroll.ecert;
    intent.enroll_tls_cert = new.actions.enroll.tls_cert;
    intent.reenroll_ecert = old.actions.reenroll.ecert != new.actions.reenroll.ecert;
    intent.reenroll_ecert_new_key =
        old.actions.reenroll.ecert_new_key != new.actions.reenroll.ecert_new_key;
    intent.reenroll_tls_cert = old.actions.reenroll.tls_cert != new.actions.reenroll.tls_cert;
    intent.reenroll_tls_cert_new_key =
        old.actions.reenroll.tls_cert_new_key != new.actions.reenroll.tls_cert_new_key;

    intent
}

/// Parses a signing-cert secret name: `tls-<owner>-signcert` or
/// `ecert-<owner>-signcert`. Returns the kind and owner name.
#[must_use]
pub fn signing_secret_kind(name: &str) -> Option<(SigningSecretKind, &str)> {
    let owner = name.strip_suffix("-signcert")?;
    if let Some(owner) = owner.strip_prefix("tls-") {
        (!owner.is_empty()).then_some((SigningSecretKind::Tls, owner))
    } else if let Some(owner) = owner.strip_prefix("ecert-") {
        (!owner.is_empty()).then_some((SigningSecretKind::Ecert, owner))
    } else {
        None
    }
}

/// Owner of a dependent secret, from its parent label.
#[must_use]
pub fn secret_owner(secret: &Secret) -> Option<&str> {
    secret
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(PARENT_LABEL))
        .map(String::as_str)
}

/// Classifies creation of a dependent secret. Only recognized signing-cert
/// secrets with their owner linkage intact are admitted.
#[must_use]
pub fn classify_secret_create(secret: &Secret) -> (bool, Intent) {
    let Some(name) = secret.metadata.name.as_deref() else {
        return (false, Intent::default());
    };
    let Some((kind, owner)) = signing_secret_kind(name) else {
        return (false, Intent::default());
    };
    if secret_owner(secret) != Some(owner) {
        debug!("Secret {} lacks its owner linkage, ignoring", name);
        return (false, Intent::default());
    }

    let mut intent = Intent::default();
    match kind {
        SigningSecretKind::Tls => intent.tls_cert_created = true,
        SigningSecretKind::Ecert => intent.ecert_created = true,
    }
    (true, intent)
}

/// Classifies a content change on a dependent secret. Non-cert secrets and
/// byte-identical payloads yield nothing.
#[must_use]
pub fn classify_secret_update(old: &Secret, new: &Secret) -> (bool, Intent) {
    let Some(name) = new.metadata.name.as_deref() else {
        return (false, Intent::default());
    };
    let Some((kind, _)) = signing_secret_kind(name) else {
        return (false, Intent::default());
    };

    let old_cert = old
        .data
        .as_ref()
        .and_then(|d| d.get("cert.pem"))
        .map(|b| &b.0);
    let new_cert = new
        .data
        .as_ref()
        .and_then(|d| d.get("cert.pem"))
        .map(|b| &b.0);
    if old_cert == new_cert {
        return (false, Intent::default());
    }

    let mut intent = Intent::default();
    match kind {
        SigningSecretKind::Tls => intent.tls_cert_updated = true,
        SigningSecretKind::Ecert => intent.ecert_updated = true,
    }
    (true, intent)
}

/// Name-uniqueness check for a freshly created component: no other existing
/// component in the namespace may carry the same name. Failing components
/// have their status forced to Error by the caller, bypassing the queue.
#[must_use]
pub fn name_is_unique(new: &LedgerComponent, existing: &[LedgerComponent]) -> bool {
    let Some(name) = new.metadata.name.as_deref() else {
        return false;
    };
    !existing.iter().any(|other| {
        other.metadata.name.as_deref() == Some(name)
            && other.metadata.uid != new.metadata.uid
    })
}
