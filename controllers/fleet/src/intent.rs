//! Remediation intents.
//!
//! An [`Intent`] records which categories of change a component experienced,
//! as an immutable set of named boolean flags. The change classifier produces
//! intents, the intent queue deduplicates and orders them, and the business
//! reconciler consumes them one at a time.

/// A deduplicated record of which category of change a resource experienced.
///
/// Two intents are equal iff all flags match; an intent with no flag set is
/// empty and carries no remediation obligation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intent {
    /// Spec fields (excluding overrides) changed
    pub spec_changed: bool,
    /// Configuration override payload changed
    pub overrides_changed: bool,
    /// TLS signing certificate content changed
    pub tls_cert_updated: bool,
    /// Enrollment certificate content changed
    pub ecert_updated: bool,
    /// User requested a restart
    pub restart_requested: bool,
    /// User requested enrollment-certificate re-enrollment
    pub reenroll_ecert: bool,
    /// User requested enrollment-certificate re-enrollment with a new key
    pub reenroll_ecert_new_key: bool,
    /// User requested TLS-certificate re-enrollment
    pub reenroll_tls_cert: bool,
    /// User requested TLS-certificate re-enrollment with a new key
    pub reenroll_tls_cert_new_key: bool,
    /// User requested a fresh enrollment certificate
    pub enroll_ecert: bool,
    /// User requested a fresh TLS certificate
    pub enroll_tls_cert: bool,
    /// Version transition mandates the v2 structural migration
    pub migrate_to_v2: bool,
    /// Version transition mandates the v2.4 structural migration
    pub migrate_to_v24: bool,
    /// Version transition mandates the v2.5 structural migration
    pub migrate_to_v25: bool,
    /// Node organizational unit toggle changed
    pub node_ou_updated: bool,
    /// Observable status triple changed
    pub status_changed: bool,
    /// Container image references changed
    pub images_changed: bool,
    /// Declared ledger version changed
    pub fabric_version_changed: bool,
    /// Membership credential specification changed
    pub msp_changed: bool,
    /// A TLS signing-cert secret was created for this component
    pub tls_cert_created: bool,
    /// An enrollment signing-cert secret was created for this component
    pub ecert_created: bool,
}

impl Intent {
    /// True iff no flag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// ORs another intent's flags into this one.
    pub fn merge(&mut self, other: &Self) {
        self.spec_changed |= other.spec_changed;
        self.overrides_changed |= other.overrides_changed;
        self.tls_cert_updated |= other.tls_cert_updated;
        self.ecert_updated |= other.ecert_updated;
        self.restart_requested |= other.restart_requested;
        self.reenroll_ecert |= other.reenroll_ecert;
        self.reenroll_ecert_new_key |= other.reenroll_ecert_new_key;
        self.reenroll_tls_cert |= other.reenroll_tls_cert;
        self.reenroll_tls_cert_new_key |= other.reenroll_tls_cert_new_key;
        self.enroll_ecert |= other.enroll_ecert;
        self.enroll_tls_cert |= other.enroll_tls_cert;
        self.migrate_to_v2 |= other.migrate_to_v2;
        self.migrate_to_v24 |= other.migrate_to_v24;
        self.migrate_to_v25 |= other.migrate_to_v25;
        self.node_ou_updated |= other.node_ou_updated;
        self.status_changed |= other.status_changed;
        self.images_changed |= other.images_changed;
        self.fabric_version_changed |= other.fabric_version_changed;
        self.msp_changed |= other.msp_changed;
        self.tls_cert_created |= other.tls_cert_created;
        self.ecert_created |= other.ecert_created;
    }
}
