//! Version-transition analysis.
//!
//! Decides whether a declared-version change mandates a structural migration
//! or a forced TLS credential re-enrollment. Evaluated by the classifier only
//! when the version string actually changed.
//!
//! Range boundaries use tag-insensitive comparisons: `2.4.1-1` is on the
//! `>= 2.4.1` side of the boundary.

use crate::intent::Intent;
use crds::Version;
use tracing::debug;

const TLS_REISSUE_V1: Version = Version {
    major: 1,
    minor: 4,
    fixpack: 9,
    tag: 0,
};
const TLS_REISSUE_V2: Version = Version {
    major: 2,
    minor: 2,
    fixpack: 1,
    tag: 0,
};
const MIGRATE_V24: Version = Version {
    major: 2,
    minor: 4,
    fixpack: 1,
    tag: 0,
};
const MIGRATE_V25: Version = Version {
    major: 2,
    minor: 5,
    fixpack: 1,
    tag: 0,
};

/// Computes the migration and re-enrollment flags mandated by moving from
/// `old` (None when the version was never set) to `new`.
#[must_use]
pub fn transition(old: Option<&str>, new: &str) -> Intent {
    let new_v = Version::parse(new);
    let old_v = old.filter(|s| !s.is_empty()).map(Version::parse);

    let mut intent = Intent::default();

    let old_epoch1 = old_v.map(|o| o.major_release_epoch() == "1");
    let new_epoch2 = new_v.major_release_epoch() == "2";

    // Unset, or a 1.x release predating the TLS re-issue fixpack.
    let old_unset_or_pre_149 = match old_v {
        None => true,
        Some(o) => o.major_release_epoch() == "1" && !o.at_least(&TLS_REISSUE_V1),
    };

    // Crossing the 1.4.9 fixpack within epoch 1 forces a TLS re-enroll.
    if old_unset_or_pre_149 && !new_epoch2 && new_v.at_least(&TLS_REISSUE_V1) {
        intent.tls_cert_updated = true;
    }

    // Jumping from pre-1.4.9 straight onto 2.2.1+ also forces it.
    if old_unset_or_pre_149 && new_epoch2 && new_v.at_least(&TLS_REISSUE_V2) {
        intent.tls_cert_updated = true;
    }

    // Crossing 2.2.1 within epoch 2.
    if let Some(o) = old_v {
        if o.major_release_epoch() == "2" && !o.at_least(&TLS_REISSUE_V2) && new_v.at_least(&TLS_REISSUE_V2)
        {
            intent.tls_cert_updated = true;
        }
    }

    // Epoch transition 1 -> 2 mandates the v2 migration, plus the newest
    // structural migration the target release requires.
    if old_epoch1.unwrap_or(true) && new_epoch2 {
        intent.migrate_to_v2 = true;
        if new_v.at_least(&MIGRATE_V25) {
            intent.migrate_to_v25 = true;
            intent.tls_cert_updated = true;
        } else if new_v.at_least(&MIGRATE_V24) {
            intent.migrate_to_v24 = true;
            intent.tls_cert_updated = true;
        }
    }

    // Within epoch 2, pre-2.4.1 installs pick up the structural migration
    // for whichever target range they land in.
    if let Some(o) = old_v {
        if o.major_release_epoch() == "2" && !o.at_least(&MIGRATE_V24) {
            if new_v.at_least(&MIGRATE_V25) {
                intent.migrate_to_v25 = true;
                intent.tls_cert_updated = true;
            } else if new_v.at_least(&MIGRATE_V24) {
                intent.migrate_to_v24 = true;
                intent.tls_cert_updated = true;
            }
        }

        // Already on 2.4.x: the 2.5 migration alone, no forced re-enroll.
        if o.major_release_epoch() == "2"
            && o.at_least(&MIGRATE_V24)
            && !o.at_least(&MIGRATE_V25)
            && new_v.at_least(&MIGRATE_V25)
        {
            intent.migrate_to_v25 = true;
        }
    }

    if !intent.is_empty() {
        debug!(
            "Version transition {:?} -> {} mandates migration/re-enroll flags",
            old, new
        );
    }

    intent
}
