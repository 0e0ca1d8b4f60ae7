//! Unit tests for change-intent classification

#[cfg(test)]
mod tests {
    use crate::classifier::*;
    use crate::test_utils::{test_component, with_parent};
    use chrono::Utc;
    use crds::{ComponentConditionType, ComponentStatus, ImageRef, MspSpec};
    use k8s_openapi::ByteString;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn signing_secret(name: &str, owner: Option<&str>, cert: &[u8]) -> Secret {
        let mut data = BTreeMap::new();
        data.insert("cert.pem".to_string(), ByteString(cert.to_vec()));
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                labels: owner.map(|o| {
                    let mut labels = BTreeMap::new();
                    labels.insert(crds::PARENT_LABEL.to_string(), o.to_string());
                    labels
                }),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn heartbeat_only_change_yields_nothing() {
        let mut old = test_component("ns", "peer0", Some(1));
        old.status = Some(ComponentStatus {
            condition: ComponentConditionType::Deployed,
            last_heartbeat_time: Some(Utc::now()),
            ..Default::default()
        });
        let mut new = old.clone();
        if let Some(status) = new.status.as_mut() {
            status.last_heartbeat_time = Some(Utc::now() + chrono::Duration::seconds(60));
        }

        let (admit, intent) = classify_update(&old, &new);
        assert!(!admit);
        assert!(intent.is_empty());
        assert!(!intent.status_changed);
    }

    #[test]
    fn status_triple_change_sets_status_changed() {
        let mut old = test_component("ns", "peer0", Some(1));
        old.status = Some(ComponentStatus {
            condition: ComponentConditionType::Deploying,
            ..Default::default()
        });
        let mut new = old.clone();
        new.status = Some(ComponentStatus {
            condition: ComponentConditionType::Deployed,
            ..Default::default()
        });

        let (admit, intent) = classify_update(&old, &new);
        assert!(admit);
        assert!(intent.status_changed);
    }

    #[test]
    fn zone_change_rejects_event_entirely() {
        let mut old = test_component("ns", "peer0", Some(1));
        old.spec.zone = Some("dal10".to_string());
        let mut new = old.clone();
        new.spec.zone = Some("dal12".to_string());
        // Other changes in the same event do not rescue it.
        new.spec.fabric_version = "2.4.1".to_string();

        let (admit, intent) = classify_update(&old, &new);
        assert!(!admit);
        assert!(intent.is_empty());
    }

    #[test]
    fn region_change_rejects_event_entirely() {
        let mut old = test_component("ns", "peer0", Some(1));
        old.spec.region = Some("us-south".to_string());
        let mut new = old.clone();
        new.spec.region = Some("us-east".to_string());

        let (admit, _) = classify_update(&old, &new);
        assert!(!admit);
    }

    #[test]
    fn overrides_change_flags_overrides_only() {
        let old = test_component("ns", "peer0", Some(1));
        let mut new = old.clone();
        new.spec.config_overrides = Some(serde_json::json!({"peer": {"gossip": {}}}));

        let (admit, intent) = classify_update(&old, &new);
        assert!(admit);
        assert!(intent.overrides_changed);
        assert!(!intent.spec_changed);
    }

    #[test]
    fn image_change_flags_images_and_spec() {
        let mut old = test_component("ns", "peer0", Some(1));
        old.spec.images = Some(crds::ComponentImages {
            component: Some(ImageRef {
                image: "peer".to_string(),
                tag: "2.2.1".to_string(),
            }),
            ..Default::default()
        });
        let mut new = old.clone();
        if let Some(images) = new.spec.images.as_mut() {
            images.component = Some(ImageRef {
                image: "peer".to_string(),
                tag: "2.4.1".to_string(),
            });
        }

        let (admit, intent) = classify_update(&old, &new);
        assert!(admit);
        assert!(intent.images_changed);
        assert!(intent.spec_changed);
    }

    #[test]
    fn version_change_feeds_transition_analyzer() {
        let mut old = test_component("ns", "peer0", Some(1));
        old.spec.fabric_version = "1.4.7".to_string();
        let mut new = old.clone();
        new.spec.fabric_version = "2.5.1".to_string();

        let (admit, intent) = classify_update(&old, &new);
        assert!(admit);
        assert!(intent.fabric_version_changed);
        assert!(intent.migrate_to_v2);
        assert!(intent.migrate_to_v25);
        assert!(intent.tls_cert_updated);
    }

    #[test]
    fn restart_and_enroll_are_level_triggered() {
        let mut old = test_component("ns", "peer0", Some(1));
        old.spec.actions.restart = true;
        old.spec.actions.enroll.tls_cert = true;
        let new = old.clone();

        // Unchanged true values still fire.
        let (admit, intent) = classify_update(&old, &new);
        assert!(admit);
        assert!(intent.restart_requested);
        assert!(intent.enroll_tls_cert);
        assert!(!intent.reenroll_tls_cert);
    }

    #[test]
    fn reenroll_is_edge_triggered() {
        let old = test_component("ns", "peer0", Some(1));
        let mut new = old.clone();
        new.spec.actions.reenroll.ecert = true;

        let (admit, intent) = classify_update(&old, &new);
        assert!(admit);
        assert!(intent.reenroll_ecert);

        // A steady true value is not an edge.
        let steady_old = new.clone();
        let steady_new = new.clone();
        let (_, intent) = classify_update(&steady_old, &steady_new);
        assert!(!intent.reenroll_ecert);
    }

    #[test]
    fn msp_and_node_ou_changes_flag() {
        let old = test_component("ns", "peer0", Some(1));
        let mut new = old.clone();
        new.spec.msp = Some(MspSpec::default());
        new.spec.disable_node_ou = Some(true);

        let (admit, intent) = classify_update(&old, &new);
        assert!(admit);
        assert!(intent.msp_changed);
        assert!(intent.node_ou_updated);
    }

    #[test]
    fn create_without_snapshot_forces_reconcile() {
        let new = test_component("ns", "peer0", Some(1));
        let (admit, intent) = classify_create(&new, None);
        assert!(admit);
        assert!(intent.is_empty());
    }

    #[test]
    fn create_catch_up_diffs_against_snapshot() {
        let snapshot = test_component("ns", "peer0", Some(1)).spec;
        let mut new = test_component("ns", "peer0", Some(1));
        new.spec.config_overrides = Some(serde_json::json!({"a": 1}));

        let (admit, intent) = classify_create(&new, Some(&snapshot));
        assert!(admit);
        assert!(intent.overrides_changed);
    }

    #[test]
    fn catch_up_image_rule_requires_previous_images() {
        let snapshot = test_component("ns", "peer0", Some(1)).spec;
        assert!(snapshot.images.is_none());
        let mut new = test_component("ns", "peer0", Some(1));
        new.spec.images = Some(crds::ComponentImages::default());

        let (_, intent) = classify_create(&new, Some(&snapshot));
        assert!(!intent.images_changed);
        // The general spec rule still sees the change.
        assert!(intent.spec_changed);
    }

    #[test]
    fn secret_creation_classified_by_name_pattern() {
        let (admit, intent) =
            classify_secret_create(&signing_secret("tls-peer0-signcert", Some("peer0"), b"A"));
        assert!(admit);
        assert!(intent.tls_cert_created);

        let (admit, intent) =
            classify_secret_create(&signing_secret("ecert-peer0-signcert", Some("peer0"), b"A"));
        assert!(admit);
        assert!(intent.ecert_created);
    }

    #[test]
    fn unrecognized_or_unlinked_secrets_rejected() {
        // Wrong name shape.
        let (admit, _) =
            classify_secret_create(&signing_secret("peer0-keystore", Some("peer0"), b"A"));
        assert!(!admit);

        // Missing owner linkage.
        let (admit, _) = classify_secret_create(&signing_secret("tls-peer0-signcert", None, b"A"));
        assert!(!admit);

        // Owner linkage naming a different component.
        let (admit, _) =
            classify_secret_create(&signing_secret("tls-peer0-signcert", Some("peer1"), b"A"));
        assert!(!admit);
    }

    #[test]
    fn secret_update_requires_byte_difference() {
        let old = signing_secret("tls-peer0-signcert", Some("peer0"), b"A");
        let same = signing_secret("tls-peer0-signcert", Some("peer0"), b"A");
        let (admit, _) = classify_secret_update(&old, &same);
        assert!(!admit);

        let changed = signing_secret("tls-peer0-signcert", Some("peer0"), b"B");
        let (admit, intent) = classify_secret_update(&old, &changed);
        assert!(admit);
        assert!(intent.tls_cert_updated);

        let old_ecert = signing_secret("ecert-peer0-signcert", Some("peer0"), b"A");
        let changed_ecert = signing_secret("ecert-peer0-signcert", Some("peer0"), b"B");
        let (admit, intent) = classify_secret_update(&old_ecert, &changed_ecert);
        assert!(admit);
        assert!(intent.ecert_updated);
    }

    #[test]
    fn non_cert_secret_updates_ignored() {
        let old = signing_secret("peer0-genesis", Some("peer0"), b"A");
        let new = signing_secret("peer0-genesis", Some("peer0"), b"B");
        let (admit, _) = classify_secret_update(&old, &new);
        assert!(!admit);
    }

    #[test]
    fn name_uniqueness() {
        let existing = vec![
            test_component("ns", "peer0", Some(1)),
            with_parent(test_component("ns", "peer1", Some(2)), "cluster"),
        ];
        let mut duplicate = test_component("ns", "peer0", Some(3));
        duplicate.metadata.uid = Some("uid-other".to_string());
        assert!(!name_is_unique(&duplicate, &existing));

        let fresh = test_component("ns", "peer9", Some(3));
        assert!(name_is_unique(&fresh, &existing));

        // The resource itself showing up in the listing is not a duplicate.
        let itself = test_component("ns", "peer0", Some(1));
        assert!(name_is_unique(&itself, &existing));
    }
}
