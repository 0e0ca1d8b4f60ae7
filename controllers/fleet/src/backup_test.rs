//! Unit tests for credential backup rotation

#[cfg(test)]
mod tests {
    use crate::backup::{
        BackupList, BackupRotator, CredentialKind, CredentialSnapshot, ITERATIONS,
        snapshot_from_secret,
    };
    use crate::test_utils::InMemorySecretStore;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn snapshot(tag: &str) -> CredentialSnapshot {
        CredentialSnapshot {
            signcert: Some(tag.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn push_below_capacity_appends() {
        let mut history = BackupList::default();
        let now = Utc::now();
        history.push(snapshot("s1"), now);
        history.push(snapshot("s2"), now);
        assert_eq!(history.list.len(), 2);
        assert_eq!(history.list[0], snapshot("s1"));
        assert_eq!(history.list[1], snapshot("s2"));
        assert_eq!(history.timestamp, Some(now));
    }

    #[test]
    fn full_history_evicts_oldest_first() {
        let mut history = BackupList::default();
        let now = Utc::now();
        for _ in 0..ITERATIONS {
            history.push(snapshot("s1"), now);
        }
        assert_eq!(history.list.len(), ITERATIONS);

        history.push(snapshot("s2"), now);
        assert_eq!(history.list.len(), ITERATIONS);
        // Oldest evicted: nine s1 entries then the new s2, order preserved.
        for entry in &history.list[..ITERATIONS - 1] {
            assert_eq!(entry, &snapshot("s1"));
        }
        assert_eq!(history.list[ITERATIONS - 1], snapshot("s2"));
    }

    #[tokio::test]
    async fn rotate_round_trips_through_secret_store() {
        let secrets = Arc::new(InMemorySecretStore::default());
        let rotator = BackupRotator::new(secrets.clone());
        let now = Utc::now();

        rotator
            .rotate("ns", "peer0", CredentialKind::Tls, snapshot("s1"), now)
            .await
            .unwrap();
        rotator
            .rotate("ns", "peer0", CredentialKind::Tls, snapshot("s2"), now)
            .await
            .unwrap();
        // A different credential kind keeps an independent history.
        rotator
            .rotate("ns", "peer0", CredentialKind::Ecert, snapshot("e1"), now)
            .await
            .unwrap();

        let tls = rotator
            .history("ns", "peer0", CredentialKind::Tls)
            .await
            .unwrap();
        assert_eq!(tls.list.len(), 2);
        assert_eq!(tls.list[0], snapshot("s1"));

        let ecert = rotator
            .history("ns", "peer0", CredentialKind::Ecert)
            .await
            .unwrap();
        assert_eq!(ecert.list.len(), 1);
    }

    #[tokio::test]
    async fn missing_history_is_empty() {
        let secrets = Arc::new(InMemorySecretStore::default());
        let rotator = BackupRotator::new(secrets);
        let history = rotator
            .history("ns", "nobody", CredentialKind::Ca)
            .await
            .unwrap();
        assert!(history.list.is_empty());
        assert!(history.timestamp.is_none());
    }

    #[test]
    fn snapshot_extraction_encodes_base64() {
        use base64::Engine as _;
        let mut data = BTreeMap::new();
        data.insert("cert.pem".to_string(), b"CERT".to_vec());
        data.insert("key.pem".to_string(), b"KEY".to_vec());
        data.insert("cacert-0.pem".to_string(), b"CA0".to_vec());
        data.insert("cacert-1.pem".to_string(), b"CA1".to_vec());
        data.insert("admincert-0.pem".to_string(), b"ADMIN".to_vec());

        let snap = snapshot_from_secret(&data);
        let b64 = base64::engine::general_purpose::STANDARD;
        assert_eq!(snap.signcert.as_deref(), Some(b64.encode(b"CERT").as_str()));
        assert_eq!(snap.keystore.as_deref(), Some(b64.encode(b"KEY").as_str()));
        assert_eq!(snap.cacerts.len(), 2);
        assert_eq!(snap.admincerts.len(), 1);
        assert!(snap.intermediatecerts.is_empty());
    }
}
