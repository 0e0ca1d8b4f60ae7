//! Bounded credential-backup rotation.
//!
//! Before any credential replacement, the outgoing material is appended to a
//! per-resource backup secret. History per credential type is bounded at
//! [`ITERATIONS`] snapshots; once full, the oldest is evicted first.

use crate::error::ControllerError;
use crate::stores::SecretStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Maximum snapshots retained per credential type.
pub const ITERATIONS: usize = 10;

/// Credential families that get backed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// TLS identity
    Tls,
    /// Enrollment identity
    Ecert,
    /// Operations endpoint identity
    Operations,
    /// CA identity
    Ca,
}

impl CredentialKind {
    fn data_key(self) -> &'static str {
        match self {
            Self::Tls => "tls-backup",
            Self::Ecert => "ecert-backup",
            Self::Operations => "operations-backup",
            Self::Ca => "ca-backup",
        }
    }
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Tls => "tls",
            Self::Ecert => "ecert",
            Self::Operations => "operations",
            Self::Ca => "ca",
        };
        write!(f, "{s}")
    }
}

/// One historical credential snapshot. Fields hold the base64-encoded
/// payloads exactly as they sit in the credential secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSnapshot {
    /// Signing certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signcert: Option<String>,

    /// Private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore: Option<String>,

    /// CA certificate chain
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cacerts: Vec<String>,

    /// Admin certificates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admincerts: Vec<String>,

    /// Intermediate CA certificates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intermediatecerts: Vec<String>,
}

/// Bounded history for one credential type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupList {
    /// Oldest-first snapshots, at most [`ITERATIONS`] entries
    #[serde(default)]
    pub list: Vec<CredentialSnapshot>,

    /// When the list was last rotated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl BackupList {
    /// Appends a snapshot, evicting the oldest entry once the history is
    /// full. Order is preserved, oldest first.
    pub fn push(&mut self, snapshot: CredentialSnapshot, now: DateTime<Utc>) {
        if self.list.len() >= ITERATIONS {
            self.list.remove(0);
        }
        self.list.push(snapshot);
        self.timestamp = Some(now);
    }
}

/// Rotates per-resource credential backups through the secret store.
pub struct BackupRotator {
    secrets: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for BackupRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupRotator").finish_non_exhaustive()
    }
}

impl BackupRotator {
    /// Creates a rotator over the given secret store.
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }

    fn backup_name(resource: &str) -> String {
        format!("{resource}-backup")
    }

    /// Appends `snapshot` to the resource's backup history for `kind`,
    /// creating the backup secret on first use.
    pub async fn rotate(
        &self,
        namespace: &str,
        resource: &str,
        kind: CredentialKind,
        snapshot: CredentialSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), ControllerError> {
        let name = Self::backup_name(resource);
        let mut data = self
            .secrets
            .get(namespace, &name)
            .await?
            .unwrap_or_default();

        let mut history: BackupList = match data.get(kind.data_key()) {
            Some(raw) => serde_json::from_slice(raw)?,
            None => BackupList::default(),
        };
        history.push(snapshot, now);
        debug!(
            "Rotated {} backup for {}/{} (history depth {})",
            kind,
            namespace,
            resource,
            history.list.len()
        );

        data.insert(kind.data_key().to_string(), serde_json::to_vec(&history)?);
        self.secrets.put(namespace, &name, data).await?;
        info!("Persisted {} credential backup for {}/{}", kind, namespace, resource);
        Ok(())
    }

    /// Snapshots the named credential secret and appends it to the
    /// resource's history for `kind`. Returns false when the secret does not
    /// exist yet (first enrollment, nothing to preserve).
    pub async fn rotate_from_secret(
        &self,
        namespace: &str,
        resource: &str,
        kind: CredentialKind,
        source_secret: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ControllerError> {
        let Some(data) = self.secrets.get(namespace, source_secret).await? else {
            debug!(
                "No {} credential secret for {}/{}, nothing to back up",
                kind, namespace, resource
            );
            return Ok(false);
        };
        self.rotate(namespace, resource, kind, snapshot_from_secret(&data), now)
            .await?;
        Ok(true)
    }

    /// Reads the current history for `kind`, if any exists.
    pub async fn history(
        &self,
        namespace: &str,
        resource: &str,
        kind: CredentialKind,
    ) -> Result<BackupList, ControllerError> {
        let name = Self::backup_name(resource);
        let Some(data) = self.secrets.get(namespace, &name).await? else {
            return Ok(BackupList::default());
        };
        match data.get(kind.data_key()) {
            Some(raw) => Ok(serde_json::from_slice(raw)?),
            None => Ok(BackupList::default()),
        }
    }

    /// Trims a history map to [`ITERATIONS`] entries; used when migrating
    /// records written before the bound existed.
    #[must_use]
    pub fn enforce_bound(mut history: BackupList) -> BackupList {
        while history.list.len() > ITERATIONS {
            history.list.remove(0);
        }
        history
    }
}

/// Extracts a credential snapshot from raw secret data, base64-encoding the
/// payloads the way they are stored at rest.
#[must_use]
pub fn snapshot_from_secret(data: &BTreeMap<String, Vec<u8>>) -> CredentialSnapshot {
    use base64::Engine as _;
    let b64 = base64::engine::general_purpose::STANDARD;
    let encode = |key: &str| data.get(key).map(|v| b64.encode(v));
    let encode_prefixed = |prefix: &str| {
        data.iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| b64.encode(v))
            .collect::<Vec<_>>()
    };
    CredentialSnapshot {
        signcert: encode("cert.pem"),
        keystore: encode("key.pem"),
        cacerts: encode_prefixed("cacert-"),
        admincerts: encode_prefixed("admincert-"),
        intermediatecerts: encode_prefixed("intermediatecert-"),
    }
}
