//! LedgerComponent CRD
//!
//! One custom resource models every managed ledger network component; the
//! `component_type` field discriminates between certificate authorities,
//! peers, orderers and console nodes. A component without a node number is
//! a cluster resource that groups addressable node resources.

use crate::status::ComponentStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label linking a node resource (and its dependent secrets) to the cluster
/// resource that owns it.
pub const PARENT_LABEL: &str = "fleet.ledgerops.io/parent";

/// Label carried by the reserved restart-coordination config objects.
pub const RESTART_COORD_LABEL: &str = "fleet.ledgerops.io/restart-coordination";

/// Kind of managed ledger component.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Certificate authority
    Ca,
    /// Peer node
    Peer,
    /// Ordering service node
    Orderer,
    /// Console node
    Console,
}

impl ComponentKind {
    /// Name of the reserved restart-coordination object for this kind.
    #[must_use]
    pub fn coordination_name(&self) -> &'static str {
        match self {
            Self::Ca => "restart-ca",
            Self::Peer => "restart-peer",
            Self::Orderer => "restart-orderer",
            Self::Console => "restart-console",
        }
    }

    /// Maps a reserved coordination-object name back to its kind.
    #[must_use]
    pub fn from_coordination_name(name: &str) -> Option<Self> {
        match name {
            "restart-ca" => Some(Self::Ca),
            "restart-peer" => Some(Self::Peer),
            "restart-orderer" => Some(Self::Orderer),
            "restart-console" => Some(Self::Console),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ca => "ca",
            Self::Peer => "peer",
            Self::Orderer => "orderer",
            Self::Console => "console",
        };
        write!(f, "{s}")
    }
}

/// Container image reference.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    /// Image repository
    pub image: String,
    /// Image tag
    pub tag: String,
}

/// Image references for the containers a component runs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentImages {
    /// Init container image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<ImageRef>,

    /// Main component image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ImageRef>,

    /// gRPC-web proxy image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ImageRef>,
}

/// Membership credential (MSP) material for one credential family.
/// All certificate fields are base64-encoded PEM.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MspConfig {
    /// Signing certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signcerts: Option<String>,

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
    pub intermediate_certs: Vec<String>,
}

/// Membership credential specification for a component.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MspSpec {
    /// Enrollment (signing) identity material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<MspConfig>,

    /// TLS identity material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<MspConfig>,
}

/// Re-enrollment actions. Edge-triggered: an intent is generated only when
/// the value changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReenrollActions {
    /// Re-enroll the enrollment certificate with the existing key
    #[serde(default)]
    pub ecert: bool,
    /// Re-enroll the enrollment certificate with a new key
    #[serde(default)]
    pub ecert_new_key: bool,
    /// Re-enroll the TLS certificate with the existing key
    #[serde(default)]
    pub tls_cert: bool,
    /// Re-enroll the TLS certificate with a new key
    #[serde(default)]
    pub tls_cert_new_key: bool,
}

/// Enrollment actions. Level-triggered: an intent is generated whenever
/// the value is true.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnrollActions {
    /// Enroll a fresh enrollment certificate
    #[serde(default)]
    pub ecert: bool,
    /// Enroll a fresh TLS certificate
    #[serde(default)]
    pub tls_cert: bool,
}

/// Explicit user-requested actions on a component.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentActions {
    /// Request a staggered restart. Level-triggered.
    #[serde(default)]
    pub restart: bool,

    /// Re-enrollment requests
    #[serde(default)]
    pub reenroll: ReenrollActions,

    /// Enrollment requests
    #[serde(default)]
    pub enroll: EnrollActions,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "fleet.ledgerops.io",
    version = "v1beta1",
    kind = "LedgerComponent",
    namespaced,
    status = "ComponentStatus",
    shortname = "lc"
)]
#[serde(rename_all = "camelCase")]
pub struct LedgerComponentSpec {
    /// Kind of component this resource manages
    pub component_type: ComponentKind,

    /// Node identity within the cluster resource. Absent on the cluster
    /// resource itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_number: Option<u32>,

    /// Deployment zone. Immutable once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    /// Deployment region. Immutable once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Declared ledger version (`major.minor.fixpack[-tag]`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fabric_version: String,

    /// Container image references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<ComponentImages>,

    /// Opaque configuration override payload. Must be a JSON object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_overrides: Option<serde_json::Value>,

    /// Membership credential material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msp: Option<MspSpec>,

    /// Disables the node organizational unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_node_ou: Option<bool>,

    /// User-requested actions
    #[serde(default)]
    pub actions: ComponentActions,

    /// Bootstrap-less mode: skip the genesis artifact gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_genesis: Option<bool>,
}

impl LedgerComponent {
    /// True iff this is a cluster resource (no node identity).
    #[must_use]
    pub fn is_cluster_resource(&self) -> bool {
        self.spec.node_number.is_none()
    }

    /// Name of the cluster resource owning this node, from the parent label.
    #[must_use]
    pub fn parent_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(PARENT_LABEL))
            .map(String::as_str)
    }
}
