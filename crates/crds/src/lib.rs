//! Fleet Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions and shared types for the
//! fleet-lifecycle controller:
//! - `LedgerComponent`: a managed ledger network component (CA, peer,
//!   orderer or console node)
//! - `ComponentStatus`: the arbitrated observable status of a component
//! - `Version`: ledger release version parsing and comparison

pub mod component;
pub mod status;
pub mod version;

pub use component::*;
pub use status::*;
pub use version::*;
