//! Prints the LedgerComponent CRD manifest as YAML.
//!
//! Usage: `cargo run --bin crdgen > deploy/crds/ledgercomponent.yaml`

use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&crds::LedgerComponent::crd())?);
    Ok(())
}
