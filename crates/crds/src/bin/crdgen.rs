//! Prints the UpdateService CRD manifest as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/updateservice.yaml`

use crds::UpdateService;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&UpdateService::crd())?);
    Ok(())
}
