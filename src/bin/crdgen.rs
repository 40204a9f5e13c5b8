//! CRD YAML Generator
//!
//! Prints the Kubernetes CRD manifests for every custom resource of the
//! influxdb-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use influxdb_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
