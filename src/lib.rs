//! cloudstrap: declarative AWS stacks with first-boot provisioning.
//!
//! Validates a YAML topology, orders it, and renders it as a program for a
//! provisioning engine. Generates the instance user data that formats and
//! mounts an EBS volume and writes a number sequence, and can run the same
//! bootstrap natively on the instance with a JSONL provenance log.

pub mod boot;
pub mod cli;
pub mod cloud;
pub mod core;
pub mod provenance;
pub mod resources;
pub mod transport;
