//! Provenance: BLAKE3 content hashing and the JSONL boot event log.

pub mod eventlog;
pub mod hasher;
