//! Shared foundational types used across the Stitch incremental build engine.
//!
//! This crate provides the content hash used for file fingerprints, snapshot
//! aggregates and history record checksums.

#![warn(missing_docs)]

pub mod hash;

pub use hash::{ContentHash, ContentHasher};
