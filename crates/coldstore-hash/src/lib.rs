//! coldstore-hash: SHA-256 tree hashing and fixed-size part splitting
//!
//! # Overview
//! - `treehash`: 1 MiB leaf hashing, pairwise reduction, incremental hasher
//! - `source`: forward-only reader split into fixed-size parts with their tree hashes

pub mod source;
pub mod treehash;

pub use source::{ChunkedSource, Part};
pub use treehash::{leaf_hash, reduce, sha256, tree_hash, TreeHash, TreeHasher, BLOCK_SIZE};
