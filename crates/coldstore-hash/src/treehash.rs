//! SHA-256 tree hashing
//!
//! Content is split into 1 MiB blocks, each block is hashed with SHA-256, and
//! the block digests are folded pairwise (`SHA256(left ++ right)`) until one
//! digest remains. An odd digest at the end of a round is carried into the
//! next round unchanged. The service computes the same reduction over every
//! part it receives, so the result must match it bit for bit.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fmt;

use coldstore_core::MIB;

/// Size of one leaf block
pub const BLOCK_SIZE: usize = MIB as usize;

/// A 32-byte SHA-256 digest, displayed as 64 lowercase hex chars
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeHash([u8; 32]);

impl TreeHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-char hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut out)
            .map_err(|e| anyhow::anyhow!("invalid SHA-256 hex '{}': {}", s, e))?;
        Ok(Self(out))
    }
}

impl fmt::Display for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeHash({})", self.to_hex())
    }
}

/// Plain SHA-256 of a whole buffer (the linear content digest)
pub fn sha256(data: &[u8]) -> TreeHash {
    TreeHash(Sha256::digest(data).into())
}

/// Digest of a single leaf block
pub fn leaf_hash(block: &[u8]) -> TreeHash {
    sha256(block)
}

fn combine(left: &TreeHash, right: &TreeHash) -> TreeHash {
    let mut hasher = Sha256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    TreeHash(hasher.finalize().into())
}

/// Fold a sequence of digests into one.
///
/// Returns `None` for an empty sequence and the lone digest, unchanged, for a
/// sequence of one. Iterative, so very long sequences don't grow the stack.
pub fn reduce(hashes: &[TreeHash]) -> Option<TreeHash> {
    let mut level: Vec<TreeHash> = hashes.to_vec();
    if level.is_empty() {
        return None;
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => combine(left, right),
                [odd] => *odd,
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
    }

    level.pop()
}

/// Tree hash of an in-memory buffer.
///
/// An empty buffer counts as a single empty block.
pub fn tree_hash(data: &[u8]) -> TreeHash {
    if data.is_empty() {
        return leaf_hash(data);
    }
    let leaves: Vec<TreeHash> = data.chunks(BLOCK_SIZE).map(leaf_hash).collect();
    // non-empty input always yields at least one leaf
    reduce(&leaves).unwrap_or_else(|| leaf_hash(&[]))
}

/// Incremental tree hash for data that arrives in pieces of any size.
///
/// Buffers at most one block; produces the same digest as [`tree_hash`] over
/// the concatenation of everything passed to [`TreeHasher::update`].
#[derive(Default)]
pub struct TreeHasher {
    block: Vec<u8>,
    leaves: Vec<TreeHash>,
    total: u64,
}

impl TreeHasher {
    pub fn new() -> Self {
        Self {
            block: Vec::with_capacity(BLOCK_SIZE),
            leaves: Vec::new(),
            total: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.total += data.len() as u64;
        while !data.is_empty() {
            let room = BLOCK_SIZE - self.block.len();
            let take = room.min(data.len());
            self.block.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.block.len() == BLOCK_SIZE {
                self.leaves.push(leaf_hash(&self.block));
                self.block.clear();
            }
        }
    }

    /// Bytes seen so far
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn finish(mut self) -> TreeHash {
        if !self.block.is_empty() || self.leaves.is_empty() {
            self.leaves.push(leaf_hash(&self.block));
        }
        reduce(&self.leaves).unwrap_or_else(|| leaf_hash(&[]))
    }
}
