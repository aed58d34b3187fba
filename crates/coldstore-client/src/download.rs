//! Job output download with end-to-end tree hash verification
//!
//! The body is pulled chunk by chunk, written straight to the caller's sink
//! and fed to a [`TreeHasher`], so memory use does not grow with the archive.

use std::io::Write;
use tracing::{info, warn};

use coldstore_core::{ColdstoreResult, JobId};
use coldstore_hash::{TreeHash, TreeHasher};

use crate::request::{Method, Request};
use crate::transport::{Exchange, Transport};
use crate::upload::ProgressFn;
use crate::vault::{id_segment, vault_path};

/// Outcome of comparing the downloaded bytes with the service's tree hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCheck {
    Match,
    Mismatch { expected: TreeHash, actual: TreeHash },
    /// The service sent no usable tree hash (inventory output, partial ranges)
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub bytes: u64,
    /// Tree hash of the bytes actually received
    pub tree_hash: TreeHash,
    pub check: HashCheck,
}

impl DownloadReport {
    pub fn is_verified(&self) -> bool {
        self.check == HashCheck::Match
    }
}

/// `GET /-/vaults/{vault}/jobs/{job}/output`, streamed into `sink`.
///
/// A tree hash mismatch is reported in the returned [`DownloadReport`] and
/// logged; it does not fail the download.
pub fn download_job_output<E: Exchange, W: Write>(
    transport: &Transport<E>,
    vault: &str,
    job: &JobId,
    sink: &mut W,
    progress: Option<&ProgressFn>,
) -> ColdstoreResult<DownloadReport> {
    let path = format!(
        "{}/jobs/{}/output",
        vault_path(vault)?,
        id_segment("job id", job.as_str())?
    );
    let mut response = transport.send(&Request::new(Method::Get, path))?;

    let expected = match response.header("x-amz-sha256-tree-hash") {
        Some(value) => match TreeHash::from_hex(value) {
            Ok(h) => Some(h),
            Err(e) => {
                warn!(value, error = %e, "ignoring malformed tree hash header");
                None
            }
        },
        None => None,
    };

    let mut hasher = TreeHasher::new();
    let mut chunks = 0usize;
    while let Some(chunk) = response.body.next_chunk()? {
        sink.write_all(chunk)?;
        hasher.update(chunk);
        if let Some(cb) = progress {
            cb(hasher.len(), chunks);
        }
        chunks += 1;
    }
    sink.flush()?;

    let bytes = hasher.len();
    let actual = hasher.finish();
    let check = match expected {
        Some(expected) if expected == actual => HashCheck::Match,
        Some(expected) => {
            warn!(
                vault,
                job = %job,
                expected = %expected,
                actual = %actual,
                "downloaded bytes do not match the service tree hash"
            );
            HashCheck::Mismatch { expected, actual }
        }
        None => HashCheck::Unavailable,
    };

    info!(vault, job = %job, bytes, verified = check == HashCheck::Match, "downloaded job output");

    Ok(DownloadReport {
        bytes,
        tree_hash: actual,
        check,
    })
}
