//! Archive upload: single-request and multipart
//!
//! [`ArchiveUploader::upload`] classifies the input with a [`ChunkedSource`]
//! before sending anything:
//!   - empty input fails with `EmptyArchive`
//!   - one part goes up in a single `POST .../archives`
//!   - two or more parts go through an [`UploadSession`]: initiate, one `PUT`
//!     per part in offset order, then complete with the archive size and the
//!     tree hash reduced from the per-part hashes
//!
//! A failed multipart upload is abandoned, not aborted. The service expires
//! the upload id on its own.

use std::io::Read;
use tracing::{debug, info, warn};

use coldstore_core::{ArchiveId, ColdstoreError, ColdstoreResult, PartSize, UploadId};
use coldstore_hash::{reduce, ChunkedSource, Part, TreeHash};

use crate::request::{Method, Request};
use crate::transport::{Exchange, Transport};
use crate::vault::{id_segment, vault_path};

/// Progress callback type (bytes_done, part_index)
pub type ProgressFn = Box<dyn Fn(u64, usize) + Send + Sync>;

/// Result of uploading one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub archive_id: ArchiveId,
    /// Tree hash of the whole archive
    pub tree_hash: TreeHash,
    pub size: u64,
    /// Number of parts sent (1 for a single-request upload)
    pub parts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Initiated,
    UploadingParts,
    Completing,
    Done,
    Failed,
}

/// Archive descriptions are limited to printable ASCII, at most 1024 bytes
pub fn check_description(description: &str) -> ColdstoreResult<()> {
    if description.len() > 1024 {
        return Err(ColdstoreError::InvalidArgument(format!(
            "archive description is {} bytes, the limit is 1024",
            description.len()
        )));
    }
    if let Some(c) = description.chars().find(|c| !(' '..='~').contains(c)) {
        return Err(ColdstoreError::InvalidArgument(format!(
            "archive description contains {c:?}; only printable ASCII is allowed"
        )));
    }
    Ok(())
}

/// State of one multipart upload.
///
/// Parts must arrive in offset order with no gaps. Every part except the last
/// must be exactly the session's part size.
#[derive(Debug)]
pub struct UploadSession<'t, E> {
    transport: &'t Transport<E>,
    vault: String,
    path: String,
    upload_id: UploadId,
    part_size: PartSize,
    part_hashes: Vec<TreeHash>,
    offset: u64,
    short_part_seen: bool,
    phase: UploadPhase,
}

impl<'t, E: Exchange> UploadSession<'t, E> {
    /// `POST /-/vaults/{vault}/multipart-uploads`
    pub fn initiate(
        transport: &'t Transport<E>,
        vault: &str,
        description: Option<&str>,
        part_size: PartSize,
    ) -> ColdstoreResult<Self> {
        let vault_path = vault_path(vault)?;
        if let Some(d) = description {
            check_description(d)?;
        }

        let request = Request::new(Method::Post, format!("{vault_path}/multipart-uploads"))
            .header("x-amz-part-size", part_size.bytes().to_string())
            .header_opt("x-amz-archive-description", description);
        let response = transport.send(&request)?;
        let upload_id = UploadId::new(id_segment(
            "upload id",
            response.require_header("x-amz-multipart-upload-id")?,
        )?);

        info!(vault, upload_id = %upload_id, part_size = %part_size, "initiated multipart upload");

        Ok(Self {
            transport,
            vault: vault.to_string(),
            path: format!("{vault_path}/multipart-uploads/{upload_id}"),
            upload_id,
            part_size,
            part_hashes: Vec::new(),
            offset: 0,
            short_part_seen: false,
            phase: UploadPhase::Initiated,
        })
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Bytes recorded so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn parts(&self) -> usize {
        self.part_hashes.len()
    }

    /// `PUT` one part. On success the part is recorded and the offset advances.
    /// The part's buffer moves into the request body.
    ///
    /// A part rejected locally leaves the session as it was. A failed send
    /// moves it to [`UploadPhase::Failed`].
    pub fn upload_part(&mut self, part: Part) -> ColdstoreResult<()> {
        self.ensure_open("upload a part")?;
        self.check_part(&part)?;
        self.phase = UploadPhase::UploadingParts;

        let (offset, len, tree_hash) = (part.offset, part.len(), part.tree_hash);
        let content_hash = part.content_hash();
        let request = Request::new(Method::Put, self.path.as_str())
            .header(
                "content-range",
                format!("bytes {}-{}/*", offset, part.last_byte()),
            )
            .header("x-amz-content-sha256", content_hash.to_hex())
            .header("x-amz-sha256-tree-hash", tree_hash.to_hex())
            .body(part.data, Some(content_hash));
        if let Err(e) = self.transport.send(&request) {
            self.abandon(&e);
            return Err(e);
        }

        self.part_hashes.push(tree_hash);
        self.offset += len;
        if len < self.part_size.bytes() {
            self.short_part_seen = true;
        }

        debug!(
            upload_id = %self.upload_id,
            part = self.part_hashes.len() - 1,
            offset,
            len,
            "uploaded part"
        );
        Ok(())
    }

    fn ensure_open(&self, action: &str) -> ColdstoreResult<()> {
        match self.phase {
            UploadPhase::Initiated | UploadPhase::UploadingParts => Ok(()),
            phase => Err(ColdstoreError::InvalidArgument(format!(
                "cannot {action} on upload {} in phase {phase:?}",
                self.upload_id
            ))),
        }
    }

    fn check_part(&self, part: &Part) -> ColdstoreResult<()> {
        if part.is_empty() {
            return Err(ColdstoreError::InvalidArgument("empty part".into()));
        }
        if part.offset != self.offset {
            return Err(ColdstoreError::InvalidArgument(format!(
                "part at offset {} does not follow the previous part (expected offset {})",
                part.offset, self.offset
            )));
        }
        if part.len() > self.part_size.bytes() {
            return Err(ColdstoreError::InvalidArgument(format!(
                "part of {} bytes exceeds the part size of {}",
                part.len(),
                self.part_size
            )));
        }
        if self.short_part_seen {
            return Err(ColdstoreError::InvalidArgument(
                "only the last part may be shorter than the part size".into(),
            ));
        }
        Ok(())
    }

    /// `POST` the completion request and return the archive id.
    pub fn complete(mut self) -> ColdstoreResult<UploadReceipt> {
        self.ensure_open("complete")?;
        self.phase = UploadPhase::Completing;
        let tree_hash = match reduce(&self.part_hashes) {
            Some(h) => h,
            None => {
                self.phase = UploadPhase::Failed;
                return Err(ColdstoreError::EmptyArchive);
            }
        };

        let request = Request::new(Method::Post, self.path.as_str())
            .header("x-amz-archive-size", self.offset.to_string())
            .header("x-amz-sha256-tree-hash", tree_hash.to_hex());
        let archive_id = match self
            .transport
            .send(&request)
            .and_then(|response| response.require_header("x-amz-archive-id").map(ArchiveId::new))
        {
            Ok(id) => id,
            Err(e) => {
                self.abandon(&e);
                return Err(e);
            }
        };

        self.phase = UploadPhase::Done;
        info!(
            vault = %self.vault,
            upload_id = %self.upload_id,
            archive_id = %archive_id,
            size = self.offset,
            parts = self.part_hashes.len(),
            "completed multipart upload"
        );

        Ok(UploadReceipt {
            archive_id,
            tree_hash,
            size: self.offset,
            parts: self.part_hashes.len(),
        })
    }

    /// Mark the session failed. No abort request is sent.
    pub fn abandon(&mut self, error: &ColdstoreError) {
        self.phase = UploadPhase::Failed;
        warn!(
            vault = %self.vault,
            upload_id = %self.upload_id,
            offset = self.offset,
            error = %error,
            "abandoning multipart upload"
        );
    }
}

/// Uploads archives with a fixed part size
pub struct ArchiveUploader<'t, E> {
    transport: &'t Transport<E>,
    part_size: PartSize,
}

impl<'t, E: Exchange> ArchiveUploader<'t, E> {
    pub fn new(transport: &'t Transport<E>, part_size: PartSize) -> Self {
        Self {
            transport,
            part_size,
        }
    }

    pub fn part_size(&self) -> PartSize {
        self.part_size
    }

    /// Upload everything `reader` yields as one archive.
    pub fn upload<R: Read>(
        &self,
        vault: &str,
        description: Option<&str>,
        reader: R,
        progress: Option<&ProgressFn>,
    ) -> ColdstoreResult<UploadReceipt> {
        vault_path(vault)?;
        if let Some(d) = description {
            check_description(d)?;
        }

        let mut source = ChunkedSource::new(reader, self.part_size)?;
        if source.is_empty() {
            return Err(ColdstoreError::EmptyArchive);
        }

        if source.is_single_part() {
            let part = source.next_part()?.ok_or(ColdstoreError::EmptyArchive)?;
            let receipt = self.upload_single(vault, description, part)?;
            if let Some(cb) = progress {
                cb(receipt.size, 0);
            }
            return Ok(receipt);
        }

        let mut session = UploadSession::initiate(self.transport, vault, description, self.part_size)?;
        if let Err(e) = send_parts(&mut session, &mut source, progress) {
            session.abandon(&e);
            return Err(e);
        }
        session.complete()
    }

    /// `POST /-/vaults/{vault}/archives` with the whole payload in one request
    fn upload_single(
        &self,
        vault: &str,
        description: Option<&str>,
        part: Part,
    ) -> ColdstoreResult<UploadReceipt> {
        let (size, tree_hash) = (part.len(), part.tree_hash);
        let content_hash = part.content_hash();
        let request = Request::new(Method::Post, format!("{}/archives", vault_path(vault)?))
            .header_opt("x-amz-archive-description", description)
            .header("x-amz-sha256-tree-hash", tree_hash.to_hex())
            .header("x-amz-content-sha256", content_hash.to_hex())
            .body(part.data, Some(content_hash));
        let response = self.transport.send(&request)?;
        let archive_id = ArchiveId::new(response.require_header("x-amz-archive-id")?);

        info!(vault, archive_id = %archive_id, size, "uploaded archive");

        Ok(UploadReceipt {
            archive_id,
            tree_hash,
            size,
            parts: 1,
        })
    }
}

fn send_parts<E: Exchange, R: Read>(
    session: &mut UploadSession<'_, E>,
    source: &mut ChunkedSource<R>,
    progress: Option<&ProgressFn>,
) -> ColdstoreResult<()> {
    while let Some(part) = source.next_part()? {
        session.upload_part(part)?;
        if let Some(cb) = progress {
            cb(session.offset(), session.parts() - 1);
        }
    }
    Ok(())
}
