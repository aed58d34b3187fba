//! coldstore-client: signed requests against an archival storage service
//!
//! # Overview
//! - `signer`: AWS Signature Version 4 for the `glacier` service
//! - `transport`: stamps, signs and sends one logical request, retrying transient failures
//! - `http`: the production [`Exchange`](transport::Exchange) over `reqwest::blocking`
//! - `upload`: single-request and multipart archive upload
//! - `download`: streamed job output with tree hash verification
//! - `vault`: vault, archive and job management calls
//!
//! [`Client`] bundles a transport with a part size and exposes every call.

pub mod download;
pub mod http;
pub mod request;
pub mod signer;
pub mod transport;
pub mod upload;
pub mod vault;

#[cfg(test)]
mod testing;

use std::io::{Read, Write};

use coldstore_core::config::ClientConfig;
use coldstore_core::{ArchiveId, ColdstoreResult, JobId, PartSize, UploadId};
use coldstore_secrets::Credentials;

pub use download::{DownloadReport, HashCheck};
pub use http::HttpExchange;
pub use request::{BodyStream, Method, Params, Request, Response};
pub use transport::{Exchange, RetryPolicy, Transport};
pub use upload::{ArchiveUploader, ProgressFn, UploadPhase, UploadReceipt, UploadSession};
pub use vault::{JobDescription, JobKind, JobParameters, VaultDescription};

/// Every service call, bound to one transport and part size
#[derive(Debug)]
pub struct Client<E = HttpExchange> {
    transport: Transport<E>,
    part_size: PartSize,
}

impl Client<HttpExchange> {
    /// Build a client talking HTTP to the configured endpoint.
    pub fn from_config(config: &ClientConfig, credentials: Credentials) -> ColdstoreResult<Self> {
        config.validate()?;
        let exchange = HttpExchange::from_config(config)?;
        let transport = Transport::new(exchange, credentials, RetryPolicy::from_config(config));
        Ok(Self::new(transport, config.part_size()?))
    }
}

impl<E: Exchange> Client<E> {
    pub fn new(transport: Transport<E>, part_size: PartSize) -> Self {
        Self {
            transport,
            part_size,
        }
    }

    pub fn with_part_size(mut self, part_size: PartSize) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn transport(&self) -> &Transport<E> {
        &self.transport
    }

    pub fn part_size(&self) -> PartSize {
        self.part_size
    }

    pub fn upload<R: Read>(
        &self,
        vault: &str,
        description: Option<&str>,
        reader: R,
        progress: Option<&ProgressFn>,
    ) -> ColdstoreResult<UploadReceipt> {
        ArchiveUploader::new(&self.transport, self.part_size).upload(vault, description, reader, progress)
    }

    pub fn download<W: Write>(
        &self,
        vault: &str,
        job: &JobId,
        sink: &mut W,
        progress: Option<&ProgressFn>,
    ) -> ColdstoreResult<DownloadReport> {
        download::download_job_output(&self.transport, vault, job, sink, progress)
    }

    pub fn list_vaults(&self) -> ColdstoreResult<Vec<VaultDescription>> {
        vault::list_vaults(&self.transport)
    }

    pub fn describe_vault(&self, vault: &str) -> ColdstoreResult<VaultDescription> {
        vault::describe_vault(&self.transport, vault)
    }

    pub fn create_vault(&self, vault: &str) -> ColdstoreResult<()> {
        vault::create_vault(&self.transport, vault)
    }

    pub fn delete_vault(&self, vault: &str) -> ColdstoreResult<()> {
        vault::delete_vault(&self.transport, vault)
    }

    pub fn delete_archive(&self, vault: &str, archive: &ArchiveId) -> ColdstoreResult<()> {
        vault::delete_archive(&self.transport, vault, archive)
    }

    pub fn abort_multipart_upload(&self, vault: &str, upload: &UploadId) -> ColdstoreResult<()> {
        vault::abort_multipart_upload(&self.transport, vault, upload)
    }

    pub fn initiate_job(&self, vault: &str, params: &JobParameters) -> ColdstoreResult<JobId> {
        vault::initiate_job(&self.transport, vault, params)
    }

    pub fn list_jobs(&self, vault: &str) -> ColdstoreResult<Vec<JobDescription>> {
        vault::list_jobs(&self.transport, vault)
    }

    pub fn describe_job(&self, vault: &str, job: &JobId) -> ColdstoreResult<JobDescription> {
        vault::describe_job(&self.transport, vault, job)
    }
}
