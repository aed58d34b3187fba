//! Vault, archive and job management calls
//!
//! Thin wrappers over [`Transport::send`]: build the path, send, decode the
//! JSON body or pick the id out of a response header.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use coldstore_core::{ArchiveId, ColdstoreError, ColdstoreResult, JobId, UploadId};

use crate::request::{Method, Request};
use crate::transport::{Exchange, Transport};

/// Vault names are 1-255 characters of `A-Z a-z 0-9 _ - .`
pub fn vault_path(vault: &str) -> ColdstoreResult<String> {
    let valid = !vault.is_empty()
        && vault.len() <= 255
        && vault
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if !valid {
        return Err(ColdstoreError::InvalidArgument(format!(
            "invalid vault name '{vault}'"
        )));
    }
    Ok(format!("/-/vaults/{vault}"))
}

/// Service-assigned ids go into the path verbatim, so they must stay one
/// segment after URL normalisation.
pub(crate) fn id_segment<'a>(what: &str, id: &'a str) -> ColdstoreResult<&'a str> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains('/')
        || id.chars().any(char::is_whitespace)
    {
        return Err(ColdstoreError::InvalidArgument(format!("invalid {what} '{id}'")));
    }
    Ok(id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VaultDescription {
    pub vault_name: String,
    #[serde(rename = "VaultARN")]
    pub vault_arn: String,
    pub creation_date: String,
    #[serde(default)]
    pub last_inventory_date: Option<String>,
    #[serde(default)]
    pub number_of_archives: u64,
    #[serde(default)]
    pub size_in_bytes: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VaultPage {
    #[serde(default)]
    marker: Option<String>,
    #[serde(default)]
    vault_list: Vec<VaultDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobDescription {
    pub job_id: JobId,
    pub action: String,
    pub status_code: String,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub creation_date: String,
    #[serde(default)]
    pub completion_date: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
    #[serde(default)]
    pub archive_id: Option<ArchiveId>,
    #[serde(default)]
    pub archive_size_in_bytes: Option<u64>,
    #[serde(default)]
    pub inventory_size_in_bytes: Option<u64>,
    #[serde(default, rename = "SHA256TreeHash")]
    pub sha256_tree_hash: Option<String>,
    #[serde(default, rename = "VaultARN")]
    pub vault_arn: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JobPage {
    #[serde(default)]
    marker: Option<String>,
    #[serde(default)]
    job_list: Vec<JobDescription>,
}

/// Kind of retrieval job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    #[serde(rename = "archive-retrieval")]
    ArchiveRetrieval,
    #[serde(rename = "inventory-retrieval")]
    InventoryRetrieval,
}

/// Body of an initiate-job request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobParameters {
    #[serde(rename = "Type")]
    pub kind: JobKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<ArchiveId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inventory format, `JSON` or `CSV`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl JobParameters {
    pub fn archive_retrieval(archive_id: ArchiveId, description: Option<String>) -> Self {
        Self {
            kind: JobKind::ArchiveRetrieval,
            archive_id: Some(archive_id),
            description,
            format: None,
        }
    }

    pub fn inventory_retrieval(format: Option<String>, description: Option<String>) -> Self {
        Self {
            kind: JobKind::InventoryRetrieval,
            archive_id: None,
            description,
            format,
        }
    }
}

/// `GET /-/vaults`, following `marker` until the last page
pub fn list_vaults<E: Exchange>(transport: &Transport<E>) -> ColdstoreResult<Vec<VaultDescription>> {
    let mut vaults = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let mut request = Request::new(Method::Get, "/-/vaults");
        if let Some(m) = &marker {
            request = request.query("marker", m.as_str());
        }
        let page: VaultPage = transport.send(&request)?.json()?;
        debug!(count = page.vault_list.len(), "vault page");
        vaults.extend(page.vault_list);
        match page.marker {
            Some(m) if !m.is_empty() => marker = Some(m),
            _ => break,
        }
    }
    Ok(vaults)
}

/// `GET /-/vaults/{vault}`
pub fn describe_vault<E: Exchange>(
    transport: &Transport<E>,
    vault: &str,
) -> ColdstoreResult<VaultDescription> {
    transport
        .send(&Request::new(Method::Get, vault_path(vault)?))?
        .json()
}

/// `PUT /-/vaults/{vault}`; creating an existing vault is not an error
pub fn create_vault<E: Exchange>(transport: &Transport<E>, vault: &str) -> ColdstoreResult<()> {
    transport.send(&Request::new(Method::Put, vault_path(vault)?))?;
    info!(vault, "created vault");
    Ok(())
}

/// `DELETE /-/vaults/{vault}`; the service refuses while the vault holds archives
pub fn delete_vault<E: Exchange>(transport: &Transport<E>, vault: &str) -> ColdstoreResult<()> {
    transport.send(&Request::new(Method::Delete, vault_path(vault)?))?;
    info!(vault, "deleted vault");
    Ok(())
}

/// `DELETE /-/vaults/{vault}/archives/{archive}`
pub fn delete_archive<E: Exchange>(
    transport: &Transport<E>,
    vault: &str,
    archive: &ArchiveId,
) -> ColdstoreResult<()> {
    let path = format!(
        "{}/archives/{}",
        vault_path(vault)?,
        id_segment("archive id", archive.as_str())?
    );
    transport.send(&Request::new(Method::Delete, path))?;
    info!(vault, archive_id = %archive, "deleted archive");
    Ok(())
}

/// `DELETE /-/vaults/{vault}/multipart-uploads/{upload}`
pub fn abort_multipart_upload<E: Exchange>(
    transport: &Transport<E>,
    vault: &str,
    upload: &UploadId,
) -> ColdstoreResult<()> {
    let path = format!(
        "{}/multipart-uploads/{}",
        vault_path(vault)?,
        id_segment("upload id", upload.as_str())?
    );
    transport.send(&Request::new(Method::Delete, path))?;
    info!(vault, upload_id = %upload, "aborted multipart upload");
    Ok(())
}

/// `POST /-/vaults/{vault}/jobs` with a JSON body; returns the new job id
pub fn initiate_job<E: Exchange>(
    transport: &Transport<E>,
    vault: &str,
    params: &JobParameters,
) -> ColdstoreResult<JobId> {
    let body = serde_json::to_vec(params)?;
    let request = Request::new(Method::Post, format!("{}/jobs", vault_path(vault)?))
        .header("content-type", "application/json")
        .body(body, None);
    let response = transport.send(&request)?;
    let job = JobId::new(response.require_header("x-amz-job-id")?);
    info!(vault, job = %job, kind = ?params.kind, "initiated job");
    Ok(job)
}

/// `GET /-/vaults/{vault}/jobs`, all pages
pub fn list_jobs<E: Exchange>(
    transport: &Transport<E>,
    vault: &str,
) -> ColdstoreResult<Vec<JobDescription>> {
    let path = format!("{}/jobs", vault_path(vault)?);
    let mut jobs = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let mut request = Request::new(Method::Get, path.as_str());
        if let Some(m) = &marker {
            request = request.query("marker", m.as_str());
        }
        let page: JobPage = transport.send(&request)?.json()?;
        jobs.extend(page.job_list);
        match page.marker {
            Some(m) if !m.is_empty() => marker = Some(m),
            _ => break,
        }
    }
    Ok(jobs)
}

/// `GET /-/vaults/{vault}/jobs/{job}`
pub fn describe_job<E: Exchange>(
    transport: &Transport<E>,
    vault: &str,
    job: &JobId,
) -> ColdstoreResult<JobDescription> {
    let path = format!(
        "{}/jobs/{}",
        vault_path(vault)?,
        id_segment("job id", job.as_str())?
    );
    transport.send(&Request::new(Method::Get, path))?.json()
}
