//! In-memory stand-in for the archival service.
//!
//! Implements `Exchange` directly, so the real signer and transport run
//! unchanged. Every request's signature is recomputed and checked, part and
//! archive tree hashes are recomputed from the received bytes, and faults can
//! be queued to exercise the retry path.
#![allow(dead_code)]

use chrono::NaiveDateTime;
use secrecy::SecretString;
use serde_json::json;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io::Cursor;

use coldstore_client::request::Params;
use coldstore_client::signer::{self, SigningInput, TIMESTAMP_FORMAT};
use coldstore_client::transport::{RawResponse, SignedRequest};
use coldstore_client::{Exchange, Method, RetryPolicy, Transport};
use coldstore_core::{ColdstoreError, ColdstoreResult, PartSize};
use coldstore_hash::{sha256, tree_hash};
use coldstore_secrets::Credentials;

pub const ACCESS_KEY: &str = "AKIDSIMULATED";
pub const SECRET_KEY: &str = "simulated/secret/key";
pub const REGION: &str = "eu-west-1";

pub fn credentials() -> Credentials {
    Credentials::new(ACCESS_KEY, SecretString::from(SECRET_KEY.to_string()), REGION)
}

pub fn transport(service: &SimulatedService) -> Transport<&SimulatedService> {
    Transport::new(service, credentials(), RetryPolicy::immediate(10))
}

pub fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) ^ ((i >> 11) as u8))
        .collect()
}

/// A failure injected ahead of the next request
pub enum Fault {
    Connection,
    Status(u16, &'static str, &'static str),
}

struct Upload {
    vault: String,
    part_size: u64,
    description: Option<String>,
    parts: BTreeMap<u64, Vec<u8>>,
}

struct Archive {
    data: Vec<u8>,
    description: Option<String>,
}

struct Job {
    vault: String,
    action: &'static str,
    archive_id: Option<String>,
    output: Vec<u8>,
    tree_hash: Option<String>,
}

#[derive(Default)]
struct State {
    vaults: BTreeMap<String, BTreeMap<String, Archive>>,
    uploads: BTreeMap<String, Upload>,
    jobs: BTreeMap<String, Job>,
    next_id: u64,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }
}

pub struct SimulatedService {
    state: RefCell<State>,
    faults: RefCell<VecDeque<Fault>>,
    log: RefCell<Vec<(Method, String)>>,
    page_size: usize,
}

type Reply = (u16, Vec<(&'static str, String)>, Vec<u8>);

fn error(status: u16, kind: &str, code: &str, message: &str) -> Reply {
    let body = json!({"type": kind, "code": code, "message": message});
    (status, Vec::new(), body.to_string().into_bytes())
}

fn not_found(what: &str) -> Reply {
    error(404, "Client", "ResourceNotFoundException", &format!("{what} not found"))
}

fn invalid(message: &str) -> Reply {
    error(400, "Client", "InvalidParameterValueException", message)
}

impl SimulatedService {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State::default()),
            faults: RefCell::new(VecDeque::new()),
            log: RefCell::new(Vec::new()),
            page_size: 2,
        }
    }

    pub fn with_vault(self, name: &str) -> Self {
        self.state
            .borrow_mut()
            .vaults
            .insert(name.to_string(), BTreeMap::new());
        self
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.borrow_mut().push_back(fault);
    }

    /// Every request that reached the service, faults included
    pub fn log(&self) -> Vec<(Method, String)> {
        self.log.borrow().clone()
    }

    pub fn archive(&self, vault: &str, id: &str) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .vaults
            .get(vault)
            .and_then(|v| v.get(id))
            .map(|a| a.data.clone())
    }

    pub fn archive_description(&self, vault: &str, id: &str) -> Option<String> {
        self.state
            .borrow()
            .vaults
            .get(vault)
            .and_then(|v| v.get(id))
            .and_then(|a| a.description.clone())
    }

    pub fn open_uploads(&self) -> usize {
        self.state.borrow().uploads.len()
    }

    fn check_signature(&self, req: &SignedRequest<'_>) -> Result<(), Reply> {
        let mut headers = req.headers.clone();
        let Some(presented) = headers.remove("authorization") else {
            return Err(error(403, "Client", "MissingAuthenticationTokenException", "no authorization"));
        };
        let Some(date) = headers.get("date") else {
            return Err(invalid("missing date header"));
        };
        let timestamp = NaiveDateTime::parse_from_str(date, TIMESTAMP_FORMAT)
            .map_err(|_| invalid("malformed date header"))?
            .and_utc();

        let expected = signer::sign(&SigningInput {
            credentials: &credentials(),
            timestamp,
            method: req.method,
            path: req.path,
            query: req.query,
            headers: &headers,
            body_digest: &sha256(req.body),
        });
        if expected.authorization != presented {
            return Err(error(403, "Client", "InvalidSignatureException", "signature mismatch"));
        }
        if headers.get("x-amz-glacier-version").map(String::as_str) != Some("2012-06-01") {
            return Err(invalid("missing API version"));
        }
        Ok(())
    }

    fn route(&self, req: &SignedRequest<'_>) -> Reply {
        let segments: Vec<&str> = req.path.trim_start_matches('/').split('/').collect();
        let mut state = self.state.borrow_mut();
        match (req.method, segments.as_slice()) {
            (Method::Get, ["-", "vaults"]) => self.list_vaults(&state, req.query),
            (Method::Put, ["-", "vaults", v]) => {
                state.vaults.entry(v.to_string()).or_default();
                (201, vec![("location", format!("/-/vaults/{v}"))], Vec::new())
            }
            (Method::Get, ["-", "vaults", v]) => match state.vaults.get(*v) {
                Some(archives) => {
                    let body = vault_json(v, archives);
                    (200, Vec::new(), body.to_string().into_bytes())
                }
                None => not_found("vault"),
            },
            (Method::Delete, ["-", "vaults", v]) => {
                match state.vaults.get(*v).map(|archives| archives.is_empty()) {
                    Some(true) => {
                        state.vaults.remove(*v);
                        (204, Vec::new(), Vec::new())
                    }
                    Some(false) => invalid("vault is not empty"),
                    None => not_found("vault"),
                }
            }
            (Method::Post, ["-", "vaults", v, "archives"]) => upload_archive(&mut state, v, req),
            (Method::Delete, ["-", "vaults", v, "archives", id]) => {
                match state.vaults.get_mut(*v).and_then(|a| a.remove(*id)) {
                    Some(_) => (204, Vec::new(), Vec::new()),
                    None => not_found("archive"),
                }
            }
            (Method::Post, ["-", "vaults", v, "multipart-uploads"]) => initiate(&mut state, v, req),
            (Method::Put, ["-", "vaults", _, "multipart-uploads", id]) => upload_part(&mut state, id, req),
            (Method::Post, ["-", "vaults", v, "multipart-uploads", id]) => complete(&mut state, v, id, req),
            (Method::Delete, ["-", "vaults", _, "multipart-uploads", id]) => {
                match state.uploads.remove(*id) {
                    Some(_) => (204, Vec::new(), Vec::new()),
                    None => not_found("upload"),
                }
            }
            (Method::Post, ["-", "vaults", v, "jobs"]) => initiate_job(&mut state, v, req.body),
            (Method::Get, ["-", "vaults", v, "jobs"]) => {
                let list: Vec<_> = state
                    .jobs
                    .iter()
                    .filter(|(_, j)| j.vault == *v)
                    .map(|(id, j)| job_json(id, j))
                    .collect();
                let body = json!({"JobList": list, "Marker": null});
                (200, Vec::new(), body.to_string().into_bytes())
            }
            (Method::Get, ["-", "vaults", _, "jobs", id]) => match state.jobs.get(*id) {
                Some(j) => (200, Vec::new(), job_json(id, j).to_string().into_bytes()),
                None => not_found("job"),
            },
            (Method::Get, ["-", "vaults", _, "jobs", id, "output"]) => match state.jobs.get(*id) {
                Some(j) => {
                    let mut headers = Vec::new();
                    if let Some(h) = &j.tree_hash {
                        headers.push(("x-amz-sha256-tree-hash", h.clone()));
                    }
                    (200, headers, j.output.clone())
                }
                None => not_found("job"),
            },
            _ => error(400, "Client", "BadRequestException", "no such route"),
        }
    }

    fn list_vaults(&self, state: &State, query: &Params) -> Reply {
        let start = query.get("marker").cloned().unwrap_or_default();
        let mut names = state.vaults.range(start..);
        let page: Vec<_> = names
            .by_ref()
            .take(self.page_size)
            .map(|(name, archives)| vault_json(name, archives))
            .collect();
        let marker = names.next().map(|(name, _)| name.clone());
        let body = json!({"VaultList": page, "Marker": marker});
        (200, Vec::new(), body.to_string().into_bytes())
    }
}

impl Exchange for SimulatedService {
    fn host(&self) -> String {
        format!("glacier.{REGION}.amazonaws.com")
    }

    fn exchange(&self, req: &SignedRequest<'_>) -> ColdstoreResult<RawResponse> {
        self.log.borrow_mut().push((req.method, req.path.to_string()));

        let (status, headers, body) = match self.faults.borrow_mut().pop_front() {
            Some(Fault::Connection) => {
                return Err(ColdstoreError::Connection("simulated reset".into()))
            }
            Some(Fault::Status(status, kind, code)) => error(status, kind, code, "injected"),
            None => match self.check_signature(req) {
                Ok(()) => self.route(req),
                Err(reply) => reply,
            },
        };

        Ok(RawResponse {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            body: Box::new(Cursor::new(body)),
        })
    }
}

fn vault_json(name: &str, archives: &BTreeMap<String, Archive>) -> serde_json::Value {
    json!({
        "VaultName": name,
        "VaultARN": format!("arn:aws:glacier:{REGION}:000000000000:vaults/{name}"),
        "CreationDate": "2024-03-01T12:00:00.000Z",
        "LastInventoryDate": null,
        "NumberOfArchives": archives.len(),
        "SizeInBytes": archives.values().map(|a| a.data.len() as u64).sum::<u64>(),
    })
}

fn job_json(id: &str, job: &Job) -> serde_json::Value {
    json!({
        "JobId": id,
        "Action": job.action,
        "StatusCode": "Succeeded",
        "Completed": true,
        "CreationDate": "2024-03-01T12:00:00.000Z",
        "CompletionDate": "2024-03-01T16:00:00.000Z",
        "ArchiveId": job.archive_id,
        "SHA256TreeHash": job.tree_hash,
        "VaultARN": format!("arn:aws:glacier:{REGION}:000000000000:vaults/{}", job.vault),
    })
}

fn header<'a>(req: &'a SignedRequest<'_>, name: &str) -> Option<&'a str> {
    req.headers.get(name).map(String::as_str)
}

fn upload_archive(state: &mut State, vault: &str, req: &SignedRequest<'_>) -> Reply {
    if !state.vaults.contains_key(vault) {
        return not_found("vault");
    }
    if header(req, "x-amz-sha256-tree-hash") != Some(tree_hash(req.body).to_hex().as_str()) {
        return invalid("tree hash mismatch");
    }
    if header(req, "x-amz-content-sha256") != Some(sha256(req.body).to_hex().as_str()) {
        return invalid("content hash mismatch");
    }
    let id = state.id("archive");
    let description = header(req, "x-amz-archive-description").map(str::to_string);
    if let Some(archives) = state.vaults.get_mut(vault) {
        archives.insert(
            id.clone(),
            Archive {
                data: req.body.to_vec(),
                description,
            },
        );
    }
    (201, vec![("x-amz-archive-id", id)], Vec::new())
}

fn initiate(state: &mut State, vault: &str, req: &SignedRequest<'_>) -> Reply {
    if !state.vaults.contains_key(vault) {
        return not_found("vault");
    }
    let part_size = match header(req, "x-amz-part-size").and_then(|s| s.parse::<u64>().ok()) {
        Some(n) if PartSize::from_bytes(n).is_ok() => n,
        _ => return invalid("bad part size"),
    };
    let id = state.id("upload");
    state.uploads.insert(
        id.clone(),
        Upload {
            vault: vault.to_string(),
            part_size,
            description: header(req, "x-amz-archive-description").map(str::to_string),
            parts: BTreeMap::new(),
        },
    );
    (201, vec![("x-amz-multipart-upload-id", id)], Vec::new())
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let range = value.strip_prefix("bytes ")?.strip_suffix("/*")?;
    let (first, last) = range.split_once('-')?;
    Some((first.parse().ok()?, last.parse().ok()?))
}

fn upload_part(state: &mut State, id: &str, req: &SignedRequest<'_>) -> Reply {
    let Some(upload) = state.uploads.get_mut(id) else {
        return not_found("upload");
    };
    let Some((first, last)) = header(req, "content-range").and_then(parse_range) else {
        return invalid("bad content-range");
    };
    let len = req.body.len() as u64;
    if last + 1 - first != len || len > upload.part_size || first % upload.part_size != 0 {
        return invalid("part does not match its range");
    }
    if header(req, "x-amz-sha256-tree-hash") != Some(tree_hash(req.body).to_hex().as_str()) {
        return invalid("part tree hash mismatch");
    }
    upload.parts.insert(first, req.body.to_vec());
    (204, Vec::new(), Vec::new())
}

fn complete(state: &mut State, vault: &str, id: &str, req: &SignedRequest<'_>) -> Reply {
    let Some(upload) = state.uploads.get(id) else {
        return not_found("upload");
    };
    let mut data = Vec::new();
    for (offset, part) in &upload.parts {
        if *offset != data.len() as u64 {
            return invalid("gap between parts");
        }
        data.extend_from_slice(part);
    }
    if header(req, "x-amz-archive-size") != Some(data.len().to_string().as_str()) {
        return invalid("archive size mismatch");
    }
    if header(req, "x-amz-sha256-tree-hash") != Some(tree_hash(&data).to_hex().as_str()) {
        return invalid("archive tree hash mismatch");
    }
    let description = upload.description.clone();
    let upload_vault = upload.vault.clone();
    if upload_vault != vault {
        return invalid("upload belongs to another vault");
    }
    state.uploads.remove(id);

    let archive_id = state.id("archive");
    if let Some(archives) = state.vaults.get_mut(vault) {
        archives.insert(archive_id.clone(), Archive { data, description });
    }
    (201, vec![("x-amz-archive-id", archive_id)], Vec::new())
}

fn initiate_job(state: &mut State, vault: &str, body: &[u8]) -> Reply {
    let Ok(params) = serde_json::from_slice::<serde_json::Value>(body) else {
        return error(400, "Client", "SerializationException", "bad job body");
    };
    let Some(archives) = state.vaults.get(vault) else {
        return not_found("vault");
    };
    let job = match params["Type"].as_str() {
        Some("archive-retrieval") => {
            let Some(archive_id) = params["ArchiveId"].as_str() else {
                return error(400, "Client", "MissingParameterValueException", "ArchiveId");
            };
            let Some(archive) = archives.get(archive_id) else {
                return not_found("archive");
            };
            Job {
                vault: vault.to_string(),
                action: "ArchiveRetrieval",
                archive_id: Some(archive_id.to_string()),
                output: archive.data.clone(),
                tree_hash: Some(tree_hash(&archive.data).to_hex()),
            }
        }
        Some("inventory-retrieval") => {
            let list: Vec<_> = archives
                .iter()
                .map(|(id, a)| json!({"ArchiveId": id, "Size": a.data.len()}))
                .collect();
            Job {
                vault: vault.to_string(),
                action: "InventoryRetrieval",
                archive_id: None,
                output: json!({"ArchiveList": list}).to_string().into_bytes(),
                tree_hash: None,
            }
        }
        _ => return invalid("unknown job type"),
    };
    let id = state.id("job");
    state.jobs.insert(id.clone(), job);
    (202, vec![("x-amz-job-id", id)], Vec::new())
}
