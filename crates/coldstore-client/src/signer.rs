//! AWS Signature Version 4 request signing
//!
//! The signature covers the method, path, canonical query string, every header
//! handed in, and the SHA-256 of the body. The timestamp is part of the signed
//! material, so each attempt of a request is signed again.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use coldstore_hash::TreeHash;
use coldstore_secrets::Credentials;

use crate::request::{Method, Params};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const SERVICE: &str = "glacier";
pub const REQUEST_TYPE: &str = "aws4_request";

/// ISO-8601 basic format used in the `date` header and the string to sign
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const DATE_FORMAT: &str = "%Y%m%d";

/// Everything the signature depends on
#[derive(Debug)]
pub struct SigningInput<'a> {
    pub credentials: &'a Credentials,
    pub timestamp: DateTime<Utc>,
    pub method: Method,
    pub path: &'a str,
    pub query: &'a Params,
    pub headers: &'a Params,
    pub body_digest: &'a TreeHash,
}

/// Result of signing, with the intermediate strings kept for debugging
#[derive(Debug, Clone)]
pub struct Signature {
    pub authorization: String,
    pub canonical_request: String,
    pub string_to_sign: String,
    pub signed_headers: String,
    pub signature: String,
}

/// Compute the `authorization` header value for a request.
pub fn sign(input: &SigningInput<'_>) -> Signature {
    let timestamp = input.timestamp.format(TIMESTAMP_FORMAT).to_string();
    let date = input.timestamp.format(DATE_FORMAT).to_string();
    let region = input.credentials.region.as_str();

    let (header_lines, signed_headers) = canonical_headers(input.headers);
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n\n{}\n{}",
        input.method.as_str(),
        input.path,
        canonical_query(input.query),
        header_lines,
        signed_headers,
        input.body_digest.to_hex(),
    );

    let scope = format!("{date}/{region}/{SERVICE}/{REQUEST_TYPE}");
    let string_to_sign = format!(
        "{ALGORITHM}\n{timestamp}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(input.credentials.secret_access_key(), &date, region);
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope},SignedHeaders={signed_headers},Signature={signature}",
        input.credentials.access_key_id,
    );

    tracing::trace!(
        canonical_request = %canonical_request.as_str(),
        string_to_sign = %string_to_sign.as_str(),
        "signed request"
    );

    Signature {
        authorization,
        canonical_request,
        string_to_sign,
        signed_headers,
        signature,
    }
}

/// Percent-encode with the SigV4 unreserved set: `A-Z a-z 0-9 - _ . ~`.
///
/// Space becomes `%20`, never `+`.
pub fn uri_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Encoded `key=value` pairs sorted by key, joined with `&`
pub fn canonical_query(query: &Params) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Returns the `name:value` lines (no trailing newline) and the signed-header list.
pub fn canonical_headers(headers: &Params) -> (String, String) {
    let mut entries: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), normalize_value(v)))
        .collect();
    entries.sort();

    let lines = entries
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n");
    let signed = entries
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    (lines, signed)
}

/// Trim, and collapse inner runs of whitespace to one space
fn normalize_value(v: &str) -> String {
    v.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn signing_key(secret: &str, date: &str, region: &str) -> [u8; 32] {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, SERVICE.as_bytes());
    hmac(&k_service, REQUEST_TYPE.as_bytes())
}
