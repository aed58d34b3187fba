//! Signed, retrying request transport
//!
//! [`Transport::send`] performs one logical request: it stamps the standard
//! headers, signs, hands the request to an [`Exchange`], and classifies the
//! outcome. Transient failures (connection errors, timeouts, server-side
//! errors, the service's request-timeout code) are retried up to the attempt
//! budget, re-signing each time. Anything else is returned immediately.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, warn};

use coldstore_core::config::ClientConfig;
use coldstore_core::{ColdstoreResult, ServiceError};
use coldstore_hash::sha256;
use coldstore_secrets::Credentials;

use crate::request::{BodyStream, Method, Params, Request, Response};
use crate::signer::{self, SigningInput, TIMESTAMP_FORMAT};

/// API version sent with every request
pub const API_VERSION: &str = "2012-06-01";

/// Cap on how much of an error body is read for classification
const MAX_ERROR_BODY: u64 = 64 * 1024;

/// A fully stamped and signed request, ready for the wire
#[derive(Debug)]
pub struct SignedRequest<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: &'a Params,
    pub headers: &'a Params,
    pub body: &'a Bytes,
}

/// What came back over the wire, before classification
pub struct RawResponse {
    pub status: u16,
    /// Lower-cased header names
    pub headers: Params,
    pub body: Box<dyn Read + Send>,
}

/// One raw HTTP round trip.
///
/// Implementations return `Connection` or `Timeout` errors for failures below
/// HTTP, and a [`RawResponse`] for any status code.
pub trait Exchange {
    /// Value of the `host` header for this endpoint
    fn host(&self) -> String;

    fn exchange(&self, request: &SignedRequest<'_>) -> ColdstoreResult<RawResponse>;
}

impl<E: Exchange + ?Sized> Exchange for &E {
    fn host(&self) -> String {
        (**self).host()
    }

    fn exchange(&self, request: &SignedRequest<'_>) -> ColdstoreResult<RawResponse> {
        (**self).exchange(request)
    }
}

/// Attempt budget and pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 10;

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }

    /// Same budget, no sleeping. For tests and fakes.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_ATTEMPTS,
            delay: Duration::from_secs(1),
        }
    }
}

pub struct Transport<E> {
    exchange: E,
    credentials: Credentials,
    policy: RetryPolicy,
    clock: fn() -> DateTime<Utc>,
}

impl<E: Exchange> Transport<E> {
    pub fn new(exchange: E, credentials: Credentials, policy: RetryPolicy) -> Self {
        Self {
            exchange,
            credentials,
            policy,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used for request timestamps
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send one logical request, retrying transient failures.
    ///
    /// When the budget runs out the last error is returned.
    pub fn send(&self, request: &Request) -> ColdstoreResult<Response> {
        let mut attempt = 1;
        loop {
            match self.attempt(request) {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "transient failure, retrying"
                    );
                    if !self.policy.delay.is_zero() {
                        std::thread::sleep(self.policy.delay);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    debug!(method = %request.method, path = %request.path, attempt, error = %e, "request failed");
                    return Err(e);
                }
            }
        }
    }

    fn attempt(&self, request: &Request) -> ColdstoreResult<Response> {
        let now = (self.clock)();

        let mut headers = request.headers.clone();
        headers.insert("date".into(), now.format(TIMESTAMP_FORMAT).to_string());
        headers.insert("host".into(), self.exchange.host());
        headers.insert("x-amz-glacier-version".into(), API_VERSION.into());
        if !request.body.is_empty() {
            headers.insert("content-length".into(), request.body.len().to_string());
        }

        let digest = request.body_digest.unwrap_or_else(|| sha256(&request.body));
        let signature = signer::sign(&SigningInput {
            credentials: &self.credentials,
            timestamp: now,
            method: request.method,
            path: &request.path,
            query: &request.query,
            headers: &headers,
            body_digest: &digest,
        });
        headers.insert("authorization".into(), signature.authorization);

        let raw = self.exchange.exchange(&SignedRequest {
            method: request.method,
            path: &request.path,
            query: &request.query,
            headers: &headers,
            body: &request.body,
        })?;

        if (200..300).contains(&raw.status) {
            debug!(method = %request.method, path = %request.path, status = raw.status, "ok");
            return Ok(Response {
                status: raw.status,
                headers: raw.headers,
                body: BodyStream::new(raw.body),
            });
        }

        let mut body = Vec::new();
        if let Err(e) = raw.body.take(MAX_ERROR_BODY).read_to_end(&mut body) {
            debug!(error = %e, "could not read error body");
        }
        Err(ServiceError::from_response(raw.status, &body).into())
    }
}

impl<E> std::fmt::Debug for Transport<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("credentials", &self.credentials)
            .field("policy", &self.policy)
            .finish()
    }
}
