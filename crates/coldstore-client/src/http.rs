//! HTTP exchange over `reqwest::blocking`

use reqwest::blocking::Client;
use reqwest::Url;
use std::time::Duration;

use coldstore_core::config::ClientConfig;
use coldstore_core::{ColdstoreError, ColdstoreResult};

use crate::request::{Method, Params};
use crate::signer::canonical_query;
use crate::transport::{Exchange, RawResponse, SignedRequest};

/// Headers reqwest derives itself from the URL and the body.
/// They are still signed; the values it sends are identical.
const DERIVED_HEADERS: [&str; 2] = ["host", "content-length"];

pub struct HttpExchange {
    client: Client,
    endpoint: Url,
}

impl HttpExchange {
    pub fn new(endpoint: &str, timeout: Duration) -> ColdstoreResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ColdstoreError::Config(format!("invalid endpoint '{endpoint}': {e}")))?;
        if endpoint.host_str().is_none() {
            return Err(ColdstoreError::Config(format!(
                "endpoint '{endpoint}' has no host"
            )));
        }

        if endpoint.scheme() == "http" {
            tracing::warn!(
                endpoint = %endpoint,
                "endpoint uses plaintext HTTP, archive data is sent unencrypted"
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coldstore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ColdstoreError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &ClientConfig) -> ColdstoreResult<Self> {
        Self::new(&config.endpoint_url(), config.timeout())
    }

    fn url_for(&self, path: &str, query: &Params) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(path);
        // Same encoding as the signature so the two can never disagree
        if query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&canonical_query(query)));
        }
        url
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn classify(e: reqwest::Error) -> ColdstoreError {
    if e.is_timeout() {
        ColdstoreError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_body() {
        ColdstoreError::Connection(e.to_string())
    } else {
        ColdstoreError::InvalidResponse(e.to_string())
    }
}

impl Exchange for HttpExchange {
    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn exchange(&self, request: &SignedRequest<'_>) -> ColdstoreResult<RawResponse> {
        let url = self.url_for(request.path, request.query);
        let mut builder = self.client.request(to_reqwest(request.method), url);
        for (name, value) in request.headers {
            if DERIVED_HEADERS.contains(&name.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().map_err(classify)?;

        let status = response.status().as_u16();
        let headers: Params = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        Ok(RawResponse {
            status,
            headers,
            body: Box::new(response),
        })
    }
}
