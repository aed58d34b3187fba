use serde::Deserialize;
use std::fmt;
use thiserror::Error;

pub type ColdstoreResult<T> = Result<T, ColdstoreError>;

#[derive(Debug, Error)]
pub enum ColdstoreError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("archives of length zero are not supported")]
    EmptyArchive,

    #[error("invalid part size {0}: must be a power-of-two multiple of 1 MiB, at most 4 GiB")]
    InvalidPartSize(u64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("response is missing the {0} header")]
    MissingHeader(&'static str),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ColdstoreError {
    /// Whether the transport should try the request again.
    ///
    /// Connection failures, timeouts, every server-attributable error and the
    /// service's own request-timeout code are transient. Everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            ColdstoreError::Connection(_) | ColdstoreError::Timeout(_) => true,
            ColdstoreError::Service(e) => e.kind.is_retryable(),
            ColdstoreError::EmptyArchive
            | ColdstoreError::InvalidPartSize(_)
            | ColdstoreError::InvalidArgument(_)
            | ColdstoreError::MissingHeader(_)
            | ColdstoreError::InvalidResponse(_)
            | ColdstoreError::Config(_)
            | ColdstoreError::Credentials(_)
            | ColdstoreError::Io(_)
            | ColdstoreError::Json(_) => false,
        }
    }

    /// The service error kind, if this error came back from the remote service.
    pub fn service_kind(&self) -> Option<ServiceErrorKind> {
        match self {
            ColdstoreError::Service(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Which side the service blames for a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Client,
    Server,
    Unknown,
}

/// Closed set of error conditions the service reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    AccessDenied,
    BadRequest,
    ExpiredToken,
    InvalidParameterValue,
    InvalidSignature,
    LimitExceeded,
    MissingAuthenticationToken,
    MissingParameterValue,
    ResourceNotFound,
    RequestTimeout,
    Serialization,
    Throttling,
    UnrecognizedClient,
    ServiceUnavailable,
    /// Client-attributed error with an unrecognized code
    Client,
    /// Server-attributed error with an unrecognized code
    Server,
    /// No usable error payload, or an unknown `type`
    Unknown,
}

impl ServiceErrorKind {
    /// Map a service error code (e.g. `ResourceNotFoundException`) to a named leaf.
    pub fn from_code(code: &str) -> Option<Self> {
        let kind = match code {
            "AccessDeniedException" => Self::AccessDenied,
            "BadRequestException" => Self::BadRequest,
            "ExpiredTokenException" => Self::ExpiredToken,
            "InvalidParameterValueException" => Self::InvalidParameterValue,
            "InvalidSignatureException" => Self::InvalidSignature,
            "LimitExceededException" => Self::LimitExceeded,
            "MissingAuthenticationTokenException" => Self::MissingAuthenticationToken,
            "MissingParameterValueException" => Self::MissingParameterValue,
            "ResourceNotFoundException" => Self::ResourceNotFound,
            "RequestTimeoutException" => Self::RequestTimeout,
            "SerializationException" => Self::Serialization,
            "ThrottlingException" => Self::Throttling,
            "UnrecognizedClientException" => Self::UnrecognizedClient,
            "ServiceUnavailableException" => Self::ServiceUnavailable,
            _ => return None,
        };
        Some(kind)
    }

    pub fn attribution(self) -> Attribution {
        match self {
            Self::ServiceUnavailable | Self::Server => Attribution::Server,
            Self::Unknown => Attribution::Unknown,
            Self::AccessDenied
            | Self::BadRequest
            | Self::ExpiredToken
            | Self::InvalidParameterValue
            | Self::InvalidSignature
            | Self::LimitExceeded
            | Self::MissingAuthenticationToken
            | Self::MissingParameterValue
            | Self::ResourceNotFound
            | Self::RequestTimeout
            | Self::Serialization
            | Self::Throttling
            | Self::UnrecognizedClient
            | Self::Client => Attribution::Client,
        }
    }

    pub fn is_retryable(self) -> bool {
        self == Self::RequestTimeout || self.attribution() == Attribution::Server
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AccessDenied => "access denied",
            Self::BadRequest => "bad request",
            Self::ExpiredToken => "expired token",
            Self::InvalidParameterValue => "invalid parameter value",
            Self::InvalidSignature => "invalid signature",
            Self::LimitExceeded => "limit exceeded",
            Self::MissingAuthenticationToken => "missing authentication token",
            Self::MissingParameterValue => "missing parameter value",
            Self::ResourceNotFound => "resource not found",
            Self::RequestTimeout => "request timeout",
            Self::Serialization => "serialization error",
            Self::Throttling => "throttled",
            Self::UnrecognizedClient => "unrecognized client",
            Self::ServiceUnavailable => "service unavailable",
            Self::Client => "client error",
            Self::Server => "server error",
            Self::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// An error response from the remote service
#[derive(Debug, Clone, Error)]
#[error("{kind} (HTTP {status}, {code}): {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub status: u16,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

impl ServiceError {
    /// Classify a non-2xx response from its status and raw body.
    ///
    /// Known `code` values win; otherwise the `type` field picks the client or
    /// server bucket. A body that is not a JSON error payload is `Unknown`.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let payload = match serde_json::from_slice::<ErrorPayload>(body) {
            Ok(p) => p,
            Err(_) => {
                return ServiceError {
                    kind: ServiceErrorKind::Unknown,
                    status,
                    code: String::new(),
                    message: String::from_utf8_lossy(body).trim().to_string(),
                }
            }
        };

        let code = payload.code.unwrap_or_default();
        let kind = ServiceErrorKind::from_code(&code).unwrap_or_else(|| {
            match payload.kind.as_deref() {
                Some("Client") => ServiceErrorKind::Client,
                Some("Server") => ServiceErrorKind::Server,
                _ => ServiceErrorKind::Unknown,
            }
        });

        ServiceError {
            kind,
            status,
            code,
            message: payload.message.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(body: &str) -> ServiceError {
        ServiceError::from_response(400, body.as_bytes())
    }

    #[test]
    fn known_code_maps_to_named_leaf() {
        let e = classify(
            r#"{"type":"Client","code":"ResourceNotFoundException","message":"Vault not found"}"#,
        );
        assert_eq!(e.kind, ServiceErrorKind::ResourceNotFound);
        assert_eq!(e.message, "Vault not found");
        assert_eq!(e.kind.attribution(), Attribution::Client);
    }

    #[test]
    fn unknown_code_falls_back_on_type() {
        let client = classify(r#"{"type":"Client","code":"NewFancyException","message":"x"}"#);
        assert_eq!(client.kind, ServiceErrorKind::Client);

        let server = classify(r#"{"type":"Server","code":"InternalFailure","message":"x"}"#);
        assert_eq!(server.kind, ServiceErrorKind::Server);
        assert!(server.kind.is_retryable());

        let odd = classify(r#"{"type":"Martian","code":"Huh","message":"x"}"#);
        assert_eq!(odd.kind, ServiceErrorKind::Unknown);
    }

    #[test]
    fn malformed_body_is_unknown() {
        let e = ServiceError::from_response(502, b"<html>Bad Gateway</html>");
        assert_eq!(e.kind, ServiceErrorKind::Unknown);
        assert_eq!(e.status, 502);
        assert!(!e.kind.is_retryable());
    }

    #[test]
    fn retry_classes() {
        assert!(ServiceErrorKind::ServiceUnavailable.is_retryable());
        assert!(ServiceErrorKind::RequestTimeout.is_retryable());
        assert!(!ServiceErrorKind::AccessDenied.is_retryable());
        assert!(!ServiceErrorKind::Throttling.is_retryable());
        assert!(!ServiceErrorKind::BadRequest.is_retryable());

        assert!(ColdstoreError::Connection("broken pipe".into()).is_retryable());
        assert!(ColdstoreError::Timeout("30s".into()).is_retryable());
        assert!(!ColdstoreError::EmptyArchive.is_retryable());
    }
}
