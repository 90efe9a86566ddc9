use std::time::Duration;
use thiserror::Error;

/// Failure of a call to the remote inference endpoint.
#[derive(Debug, Error)]
pub enum RemoteInvocationError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("network error: {message}")]
    Network { message: String },

    #[error("request timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("request throttled by endpoint '{endpoint_name}'")]
    Throttled {
        endpoint_name: String,
        request_id: Option<String>,
    },

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Response body was not UTF-8 encoded JSON.
    #[error("malformed response: {message}")]
    Protocol { message: String },

    #[error("failed to encode request payload: {0}")]
    Encode(#[source] serde_json::Error),
}

impl RemoteInvocationError {
    /// AWS request id of the failed call, when the service returned one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            RemoteInvocationError::Throttled { request_id, .. } => request_id.as_deref(),
            RemoteInvocationError::Service(e) => e.request_id.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing region: set AWS_REGION or AWS_DEFAULT_REGION")]
    MissingRegion,

    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("no credentials found in the environment")]
    NotFound,

    #[error("invalid credentials: {message}")]
    Invalid { message: String },
}

/// Non-success response from SageMaker Runtime.
#[derive(Debug, Error)]
#[error("{kind} (status {status}): {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub status: u16,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    Validation,
    Model,
    ModelNotReady,
    ServiceUnavailable,
    InternalFailure,
    InternalDependency,
    AccessDenied,
    Unknown,
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceErrorKind::Validation => "ValidationError",
            ServiceErrorKind::Model => "ModelError",
            ServiceErrorKind::ModelNotReady => "ModelNotReadyException",
            ServiceErrorKind::ServiceUnavailable => "ServiceUnavailable",
            ServiceErrorKind::InternalFailure => "InternalFailure",
            ServiceErrorKind::InternalDependency => "InternalDependencyException",
            ServiceErrorKind::AccessDenied => "AccessDeniedException",
            ServiceErrorKind::Unknown => "UnknownError",
        };
        f.write_str(name)
    }
}

/// Strip the namespace suffix from an `x-amzn-errortype` header value,
/// e.g. `ModelError:http://internal.amazon.com/coral/...` -> `ModelError`.
pub fn parse_error_type(header: &str) -> &str {
    header.split(':').next().unwrap_or(header).trim()
}

/// Map an InvokeEndpoint error response to a typed error.
pub fn map_service_error(
    status: u16,
    error_type: Option<&str>,
    message: Option<String>,
    request_id: Option<String>,
    endpoint_name: &str,
) -> RemoteInvocationError {
    let code = error_type.map(parse_error_type).unwrap_or("");

    if code == "ThrottlingException" || (status == 429 && code != "ModelNotReadyException") {
        return RemoteInvocationError::Throttled {
            endpoint_name: endpoint_name.to_string(),
            request_id,
        };
    }

    let kind = match (status, code) {
        (_, "ValidationError") | (_, "ValidationException") => ServiceErrorKind::Validation,
        (_, "ModelError") => ServiceErrorKind::Model,
        (_, "ModelNotReadyException") => ServiceErrorKind::ModelNotReady,
        (_, "ServiceUnavailable") => ServiceErrorKind::ServiceUnavailable,
        (_, "InternalFailure") => ServiceErrorKind::InternalFailure,
        (_, "InternalDependencyException") => ServiceErrorKind::InternalDependency,
        (_, "AccessDeniedException") => ServiceErrorKind::AccessDenied,
        (403, _) => ServiceErrorKind::AccessDenied,
        (503, _) => ServiceErrorKind::ServiceUnavailable,
        (500..=599, _) => ServiceErrorKind::InternalFailure,
        (400..=499, _) => ServiceErrorKind::Validation,
        _ => ServiceErrorKind::Unknown,
    };

    RemoteInvocationError::Service(ServiceError {
        kind,
        status,
        message: message.unwrap_or_else(|| format!("endpoint '{}' returned status {}", endpoint_name, status)),
        request_id,
    })
}
