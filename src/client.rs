//! Client for the SageMaker Runtime `InvokeEndpoint` operation.

use crate::config::ClassifierConfig;
use crate::credentials::CredentialsProvider;
use crate::error::{map_service_error, ConfigurationError, RemoteInvocationError};
use crate::signing::RequestSigner;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::Client as HttpClient;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeEndpointInput {
    pub endpoint_name: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub accept: String,
}

impl InvokeEndpointInput {
    /// A JSON request expecting a JSON response.
    pub fn json(endpoint_name: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            body,
            content_type: JSON_CONTENT_TYPE.to_string(),
            accept: JSON_CONTENT_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvokeEndpointOutput {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub invoked_production_variant: Option<String>,
}

/// Seam between the request handler and the hosted model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    async fn invoke_endpoint(
        &self,
        input: InvokeEndpointInput,
    ) -> Result<InvokeEndpointOutput, RemoteInvocationError>;
}

/// Built once per container and shared by every invocation; holds no
/// mutable state.
pub struct SageMakerRuntimeClient {
    base_url: String,
    http_client: HttpClient,
    signer: RequestSigner,
    credentials_provider: Arc<dyn CredentialsProvider>,
    timeout: Option<std::time::Duration>,
}

impl SageMakerRuntimeClient {
    pub fn new(
        config: &ClassifierConfig,
        credentials_provider: Arc<dyn CredentialsProvider>,
    ) -> Result<Self, RemoteInvocationError> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(|e| RemoteInvocationError::Network {
            message: format!("failed to create HTTP client: {}", e),
        })?;

        Ok(Self {
            base_url: config.runtime_endpoint(),
            http_client,
            signer: RequestSigner::sagemaker(&config.region),
            credentials_provider,
            timeout: config.request_timeout,
        })
    }

    fn invocation_url(&self, endpoint_name: &str) -> Result<Url, RemoteInvocationError> {
        let raw = format!(
            "{}/endpoints/{}/invocations",
            self.base_url,
            urlencoding::encode(endpoint_name)
        );
        Url::parse(&raw).map_err(|e| {
            RemoteInvocationError::Configuration(ConfigurationError::Invalid {
                field: "endpoint_url",
                message: e.to_string(),
            })
        })
    }

    fn map_transport_error(&self, error: reqwest::Error) -> RemoteInvocationError {
        match (error.is_timeout(), self.timeout) {
            (true, Some(duration)) => RemoteInvocationError::Timeout { duration },
            _ => RemoteInvocationError::Network {
                message: error.to_string(),
            },
        }
    }
}

#[async_trait]
impl InferenceRuntime for SageMakerRuntimeClient {
    #[instrument(skip(self, input), fields(endpoint_name = %input.endpoint_name, body_size = input.body.len()))]
    async fn invoke_endpoint(
        &self,
        input: InvokeEndpointInput,
    ) -> Result<InvokeEndpointOutput, RemoteInvocationError> {
        if input.endpoint_name.is_empty() {
            return Err(ConfigurationError::Invalid {
                field: "endpoint_name",
                message: "endpoint name must not be empty".to_string(),
            }
            .into());
        }

        let url = self.invocation_url(&input.endpoint_name)?;
        let headers = vec![
            ("content-type".to_string(), input.content_type.clone()),
            ("accept".to_string(), input.accept.clone()),
        ];

        let credentials = self.credentials_provider.credentials().await?;
        debug!(provider = self.credentials_provider.name(), "Signing request");
        let auth_headers = self
            .signer
            .sign(&credentials, "POST", &url, &headers, &input.body, Utc::now())?;

        let mut request = self.http_client.post(url);
        for (name, value) in headers.iter().chain(auth_headers.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .body(input.body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let request_id = header("x-amzn-requestid");
        let error_type = header("x-amzn-errortype");
        let content_type = header("content-type");
        let invoked_production_variant = header("x-amzn-invoked-production-variant");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("message")
                        .or_else(|| v.get("Message"))
                        .and_then(|m| m.as_str())
                        .map(String::from)
                });
            return Err(map_service_error(
                status.as_u16(),
                error_type.as_deref(),
                message,
                request_id,
                &input.endpoint_name,
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        debug!(
            status = status.as_u16(),
            request_id = request_id.as_deref().unwrap_or("-"),
            variant = invoked_production_variant.as_deref().unwrap_or("-"),
            response_size = body.len(),
            "Endpoint responded"
        );

        Ok(InvokeEndpointOutput {
            body,
            content_type,
            invoked_production_variant,
        })
    }
}
