use crate::client::{InferenceRuntime, InvokeEndpointInput};
use crate::error::RemoteInvocationError;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

pub const ENDPOINT_IDENTIFIER_KEY: &str = "endpoint_identifier";
// Legacy key still sent by older callers.
pub const ENDPOINT_NAME_ALIAS: &str = "endpoint_name";
pub const FEATURES_KEY: &str = "features";
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred.";

#[derive(Debug, Serialize, PartialEq)]
pub struct ResponseEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: ResponseBody,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ResponseBody {
    Classification { classification: Value },
    Error { error: String },
}

/// Result of processing one event, before it is put on the wire.
#[derive(Debug)]
pub enum Outcome {
    Success { result: Value },
    BadRequest { field: &'static str },
    InternalError { detail: String },
}

impl Outcome {
    pub fn into_response(self) -> ResponseEnvelope {
        match self {
            Outcome::Success { result } => ResponseEnvelope {
                status_code: 200,
                body: ResponseBody::Classification {
                    classification: result,
                },
            },
            Outcome::BadRequest { field } => ResponseEnvelope {
                status_code: 400,
                body: ResponseBody::Error {
                    error: format!("Missing key in the input: '{}'", field),
                },
            },
            // `detail` is for the logs only.
            Outcome::InternalError { .. } => ResponseEnvelope {
                status_code: 500,
                body: ResponseBody::Error {
                    error: INTERNAL_ERROR_MESSAGE.to_string(),
                },
            },
        }
    }
}

/// Send `features` as JSON to the named endpoint and decode its JSON answer.
pub async fn invoke_classification(
    runtime: &dyn InferenceRuntime,
    endpoint_identifier: &str,
    features: &Value,
) -> Result<Value, RemoteInvocationError> {
    info!(endpoint = endpoint_identifier, "Invoking classification endpoint");

    let payload = serde_json::to_vec(features).map_err(RemoteInvocationError::Encode)?;
    let output = runtime
        .invoke_endpoint(InvokeEndpointInput::json(endpoint_identifier, payload))
        .await?;

    let text = std::str::from_utf8(&output.body).map_err(|e| RemoteInvocationError::Protocol {
        message: format!("response body is not UTF-8: {}", e),
    })?;
    let result: Value = serde_json::from_str(text).map_err(|e| RemoteInvocationError::Protocol {
        message: format!("response body is not JSON: {}", e),
    })?;

    info!(endpoint = endpoint_identifier, result = %result, "Classification result");
    Ok(result)
}

/// Map one event to its outcome. Never fails; every error becomes an `Outcome`.
pub async fn classify_event(event: &Value, runtime: &dyn InferenceRuntime) -> Outcome {
    let Some(endpoint) = event
        .get(ENDPOINT_IDENTIFIER_KEY)
        .or_else(|| event.get(ENDPOINT_NAME_ALIAS))
    else {
        return Outcome::BadRequest {
            field: ENDPOINT_IDENTIFIER_KEY,
        };
    };
    let Some(features) = event.get(FEATURES_KEY) else {
        return Outcome::BadRequest { field: FEATURES_KEY };
    };

    let Some(endpoint) = endpoint.as_str() else {
        return Outcome::InternalError {
            detail: format!("{} must be a string, got {}", ENDPOINT_IDENTIFIER_KEY, endpoint),
        };
    };

    match invoke_classification(runtime, endpoint, features).await {
        Ok(result) => Outcome::Success { result },
        Err(e) => Outcome::InternalError {
            detail: match e.request_id() {
                Some(request_id) => format!("{} (request id {})", e, request_id),
                None => e.to_string(),
            },
        },
    }
}

/// Handle one event end to end: classify, log the outcome, build the envelope.
pub async fn handle_request(event: Value, runtime: &dyn InferenceRuntime) -> ResponseEnvelope {
    info!(event = %event, "Received event");
    let outcome = classify_event(&event, runtime).await;

    match &outcome {
        Outcome::Success { .. } => {}
        Outcome::BadRequest { field } => warn!(field = *field, "Missing key in the event"),
        Outcome::InternalError { detail } => error!(error = %detail, "Error during classification"),
    }

    let response = outcome.into_response();
    info!(status_code = response.status_code, "Handler response");
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{InvokeEndpointOutput, MockInferenceRuntime};
    use crate::error::{ServiceError, ServiceErrorKind};
    use bytes::Bytes;
    use serde_json::json;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    fn responding_with(body: &'static [u8]) -> MockInferenceRuntime {
        let mut runtime = MockInferenceRuntime::new();
        runtime.expect_invoke_endpoint().times(1).returning(move |_| {
            Ok(InvokeEndpointOutput {
                body: Bytes::from_static(body),
                ..Default::default()
            })
        });
        runtime
    }

    fn failing() -> MockInferenceRuntime {
        let mut runtime = MockInferenceRuntime::new();
        runtime.expect_invoke_endpoint().times(1).returning(|_| {
            Err(RemoteInvocationError::Service(ServiceError {
                kind: ServiceErrorKind::InternalFailure,
                status: 500,
                message: "SageMaker error: secret-host-10.0.0.7".to_string(),
                request_id: Some("req-1".to_string()),
            }))
        });
        runtime
    }

    fn never_called() -> MockInferenceRuntime {
        let mut runtime = MockInferenceRuntime::new();
        runtime.expect_invoke_endpoint().times(0);
        runtime
    }

    #[tokio::test]
    async fn test_successful_classification() {
        let features = json!({"summary": "x", "keywords": ["a", "b"]});
        let expected_body = serde_json::to_vec(&features).unwrap();

        let mut runtime = MockInferenceRuntime::new();
        runtime
            .expect_invoke_endpoint()
            .withf(move |input| {
                input.endpoint_name == "clf-1"
                    && input.body == expected_body
                    && input.content_type == "application/json"
            })
            .times(1)
            .returning(|_| {
                Ok(InvokeEndpointOutput {
                    body: Bytes::from_static(br#"{"category":"Category A"}"#),
                    ..Default::default()
                })
            });

        let event = json!({"endpoint_identifier": "clf-1", "features": features});
        let response = handle_request(event, &runtime).await;

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"statusCode": 200, "body": {"classification": {"category": "Category A"}}})
        );
    }

    #[tokio::test]
    async fn test_endpoint_name_alias_is_accepted() {
        let runtime = responding_with(br#"{"category":"Category B"}"#);
        let event = json!({"endpoint_name": "classification-endpoint", "features": {"summary": "s"}});

        let response = handle_request(event, &runtime).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.body,
            ResponseBody::Classification {
                classification: json!({"category": "Category B"})
            }
        );
    }

    #[tokio::test]
    async fn test_missing_endpoint_identifier() {
        let runtime = never_called();
        let event = json!({"features": {"summary": "x", "keywords": ["a"]}});

        let response = handle_request(event, &runtime).await;

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"statusCode": 400, "body": {"error": "Missing key in the input: 'endpoint_identifier'"}})
        );
    }

    #[tokio::test]
    async fn test_missing_features() {
        let runtime = never_called();
        let event = json!({"endpoint_identifier": "clf-1"});

        let response = handle_request(event, &runtime).await;

        assert_eq!(response.status_code, 400);
        match response.body {
            ResponseBody::Error { error } => assert!(error.contains("'features'")),
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_object_event_is_bad_request() {
        let runtime = never_called();

        let response = handle_request(json!(["clf-1", {}]), &runtime).await;

        assert_eq!(response.status_code, 400);
    }

    #[tokio::test]
    async fn test_null_features_are_still_present() {
        let mut runtime = MockInferenceRuntime::new();
        runtime
            .expect_invoke_endpoint()
            .withf(|input| input.body == b"null")
            .times(1)
            .returning(|_| {
                Ok(InvokeEndpointOutput {
                    body: Bytes::from_static(b"\"unknown\""),
                    ..Default::default()
                })
            });

        let event = json!({"endpoint_identifier": "clf-1", "features": null});
        let response = handle_request(event, &runtime).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.body,
            ResponseBody::Classification {
                classification: json!("unknown")
            }
        );
    }

    #[tokio::test]
    async fn test_remote_failure_is_not_leaked() {
        let runtime = failing();
        let event = json!({"endpoint_identifier": "clf-1", "features": {"summary": "x"}});

        let response = handle_request(event, &runtime).await;

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"statusCode": 500, "body": {"error": "An internal server error occurred."}})
        );
    }

    #[tokio::test]
    async fn test_failure_detail_stays_in_outcome() {
        let runtime = failing();
        let event = json!({"endpoint_identifier": "clf-1", "features": {}});

        match classify_event(&event, &runtime).await {
            Outcome::InternalError { detail } => {
                assert!(detail.contains("secret-host-10.0.0.7"));
                assert!(detail.contains("req-1"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_response_is_internal_error() {
        let bodies: [&'static [u8]; 2] = [b"<html>oops</html>", &[0xff, 0xfe, 0x00]];
        for body in bodies {
            let mut runtime = MockInferenceRuntime::new();
            runtime.expect_invoke_endpoint().times(1).returning(move |_| {
                Ok(InvokeEndpointOutput {
                    body: Bytes::copy_from_slice(body),
                    ..Default::default()
                })
            });
            let event = json!({"endpoint_identifier": "clf-1", "features": {}});

            let response = handle_request(event, &runtime).await;

            assert_eq!(response.status_code, 500);
            assert_eq!(
                response.body,
                ResponseBody::Error {
                    error: INTERNAL_ERROR_MESSAGE.to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_non_string_identifier_is_internal_error() {
        let runtime = never_called();
        let event = json!({"endpoint_identifier": 42, "features": {}});

        let response = handle_request(event, &runtime).await;

        assert_eq!(response.status_code, 500);
    }

    #[tokio::test]
    async fn test_invoke_classification_passes_result_through() {
        let results = [
            json!(null),
            json!(true),
            json!(3.5),
            json!("Category A"),
            json!([1, "two", {"three": [3]}]),
            json!({"category": "Category A", "scores": {"a": 0.9, "b": 0.1}}),
        ];

        for expected in results {
            let encoded = serde_json::to_vec(&expected).unwrap();
            let mut runtime = MockInferenceRuntime::new();
            runtime.expect_invoke_endpoint().times(1).returning(move |_| {
                Ok(InvokeEndpointOutput {
                    body: Bytes::from(encoded.clone()),
                    ..Default::default()
                })
            });

            let result = invoke_classification(&runtime, "clf-1", &json!({"summary": "x"}))
                .await
                .unwrap();
            assert_eq!(result, expected);
        }
    }

    #[tokio::test]
    async fn test_invoke_classification_propagates_errors() {
        let runtime = failing();

        let err = invoke_classification(&runtime, "clf-1", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, RemoteInvocationError::Service(_)));
        assert!(err.to_string().contains("SageMaker error"));
    }

    #[tokio::test]
    async fn test_large_integers_pass_through_exactly() {
        let mut runtime = MockInferenceRuntime::new();
        runtime
            .expect_invoke_endpoint()
            .withf(|input| input.body == br#"{"big":123456789012345678901234567890}"#)
            .times(1)
            .returning(|_| {
                Ok(InvokeEndpointOutput {
                    body: Bytes::from_static(br#"{"id":18446744073709551616,"score":-9223372036854775809}"#),
                    ..Default::default()
                })
            });

        let event: Value = serde_json::from_str(
            r#"{"endpoint_identifier":"clf-1","features":{"big":123456789012345678901234567890}}"#,
        )
        .unwrap();
        let response = handle_request(event, &runtime).await;

        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"statusCode":200,"body":{"classification":{"id":18446744073709551616,"score":-9223372036854775809}}}"#
        );
    }

    #[tokio::test]
    async fn test_null_identifier_does_not_fall_back_to_alias() {
        let runtime = never_called();
        let event = json!({"endpoint_identifier": null, "endpoint_name": "clf-1", "features": {}});

        let response = handle_request(event, &runtime).await;

        assert_eq!(response.status_code, 500);
    }

    #[tokio::test]
    async fn test_event_and_failure_are_logged() {
        let (logs, _guard) = capture_logs();
        let runtime = failing();
        let event = json!({"endpoint_identifier": "clf-1", "features": {"summary": "x"}});

        let response = handle_request(event, &runtime).await;

        assert_eq!(response.status_code, 500);
        let logs = logs.contents();
        assert!(logs.contains("Received event"));
        assert!(logs.contains(r#""endpoint_identifier":"clf-1""#));
        assert!(logs.contains("secret-host-10.0.0.7"));
    }
}
