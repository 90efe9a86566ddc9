use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

use document_classifier::credentials::EnvCredentialsProvider;
use document_classifier::{handle_request, ClassifierConfig, LogFormat, SageMakerRuntimeClient};

// CloudWatch stamps each line, so timestamps are left out.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time();

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_ansi(false).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Client is built once at cold start and lent to every invocation
    let config = ClassifierConfig::from_env()?;
    init_tracing(config.log_format);

    let client = SageMakerRuntimeClient::new(&config, Arc::new(EnvCredentialsProvider))?;
    tracing::info!(
        region = %config.region,
        endpoint = %config.runtime_endpoint(),
        timeout = ?config.request_timeout,
        "Classifier initialized"
    );

    let client = &client;
    run(service_fn(move |event: LambdaEvent<Value>| async move {
        let span = tracing::info_span!("invocation", request_id = %event.context.request_id);
        Ok::<_, Error>(handle_request(event.payload, client).instrument(span).await)
    }))
    .await
}
