//! Lambda adapter that forwards a document's features to a SageMaker
//! classification endpoint and relays the model's answer.
//!
//! [`handler::handle_request`] always yields a [`handler::ResponseEnvelope`]:
//! 200 with the classification, 400 when a required key is missing, or 500
//! with a generic message when the endpoint call fails.

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handler;
pub mod signing;

pub use client::{InferenceRuntime, InvokeEndpointInput, InvokeEndpointOutput, SageMakerRuntimeClient};
pub use config::{ClassifierConfig, LogFormat};
pub use error::RemoteInvocationError;
pub use handler::{handle_request, invoke_classification, Outcome, ResponseBody, ResponseEnvelope};
