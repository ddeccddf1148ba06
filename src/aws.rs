//! Shared setup for the identity provider and broker SDK clients.
//!
//! The login and identity-pool operations used here accept unsigned
//! requests, so clients are built without cloud credentials. Every call is
//! single-shot: the SDK's own retries are disabled.

use std::time::Duration;

use aws_config::{BehaviorVersion, Region, SdkConfig, retry::RetryConfig, timeout::TimeoutConfig};
use aws_sdk_cognitoidentityprovider::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

/// Failure of a single service call.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CallError {
    /// The service refused the request with a typed error
    #[error("{code}: {message}")]
    Service {
        /// Error type without namespace, e.g. `NotAuthorizedException`
        code: String,
        /// Service-supplied message
        message: String,
    },
    /// The request never produced a usable answer: connection failure,
    /// timeout, or a server-side error status
    #[error("transport error: {0}")]
    Transport(String),
    /// The response could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// SDK configuration for `region`, optionally pointed at `endpoint`.
pub async fn sdk_config(region: &str, endpoint: Option<&str>, timeout: Duration) -> SdkConfig {
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(timeout)
        .operation_timeout(timeout)
        .build();
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .no_credentials()
        .retry_config(RetryConfig::disabled())
        .timeout_config(timeouts);
    if let Some(url) = endpoint {
        loader = loader.endpoint_url(url);
    }
    loader.load().await
}

/// Classify an SDK failure.
///
/// Only a typed client-side refusal (4xx with an error code) is a
/// [`CallError::Service`]. A 5xx status, or an error status without a code,
/// means the service did not judge the request and is a transport failure.
pub(crate) fn call_error<E>(err: &SdkError<E>) -> CallError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match err {
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            let service = context.err();
            match service.code() {
                Some(code) if status < 500 => CallError::Service {
                    code: code.to_string(),
                    message: service.message().unwrap_or_default().to_string(),
                },
                _ => CallError::Transport(format!(
                    "HTTP {status}: {}",
                    DisplayErrorContext(service)
                )),
            }
        }
        SdkError::ResponseError(_) | SdkError::ConstructionFailure(_) => {
            CallError::Malformed(DisplayErrorContext(err).to_string())
        }
        _ => CallError::Transport(DisplayErrorContext(err).to_string()),
    }
}
