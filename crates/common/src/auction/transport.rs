//! Outbound transport used by the invoker to execute partner calls.

use async_trait::async_trait;
use error_stack::{Report, ResultExt};
use reqwest::Client;

use crate::error::GatewayError;

use super::types::{HttpRequest, HttpResponse};

/// Executes one outbound call descriptor.
///
/// Implementations own connection pooling and TLS. Dropping the returned
/// future must cancel the in-flight call.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Report<GatewayError>>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Report<GatewayError>> {
        let response = self
            .client
            .request(request.method.clone(), &request.uri)
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .change_context(GatewayError::Transport {
                message: format!("request to {} failed", request.uri),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .change_context(GatewayError::Transport {
                message: format!("failed to read response body from {}", request.uri),
            })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
