use anyhow::Result;
use async_trait::async_trait;
use relay_types::{HttpRequest, HttpResponse};

/// Sends one assembled request.
///
/// Implementations return `Ok` for every response the server produced, including error
/// statuses; `Err` is reserved for transport failures such as connection errors or
/// timeouts. The chain executor records either outcome as a step result.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Executor that never touches the network and answers every request with the
/// synthetic dry-run response. Useful for previews and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

#[async_trait]
impl HttpExecutor for NoopExecutor {
    async fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse> {
        Ok(HttpResponse::dry_run())
    }
}
