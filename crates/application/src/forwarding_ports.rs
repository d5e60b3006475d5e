use async_trait::async_trait;

use stickyroute_core::AppResult;
use stickyroute_domain::NodeAddress;

/// Buffered inbound request handed to the router.
pub type ForwardRequest = http::Request<Vec<u8>>;

/// Buffered response returned by the owning node.
pub type ForwardResponse = http::Response<Vec<u8>>;

/// Reverse-proxies one request to the node owning its partition.
#[async_trait]
pub trait ForwardingTransport: Send + Sync {
    /// Sends `request` to `target` and returns the peer's response.
    ///
    /// Host rewriting and hop-by-hop header handling belong to the
    /// implementation. Failures to reach the peer are `AppError::Forwarding`.
    async fn forward(
        &self,
        target: &NodeAddress,
        request: ForwardRequest,
    ) -> AppResult<ForwardResponse>;
}
