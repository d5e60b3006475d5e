use async_trait::async_trait;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use stickyroute_application::{ForwardRequest, ForwardResponse, ForwardingTransport};
use stickyroute_core::{AppError, AppResult};
use stickyroute_domain::NodeAddress;

/// Connection-scoped headers that must not cross a proxy hop.
static HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Forwards requests to their partition owner over HTTP.
#[derive(Clone)]
pub struct HttpForwardingTransport {
    http_client: reqwest::Client,
}

impl HttpForwardingTransport {
    /// Creates a transport; timeouts are configured on `http_client`.
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let connection_listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP_HEADERS.iter().chain(connection_listed.iter()) {
        headers.remove(name);
    }
}

fn outbound_headers(request: &ForwardRequest) -> HeaderMap {
    let mut headers = request.headers().clone();
    strip_hop_by_hop(&mut headers);

    if let Some(host) = headers.remove(header::HOST)
        && !headers.contains_key(X_FORWARDED_HOST)
    {
        headers.insert(X_FORWARDED_HOST, host);
    }
    headers.remove(header::CONTENT_LENGTH);

    headers
}

#[async_trait]
impl ForwardingTransport for HttpForwardingTransport {
    async fn forward(
        &self,
        target: &NodeAddress,
        request: ForwardRequest,
    ) -> AppResult<ForwardResponse> {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map_or("/", |path_and_query| path_and_query.as_str());
        let url = target.join(path_and_query);
        let headers = outbound_headers(&request);
        let method = request.method().clone();

        let response = self
            .http_client
            .request(method, url.as_str())
            .headers(headers)
            .body(request.into_body())
            .send()
            .await
            .map_err(|error| {
                AppError::Forwarding(format!("request to owner '{target}' failed: {error}"))
            })?;

        let status = response.status();
        let mut response_headers = response.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        response_headers.remove(header::CONTENT_LENGTH);

        let body = response.bytes().await.map_err(|error| {
            AppError::Forwarding(format!(
                "failed to read response from owner '{target}': {error}"
            ))
        })?;

        let mut forwarded = http::Response::new(body.to_vec());
        *forwarded.status_mut() = status;
        *forwarded.headers_mut() = response_headers;
        if let Ok(served_by) = HeaderValue::from_str(target.as_str()) {
            forwarded
                .headers_mut()
                .insert(HeaderName::from_static("x-served-by"), served_by);
        }

        Ok(forwarded)
    }
}
