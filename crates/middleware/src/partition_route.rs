use std::convert::Infallible;

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::handler::Handler;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::Response;
use axum::routing::{MethodRouter, any};
use stickyroute_application::{ForwardRequest, RouteConfig, RouteOutcome, StickyProxy};
use stickyroute_core::AppError;

use crate::error::ApiResult;

/// Largest request body buffered before routing, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Middleware state binding routes to one proxy instance.
#[derive(Clone)]
pub struct PartitionRoute {
    proxy: StickyProxy,
    config: RouteConfig,
    max_body_bytes: usize,
}

impl PartitionRoute {
    /// Routes through `proxy` with the instance defaults.
    #[must_use]
    pub fn new(proxy: StickyProxy) -> Self {
        Self {
            proxy,
            config: RouteConfig::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Overrides extractor or lease for the routes using this state.
    #[must_use]
    pub fn with_config(mut self, config: RouteConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the body buffering limit.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Serves the request on the partition owner.
///
/// Use with [`axum::middleware::from_fn_with_state`]. When this node owns the
/// partition the inner handler runs with the lock held, otherwise the owner's
/// response is relayed unchanged.
pub async fn route_partitioned(
    State(route): State<PartitionRoute>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, route.max_body_bytes)
        .await
        .map_err(|error| AppError::Validation(format!("request body rejected: {error}")))?;
    let request = ForwardRequest::from_parts(parts, body.to_vec());

    let outcome = route
        .proxy
        .router()
        .route(request, &route.config, move |request| async move {
            next.run(request.map(Body::from)).await
        })
        .await?;

    Ok(match outcome {
        RouteOutcome::Local(response) => response,
        RouteOutcome::Forwarded { response, .. } => response.map(Body::from),
    })
}

/// Wraps `handler` so it only ever runs on the owner of the request's partition.
pub fn partitioned<H, T, S>(route: PartitionRoute, handler: H) -> MethodRouter<S, Infallible>
where
    H: Handler<T, S>,
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    any(handler).route_layer(from_fn_with_state(route, route_partitioned))
}
