//! stickyroute node: one proxy instance serving partitioned endpoints.

#![forbid(unsafe_code)]

mod node_config;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use redis::cluster::ClusterClientBuilder;
use stickyroute_application::{CoordinationStore, ForwardingTransport, StickyProxy};
use stickyroute_core::{AppError, AppResult};
use stickyroute_infrastructure::{
    HttpForwardingTransport, InMemoryCoordinationStore, RedisCoordinationStore,
};
use stickyroute_middleware::{PartitionRoute, partitioned};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::node_config::{NodeConfig, StoreBackend, init_tracing};

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = NodeConfig::load()?;
    let store = build_store(&config.store_backend).await?;
    let http_client = reqwest::Client::builder()
        .timeout(config.forward_timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build http client: {error}")))?;
    let transport: Arc<dyn ForwardingTransport> =
        Arc::new(HttpForwardingTransport::new(http_client));

    let proxy = StickyProxy::start(
        store,
        transport,
        config.node_address.as_str(),
        config.proxy_options(),
    )
    .await?;

    let route = PartitionRoute::new(proxy.clone()).with_max_body_bytes(config.max_body_bytes);
    let app = Router::new()
        .route("/", partitioned(route.clone(), root))
        .route("/hello", partitioned(route, hello))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http());

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind {address}: {error}")))?;
    info!(%address, node_address = %proxy.node_address(), "stickyroute node listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| AppError::Internal(format!("server error: {error}")));

    let report = proxy.close().await?;
    info!(
        released_locks = report.released_locks,
        liveness_cleared = report.liveness_cleared,
        "stickyroute node stopped"
    );

    served
}

async fn build_store(backend: &StoreBackend) -> AppResult<Arc<dyn CoordinationStore>> {
    match backend {
        StoreBackend::Redis { url, key_prefix } => {
            let client = redis::Client::open(url.as_str())
                .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
            let store = RedisCoordinationStore::connect(client, key_prefix.as_str()).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::RedisCluster {
            urls,
            username,
            password,
            key_prefix,
        } => {
            let mut builder = ClusterClientBuilder::new(urls.iter().map(String::as_str));
            if let Some(username) = username {
                builder = builder.username(username.clone());
            }
            if let Some(password) = password {
                builder = builder.password(password.clone());
            }
            let client = builder
                .build()
                .map_err(|error| AppError::Validation(format!("invalid REDIS_URLS: {error}")))?;
            let store = RedisCoordinationStore::connect_cluster(client, key_prefix.as_str()).await?;
            info!(seed_nodes = urls.len(), "connected to redis cluster");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("STORE_BACKEND=memory coordinates this process only");
            Ok(Arc::new(InMemoryCoordinationStore::new()))
        }
    }
}

async fn root() -> &'static str {
    info!("serving /");
    "This is my website!\n"
}

async fn hello() -> &'static str {
    info!("serving /hello");
    "Hello, HTTP!\n"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
