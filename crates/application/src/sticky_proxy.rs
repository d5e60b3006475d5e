//! Lifecycle of one proxy instance: startup liveness, heartbeat, shutdown drain.


use std::sync::{Arc, Mutex, PoisonError};

use stickyroute_core::{AppError, AppResult};
use stickyroute_domain::{HeartbeatPeriod, NodeAddress};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::coordination_ports::CoordinationStore;
use crate::forwarding_ports::ForwardingTransport;
use crate::heartbeat::spawn_heartbeat;
use crate::in_flight_registry::InFlightRegistry;
use crate::ownership_ledger::OwnershipLedger;
use crate::partition_router::{PartitionRouter, RetryPolicy, RouteConfig};

/// Instance-level proxy settings.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    /// Interval between liveness publications.
    pub heartbeat_period: HeartbeatPeriod,
    /// Routing defaults applied when a call site sets nothing.
    pub instance_config: RouteConfig,
    /// Bound on reclaim-and-retry rounds per request.
    pub retry_policy: RetryPolicy,
    /// Delete this instance's liveness marker on close instead of letting it expire.
    pub clear_liveness_on_close: bool,
}

/// What [`StickyProxy::close`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReport {
    /// Number of partition locks released by the drain.
    pub released_locks: usize,
    /// Whether the liveness marker was deleted.
    pub liveness_cleared: bool,
}

struct ProxyInner {
    router: PartitionRouter,
    ledger: OwnershipLedger,
    registry: Arc<InFlightRegistry>,
    cancel_token: CancellationToken,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    clear_liveness_on_close: bool,
}

/// One running proxy instance.
///
/// Cloning is cheap and every clone controls the same instance.
#[derive(Clone)]
pub struct StickyProxy {
    inner: Arc<ProxyInner>,
}

impl StickyProxy {
    /// Starts a proxy instance for `node_address`.
    ///
    /// The liveness marker is published once before this returns, so peers
    /// never mistake a freshly started node for a dead one. The heartbeat then
    /// keeps it alive until [`StickyProxy::close`].
    pub async fn start(
        store: Arc<dyn CoordinationStore>,
        transport: Arc<dyn ForwardingTransport>,
        node_address: &str,
        options: ProxyOptions,
    ) -> AppResult<Self> {
        let node_address = NodeAddress::parse(node_address)?;
        tokio::runtime::Handle::try_current().map_err(|error| {
            AppError::Internal(format!("sticky proxy requires a tokio runtime: {error}"))
        })?;

        let ledger = OwnershipLedger::new(store, node_address);
        ledger
            .publish_liveness(options.heartbeat_period.liveness_ttl())
            .await?;

        let registry = Arc::new(InFlightRegistry::new());
        let router = PartitionRouter::new(
            ledger.clone(),
            Arc::clone(&registry),
            transport,
            options.instance_config,
            options.retry_policy,
        );

        let cancel_token = CancellationToken::new();
        let heartbeat = spawn_heartbeat(
            ledger.clone(),
            options.heartbeat_period,
            cancel_token.clone(),
        );

        info!(
            node_address = %ledger.node_address(),
            instance_id = ledger.instance_id(),
            "sticky proxy started"
        );

        Ok(Self {
            inner: Arc::new(ProxyInner {
                router,
                ledger,
                registry,
                cancel_token,
                heartbeat: Mutex::new(Some(heartbeat)),
                clear_liveness_on_close: options.clear_liveness_on_close,
            }),
        })
    }

    /// Router handling this instance's requests.
    #[must_use]
    pub fn router(&self) -> &PartitionRouter {
        &self.inner.router
    }

    /// Address this instance advertises.
    #[must_use]
    pub fn node_address(&self) -> &NodeAddress {
        self.inner.ledger.node_address()
    }

    /// Whether [`StickyProxy::close`] has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.registry.is_closed()
    }

    /// Stops the heartbeat and releases every partition lock this node holds.
    ///
    /// Requests still running keep their output but no longer own a lock.
    /// Closing twice is rejected.
    pub async fn close(&self) -> AppResult<CloseReport> {
        let heartbeat = self
            .inner
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| AppError::Conflict("sticky proxy is already closed".to_owned()))?;

        self.inner.cancel_token.cancel();
        if let Err(error) = heartbeat.await {
            warn!(error = %error, "heartbeat task ended abnormally");
        }

        let released_locks = self.inner.registry.drain_all(&self.inner.ledger).await?;

        let liveness_cleared = if self.inner.clear_liveness_on_close {
            self.inner.ledger.clear_liveness().await?
        } else {
            false
        };

        info!(
            node_address = %self.node_address(),
            released_locks,
            liveness_cleared,
            "sticky proxy closed"
        );

        Ok(CloseReport {
            released_locks,
            liveness_cleared,
        })
    }
}
