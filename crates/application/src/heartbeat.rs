//! Background liveness publication for one proxy instance.

use stickyroute_domain::HeartbeatPeriod;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ownership_ledger::OwnershipLedger;

/// Spawns the heartbeat loop on the current tokio runtime.
///
/// Every `period` the loop republishes this node's liveness marker with a TTL
/// of three periods. A failed publication is logged and retried on the next
/// tick. The loop ends as soon as `cancel_token` is cancelled.
pub fn spawn_heartbeat(
    ledger: OwnershipLedger,
    period: HeartbeatPeriod,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            node_address = %ledger.node_address(),
            period_ms = period.as_duration().as_millis(),
            "heartbeat started"
        );

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(period.as_duration()) => {}
            }

            match ledger.publish_liveness(period.liveness_ttl()).await {
                Ok(()) => debug!(node_address = %ledger.node_address(), "heartbeat published"),
                Err(error) => warn!(
                    node_address = %ledger.node_address(),
                    error = %error,
                    "failed to publish heartbeat"
                ),
            }
        }

        info!(node_address = %ledger.node_address(), "heartbeat stopped");
    })
}
