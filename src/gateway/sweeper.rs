//! Heartbeat sweeper: periodic liveness probes for registered connections.

use std::sync::Arc;
use std::time::Duration;

use super::protocol::ServerEvent;
use super::registry::ConnectionRegistry;

/// Run one sweep: probe every registered connection for the knowledge-base
/// key with a heartbeat event and prune the ones whose event channel is
/// gone. Returns the number pruned. Safe to race with a connection's own
/// cleanup because registry removal is idempotent.
pub fn sweep(registry: &ConnectionRegistry, kb_key: &str) -> usize {
    let mut pruned = 0;
    for connection_id in registry.snapshot_ids(kb_key) {
        // The entry may have been removed between snapshot and probe.
        let Some(handle) = registry.get(kb_key, connection_id) else {
            continue;
        };
        if handle.sender.send(ServerEvent::Heartbeat {}).is_err() {
            tracing::debug!(%connection_id, "heartbeat failed; pruning connection");
            registry.unregister(kb_key, connection_id);
            pruned += 1;
        }
    }
    pruned
}

/// Run the sweeper forever at a fixed period, independent of any
/// connection's lifecycle.
pub async fn run(registry: Arc<ConnectionRegistry>, kb_key: String, period: Duration) {
    tracing::info!(period_secs = period.as_secs(), "heartbeat sweeper started");
    loop {
        tokio::time::sleep(period).await;
        let pruned = sweep(&registry, &kb_key);
        if pruned > 0 {
            tracing::info!(pruned, "heartbeat sweep pruned stale connections");
        }
    }
}
