//! Runtime event watcher.
//!
//! Events are drawn one at a time; each qualifying event runs a full
//! discovery cycle to completion before the next event is read.

use arc_swap::ArcSwap;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::client::RuntimeClient;
use super::discovery::{discover, Discovery};
use super::model::LabelConfig;
use crate::observability::metrics;

/// Rebuild the address table and publish it as the next generation.
///
/// On failure the current generation stays published. Returns whether a
/// new generation was published.
pub async fn refresh(
    client: &dyn RuntimeClient,
    current: &ArcSwap<Discovery>,
    labels: &LabelConfig,
) -> bool {
    let generation = current.load().generation + 1;
    match discover(client, labels, generation).await {
        Ok(discovery) => {
            metrics::set_address_table_size(discovery.table.len());
            metrics::record_discovery_cycle("ok");
            current.store(Arc::new(discovery));
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Discovery cycle failed, keeping previous address table");
            metrics::record_discovery_cycle("error");
            false
        }
    }
}

/// Follow the runtime event stream until it ends or shutdown is signalled.
pub async fn watch(
    client: Arc<dyn RuntimeClient>,
    current: Arc<ArcSwap<Discovery>>,
    labels: LabelConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("Docker event watcher starting");
    let mut events = client.events();

    loop {
        tokio::select! {
            next = events.next() => {
                match next {
                    Some(Ok(event)) => {
                        if !event.triggers_refresh() {
                            tracing::trace!(kind = %event.kind, action = %event.action, "Ignoring runtime event");
                            continue;
                        }
                        tracing::debug!(
                            kind = %event.kind,
                            action = %event.action,
                            actor = %event.actor,
                            "Runtime event, rebuilding address table"
                        );
                        refresh(client.as_ref(), &current, &labels).await;
                    }
                    Some(Err(e)) => {
                        // No reconnect: the last published table keeps serving.
                        tracing::debug!(error = %e, "Docker event stream failed, watcher stopping");
                        break;
                    }
                    None => {
                        tracing::debug!("Docker event stream ended, watcher stopping");
                        break;
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Docker event watcher received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
