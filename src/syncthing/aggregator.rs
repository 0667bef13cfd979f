//! Batch driver: fans the collector out over the (filtered) registry under
//! one shared deadline and returns results in registry order, independent of
//! completion order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{HostFilter, InstanceRegistry};
use crate::syncthing::client::DaemonClient;
use crate::syncthing::collector;
use crate::syncthing::model::Node;
use crate::types::DaemonError;

/// Cap on concurrently running collectors within one batch.
const COLLECTOR_CONCURRENCY: usize = 8;

/// Result of one aggregation batch. Cloned out to every request coalesced
/// onto the batch.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub nodes: Vec<Node>,
    pub error: Option<String>,
}

pub struct Aggregator {
    registry: InstanceRegistry,
    http: reqwest::Client,
    deadline: Duration,
    inflight: Mutex<HashMap<HostFilter, Arc<OnceCell<Batch>>>>,
}

impl Aggregator {
    pub fn new(registry: InstanceRegistry, http: reqwest::Client, deadline: Duration) -> Self {
        Self {
            registry,
            http,
            deadline,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one batch for the filter, or joins the batch already in flight
    /// for the same filter.
    pub async fn query(&self, filter: HostFilter) -> Batch {
        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(filter)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let batch = cell.get_or_init(|| self.run_batch(filter)).await.clone();

        let mut inflight = self.inflight.lock().await;
        if let Some(current) = inflight.get(&filter) {
            if Arc::ptr_eq(current, &cell) {
                inflight.remove(&filter);
            }
        }
        batch
    }

    async fn run_batch(&self, filter: HostFilter) -> Batch {
        let instances = self.registry.filtered(filter);
        if instances.is_empty() {
            return Batch::default();
        }
        debug!(count = instances.len(), ?filter, "Starting aggregation batch");

        let cancel = CancellationToken::new();
        let limiter = Arc::new(Semaphore::new(COLLECTOR_CONCURRENCY));

        let handles: Vec<_> = instances
            .iter()
            .map(|instance| {
                let instance = instance.clone();
                let client = DaemonClient::new(self.http.clone(), &instance, cancel.clone());
                let cancel = cancel.clone();
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    let _permit = tokio::select! {
                        _ = cancel.cancelled() => {
                            return Node::unreachable(&instance, DaemonError::Timeout.to_string());
                        }
                        permit = limiter.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => {
                                return Node::unreachable(&instance, DaemonError::Timeout.to_string());
                            }
                        },
                    };
                    collector::collect_node(&client, &instance).await
                })
            })
            .collect();

        let watchdog = {
            let cancel = cancel.clone();
            let deadline = self.deadline;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            })
        };

        let mut nodes = Vec::with_capacity(handles.len());
        for (instance, handle) in instances.iter().zip(handles) {
            match handle.await {
                Ok(node) => nodes.push(node),
                Err(err) => {
                    warn!(instance = %instance.name, error = ?err, "Collector task failed");
                    nodes.push(Node::unreachable(instance, "collector task failed".to_string()));
                }
            }
        }
        watchdog.abort();

        let error = if cancel.is_cancelled() {
            let stalled = nodes.iter().filter(|n| !n.ok).count();
            warn!(
                stalled,
                total = nodes.len(),
                deadline_ms = self.deadline.as_millis() as u64,
                "Batch deadline exceeded, returning partial results"
            );
            Some(format!(
                "Aggregation deadline of {} ms exceeded; partial results returned",
                self.deadline.as_millis()
            ))
        } else {
            None
        };

        Batch { nodes, error }
    }
}
