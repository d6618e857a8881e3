// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-twin project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Telemetry fan-out between the tick driver and SSE subscribers.
//!
//! The tick driver publishes one snapshot per step; any number of consumers
//! subscribe through a broadcast channel. A consumer that falls behind has
//! the intermediate snapshots dropped for it rather than stalling the
//! producer, and new subscribers can fetch the latest snapshot immediately
//! on connect.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::simulation::state::PlantSnapshot;

/// Shared snapshot stream for broadcasting telemetry to multiple consumers.
#[derive(Clone, Debug)]
pub struct TelemetryStream {
    sender: broadcast::Sender<PlantSnapshot>,
    /// Latest snapshot for new subscribers.
    latest: Arc<RwLock<Option<PlantSnapshot>>>,
}

impl TelemetryStream {
    /// Create a new stream. `capacity` bounds how far a slow consumer may
    /// lag before snapshots are dropped for it.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// Publish a snapshot to all subscribers. Having no subscribers is not
    /// an error.
    pub async fn publish(&self, snapshot: PlantSnapshot) {
        {
            let mut latest = self.latest.write().await;
            *latest = Some(snapshot.clone());
        }
        let _ = self.sender.send(snapshot);
    }

    /// Latest published snapshot, if any.
    pub async fn latest(&self) -> Option<PlantSnapshot> {
        self.latest.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlantSnapshot> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Consumer side of the telemetry stream.
pub struct TelemetryConsumer {
    receiver: broadcast::Receiver<PlantSnapshot>,
}

impl TelemetryConsumer {
    pub fn new(stream: &TelemetryStream) -> Self {
        Self {
            receiver: stream.subscribe(),
        }
    }

    /// Next snapshot, or `None` once the stream is closed. A lagging
    /// consumer skips the dropped snapshots and resumes with the current
    /// one.
    pub async fn next(&mut self) -> Option<PlantSnapshot> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("telemetry consumer lagged, skipped {} snapshots", skipped);
                }
            }
        }
    }
}
