// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Subscriber registry and fan-out
//!
//! The [`Broadcaster`] owns the set of live subscriber connections. A new
//! connection first receives every cached result (the replay) and only then
//! becomes visible to live broadcasts. The connection set stays locked for the
//! whole replay and for every fan-out, so a live result for a source can never
//! overtake the replayed one.
//!
//! Delivery failures are isolated: a connection that cannot take a message is
//! dropped from the registry and the remaining connections are unaffected.

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::LatestCache;
use crate::error::DeliveryFailure;
use crate::models::{AnalysisResult, Envelope};

/// Registry-assigned handle for one subscriber
pub type SubscriberId = Uuid;

/// Transport-side half of a subscriber
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<(), DeliveryFailure>;
}

/// A connection backed by a bounded queue.
///
/// The transport drains the receiving end. `send` never waits: a full queue
/// means the client is not keeping up and the delivery fails.
pub struct ChannelConnection {
    tx: mpsc::Sender<Envelope>,
}

impl ChannelConnection {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn send(&self, envelope: &Envelope) -> Result<(), DeliveryFailure> {
        self.tx.try_send(envelope.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryFailure::Backpressure,
            mpsc::error::TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

pub struct Broadcaster {
    cache: LatestCache,
    connections: Mutex<HashMap<SubscriberId, Arc<dyn Connection>>>,
    delivery_timeout: Duration,
}

impl Broadcaster {
    /// `delivery_timeout` bounds every individual send
    pub fn new(cache: LatestCache, delivery_timeout: Duration) -> Self {
        Self {
            cache,
            connections: Mutex::new(HashMap::new()),
            delivery_timeout,
        }
    }

    pub fn cache(&self) -> &LatestCache {
        &self.cache
    }

    /// Register a connection and replay the cache to it.
    ///
    /// If the replay cannot be delivered the connection is removed again and
    /// the failure is returned.
    pub async fn connect(&self, connection: Arc<dyn Connection>) -> Result<SubscriberId, DeliveryFailure> {
        let id = Uuid::new_v4();
        let mut connections = self.connections.lock().await;
        connections.insert(id, Arc::clone(&connection));

        let replay = self.cache.snapshot().await;
        let replayed = replay.len();

        for result in replay.into_values() {
            if let Err(e) = self.deliver(connection.as_ref(), &Envelope::update(result)).await {
                connections.remove(&id);
                warn!("Replay to subscriber {} failed: {}", id, e);
                return Err(e);
            }
        }

        info!(
            "Subscriber {} connected ({} cached results replayed). Total connections: {}",
            id,
            replayed,
            connections.len()
        );
        Ok(id)
    }

    /// Remove a connection. Returns whether it was still registered.
    pub async fn disconnect(&self, id: SubscriberId) -> bool {
        let mut connections = self.connections.lock().await;
        let removed = connections.remove(&id).is_some();
        if removed {
            info!("Subscriber {} disconnected. Total connections: {}", id, connections.len());
        }
        removed
    }

    /// Cache `result`, then deliver it to every connection.
    ///
    /// Returns the number of connections that accepted it.
    pub async fn broadcast(&self, result: AnalysisResult) -> usize {
        self.cache.insert(result.clone()).await;
        self.fan_out(Envelope::update(result)).await
    }

    /// Deliver an out-of-band status message to every connection
    pub async fn broadcast_status(&self, status: &str, message: &str) -> usize {
        self.fan_out(Envelope::status(status, message)).await
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    async fn fan_out(&self, envelope: Envelope) -> usize {
        let mut connections = self.connections.lock().await;

        let outcomes = join_all(connections.iter().map(|(id, connection)| {
            let envelope = &envelope;
            async move { (*id, self.deliver(connection.as_ref(), envelope).await) }
        }))
        .await;

        let mut delivered = 0;
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Dropping subscriber {}: {}", id, e);
                    connections.remove(&id);
                }
            }
        }

        debug!(
            "Delivered {:?} message to {} of {} subscribers",
            envelope.source_id().unwrap_or("status"),
            delivered,
            connections.len()
        );
        delivered
    }

    async fn deliver(&self, connection: &dyn Connection, envelope: &Envelope) -> Result<(), DeliveryFailure> {
        match tokio::time::timeout(self.delivery_timeout, connection.send(envelope)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DeliveryFailure::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Payload, Provenance};
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records everything it is sent; can be told to start failing
    #[derive(Default)]
    struct RecordingConnection {
        received: std::sync::Mutex<Vec<Envelope>>,
        failing: AtomicBool,
        delay: Option<Duration>,
    }

    impl RecordingConnection {
        fn slow(delay: Duration) -> Self {
            Self { delay: Some(delay), ..Self::default() }
        }

        fn fail(&self) {
            self.failing.store(true, Ordering::SeqCst);
        }

        fn received(&self) -> Vec<Envelope> {
            self.received.lock().unwrap().clone()
        }

        fn sun_values_for(&self, source_id: &str) -> Vec<f64> {
            self.received()
                .into_iter()
                .filter_map(|e| match e.payload {
                    Payload::Update(r) if r.source_id == source_id => Some(r.sun_exposure),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        async fn send(&self, envelope: &Envelope) -> Result<(), DeliveryFailure> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(DeliveryFailure::Closed);
            }
            self.received.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    fn result(source_id: &str, sun: f64) -> AnalysisResult {
        AnalysisResult {
            source_id: source_id.to_string(),
            timestamp: Utc::now(),
            sun_exposure: sun,
            shadow_exposure: 1.0 - sun,
            wetness_score: 0.4,
            brightness: 0.5,
            provenance: Provenance::Live,
            image_url: None,
        }
    }

    fn broadcaster() -> Arc<Broadcaster> {
        Arc::new(Broadcaster::new(LatestCache::new(), Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_new_subscriber_gets_replay_before_live() {
        let broadcaster = broadcaster();
        broadcaster.broadcast(result("a", 0.3)).await;
        broadcaster.broadcast(result("b", 0.6)).await;

        let conn = Arc::new(RecordingConnection::default());
        broadcaster.connect(conn.clone()).await.unwrap();
        assert_eq!(conn.received().len(), 2);

        broadcaster.broadcast(result("c", 0.9)).await;
        let received = conn.received();

        assert_eq!(received.len(), 3);
        let mut replayed: Vec<_> = received[..2].iter().filter_map(|e| e.source_id()).collect();
        replayed.sort();
        assert_eq!(replayed, vec!["a", "b"]);
        assert_eq!(received[2].source_id(), Some("c"));
    }

    #[tokio::test]
    async fn test_empty_cache_replays_nothing() {
        let broadcaster = broadcaster();
        let conn = Arc::new(RecordingConnection::default());
        broadcaster.connect(conn.clone()).await.unwrap();

        assert!(conn.received().is_empty());
        assert_eq!(broadcaster.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_connection_is_dropped_without_affecting_others() {
        let broadcaster = broadcaster();
        let healthy = Arc::new(RecordingConnection::default());
        let broken = Arc::new(RecordingConnection::default());
        broadcaster.connect(healthy.clone()).await.unwrap();
        broadcaster.connect(broken.clone()).await.unwrap();

        broken.fail();
        assert_eq!(broadcaster.broadcast(result("a", 0.5)).await, 1);
        assert_eq!(broadcaster.connection_count().await, 1);

        assert_eq!(broadcaster.broadcast(result("a", 0.7)).await, 1);
        assert_eq!(healthy.sun_values_for("a"), vec![0.5, 0.7]);
        assert!(broken.received().is_empty());
    }

    #[tokio::test]
    async fn test_failed_replay_unregisters() {
        let broadcaster = broadcaster();
        broadcaster.broadcast(result("a", 0.3)).await;

        let conn = Arc::new(RecordingConnection::default());
        conn.fail();

        assert_eq!(broadcaster.connect(conn).await.unwrap_err(), DeliveryFailure::Closed);
        assert_eq!(broadcaster.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_slow_connection_times_out() {
        let broadcaster = Arc::new(Broadcaster::new(LatestCache::new(), Duration::from_millis(20)));
        let slow = Arc::new(RecordingConnection::slow(Duration::from_millis(500)));
        let fast = Arc::new(RecordingConnection::default());
        broadcaster.connect(slow).await.unwrap();
        broadcaster.connect(fast.clone()).await.unwrap();

        assert_eq!(broadcaster.broadcast_status("started", "hello").await, 1);
        assert_eq!(broadcaster.connection_count().await, 1);
        assert_eq!(fast.received().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let broadcaster = broadcaster();
        let id = broadcaster.connect(Arc::new(RecordingConnection::default())).await.unwrap();

        assert!(broadcaster.disconnect(id).await);
        assert!(!broadcaster.disconnect(id).await);
        assert!(!broadcaster.disconnect(Uuid::new_v4()).await);
        assert_eq!(broadcaster.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_updates_cache_even_without_subscribers() {
        let broadcaster = broadcaster();
        assert_eq!(broadcaster.broadcast(result("a", 0.8)).await, 0);
        assert_eq!(broadcaster.cache().get("a").await.unwrap().sun_exposure, 0.8);
    }

    #[tokio::test]
    async fn test_status_reaches_everyone() {
        let broadcaster = broadcaster();
        let a = Arc::new(RecordingConnection::default());
        let b = Arc::new(RecordingConnection::default());
        broadcaster.connect(a.clone()).await.unwrap();
        broadcaster.connect(b.clone()).await.unwrap();

        assert_eq!(broadcaster.broadcast_status("cycle_complete", "2 of 2").await, 2);
        for conn in [a, b] {
            let received = conn.received();
            assert!(matches!(&received[0].payload, Payload::Status(s) if s.status == "cycle_complete"));
        }
    }

    #[tokio::test]
    async fn test_live_result_never_overtakes_replay() {
        let broadcaster = broadcaster();
        broadcaster.broadcast(result("a", 0.1)).await;

        let conn = Arc::new(RecordingConnection::slow(Duration::from_millis(50)));
        let connecting = {
            let broadcaster = Arc::clone(&broadcaster);
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { broadcaster.connect(conn).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        broadcaster.broadcast(result("a", 0.9)).await;
        connecting.await.unwrap().unwrap();

        let seen = conn.sun_values_for("a");
        assert_eq!(seen.last(), Some(&0.9));
    }

    #[tokio::test]
    async fn test_channel_connection_backpressure_and_close() {
        let (conn, mut rx) = ChannelConnection::new(1);
        let envelope = Envelope::status("s", "m");

        conn.send(&envelope).await.unwrap();
        assert_eq!(conn.send(&envelope).await.unwrap_err(), DeliveryFailure::Backpressure);

        assert_eq!(rx.recv().await.unwrap(), envelope);
        drop(rx);
        assert_eq!(conn.send(&envelope).await.unwrap_err(), DeliveryFailure::Closed);
    }
}
