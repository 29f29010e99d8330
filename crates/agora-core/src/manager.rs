//! The connection manager.
//!
//! The manager is the single owner of the client set. Connects, disconnects
//! and broadcasts arrive as [`Event`]s over one bounded channel and are
//! applied one at a time, so no two events ever interleave.

use agora_protocol::{codec, Envelope};
use agora_transport::ConnectionId;
use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::client::ClientHandle;
use crate::metrics;
use crate::queue::QueueError;

/// Manager errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The event loop is no longer running.
    #[error("Manager stopped")]
    Stopped,
}

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Capacity of the event intake.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
        }
    }
}

/// An event processed by the manager loop.
#[derive(Debug)]
pub enum Event {
    /// Register a client and announce it.
    Connect(ClientHandle),
    /// Unregister a client, if still registered, and announce its departure.
    Disconnect(ConnectionId),
    /// Fan a serialized frame out to every registered client.
    Broadcast(Bytes),
    /// Report a snapshot of the manager state.
    Stats(oneshot::Sender<ManagerStats>),
}

/// Manager statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Number of registered clients.
    pub clients: usize,
    /// Frames successfully enqueued since start.
    pub frames_delivered: u64,
    /// Clients dropped because their queue was full or closed.
    pub slow_consumers_dropped: u64,
}

/// Cloneable handle used to submit events to a [`Manager`].
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    events: mpsc::Sender<Event>,
}

impl ManagerHandle {
    /// Register a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager loop has stopped.
    pub async fn connect(&self, client: ClientHandle) -> Result<(), ManagerError> {
        self.submit(Event::Connect(client)).await
    }

    /// Unregister a client. Unknown ids are ignored by the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager loop has stopped.
    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), ManagerError> {
        self.submit(Event::Disconnect(id)).await
    }

    /// Broadcast a serialized frame to every client.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager loop has stopped.
    pub async fn broadcast(&self, frame: Bytes) -> Result<(), ManagerError> {
        self.submit(Event::Broadcast(frame)).await
    }

    /// Fetch manager statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager loop has stopped.
    pub async fn stats(&self) -> Result<ManagerStats, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.submit(Event::Stats(tx)).await?;
        rx.await.map_err(|_| ManagerError::Stopped)
    }

    async fn submit(&self, event: Event) -> Result<(), ManagerError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ManagerError::Stopped)
    }
}

/// The connection manager.
pub struct Manager {
    /// Registered clients. Only touched from [`Manager::handle_event`].
    clients: HashMap<ConnectionId, ClientHandle>,
    events: mpsc::Receiver<Event>,
    stats: ManagerStats,
}

impl Manager {
    /// Create a manager and the handle used to feed it.
    #[must_use]
    pub fn new(config: ManagerConfig) -> (Self, ManagerHandle) {
        let (tx, rx) = mpsc::channel(config.event_capacity);
        info!("Creating manager with config: {:?}", config);

        let manager = Self {
            clients: HashMap::new(),
            events: rx,
            stats: ManagerStats::default(),
        };

        (manager, ManagerHandle { events: tx })
    }

    /// Create a manager and run its loop on a new task.
    #[must_use]
    pub fn spawn(config: ManagerConfig) -> (ManagerHandle, JoinHandle<()>) {
        let (manager, handle) = Self::new(config);
        (handle, tokio::spawn(manager.run()))
    }

    /// Run the event loop until every [`ManagerHandle`] has been dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle_event(event);
        }

        info!(clients = self.clients.len(), "Manager event loop stopped");
    }

    /// Apply a single event.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connect(client) => self.on_connect(client),
            Event::Disconnect(id) => self.on_disconnect(&id),
            Event::Broadcast(frame) => {
                let delivered = self.fan_out(&frame);
                metrics::record_message(frame.len(), "broadcast");
                trace!(recipients = delivered, "Broadcast");
            }
            Event::Stats(reply) => {
                // The requester may have given up waiting
                let _ = reply.send(self.stats());
            }
        }
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Check if a client is registered.
    #[must_use]
    pub fn is_registered(&self, id: &ConnectionId) -> bool {
        self.clients.contains_key(id)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            clients: self.clients.len(),
            ..self.stats
        }
    }

    fn on_connect(&mut self, client: ClientHandle) {
        let id = client.id().clone();
        let announcement = Envelope::joined(client.name());
        debug!(client = %id, name = %client.name(), "Client connected");

        if let Some(mut previous) = self.clients.insert(id.clone(), client) {
            warn!(client = %id, "Replacing client registered under the same id");
            previous.queue.close();
        }
        metrics::set_registered_clients(self.clients.len());

        // The new client is already registered and sees its own welcome
        self.announce(&announcement);
    }

    fn on_disconnect(&mut self, id: &ConnectionId) {
        let Some(mut client) = self.clients.remove(id) else {
            trace!(client = %id, "Disconnect for unregistered client ignored");
            return;
        };

        client.queue.close();
        metrics::set_registered_clients(self.clients.len());
        debug!(client = %id, name = %client.name(), "Client disconnected");

        self.announce(&Envelope::left(client.name()));
    }

    fn announce(&mut self, envelope: &Envelope) {
        match codec::encode(envelope) {
            Ok(frame) => {
                self.fan_out(&frame);
            }
            Err(e) => {
                error!(error = %e, "Dropping announcement that failed to encode");
                metrics::record_error("encode");
            }
        }
    }

    /// Offer `frame` to every client without blocking.
    ///
    /// Clients whose queue is full or closed are closed and removed in the
    /// same pass. Returns the number of clients that accepted the frame.
    fn fan_out(&mut self, frame: &Bytes) -> usize {
        let mut delivered = 0;
        let mut dropped = 0;

        self.clients.retain(|id, client| {
            match client.queue.try_enqueue(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    match e {
                        QueueError::Full => {
                            warn!(client = %id, name = %client.name(), "Dropping slow client");
                        }
                        QueueError::Closed => {
                            debug!(client = %id, "Dropping client with closed queue");
                        }
                    }
                    client.queue.close();
                    metrics::record_slow_consumer();
                    dropped += 1;
                    false
                }
            }
        });

        self.stats.frames_delivered += delivered as u64;
        if dropped > 0 {
            self.stats.slow_consumers_dropped += dropped;
            metrics::set_registered_clients(self.clients.len());
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OutboundReceiver;
    use agora_protocol::SYSTEM_SENDER;

    fn client(id: &str, name: &str, capacity: usize) -> (ClientHandle, OutboundReceiver) {
        ClientHandle::open(ConnectionId::from(id), name, capacity)
    }

    fn next_envelope(rx: &mut OutboundReceiver) -> Option<Envelope> {
        rx.try_recv().map(|frame| codec::decode(&frame).unwrap())
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<Envelope> {
        std::iter::from_fn(|| next_envelope(rx)).collect()
    }

    #[test]
    fn test_connects_grow_client_set() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let mut receivers = Vec::new();

        for i in 0..5 {
            let (c, rx) = client(&format!("conn-{}", i), "user", 16);
            manager.handle_event(Event::Connect(c));
            receivers.push(rx);
        }

        assert_eq!(manager.client_count(), 5);
    }

    #[test]
    fn test_new_client_sees_own_welcome() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let (a, mut rx_a) = client("a", "A", 16);

        manager.handle_event(Event::Connect(a));

        let welcome = next_envelope(&mut rx_a).unwrap();
        assert_eq!(welcome.sender, SYSTEM_SENDER);
        assert_eq!(welcome, Envelope::joined("A"));
    }

    #[test]
    fn test_duplicate_id_replaces_previous_client() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let (first, rx_first) = client("a", "A", 16);
        let (second, mut rx_second) = client("a", "A2", 16);

        manager.handle_event(Event::Connect(first));
        manager.handle_event(Event::Connect(second));

        assert!(rx_first.is_closed());
        assert_eq!(manager.client_count(), 1);
        assert_eq!(drain(&mut rx_second), vec![Envelope::joined("A2")]);
    }

    #[test]
    fn test_announcement_that_fails_to_encode_is_dropped() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let (a, mut rx_a) = client("a", "A", 16);
        manager.handle_event(Event::Connect(a));
        drain(&mut rx_a);

        let oversized = "x".repeat(codec::MAX_FRAME_SIZE + 1);
        let (b, mut rx_b) = client("b", oversized.as_str(), 16);
        manager.handle_event(Event::Connect(b));

        assert!(manager.is_registered(&"b".into()));
        assert!(next_envelope(&mut rx_a).is_none());
        assert!(next_envelope(&mut rx_b).is_none());

        let frame = Bytes::from_static(br#"{"content":"x"}"#);
        manager.handle_event(Event::Broadcast(frame.clone()));
        assert_eq!(rx_a.try_recv(), Some(frame.clone()));
        assert_eq!(rx_b.try_recv(), Some(frame));
        assert_eq!(manager.stats().clients, 2);
    }

    #[test]
    fn test_disconnect_unknown_is_noop() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let (a, mut rx_a) = client("a", "A", 16);
        manager.handle_event(Event::Connect(a));
        drain(&mut rx_a);

        manager.handle_event(Event::Disconnect("ghost".into()));

        assert_eq!(manager.client_count(), 1);
        assert!(next_envelope(&mut rx_a).is_none());
    }

    #[test]
    fn test_disconnect_closes_queue_once() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let (a, mut rx_a) = client("a", "A", 16);
        let (b, mut rx_b) = client("b", "B", 16);
        manager.handle_event(Event::Connect(a));
        manager.handle_event(Event::Connect(b));
        drain(&mut rx_a);

        manager.handle_event(Event::Disconnect("b".into()));
        assert!(rx_b.is_closed());
        assert!(!manager.is_registered(&"b".into()));
        assert_eq!(drain(&mut rx_a), vec![Envelope::left("B")]);

        // Second disconnect neither re-announces nor touches other clients
        manager.handle_event(Event::Disconnect("b".into()));
        assert_eq!(manager.client_count(), 1);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_client() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let mut receivers = Vec::new();
        for i in 0..3 {
            let (c, rx) = client(&format!("conn-{}", i), "user", 16);
            manager.handle_event(Event::Connect(c));
            receivers.push(rx);
        }
        for rx in &mut receivers {
            drain(rx);
        }

        let frame = codec::encode(&Envelope::chat("A", "hi")).unwrap();
        manager.handle_event(Event::Broadcast(frame.clone()));

        for rx in &mut receivers {
            assert_eq!(rx.try_recv(), Some(frame.clone()));
        }
    }

    #[test]
    fn test_full_queue_is_dropped_in_same_step() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let (fast, mut rx_fast) = client("fast", "F", 16);
        let (slow, rx_slow) = client("slow", "S", 1);
        manager.handle_event(Event::Connect(fast));
        manager.handle_event(Event::Connect(slow));
        // slow's own welcome fills its queue
        drain(&mut rx_fast);

        let frame = codec::encode(&Envelope::chat("F", "hello")).unwrap();
        manager.handle_event(Event::Broadcast(frame.clone()));

        assert!(!manager.is_registered(&"slow".into()));
        assert!(rx_slow.is_closed());
        assert_eq!(rx_fast.try_recv(), Some(frame));
        assert_eq!(manager.stats().slow_consumers_dropped, 1);
        assert_eq!(manager.stats().clients, 1);
    }

    #[test]
    fn test_dropped_receiver_treated_as_disconnected() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let (a, rx_a) = client("a", "A", 16);
        manager.handle_event(Event::Connect(a));
        drop(rx_a);

        manager.handle_event(Event::Broadcast(Bytes::from_static(b"{}")));

        assert_eq!(manager.client_count(), 0);
    }

    #[test]
    fn test_every_member_receives_or_is_removed() {
        let (mut manager, _handle) = Manager::new(ManagerConfig::default());
        let mut receivers = Vec::new();
        for i in 0..8 {
            // Early clients overflow on the welcomes of later ones
            let (c, rx) = client(&format!("conn-{}", i), "user", i + 1);
            manager.handle_event(Event::Connect(c));
            receivers.push((ConnectionId::from(format!("conn-{}", i)), rx));
        }

        let frame = Bytes::from_static(br#"{"content":"x"}"#);
        manager.handle_event(Event::Broadcast(frame.clone()));

        for (id, rx) in &mut receivers {
            let received = std::iter::from_fn(|| rx.try_recv()).any(|f| f == frame);
            assert!(
                received || !manager.is_registered(id),
                "{} neither received the frame nor was removed",
                id
            );
            assert_eq!(received, manager.is_registered(id));
        }
    }

    #[tokio::test]
    async fn test_run_serves_handles_until_dropped() {
        let (handle, task) = Manager::spawn(ManagerConfig::default());
        let (a, mut rx_a) = client("a", "A", 16);

        handle.connect(a).await.unwrap();
        let welcome = rx_a.recv().await.unwrap();
        assert_eq!(codec::decode(&welcome).unwrap(), Envelope::joined("A"));

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.clients, 1);
        assert_eq!(stats.frames_delivered, 1);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_errors_after_stop() {
        let (manager, handle) = Manager::new(ManagerConfig::default());
        drop(manager);

        assert!(matches!(
            handle.disconnect("a".into()).await,
            Err(ManagerError::Stopped)
        ));
    }
}
