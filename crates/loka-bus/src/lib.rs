//! In-process publish/subscribe bus with named channels.
//!
//! Channels are created lazily on first subscription and pruned once every
//! receiver is gone. Delivery is fan-out: each currently subscribed receiver
//! gets its own clone of the event. Publishing on a channel nobody listens
//! to silently drops the event — the bus enforces no correlation and no
//! access control.
//!
//! [`EventBus::call`] layers the request/response idiom on top: it
//! subscribes to the reply channel *before* publishing the request, then
//! resolves on the first event observed there, so callers never race their
//! own answer.

use std::collections::HashMap;
use std::sync::Arc;

use loka_protocol::{BusPayload, ProtocolError, ProtocolResult};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

/// One delivery on a bus channel.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub channel: String,
    pub payload: BusPayload,
}

/// Cheap-to-clone handle to a shared bus. All clones observe the same
/// channels; the handle is the unit an agent tree shares by reference.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<BusEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds the per-receiver backlog; a receiver that lags past
    /// it skips ahead rather than blocking the publisher.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                capacity,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Publish `payload` on `channel`, delivering to receivers subscribed at
    /// this moment. Returns the number of receivers reached.
    pub fn emit(&self, channel: &str, payload: impl Into<BusPayload>) -> usize {
        let event = BusEvent {
            channel: channel.to_owned(),
            payload: payload.into(),
        };

        let mut channels = self.inner.channels.lock();
        let Some(sender) = channels.get(channel) else {
            trace!(channel, "emit on silent channel dropped");
            return 0;
        };
        if sender.receiver_count() == 0 {
            channels.remove(channel);
            trace!(channel, "pruned channel with no receivers");
            return 0;
        }
        sender.send(event).unwrap_or(0)
    }

    /// Subscribe to `channel`. The subscription lives until the returned
    /// stream is dropped.
    pub fn subscribe(&self, channel: &str) -> BusStream {
        let mut channels = self.inner.channels.lock();
        let sender = channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0);
        BusStream {
            channel: channel.to_owned(),
            receiver: sender.subscribe(),
        }
    }

    /// Wait for the next single event on `channel` (a one-shot
    /// subscription).
    pub async fn next(&self, channel: &str) -> ProtocolResult<BusEvent> {
        let mut stream = self.subscribe(channel);
        stream
            .recv()
            .await
            .ok_or_else(|| ProtocolError::ChannelClosed(channel.to_owned()))
    }

    /// Request/response: subscribe to `reply`, publish `payload` on
    /// `request`, and resolve on the first event observed on `reply`.
    ///
    /// There is no timeout; if nothing ever answers on `reply` the future
    /// pends forever. Bounding the wait is the caller's concern.
    pub async fn call(
        &self,
        request: &str,
        reply: &str,
        payload: impl Into<BusPayload>,
    ) -> ProtocolResult<BusEvent> {
        let mut stream = self.subscribe(reply);
        self.emit(request, payload);
        stream
            .recv()
            .await
            .ok_or_else(|| ProtocolError::ChannelClosed(reply.to_owned()))
    }

    /// Number of live channels; diagnostics only.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// An open subscription on one channel.
pub struct BusStream {
    channel: String,
    receiver: broadcast::Receiver<BusEvent>,
}

impl BusStream {
    /// Receive the next event. `None` once the channel is closed. A lagged
    /// receiver skips the overwritten backlog and keeps going.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(channel = %self.channel, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use loka_protocol::{Packet, channels};
    use serde_json::json;

    #[tokio::test]
    async fn emit_reaches_every_current_subscriber() -> Result<()> {
        let bus = EventBus::new();
        let mut first = bus.subscribe("greetings");
        let mut second = bus.subscribe("greetings");

        let reached = bus.emit("greetings", json!("hi"));
        assert_eq!(reached, 2);

        for stream in [&mut first, &mut second] {
            let event = stream.recv().await.expect("event delivered");
            assert_eq!(event.channel, "greetings");
            assert!(matches!(event.payload, BusPayload::Value(ref v) if v == "hi"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        assert_eq!(bus.emit("nobody", BusPayload::Empty), 0);
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn dropped_subscriptions_prune_the_channel() {
        let bus = EventBus::new();
        let stream = bus.subscribe("short-lived");
        assert_eq!(bus.channel_count(), 1);
        drop(stream);

        // Next emit notices the channel has no receivers and prunes it.
        assert_eq!(bus.emit("short-lived", BusPayload::Empty), 0);
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn next_resolves_on_the_first_event_only() -> Result<()> {
        let bus = EventBus::new();
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.next("once").await })
        };
        tokio::task::yield_now().await;

        while bus.emit("once", json!(1)) == 0 {
            tokio::task::yield_now().await;
        }
        let event = waiter.await??;
        assert!(matches!(event.payload, BusPayload::Value(ref v) if v == 1));
        Ok(())
    }

    #[tokio::test]
    async fn call_observes_the_correlated_reply() -> Result<()> {
        let bus = EventBus::new();
        let responder = {
            let bus = bus.clone();
            tokio::spawn(async move {
                let mut questions = bus.subscribe(&channels::question("echo"));
                let event = questions.recv().await.expect("question arrives");
                let packet = event.payload.into_packet().expect("packet payload");
                let reply = channels::answer("echo", &packet.id);
                bus.emit(&reply, BusPayload::packet(packet));
            })
        };
        tokio::task::yield_now().await;

        let packet = Packet::new("echo ping");
        let reply = channels::answer("echo", &packet.id);
        let event = bus
            .call(&channels::question("echo"), &reply, BusPayload::packet(packet))
            .await?;
        let answered = event.payload.into_packet().expect("packet payload");
        assert_eq!(answered.q.text, "echo ping");

        responder.await?;
        Ok(())
    }
}
