//! Request/response correlation over the shared socket.
//!
//! Each correlated request registers its `messageId` here before it is
//! written to the wire. Responses are matched strictly by correlation id,
//! never by arrival order. Every entry is resolved exactly once — by the
//! matching response, by timeout abandonment, or by a connection drop —
//! and resolution always removes it, so the pending set cannot grow
//! unbounded.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::oneshot;

use carelink_shared::protocol::ServerFrame;

struct PendingEntry {
    reply: oneshot::Sender<ServerFrame>,
    issued_at: Instant,
}

/// Map from correlation id to the pending request awaiting its response.
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<String, PendingEntry>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a correlation id and receive the reply channel.
    pub fn register(&self, id: String) -> oneshot::Receiver<ServerFrame> {
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            reply: tx,
            issued_at: Instant::now(),
        };
        if self.inner.lock().unwrap().insert(id, entry).is_some() {
            tracing::warn!("duplicate correlation id registered; previous request dropped");
        }
        rx
    }

    /// Resolve a pending entry with an inbound frame.
    ///
    /// Returns `true` when a matching entry existed (the frame was a
    /// response), `false` otherwise (the frame is a push event).
    pub fn resolve(&self, id: &str, frame: ServerFrame) -> bool {
        let entry = self.inner.lock().unwrap().remove(id);
        match entry {
            Some(entry) => {
                tracing::trace!(
                    correlation_id = id,
                    elapsed_ms = entry.issued_at.elapsed().as_millis() as u64,
                    "correlated response matched"
                );
                // The requester may have timed out and dropped its receiver.
                let _ = entry.reply.send(frame);
                true
            }
            None => false,
        }
    }

    /// Drop a pending entry after its timeout expired. Returns `true` when
    /// the entry was still present.
    pub fn abandon(&self, id: &str) -> bool {
        self.inner.lock().unwrap().remove(id).is_some()
    }

    /// Drop every pending entry (connection lost). Receivers observe the
    /// closed channel.
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: &str) -> ServerFrame {
        ServerFrame::ChannelListResponse {
            message_id: Some(id.to_string()),
            channels: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_each_response_resolves_exactly_one_entry() {
        let pending = PendingRequests::new();

        let ids: Vec<String> = (0..10).map(|_| uuid::Uuid::new_v4().to_string()).collect();
        let receivers: Vec<_> = ids.iter().map(|id| pending.register(id.clone())).collect();

        // Correlation ids are distinct.
        assert_eq!(pending.len(), 10);

        // Resolve out of order; matching is by id, not arrival order.
        for id in ids.iter().rev() {
            assert!(pending.resolve(id, response(id)));
        }
        assert!(pending.is_empty());

        for (id, rx) in ids.iter().zip(receivers) {
            let frame = rx.await.unwrap();
            assert_eq!(frame.message_id(), Some(id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_second_resolution_is_a_push() {
        let pending = PendingRequests::new();
        let _rx = pending.register("m1".into());

        assert!(pending.resolve("m1", response("m1")));
        assert!(!pending.resolve("m1", response("m1")));
    }

    #[tokio::test]
    async fn test_abandon_removes_entry() {
        let pending = PendingRequests::new();
        let rx = pending.register("m1".into());

        assert!(pending.abandon("m1"));
        assert!(!pending.abandon("m1"));
        assert!(pending.is_empty());
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_clear_fails_outstanding_receivers() {
        let pending = PendingRequests::new();
        let rx1 = pending.register("m1".into());
        let rx2 = pending.register("m2".into());

        pending.clear();
        assert!(pending.is_empty());
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }
}
