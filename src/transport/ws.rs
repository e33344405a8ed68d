//! WebSocket-backed transport adapter, built on axum's `ws` extractor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::TransportError;

/// Bounded outbox that, unlike `mpsc::Sender`, lets the producer evict the
/// oldest queued item on overflow instead of only ever rejecting the newest
/// one (spec §5, the supervisor outbox's "drop oldest non-audio" policy).
struct Outbox<Out> {
    queue: Mutex<VecDeque<Out>>,
    capacity: usize,
    notify: Notify,
    closed: Arc<AtomicBool>,
}

impl<Out> Outbox<Out> {
    fn new(capacity: usize, closed: Arc<AtomicBool>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            notify: Notify::new(),
            closed,
        }
    }

    /// Enqueues `msg`. When the outbox is full, `evict_oldest` selects the
    /// overflow policy: drop the oldest queued item and accept the new one,
    /// or reject the new one and keep what's already queued.
    fn push(&self, msg: Out, evict_oldest: bool) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::PeerGone);
        }
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            if evict_oldest {
                queue.pop_front();
            } else {
                return Err(TransportError::PeerSlow);
            }
        }
        queue.push_back(msg);
        drop(queue);
        self.notify.notify_one();
        Ok(())
    }

    /// Waits until at least one message is queued or the transport closes,
    /// then drains and returns everything queued at that point.
    async fn recv_batch(&self) -> Vec<Out> {
        loop {
            {
                let mut queue = self.queue.lock();
                if !queue.is_empty() {
                    return queue.drain(..).collect();
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return Vec::new();
            }
            self.notify.notified().await;
        }
    }

    fn drain_now(&self) -> Vec<Out> {
        self.queue.lock().drain(..).collect()
    }
}

/// Handle to a live WebSocket peer. `send` enqueues and returns immediately;
/// the socket itself is owned by background send/receive pump tasks.
#[derive(Clone)]
pub struct WsTransport<Out> {
    outbox: Arc<Outbox<Out>>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl<Out> WsTransport<Out>
where
    Out: Serialize + Send + 'static,
{
    /// Split the socket, spawn the send and receive pumps, and return the
    /// handle plus a channel of decoded inbound messages. Unparseable
    /// frames are logged and dropped rather than closing the connection
    /// (spec §7, "Protocol violation").
    pub fn spawn<In>(
        socket: WebSocket,
        outbox_capacity: usize,
        drain_timeout: Duration,
    ) -> (Self, mpsc::Receiver<In>)
    where
        In: DeserializeOwned + Send + 'static,
    {
        let (mut sink, mut stream) = socket.split();
        let (inbound_tx, inbound_rx) = mpsc::channel::<In>(outbox_capacity);
        let cancel = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));
        let outbox = Arc::new(Outbox::<Out>::new(outbox_capacity, closed.clone()));

        let send_cancel = cancel.clone();
        let send_outbox = outbox.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = send_cancel.cancelled() => break,
                    batch = send_outbox.recv_batch() => {
                        if batch.is_empty() {
                            break;
                        }
                        let mut write_failed = false;
                        for msg in batch {
                            let text = match serde_json::to_string(&msg) {
                                Ok(t) => t,
                                Err(e) => {
                                    warn!(error = %e, "failed to serialize outbound message");
                                    continue;
                                }
                            };
                            if sink.send(Message::Text(text.into())).await.is_err() {
                                write_failed = true;
                                break;
                            }
                        }
                        if write_failed {
                            break;
                        }
                    }
                }
            }

            // Drain whatever is already queued, bounded by Δ_drain, then
            // discard (spec §5, "Cancellation and timeouts").
            let _ = tokio::time::timeout(drain_timeout, async {
                for msg in send_outbox.drain_now() {
                    if let Ok(text) = serde_json::to_string(&msg) {
                        let _ = sink.send(Message::Text(text.into())).await;
                    }
                }
            })
            .await;
            let _ = sink.close().await;
        });

        let recv_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = recv_cancel.cancelled() => break,
                    frame = stream.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<In>(&text) {
                                    Ok(msg) => {
                                        if inbound_tx.send(msg).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => debug!(error = %e, "discarding unparseable inbound message"),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                debug!(error = %e, "transport read error");
                                break;
                            }
                        }
                    }
                }
            }
            recv_cancel.cancel();
        });

        (
            Self {
                outbox,
                cancel,
                closed,
            },
            inbound_rx,
        )
    }

    /// Enqueues an outbound message with "drop newest on full" semantics.
    /// Never blocks.
    pub fn send(&self, msg: Out) -> Result<(), TransportError> {
        self.outbox.push(msg, false)
    }

    /// Enqueues an outbound message, choosing the overflow policy per
    /// message: `evict_oldest` drops the oldest queued item to make room
    /// instead of rejecting this one (spec §5's asymmetric supervisor
    /// outbox policy: evict oldest for non-audio, reject newest for audio).
    pub fn send_with_priority(&self, msg: Out, evict_oldest: bool) -> Result<(), TransportError> {
        self.outbox.push(msg, evict_oldest)
    }

    /// Idempotent close: the first call cancels the pumps, subsequent calls no-op.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.cancel.cancel();
            self.outbox.notify.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_for_test<Out>(capacity: usize) -> WsTransport<Out> {
        let closed = Arc::new(AtomicBool::new(false));
        WsTransport {
            outbox: Arc::new(Outbox::new(capacity, closed.clone())),
            cancel: CancellationToken::new(),
            closed,
        }
    }

    #[test]
    fn close_is_idempotent() {
        let t = transport_for_test::<()>(1);
        t.close();
        t.close();
        assert!(t.is_closed());
    }

    #[tokio::test]
    async fn send_after_close_is_peer_gone() {
        let t = transport_for_test::<u8>(1);
        t.close();
        assert_eq!(t.send(1), Err(TransportError::PeerGone));
    }

    #[tokio::test]
    async fn send_when_full_is_peer_slow() {
        let t = transport_for_test::<u8>(1);
        t.send(1).unwrap();
        assert_eq!(t.send(2), Err(TransportError::PeerSlow));
    }

    #[tokio::test]
    async fn send_with_priority_evicts_oldest_when_full() {
        let t = transport_for_test::<u8>(2);
        t.send(1).unwrap();
        t.send(2).unwrap();
        t.send_with_priority(3, true).unwrap();
        assert_eq!(t.outbox.drain_now(), vec![2, 3]);
    }

    #[tokio::test]
    async fn send_with_priority_without_eviction_matches_send() {
        let t = transport_for_test::<u8>(1);
        t.send(1).unwrap();
        assert_eq!(t.send_with_priority(2, false), Err(TransportError::PeerSlow));
    }
}
