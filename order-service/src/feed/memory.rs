//! In-process feed
//!
//! An unbounded channel stands in for the stream. A message whose handler
//! fails goes to the front of a pending queue and is delivered again after a
//! back-off, before anything new is read. Past the delivery limit it moves
//! to the dead-letter list instead.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{DeliveryTracker, FeedConsumer, FeedProducer, MessageHandler};
use crate::error::{OrderError, OrderResult};

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(10);
const DEFAULT_MAX_DELIVERIES: u32 = 5;

/// Sequence number plus payload
type Message = (u64, Vec<u8>);

/// In-memory [`FeedConsumer`] + [`FeedProducer`]
pub struct MemoryFeed {
    tx: mpsc::UnboundedSender<Message>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    next_seq: AtomicU64,
    pending: Mutex<VecDeque<Message>>,
    dead_letters: Mutex<Vec<Vec<u8>>>,
    deliveries: AtomicUsize,
    acked: AtomicUsize,
    retry_backoff: Duration,
    max_deliveries: u32,
}

impl MemoryFeed {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            next_seq: AtomicU64::new(0),
            pending: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(Vec::new()),
            deliveries: AtomicUsize::new(0),
            acked: AtomicUsize::new(0),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_deliveries: DEFAULT_MAX_DELIVERIES,
        }
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Deliveries before a failing message is dead-lettered (0: unlimited)
    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries;
        self
    }

    /// Messages handed to a handler, redeliveries included
    pub fn deliveries(&self) -> usize {
        self.deliveries.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    /// Messages awaiting redelivery
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or_default()
    }

    /// Payloads given up on after the delivery limit
    pub fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.dead_letters
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    fn take_pending(&self) -> Option<Message> {
        self.pending.lock().ok()?.pop_front()
    }

    fn push_pending(&self, message: Message) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_front(message);
        }
    }

    fn dead_letter(&self, payload: Vec<u8>) {
        if let Ok(mut dead) = self.dead_letters.lock() {
            dead.push(payload);
        }
    }
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedConsumer for MemoryFeed {
    async fn consume(
        &self,
        handler: &dyn MessageHandler,
        shutdown: CancellationToken,
    ) -> OrderResult<()> {
        let mut rx = self.rx.lock().await;
        let mut tracker = DeliveryTracker::new(self.max_deliveries);

        loop {
            let message = match self.take_pending() {
                Some(message) => message,
                None => tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => match received {
                        Some(message) => message,
                        None => break,
                    },
                },
            };

            if shutdown.is_cancelled() {
                self.push_pending(message);
                break;
            }

            let (seq, payload) = message;
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            match handler.handle(&payload).await {
                Ok(()) => {
                    tracker.clear(&seq);
                    self.acked.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) if tracker.record_failure(seq) => {
                    tracing::error!(seq, error = %e, "Delivery limit reached, message dead-lettered");
                    self.dead_letter(payload);
                }
                Err(e) => {
                    tracing::warn!(seq, error = %e, "Handler failed, message left pending");
                    self.push_pending((seq, payload));
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_backoff) => {}
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl FeedProducer for MemoryFeed {
    async fn send(&self, key: &str, payload: &[u8]) -> OrderResult<()> {
        tracing::trace!(key = %key, bytes = payload.len(), "Feed send (memory)");
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send((seq, payload.to_vec()))
            .map_err(|_| OrderError::feed("memory feed closed"))
    }
}
