//! The broker side of the bus, hosted in-process by the controller (spec
//! §2, §4.1). Modeled on the teacher's `WorkerPool` (round-robin dispatch
//! over a registered set of senders, guarded by a single lock) generalized
//! from one pool of workers to one pool per topic, plus a fan-out path for
//! publish/subscribe.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use aiperf_core::error::Result;

use crate::envelope::{Envelope, EnvelopeKind};
use crate::framing::{self, FramedBus};
use crate::transport::BusListener;

const DELIVERY_QUEUE_DEPTH: usize = 1024;

#[derive(Default)]
struct Topic {
    subscribers: Vec<mpsc::Sender<Envelope>>,
    pull_consumers: VecDeque<mpsc::Sender<Envelope>>,
    next_pull: usize,
    publisher_seq: HashMap<String, u64>,
}

#[derive(Default)]
struct Broker {
    topics: Mutex<HashMap<String, Topic>>,
}

impl Broker {
    fn subscribe(&self, topic: &str, tx: mpsc::Sender<Envelope>) {
        self.topics.lock().entry(topic.to_string()).or_default().subscribers.push(tx);
    }

    fn register_pull(&self, topic: &str, tx: mpsc::Sender<Envelope>) {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .pull_consumers
            .push_back(tx);
    }

    /// Fans `envelope` out to every current subscriber of its topic,
    /// stamping a monotonic per-(publisher, topic) sequence number first
    /// (FIFO-per-(publisher,topic) ordering, spec §2).
    fn publish(&self, envelope: &mut Envelope) -> Vec<mpsc::Sender<Envelope>> {
        let mut topics = self.topics.lock();
        let topic = topics.entry(envelope.topic.clone()).or_default();
        let seq = topic.publisher_seq.entry(envelope.publisher_id.clone()).or_insert(0);
        *seq += 1;
        envelope.seq = *seq;
        topic.subscribers.retain(|tx| !tx.is_closed());
        topic.subscribers.clone()
    }

    /// Picks the next pull consumer for `topic` round-robin, skipping
    /// closed channels, mirroring `WorkerPool::next_worker_index`.
    fn next_pull_consumer(&self, topic: &str) -> Option<mpsc::Sender<Envelope>> {
        let mut topics = self.topics.lock();
        let entry = topics.entry(topic.to_string()).or_default();
        entry.pull_consumers.retain(|tx| !tx.is_closed());
        if entry.pull_consumers.is_empty() {
            return None;
        }
        let idx = entry.next_pull % entry.pull_consumers.len();
        entry.next_pull = entry.next_pull.wrapping_add(1);
        entry.pull_consumers.get(idx).cloned()
    }
}

/// Runs the broker accept loop until `shutdown` is cancelled. Each
/// connection gets its own reader/writer task pair, matching the teacher's
/// one-task-per-worker-channel layout.
pub struct BusServer {
    broker: Arc<Broker>,
    connection_seq: AtomicU64,
}

impl BusServer {
    pub fn new() -> Self {
        Self {
            broker: Arc::new(Broker::default()),
            connection_seq: AtomicU64::new(0),
        }
    }

    pub async fn run(&self, listener: BusListener, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("bus server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let stream = accepted?;
                    let id = self.connection_seq.fetch_add(1, Ordering::Relaxed);
                    let broker = Arc::clone(&self.broker);
                    let child_token = shutdown.child_token();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(id, framing::frame(stream), broker, child_token).await {
                            warn!(connection = id, error = %err, "bus connection ended with error");
                        }
                    });
                }
            }
        }
    }
}

impl Default for BusServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_connection(
    id: u64,
    mut framed: FramedBus,
    broker: Arc<Broker>,
    shutdown: CancellationToken,
) -> Result<()> {
    let (out_tx, mut out_rx) = mpsc::channel::<Envelope>(DELIVERY_QUEUE_DEPTH);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(envelope) => framing::send(&mut framed, &envelope).await?,
                    None => return Ok(()),
                }
            }
            incoming = framing::recv(&mut framed) => {
                let Some(envelope) = incoming? else {
                    trace!(connection = id, "peer closed");
                    return Ok(());
                };
                match envelope.kind {
                    EnvelopeKind::Subscribe => broker.subscribe(&envelope.topic, out_tx.clone()),
                    EnvelopeKind::PullRegister => broker.register_pull(&envelope.topic, out_tx.clone()),
                    EnvelopeKind::Publish => {
                        let mut envelope = envelope;
                        let targets = broker.publish(&mut envelope);
                        let delivered = Envelope {
                            kind: EnvelopeKind::Delivered,
                            ..envelope
                        };
                        for tx in targets {
                            let _ = tx.send(delivered.clone()).await;
                        }
                    }
                    EnvelopeKind::Push => {
                        if let Some(tx) = broker.next_pull_consumer(&envelope.topic) {
                            let delivered = Envelope {
                                kind: EnvelopeKind::PullDelivered,
                                ..envelope
                            };
                            let _ = tx.send(delivered).await;
                        } else {
                            warn!(topic = %envelope.topic, "push with no registered pull consumers, dropping");
                        }
                    }
                    other => {
                        warn!(connection = id, kind = ?other, "unexpected frame from client");
                    }
                }
            }
        }
    }
}
