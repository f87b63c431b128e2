//! Client handle for the bus: connect, subscribe, publish, push, pull.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use aiperf_core::config::CommBackend;
use aiperf_core::error::Result;

use crate::envelope::{Envelope, EnvelopeKind};
use crate::framing::{self, FramedBus};
use crate::transport;

const INBOX_DEPTH: usize = 1024;

/// A connected bus client. Reading and writing are split across a single
/// background pump task so publish/push calls never block on unrelated
/// inbound traffic.
pub struct BusClient {
    publisher_id: String,
    outbound: mpsc::Sender<Envelope>,
    inbound: mpsc::Receiver<Envelope>,
    _pump: JoinHandle<()>,
}

impl BusClient {
    pub async fn connect(backend: CommBackend, addr: &str, publisher_id: impl Into<String>) -> Result<Self> {
        let stream = transport::connect(backend, addr).await?;
        let framed = framing::frame(stream);
        let (out_tx, out_rx) = mpsc::channel(INBOX_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(INBOX_DEPTH);
        let pump = tokio::spawn(pump_loop(framed, out_rx, in_tx));
        Ok(Self {
            publisher_id: publisher_id.into(),
            outbound: out_tx,
            inbound: in_rx,
            _pump: pump,
        })
    }

    pub async fn subscribe(&self, topic: impl Into<String>) -> Result<()> {
        self.send_raw(Envelope::subscribe(topic)).await
    }

    pub async fn pull_register(&self, topic: impl Into<String>) -> Result<()> {
        self.send_raw(Envelope::pull_register(topic)).await
    }

    pub async fn publish(&self, topic: impl Into<String>, payload: serde_json::Value) -> Result<()> {
        self.send_raw(Envelope::publish(topic, self.publisher_id.clone(), payload)).await
    }

    pub async fn push(&self, topic: impl Into<String>, payload: serde_json::Value) -> Result<()> {
        self.send_raw(Envelope::push(topic, payload)).await
    }

    /// Receives the next delivered (`Delivered` or `PullDelivered`) envelope.
    /// `None` once the connection has closed.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.inbound.recv().await
    }

    /// Splits into an owned publish/push handle and a receive-only stream,
    /// for callers that want to hand the stream to `tokio_stream` combinators.
    pub fn into_stream(self) -> (BusSender, ReceiverStream<Envelope>) {
        (
            BusSender {
                publisher_id: self.publisher_id,
                outbound: self.outbound,
            },
            ReceiverStream::new(self.inbound),
        )
    }

    async fn send_raw(&self, envelope: Envelope) -> Result<()> {
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| aiperf_core::error::AiPerfError::transport("bus pump task has exited"))
    }
}

/// The publish/push half of a split `BusClient`.
#[derive(Clone)]
pub struct BusSender {
    publisher_id: String,
    outbound: mpsc::Sender<Envelope>,
}

impl BusSender {
    pub async fn publish(&self, topic: impl Into<String>, payload: serde_json::Value) -> Result<()> {
        self.outbound
            .send(Envelope::publish(topic, self.publisher_id.clone(), payload))
            .await
            .map_err(|_| aiperf_core::error::AiPerfError::transport("bus pump task has exited"))
    }

    pub async fn push(&self, topic: impl Into<String>, payload: serde_json::Value) -> Result<()> {
        self.outbound
            .send(Envelope::push(topic, payload))
            .await
            .map_err(|_| aiperf_core::error::AiPerfError::transport("bus pump task has exited"))
    }
}

async fn pump_loop(mut framed: FramedBus, mut out_rx: mpsc::Receiver<Envelope>, in_tx: mpsc::Sender<Envelope>) {
    loop {
        tokio::select! {
            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(envelope) => {
                        if let Err(err) = framing::send(&mut framed, &envelope).await {
                            warn!(error = %err, "bus client send failed");
                            return;
                        }
                    }
                    None => return,
                }
            }
            incoming = framing::recv(&mut framed) => {
                match incoming {
                    Ok(Some(envelope)) => {
                        if matches!(envelope.kind, EnvelopeKind::Delivered | EnvelopeKind::PullDelivered) {
                            if in_tx.send(envelope).await.is_err() {
                                return;
                            }
                        } else if matches!(envelope.kind, EnvelopeKind::Error) {
                            warn!(topic = %envelope.topic, payload = %envelope.payload, "broker rejected frame");
                        }
                    }
                    Ok(None) => return,
                    Err(err) => {
                        warn!(error = %err, "bus client recv failed");
                        return;
                    }
                }
            }
        }
    }
}
