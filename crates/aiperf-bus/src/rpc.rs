//! Correlated request/reply (spec §4.1: `request(service_id, command,
//! timeout)` / `respond`), layered on top of the existing push/pull
//! primitives rather than extending the wire `Envelope` with a third
//! delivery pattern: a request is a `push` onto the target's request topic
//! carrying a reply topic and correlation id in the payload, the responder
//! `push`es its answer back onto that reply topic.

use std::time::Duration;

use serde_json::{Value, json};
use uuid::Uuid;

use aiperf_core::config::CommBackend;
use aiperf_core::error::{AiPerfError, Result};

use crate::client::BusClient;
use crate::envelope::EnvelopeKind;

/// Dedicated topic a service registers as a pull consumer of to receive
/// requests addressed to it.
pub fn request_topic(service_id: &str) -> String {
    format!("svc.request.{service_id}")
}

/// A client-side handle for issuing correlated requests against one or more
/// target services. Holds its own bus connection and a private reply topic
/// it subscribes to, so in-flight requests don't compete with a service's
/// command or data traffic.
pub struct RpcClient {
    bus: BusClient,
    reply_topic: String,
}

impl RpcClient {
    pub async fn connect(backend: CommBackend, addr: &str, client_id: impl Into<String>) -> Result<Self> {
        let client_id = client_id.into();
        let reply_topic = format!("svc.reply.{client_id}.{}", Uuid::new_v4());
        let bus = BusClient::connect(backend, addr, client_id).await?;
        bus.subscribe(&reply_topic).await?;
        Ok(Self { bus, reply_topic })
    }

    /// Sends `payload` to `target_service_id`'s request topic and awaits the
    /// matching reply, up to `timeout`. Messages on the reply topic that
    /// don't match this call's correlation id (a stale reply from a prior,
    /// since-timed-out request) are discarded rather than returned.
    pub async fn request(&mut self, target_service_id: &str, payload: Value, timeout: Duration) -> Result<Value> {
        let correlation_id = Uuid::new_v4().to_string();
        let envelope = json!({
            "correlation_id": correlation_id,
            "reply_topic": self.reply_topic,
            "payload": payload,
        });
        self.bus.push(request_topic(target_service_id), envelope).await?;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(AiPerfError::transport(format!(
                        "request to {target_service_id} timed out after {timeout:?}"
                    )));
                }
                received = self.bus.recv() => {
                    let Some(envelope) = received else {
                        return Err(AiPerfError::transport("bus connection closed while awaiting reply"));
                    };
                    if envelope.kind != EnvelopeKind::Delivered {
                        continue;
                    }
                    if envelope.payload.get("correlation_id").and_then(Value::as_str) == Some(correlation_id.as_str()) {
                        return Ok(envelope.payload.get("payload").cloned().unwrap_or(Value::Null));
                    }
                }
            }
        }
    }
}

/// The server side of a request/reply pair: a service pull-registers on its
/// own request topic and, for each inbound envelope, replies by publishing
/// onto the embedded `reply_topic` with the same `correlation_id`.
pub struct RpcResponder<'a> {
    bus: &'a BusClient,
}

impl<'a> RpcResponder<'a> {
    pub fn new(bus: &'a BusClient) -> Self {
        Self { bus }
    }

    /// Decodes one inbound request envelope's payload into `(correlation_id,
    /// reply_topic, payload)`, or `None` if it isn't a well-formed request.
    pub fn decode(payload: &Value) -> Option<(String, String, Value)> {
        let correlation_id = payload.get("correlation_id")?.as_str()?.to_string();
        let reply_topic = payload.get("reply_topic")?.as_str()?.to_string();
        let body = payload.get("payload").cloned().unwrap_or(Value::Null);
        Some((correlation_id, reply_topic, body))
    }

    pub async fn reply(&self, reply_topic: &str, correlation_id: &str, payload: Value) -> Result<()> {
        self.bus
            .publish(reply_topic, json!({ "correlation_id": correlation_id, "payload": payload }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::BusServer;
    use crate::transport::BusListener;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn request_round_trips_through_responder() {
        let dir = std::env::temp_dir().join(format!("aiperf-rpc-test-{}", Uuid::new_v4()));
        let addr = dir.to_string_lossy().to_string();

        let listener = BusListener::bind_ipc(&addr).expect("bind");
        let server = BusServer::new();
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let server_task = tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        let responder_bus = BusClient::connect(CommBackend::Ipc, &addr, "dataset_manager").await.expect("connect responder");
        responder_bus.pull_register(request_topic("dataset_manager")).await.expect("register request topic");

        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut client = RpcClient::connect(CommBackend::Ipc, &addr, "worker-1").await.expect("connect client");
        let request_fut = client.request("dataset_manager", json!({"session_id": "abc"}), Duration::from_secs(2));

        let mut responder_bus = responder_bus;
        let serve_fut = async {
            let envelope = responder_bus.recv().await.expect("responder receives request");
            let (correlation_id, reply_topic, body) = RpcResponder::decode(&envelope.payload).expect("well-formed request");
            assert_eq!(body, json!({"session_id": "abc"}));
            RpcResponder::new(&responder_bus)
                .reply(&reply_topic, &correlation_id, json!({"session_id": "abc", "turns": []}))
                .await
                .expect("reply");
        };

        let (reply, _) = tokio::join!(request_fut, serve_fut);
        assert_eq!(reply.expect("request resolves"), json!({"session_id": "abc", "turns": []}));

        shutdown.cancel();
        let _ = server_task.await;
        let _ = std::fs::remove_file(&addr);
    }
}
