//! Typed pub/sub and push/pull message bus over IPC or TCP transports
//! (spec §2, §4.1).

pub mod client;
pub mod envelope;
pub mod framing;
pub mod rpc;
pub mod server;
pub mod topics;
pub mod transport;

pub use client::{BusClient, BusSender};
pub use envelope::{Envelope, EnvelopeKind};
pub use rpc::{RpcClient, RpcResponder, request_topic};
pub use server::BusServer;
pub use topics::{
    CREDIT_DROP_TOPIC, CREDIT_RETURN_TOPIC, CREDITS_COMPLETE_TOPIC, FINAL_RESULTS_TOPIC, METRICS_TOPIC,
    PROGRESS_TOPIC, RECORDS_TOPIC, TELEMETRY_TOPIC,
};
pub use transport::{BusListener, BusStream};

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_core::config::CommBackend;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn publish_fans_out_to_all_subscribers() {
        let dir = std::env::temp_dir().join(format!("aiperf-bus-test-{}", uuid::Uuid::new_v4()));
        let addr = dir.to_string_lossy().to_string();

        let listener = BusListener::bind_ipc(&addr).expect("bind");
        let server = BusServer::new();
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let server_task = tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        let mut sub_a = BusClient::connect(CommBackend::Ipc, &addr, "sub-a").await.expect("connect a");
        let mut sub_b = BusClient::connect(CommBackend::Ipc, &addr, "sub-b").await.expect("connect b");
        sub_a.subscribe("events").await.expect("subscribe a");
        sub_b.subscribe("events").await.expect("subscribe b");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let publisher = BusClient::connect(CommBackend::Ipc, &addr, "pub-1").await.expect("connect pub");
        publisher
            .publish("events", serde_json::json!({"hello": "world"}))
            .await
            .expect("publish");

        let a = sub_a.recv().await.expect("a receives");
        let b = sub_b.recv().await.expect("b receives");
        assert_eq!(a.payload, serde_json::json!({"hello": "world"}));
        assert_eq!(b.payload, serde_json::json!({"hello": "world"}));
        assert_eq!(a.seq, 1);

        shutdown.cancel();
        let _ = server_task.await;
        let _ = std::fs::remove_file(&addr);
    }

    #[tokio::test]
    async fn push_round_robins_across_pull_consumers() {
        let dir = std::env::temp_dir().join(format!("aiperf-bus-test-{}", uuid::Uuid::new_v4()));
        let addr = dir.to_string_lossy().to_string();

        let listener = BusListener::bind_ipc(&addr).expect("bind");
        let server = BusServer::new();
        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let server_task = tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        let mut worker_a = BusClient::connect(CommBackend::Ipc, &addr, "worker-a").await.expect("connect a");
        let mut worker_b = BusClient::connect(CommBackend::Ipc, &addr, "worker-b").await.expect("connect b");
        worker_a.pull_register("credits").await.expect("register a");
        worker_b.pull_register("credits").await.expect("register b");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let producer = BusClient::connect(CommBackend::Ipc, &addr, "timing").await.expect("connect producer");
        for i in 0..4 {
            producer.push("credits", serde_json::json!({"i": i})).await.expect("push");
        }

        let a0 = worker_a.recv().await.expect("a gets one");
        let b0 = worker_b.recv().await.expect("b gets one");
        assert_ne!(a0.payload, b0.payload);

        shutdown.cancel();
        let _ = server_task.await;
        let _ = std::fs::remove_file(&addr);
    }
}
