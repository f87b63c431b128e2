//! The Worker service (spec §4.6): pulls credits, fetches the conversation
//! they reference, drives each turn through the request pipeline, and
//! reports results. Grounded on `workers/worker.py`'s `_process_credit` loop,
//! reworked onto the bus's push/pull primitives and the RPC helper in place
//! of the original's internal asyncio queues.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::sleep;
use tracing::warn;

use aiperf_bus::{BusClient, CREDIT_DROP_TOPIC, CREDIT_RETURN_TOPIC, RECORDS_TOPIC, RpcClient};
use aiperf_core::config::{ServiceConfig, UserConfig};
use aiperf_core::error::{AiPerfError, Result};
use aiperf_core::model::{Conversation, Credit};
use aiperf_service::Service;

use crate::request::RequestPipeline;

pub const SERVICE_TYPE: &str = "worker";
const DATASET_MANAGER_SERVICE_ID: &str = "dataset_manager";
const CONVERSATION_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WorkerService {
    service_config: ServiceConfig,
    service_id: String,
    user_config: Option<UserConfig>,
    bus: Option<BusClient>,
    dataset_client: Option<RpcClient>,
    pipeline: Option<RequestPipeline>,
    conversation_cache: HashMap<String, Conversation>,
}

impl WorkerService {
    pub fn new(service_id: impl Into<String>, service_config: ServiceConfig) -> Self {
        Self {
            service_config,
            service_id: service_id.into(),
            user_config: None,
            bus: None,
            dataset_client: None,
            pipeline: None,
            conversation_cache: HashMap::new(),
        }
    }

    async fn fetch_conversation(&mut self, session_hint: Option<&str>) -> Result<Conversation> {
        if let Some(hint) = session_hint {
            if let Some(cached) = self.conversation_cache.get(hint) {
                return Ok(cached.clone());
            }
        }

        let client = self.dataset_client.as_mut().ok_or_else(|| AiPerfError::Initialization {
            service_id: self.service_id.clone(),
            reason: "on_start did not establish a dataset-manager connection".to_string(),
        })?;
        let request_body = json!({"session_id": session_hint});
        let response = client.request(DATASET_MANAGER_SERVICE_ID, request_body, CONVERSATION_REQUEST_TIMEOUT).await?;
        if let Some(error) = response.get("error").and_then(serde_json::Value::as_str) {
            return Err(AiPerfError::request(format!("dataset manager: {error}")));
        }
        let conversation: Conversation = serde_json::from_value(
            response.get("conversation").cloned().ok_or_else(|| AiPerfError::request("malformed GET_CONVERSATION reply"))?,
        )?;
        self.conversation_cache.insert(conversation.session_id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn process_credit(&mut self, credit: Credit) -> Result<()> {
        let session_hint = (!credit.conversation_id.is_empty()).then(|| credit.conversation_id.clone());
        let conversation = match self.fetch_conversation(session_hint.as_deref()).await {
            Ok(conversation) => conversation,
            Err(err) => {
                warn!(service_id = %self.service_id, error = %err, "failed to fetch conversation for credit");
                return self.return_credit(&credit).await;
            }
        };

        let model = self
            .user_config
            .as_ref()
            .and_then(|cfg| cfg.model_names.first())
            .cloned()
            .unwrap_or_default();
        let Some(pipeline) = self.pipeline.as_ref() else {
            return self.return_credit(&credit).await;
        };

        for (turn_index, turn) in conversation.turns.iter().enumerate() {
            if turn.delay_ms > 0.0 {
                sleep(Duration::from_secs_f64(turn.delay_ms / 1000.0)).await;
            }
            let record = pipeline.send_turn(&model, &conversation.session_id, turn_index, turn, &credit).await;
            let payload = json!({
                "worker_id": self.service_id,
                "parsed_record": record,
            });
            if let Some(bus) = self.bus.as_ref() {
                if let Err(err) = bus.push(RECORDS_TOPIC, payload).await {
                    warn!(service_id = %self.service_id, error = %err, "failed to push parsed record");
                }
            }
        }

        self.return_credit(&credit).await
    }

    async fn return_credit(&mut self, credit: &Credit) -> Result<()> {
        let Some(bus) = self.bus.as_ref() else { return Ok(()) };
        bus.push(CREDIT_RETURN_TOPIC, json!({"credit_id": credit.credit_id})).await
    }
}

#[async_trait]
impl Service for WorkerService {
    fn service_type(&self) -> &'static str {
        SERVICE_TYPE
    }

    fn required_clients(&self) -> Vec<String> {
        vec![DATASET_MANAGER_SERVICE_ID.to_string()]
    }

    async fn on_configure(&mut self, user_config: UserConfig) -> Result<()> {
        self.pipeline = Some(RequestPipeline::new(user_config.endpoint.clone()));
        self.user_config = Some(user_config);
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let bus = BusClient::connect(self.service_config.comm_backend, &self.service_config.bus_addr, self.service_id.clone()).await?;
        bus.pull_register(CREDIT_DROP_TOPIC).await?;
        self.bus = Some(bus);

        let dataset_client = RpcClient::connect(self.service_config.comm_backend, &self.service_config.bus_addr, self.service_id.clone()).await?;
        self.dataset_client = Some(dataset_client);
        Ok(())
    }

    async fn on_run(&mut self, shutdown: tokio_util::sync::CancellationToken) -> Result<()> {
        loop {
            let Some(bus) = self.bus.as_mut() else { return Ok(()) };
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                envelope = bus.recv() => {
                    let Some(envelope) = envelope else { return Ok(()) };
                    if envelope.kind != aiperf_bus::EnvelopeKind::PullDelivered {
                        continue;
                    }
                    let credit: Credit = match serde_json::from_value(envelope.payload) {
                        Ok(credit) => credit,
                        Err(err) => {
                            warn!(service_id = %self.service_id, error = %err, "malformed credit envelope");
                            continue;
                        }
                    };
                    if let Err(err) = self.process_credit(credit).await {
                        warn!(service_id = %self.service_id, error = %err, "credit processing failed");
                    }
                }
            }
        }
    }
}
