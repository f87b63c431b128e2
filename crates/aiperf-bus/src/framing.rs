//! Length-delimited JSON framing shared by the broker and clients.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use aiperf_core::error::{AiPerfError, Result};

use crate::envelope::Envelope;
use crate::transport::BusStream;

pub type FramedBus = Framed<BusStream, LengthDelimitedCodec>;

pub fn frame(stream: BusStream) -> FramedBus {
    Framed::new(stream, LengthDelimitedCodec::new())
}

pub async fn send(framed: &mut FramedBus, envelope: &Envelope) -> Result<()> {
    let bytes = serde_json::to_vec(envelope)?;
    framed
        .send(Bytes::from(bytes))
        .await
        .map_err(|e| AiPerfError::transport(format!("send: {e}")))
}

pub async fn recv(framed: &mut FramedBus) -> Result<Option<Envelope>> {
    match framed.next().await {
        Some(Ok(bytes)) => {
            let envelope: Envelope = serde_json::from_slice(&bytes)?;
            Ok(Some(envelope))
        }
        Some(Err(e)) => Err(AiPerfError::transport(format!("recv: {e}"))),
        None => Ok(None),
    }
}
