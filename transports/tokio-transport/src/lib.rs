//! Tokio WebSocket transport for the SFU signaling connection.
//!
//! Every binary WebSocket message carries exactly one signaling frame, so the
//! transport forwards payloads untouched and leaves framing to `videocore`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::{CloseFrame, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use videocore::net::{NORMAL_CLOSURE, Transport, TransportEvent, TransportFactory};

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

const EVENT_CHANNEL_CAPACITY: usize = 100;

pub struct TokioWebSocketTransport {
    ws_sink: Mutex<Option<WsSink>>,
}

impl TokioWebSocketTransport {
    fn new(sink: WsSink) -> Self {
        Self {
            ws_sink: Mutex::new(Some(sink)),
        }
    }
}

#[async_trait]
impl Transport for TokioWebSocketTransport {
    async fn send(&self, data: &[u8]) -> Result<(), anyhow::Error> {
        let mut sink_guard = self.ws_sink.lock().await;
        let sink = sink_guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Socket is closed"))?;

        trace!(target: "Sfu/Transport", "--> Sending {} bytes", data.len());
        sink.send(Message::binary(data.to_vec()))
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket send error: {e}"))
    }

    async fn disconnect(&self) {
        let Some(mut sink) = self.ws_sink.lock().await.take() else {
            return;
        };
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::from(NORMAL_CLOSURE),
            reason: Utf8Bytes::from_static("client disconnect"),
        }));
        if let Err(e) = sink.send(close).await {
            debug!(target: "Sfu/Transport", "Close frame not delivered: {e}");
        }
        if let Err(e) = sink.close().await {
            debug!(target: "Sfu/Transport", "Error closing sink: {e}");
        }
    }
}

#[derive(Default)]
pub struct TokioWebSocketTransportFactory;

impl TokioWebSocketTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for TokioWebSocketTransportFactory {
    async fn create_transport(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        info!(target: "Sfu/Transport", "Dialing {url}");
        let (client, _response) = connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket connect failed: {e}"))?;

        let (sink, stream) = client.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let transport = Arc::new(TokioWebSocketTransport::new(sink));

        // Queued ahead of anything the read pump produces.
        let _ = event_tx.send(TransportEvent::Connected).await;
        tokio::spawn(read_pump(stream, event_tx));

        Ok((transport, event_rx))
    }
}

async fn read_pump(mut stream: WsStream, event_tx: mpsc::Sender<TransportEvent>) {
    let mut close_frame = None;
    let mut failure = None;

    loop {
        match stream.next().await {
            Some(Ok(Message::Binary(data))) => {
                trace!(target: "Sfu/Transport", "<-- Received {} bytes", data.len());
                if event_tx
                    .send(TransportEvent::DataReceived(data))
                    .await
                    .is_err()
                {
                    warn!(target: "Sfu/Transport", "Event receiver dropped, closing read pump");
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                trace!(target: "Sfu/Transport", "Received close frame: {frame:?}");
                close_frame = Some(frame);
                break;
            }
            Some(Ok(Message::Text(text))) => {
                warn!(target: "Sfu/Transport", "Ignoring text message of {} bytes", text.len());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(target: "Sfu/Transport", "Error reading from websocket: {e}");
                failure = Some(e.to_string());
                break;
            }
            None => {
                trace!(target: "Sfu/Transport", "Websocket stream ended");
                break;
            }
        }
    }

    let _ = event_tx
        .send(disconnected_event(close_frame, failure))
        .await;
}

/// `close_frame` is `Some` when the peer sent a close message, which itself
/// may or may not carry a code.
fn disconnected_event(
    close_frame: Option<Option<CloseFrame>>,
    failure: Option<String>,
) -> TransportEvent {
    match close_frame {
        Some(Some(frame)) => TransportEvent::Disconnected {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.as_str().to_string(),
        },
        Some(None) => TransportEvent::Disconnected {
            code: Some(NORMAL_CLOSURE),
            reason: String::new(),
        },
        None => TransportEvent::Disconnected {
            code: None,
            reason: failure.unwrap_or_else(|| "stream ended".to_string()),
        },
    }
}
