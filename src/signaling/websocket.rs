//! WebSocket signaling channel backed by `tokio-tungstenite`.

use super::{ChannelEvent, ChannelFactory, ChannelMessage, SignalingChannel};
use crate::error::ChannelError;
use crate::session::ChannelSink;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const PROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

/// Opens WebSocket channels on the given tokio runtime.
#[derive(Debug, Clone)]
pub struct WebSocketChannelFactory {
    runtime: Handle,
}

impl WebSocketChannelFactory {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Uses the runtime of the calling task, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl ChannelFactory for WebSocketChannelFactory {
    fn open(
        &self,
        url: &str,
        protocols: &[String],
        sink: ChannelSink,
    ) -> Result<Arc<dyn SignalingChannel>, ChannelError> {
        let request = build_request(url, protocols)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime.spawn(run_channel(request, url.to_string(), rx, sink));
        Ok(Arc::new(WebSocketChannel { tx }))
    }
}

enum Outbound {
    Text(String),
    Close,
}

struct WebSocketChannel {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SignalingChannel for WebSocketChannel {
    fn send(&self, text: String) -> Result<(), ChannelError> {
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

pub(crate) fn build_request(url: &str, protocols: &[String]) -> Result<Request, ChannelError> {
    let mut request = url.into_client_request()?;
    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|e| ChannelError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(PROTOCOL_HEADER, value);
    }
    Ok(request)
}

/// Drives one connection: handshake, then pumps outbound text and inbound
/// frames until either side closes. `closed` is always reported last.
async fn run_channel(
    request: Request,
    url: String,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    sink: ChannelSink,
) {
    info!("Connecting to signaling server: {}", url);

    let mut close_event = ChannelEvent::new(url.clone());

    let (ws_stream, response) = match connect_async(request).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Failed to connect to signaling server {}: {}", url, e);
            close_event.code = Some(CloseCode::Abnormal.into());
            close_event.reason = Some(e.to_string());
            sink.error(e.into());
            sink.closed(close_event);
            return;
        }
    };

    let protocol = response
        .headers()
        .get(PROTOCOL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    info!("Connected to signaling server (protocol: {:?})", protocol);
    sink.opened(ChannelEvent {
        protocol,
        ..ChannelEvent::new(url)
    });

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Text(text)) => {
                    debug!("Sending signaling message: {}", text);
                    if let Err(e) = write.send(Message::Text(text)).await {
                        warn!("Failed to send signaling message: {}", e);
                        close_event.code = Some(CloseCode::Abnormal.into());
                        sink.error(e.into());
                        break;
                    }
                }
                // explicit close, or every handle to the channel was dropped
                Some(Outbound::Close) | None => {
                    debug!("Closing signaling channel");
                    let _ = write.send(Message::Close(None)).await;
                    close_event.code = Some(CloseCode::Normal.into());
                    break;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    debug!("Received signaling message: {}", text);
                    sink.message(ChannelMessage::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    sink.message(ChannelMessage::Binary(Bytes::from(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Signaling channel closed by server");
                    if let Some(frame) = frame {
                        close_event.code = Some(frame.code.into());
                        close_event.reason = Some(frame.reason.to_string());
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Signaling channel error: {}", e);
                    close_event.code = Some(CloseCode::Abnormal.into());
                    sink.error(e.into());
                    break;
                }
                None => {
                    close_event.code = Some(CloseCode::Abnormal.into());
                    break;
                }
            },
        }
    }

    debug!("Signaling channel task terminated");
    sink.closed(close_event);
}
