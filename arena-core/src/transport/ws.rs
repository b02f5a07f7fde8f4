//! WebSocket transport backed by tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use super::{Frame, Link, Transport};
use crate::error::ConnectionError;

/// Opens STOMP-over-WebSocket links
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }

    /// Forward queued frames to the socket; closes the socket when the queue ends
    async fn outgoing_task<S>(mut rx: mpsc::UnboundedReceiver<Frame>, mut ws_sender: S)
    where
        S: SinkExt<Message> + Unpin,
        S::Error: std::fmt::Debug,
    {
        while let Some(frame) = rx.recv().await {
            debug!(command = %frame.command, "Sending frame");
            if let Err(e) = ws_sender.send(Message::Text(frame.encode().into())).await {
                warn!("Failed to send WebSocket message: {:?}", e);
                return;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    }

    /// Decode socket messages into frames until either side goes away
    async fn incoming_task<S>(mut ws_receiver: S, tx: mpsc::UnboundedSender<Frame>)
    where
        S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        while let Some(result) = ws_receiver.next().await {
            let text = match result {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!("Ignoring non-UTF-8 binary message");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Received close message");
                    break;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            };

            match Frame::decode(&text) {
                Ok(Some(frame)) => {
                    if tx.send(frame).is_err() {
                        debug!("Link dropped, stopping incoming task");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Dropping undecodable frame"),
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, endpoint: &str) -> Result<Link, ConnectionError> {
        let (ws_stream, _response) = connect_async(endpoint)
            .await
            .map_err(|e| ConnectionError::Transport(format!("{endpoint}: {e}")))?;

        let (ws_sender, ws_receiver) = ws_stream.split();

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::outgoing_task(outgoing_rx, ws_sender));
        tokio::spawn(Self::incoming_task(ws_receiver, incoming_tx));

        Ok(Link {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}
