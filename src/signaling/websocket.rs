//! WebSocket signaling transport
//!
//! Each text frame carries one JSON-encoded [`SignalingMessage`]. Non-text
//! frames are ignored and malformed frames are logged and skipped.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{SignalingChannel, SignalingMessage};
use crate::error::{CallError, Result};

/// Connect to a relay and spawn the read/write pumps
pub async fn connect(url: &str, capacity: usize) -> Result<SignalingChannel> {
    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| CallError::Signaling(format!("Failed to connect to {}: {}", url, e)))?;
    info!("Signaling connected: {}", url);

    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<SignalingMessage>(capacity);
    let (in_tx, in_rx) = mpsc::channel::<SignalingMessage>(capacity);

    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match message.to_json() {
                Ok(t) => t,
                Err(e) => {
                    warn!("Failed to encode {} signal: {}", message.event_name(), e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                warn!("Signaling write failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
        debug!("Signaling writer stopped");
    });

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match SignalingMessage::from_json(&text) {
                    Ok(message) => {
                        if in_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed signaling frame: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Signaling read failed: {}", e);
                    break;
                }
            }
        }
        debug!("Signaling reader stopped");
    });

    Ok(SignalingChannel::new(out_tx, in_rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::SessionDescription;
    use tokio::net::TcpListener;

    /// Accept one client and echo every text frame back
    async fn spawn_echo_relay() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if frame.is_text() {
                    // junk first so the client has to skip it
                    ws.send(Message::Text("not json".to_string())).await.unwrap();
                    ws.send(frame).await.unwrap();
                }
            }
        });

        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_websocket_roundtrip_skips_malformed() {
        let url = spawn_echo_relay().await;
        let mut channel = connect(&url, 8).await.unwrap();

        let offer = SignalingMessage::Offer(SessionDescription::offer("v=0\r\n"));
        channel.send(offer.clone()).await.unwrap();

        assert_eq!(channel.recv().await, Some(offer));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect(&format!("ws://{}", addr), 8).await;
        assert!(matches!(result, Err(CallError::Signaling(_))));
    }
}
