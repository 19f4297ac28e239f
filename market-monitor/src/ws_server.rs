//! WebSocket fan-out of published events to connected clients

use crate::event_bus::BroadcastPublisher;
use crate::shutdown::Shutdown;
use anyhow::Result;
use common::PublishedEvent;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum ClientMessage {
    SubscribePair { symbol: String },
    UnsubscribePair { symbol: String },
}

/// Per-connection symbol filter. Empty means every symbol.
#[derive(Debug, Default)]
struct SymbolFilter {
    symbols: HashSet<String>,
}

impl SymbolFilter {
    fn allows(&self, event: &PublishedEvent) -> bool {
        self.symbols.is_empty() || self.symbols.contains(&event.symbol().to_uppercase())
    }

    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::SubscribePair { symbol }) => {
                debug!("Client subscribed to {}", symbol);
                self.symbols.insert(symbol.to_uppercase());
            }
            Ok(ClientMessage::UnsubscribePair { symbol }) => {
                debug!("Client unsubscribed from {}", symbol);
                self.symbols.remove(&symbol.to_uppercase());
            }
            Err(_) => warn!("Ignoring client message: {}", text),
        }
    }
}

/// Accept WebSocket clients on `addr` until shutdown
pub async fn serve(addr: &str, publisher: Arc<BroadcastPublisher>, mut shutdown: Shutdown) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("📡 WebSocket server listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let events = publisher.subscribe();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, events, shutdown).await {
                                warn!("WebSocket client {} failed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            }
            _ = shutdown.wait() => break,
        }
    }

    info!("WebSocket server stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    mut events: tokio::sync::broadcast::Receiver<PublishedEvent>,
    mut shutdown: Shutdown,
) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!("WebSocket client connected: {}", peer);

    let (mut write, mut read) = ws_stream.split();
    let mut filter = SymbolFilter::default();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !filter.allows(&event) {
                            continue;
                        }
                        let text = serde_json::to_string(&event)?;
                        write.send(Message::Text(text)).await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client {} lagged, skipped {} event(s)", peer, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => filter.handle_text(&text),
                    Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket read error from {}: {}", peer, e);
                        break;
                    }
                }
            }
            _ = shutdown.wait() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        }
    }

    info!("WebSocket client disconnected: {}", peer);
    Ok(())
}
