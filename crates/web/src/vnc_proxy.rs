//! WebSocket to TCP bridge
//!
//! Lets a `tcp` proxy rule stand in for websockify: the gateway terminates
//! the browser's WebSocket and relays binary frames to a raw TCP service
//! such as a VNC server's RFB port.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use studio_common::Upstream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, trace};

const READ_BUFFER: usize = 64 * 1024;

/// Subprotocols offered to noVNC-style clients
pub const SUBPROTOCOLS: [&str; 1] = ["binary"];

/// An established TCP connection waiting for its WebSocket peer
pub struct TcpBridge {
    authority: String,
    stream: TcpStream,
}

impl TcpBridge {
    /// Connect to the upstream before the client upgrade is accepted, so a
    /// dead upstream can still be reported as an HTTP error.
    pub async fn connect(upstream: &Upstream) -> std::io::Result<Self> {
        let authority = upstream.authority();
        debug!("Connecting TCP bridge to {}", authority);
        let stream = TcpStream::connect((upstream.host.as_str(), upstream.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self { authority, stream })
    }

    /// Relay frames until either side closes
    pub async fn bridge(self, socket: WebSocket) -> anyhow::Result<()> {
        let (tcp_read, tcp_write) = self.stream.into_split();
        let (ws_write, ws_read) = socket.split();

        let ws_to_tcp = Self::forward_ws_to_tcp(ws_read, tcp_write);
        let tcp_to_ws = Self::forward_tcp_to_ws(tcp_read, ws_write);

        tokio::select! {
            result = ws_to_tcp => {
                if let Err(e) = result {
                    debug!("WS->TCP forwarding ended: {}", e);
                }
            }
            result = tcp_to_ws => {
                if let Err(e) = result {
                    debug!("TCP->WS forwarding ended: {}", e);
                }
            }
        }

        debug!("TCP bridge to {} closed", self.authority);
        Ok(())
    }

    async fn forward_ws_to_tcp(
        mut ws_read: SplitStream<WebSocket>,
        mut tcp_write: OwnedWriteHalf,
    ) -> anyhow::Result<()> {
        while let Some(msg) = ws_read.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    trace!("WS->TCP: {} bytes", data.len());
                    tcp_write.write_all(&data).await?;
                }
                Ok(Message::Text(text)) => {
                    // Some clients send the RFB version string as text
                    trace!("WS->TCP (text): {} bytes", text.len());
                    tcp_write.write_all(text.as_bytes()).await?;
                }
                Ok(Message::Close(_)) => {
                    debug!("WebSocket closed by client");
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
            }
        }

        tcp_write.shutdown().await?;
        Ok(())
    }

    async fn forward_tcp_to_ws(
        mut tcp_read: OwnedReadHalf,
        mut ws_write: SplitSink<WebSocket, Message>,
    ) -> anyhow::Result<()> {
        let mut buffer = vec![0u8; READ_BUFFER];

        loop {
            let n = tcp_read.read(&mut buffer).await?;
            if n == 0 {
                debug!("Upstream closed TCP connection");
                break;
            }

            trace!("TCP->WS: {} bytes", n);

            if let Err(e) = ws_write.send(Message::Binary(buffer[..n].to_vec())).await {
                error!("Failed to send to WebSocket: {}", e);
                break;
            }
        }

        let _ = ws_write.close().await;
        Ok(())
    }
}
