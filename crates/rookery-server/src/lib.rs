//! Rookery chat server: the wire protocol and service facade around
//! [`rookery_core`].
//!
//! The server speaks a newline-delimited JSON protocol over TCP. Remote
//! calls arrive as numbered request frames; messages for the account
//! logged in on a connection are pushed back over the same socket and
//! acknowledged by the client.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod service;
pub mod wire;

pub use config::ServerConfig;
pub use service::ChatService;

/// Accept connections forever, spawning one task per client.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> std::io::Result<()> {
    let service = Arc::new(ChatService::new());
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(%peer, "client connected");
                let service = Arc::clone(&service);
                let config = config.clone();
                tokio::spawn(connection::serve_connection(stream, service, config));
            }
            Err(error) => {
                warn!(%error, "failed to accept connection");
            }
        }
    }
}
