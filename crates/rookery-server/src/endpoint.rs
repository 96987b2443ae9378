//! The server-side delivery handle for a connected client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use rookery_core::{ChatError, Endpoint};

use crate::wire::ServerFrame;

/// Implements [`Endpoint`] for one client connection.
///
/// A delivery pushes a message frame through the connection's writer task
/// and waits for the matching ack from the client's read loop. A timeout,
/// a negative ack, or a closed connection all count as delivery failure,
/// which is what triggers mailbox demotion upstream.
pub struct ConnectionEndpoint {
    connection_id: Uuid,
    writer: mpsc::Sender<ServerFrame>,
    pending_acks: Arc<DashMap<String, oneshot::Sender<bool>>>,
    delivery_timeout: Duration,
}

impl ConnectionEndpoint {
    /// Create the endpoint handle for a connection.
    pub fn new(
        connection_id: Uuid,
        writer: mpsc::Sender<ServerFrame>,
        pending_acks: Arc<DashMap<String, oneshot::Sender<bool>>>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            connection_id,
            writer,
            pending_acks,
            delivery_timeout,
        }
    }
}

#[async_trait]
impl Endpoint for ConnectionEndpoint {
    async fn receive_message(&self, message: &str) -> Result<(), ChatError> {
        let id = Uuid::new_v4().to_string();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending_acks.insert(id.clone(), ack_tx);

        let frame = ServerFrame::Message {
            id: id.clone(),
            body: message.to_string(),
        };
        if self.writer.send(frame).await.is_err() {
            self.pending_acks.remove(&id);
            return Err(ChatError::Communication("connection closed".to_string()));
        }

        match tokio::time::timeout(self.delivery_timeout, ack_rx).await {
            Ok(Ok(true)) => {
                debug!(connection = %self.connection_id, delivery = %id, "message acked");
                Ok(())
            }
            Ok(Ok(false)) => Err(ChatError::Communication(
                "client rejected message".to_string(),
            )),
            Ok(Err(_)) => Err(ChatError::Communication("connection closed".to_string())),
            Err(_) => {
                self.pending_acks.remove(&id);
                warn!(connection = %self.connection_id, delivery = %id, "delivery timed out");
                Err(ChatError::Communication("delivery timed out".to_string()))
            }
        }
    }
}
