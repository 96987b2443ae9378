//! Per-connection handling.
//!
//! Each accepted socket gets one read loop plus a writer task that owns
//! the write half. Every request spawns its own handler task, matching
//! the thread-per-request model of the RPC surface: a slow delivery on
//! one request never blocks the connection's other requests or the acks
//! the delivery itself is waiting for.
//!
//! A vanished client is not logged out implicitly; the next delivery to
//! its endpoint fails and demotes the account to a mailbox.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use rookery_core::Endpoint;

use crate::config::ServerConfig;
use crate::endpoint::ConnectionEndpoint;
use crate::service::ChatService;
use crate::wire::{ClientFrame, Reply, Request, ServerFrame};

/// Outbound frame queue depth per connection.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Drive one client connection until it disconnects.
pub async fn serve_connection(stream: TcpStream, service: Arc<ChatService>, config: ServerConfig) {
    let connection_id = Uuid::new_v4();
    let peer = stream.peer_addr().ok();
    debug!(connection = %connection_id, ?peer, "connection opened");

    let (read_half, mut write_half) = stream.into_split();
    let (writer, mut outbound) = mpsc::channel::<ServerFrame>(OUTBOUND_QUEUE_DEPTH);
    let pending_acks: Arc<DashMap<String, oneshot::Sender<bool>>> = Arc::new(DashMap::new());

    let writer_connection = connection_id;
    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let mut line = match serde_json::to_string(&frame) {
                Ok(line) => line,
                Err(error) => {
                    warn!(connection = %writer_connection, %error, "failed to encode frame");
                    continue;
                }
            };
            line.push('\n');
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let frame: ClientFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(connection = %connection_id, %error, "unparsable frame, ignoring");
                continue;
            }
        };

        match frame {
            ClientFrame::Ack { id, ok } => {
                if let Some((_, ack)) = pending_acks.remove(&id) {
                    let _ = ack.send(ok);
                } else {
                    debug!(connection = %connection_id, delivery = %id, "ack for expired delivery");
                }
            }
            ClientFrame::Request { seq, op } => {
                let service = Arc::clone(&service);
                let writer = writer.clone();
                let endpoint: Arc<dyn Endpoint> = Arc::new(ConnectionEndpoint::new(
                    connection_id,
                    writer.clone(),
                    Arc::clone(&pending_acks),
                    config.delivery_timeout,
                ));
                tokio::spawn(async move {
                    let result = handle_request(&service, op, endpoint).await;
                    let _ = writer.send(ServerFrame::Reply { seq, result }).await;
                });
            }
        }
    }

    debug!(connection = %connection_id, "connection closed");
}

/// Execute one request against the service.
///
/// `endpoint` is this connection's callback handle; it only comes into
/// play for login.
async fn handle_request(
    service: &ChatService,
    request: Request,
    endpoint: Arc<dyn Endpoint>,
) -> Reply {
    match request {
        Request::CheckForAccount { name } => Reply::Bool {
            value: service.check_for_account(&name),
        },
        Request::Login { name } => match service.login(&name, endpoint).await {
            Ok(()) => Reply::Ok,
            Err(error) => error.into(),
        },
        Request::Logout { name } => {
            service.logout(&name);
            Reply::Ok
        }
        Request::AddAccount { name } => into_reply(service.add_account(&name)),
        Request::AddGroup { name } => into_reply(service.add_group(&name)),
        Request::AddGroupMember { group, member } => {
            into_reply(service.add_group_member(&group, &member))
        }
        Request::ListAccounts { pattern } => into_names(service.list_accounts(&pattern)),
        Request::ListGroups { pattern } => into_names(service.list_groups(&pattern)),
        Request::SendMessage { target, message } => {
            service.send_message(&target, &message).await;
            Reply::Ok
        }
        Request::DeleteAccount { name } => Reply::Code {
            code: service.delete_account(&name),
        },
    }
}

fn into_reply(result: Result<(), rookery_core::ChatError>) -> Reply {
    match result {
        Ok(()) => Reply::Ok,
        Err(error) => error.into(),
    }
}

fn into_names(result: Result<Vec<String>, rookery_core::ChatError>) -> Reply {
    match result {
        Ok(names) => Reply::Names { names },
        Err(error) => error.into(),
    }
}
