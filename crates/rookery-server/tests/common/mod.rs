//! Shared harness: an in-process server on an ephemeral port plus a raw
//! line-protocol client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};

use rookery_server::{serve, ServerConfig};

/// How long a test waits for a reply or a pushed message.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Delivery ack timeout used by test servers; short so that
/// demotion-by-timeout tests stay fast.
pub const TEST_DELIVERY_TIMEOUT: Duration = Duration::from_millis(300);

/// Initialize tracing once for the test binary.
pub fn init_test() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// An in-process server listening on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let config = ServerConfig {
            addr: addr.to_string(),
            delivery_timeout: TEST_DELIVERY_TIMEOUT,
        };
        tokio::spawn(async move {
            let _ = serve(listener, config).await;
        });
        Self { addr }
    }
}

/// A raw protocol client with a background read loop.
///
/// The read loop routes replies by sequence number, collects pushed
/// messages into an inbox, and (unless the client was connected with
/// `acks: false`) acknowledges each push immediately — so deliveries to
/// this client never stall a concurrently awaited request.
pub struct TestClient {
    writer: mpsc::Sender<String>,
    seq: AtomicU64,
    replies: Arc<DashMap<u64, oneshot::Sender<Value>>>,
    inbox: Mutex<mpsc::UnboundedReceiver<String>>,
    io_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Drop for TestClient {
    // The I/O tasks own the socket halves; aborting them on drop is what
    // actually closes the connection so the server sees the hangup.
    fn drop(&mut self) {
        for task in &self.io_tasks {
            task.abort();
        }
    }
}

impl TestClient {
    /// Connect a well-behaved client that acks every pushed message.
    pub async fn connect(addr: SocketAddr) -> Self {
        Self::connect_with_acks(addr, true).await
    }

    /// Connect a client; with `acks: false` it swallows pushes without
    /// acknowledging, simulating a stuck client.
    pub async fn connect_with_acks(addr: SocketAddr, acks: bool) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, mut write_half) = stream.into_split();

        let (writer, mut to_write) = mpsc::channel::<String>(32);
        let write_task = tokio::spawn(async move {
            while let Some(mut line) = to_write.recv().await {
                line.push('\n');
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let replies: Arc<DashMap<u64, oneshot::Sender<Value>>> = Arc::new(DashMap::new());
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let reader_replies = Arc::clone(&replies);
        let ack_writer = writer.clone();
        let read_task = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let value: Value = match serde_json::from_str(&line) {
                    Ok(value) => value,
                    Err(_) => continue,
                };
                match value.get("type").and_then(Value::as_str) {
                    Some("reply") => {
                        let seq = value.get("seq").and_then(Value::as_u64).unwrap_or(0);
                        if let Some((_, reply)) = reader_replies.remove(&seq) {
                            let _ = reply.send(value["result"].clone());
                        }
                    }
                    Some("message") => {
                        if acks {
                            let ack = json!({
                                "type": "ack",
                                "id": value["id"],
                                "ok": true,
                            });
                            let _ = ack_writer.send(ack.to_string()).await;
                        }
                        let body = value["body"].as_str().unwrap_or_default().to_string();
                        let _ = inbox_tx.send(body);
                    }
                    _ => {}
                }
            }
        });

        Self {
            writer,
            seq: AtomicU64::new(0),
            replies,
            inbox: Mutex::new(inbox_rx),
            io_tasks: vec![write_task, read_task],
        }
    }

    /// Send one request and await its reply payload.
    pub async fn request(&self, op: Value) -> Value {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.replies.insert(seq, reply_tx);

        let frame = json!({"type": "request", "seq": seq, "op": op});
        self.writer
            .send(frame.to_string())
            .await
            .expect("send request");

        tokio::time::timeout(DEFAULT_TIMEOUT, reply_rx)
            .await
            .expect("timed out waiting for reply")
            .expect("reply channel closed")
    }

    /// Await the next pushed message, if any arrives in time.
    pub async fn next_message(&self) -> Option<String> {
        let mut inbox = self.inbox.lock().await;
        tokio::time::timeout(DEFAULT_TIMEOUT, inbox.recv())
            .await
            .ok()
            .flatten()
    }

    /// Assert that no message is pushed within a short grace period.
    pub async fn expect_no_message(&self) {
        let mut inbox = self.inbox.lock().await;
        let outcome = tokio::time::timeout(Duration::from_millis(200), inbox.recv()).await;
        assert!(outcome.is_err(), "unexpected message: {outcome:?}");
    }

    // Convenience wrappers for the common operations.

    pub async fn login(&self, name: &str) -> Value {
        self.request(json!({"op": "login", "name": name})).await
    }

    pub async fn logout(&self, name: &str) -> Value {
        self.request(json!({"op": "logout", "name": name})).await
    }

    pub async fn add_account(&self, name: &str) -> Value {
        self.request(json!({"op": "add_account", "name": name})).await
    }

    pub async fn add_group(&self, name: &str) -> Value {
        self.request(json!({"op": "add_group", "name": name})).await
    }

    pub async fn add_group_member(&self, group: &str, member: &str) -> Value {
        self.request(json!({"op": "add_group_member", "group": group, "member": member}))
            .await
    }

    pub async fn send_message(&self, target: &str, message: &str) -> Value {
        self.request(json!({"op": "send_message", "target": target, "message": message}))
            .await
    }

    pub async fn delete_account(&self, name: &str) -> i64 {
        let result = self
            .request(json!({"op": "delete_account", "name": name}))
            .await;
        result["code"].as_i64().expect("code reply")
    }

    pub async fn check_for_account(&self, name: &str) -> bool {
        let result = self
            .request(json!({"op": "check_for_account", "name": name}))
            .await;
        result["value"].as_bool().expect("bool reply")
    }

    pub async fn list_accounts(&self, pattern: &str) -> Vec<String> {
        names(
            self.request(json!({"op": "list_accounts", "pattern": pattern}))
                .await,
        )
    }

    pub async fn list_groups(&self, pattern: &str) -> Vec<String> {
        names(
            self.request(json!({"op": "list_groups", "pattern": pattern}))
                .await,
        )
    }
}

fn names(result: Value) -> Vec<String> {
    result["names"]
        .as_array()
        .unwrap_or_else(|| panic!("names reply, got {result}"))
        .iter()
        .map(|name| name.as_str().unwrap_or_default().to_string())
        .collect()
}

/// Assert an ok reply.
pub fn assert_ok(result: &Value) {
    assert_eq!(result["status"], "ok", "expected ok, got {result}");
}

/// Assert an error reply of the given kind.
pub fn assert_error(result: &Value, kind: &str) {
    assert_eq!(result["status"], "error", "expected error, got {result}");
    assert_eq!(result["kind"], kind, "unexpected error kind: {result}");
}
