//! Transport-agnostic connections.
//!
//! A transport server builds a [`Connection`] from [`ConnectionDetails`] and
//! its own [`ConnectionTransport`]. Clones share identity, counters, rooms and
//! the destroyed flag; `params` belongs to the clone, so a stateful transport
//! clones the session connection, sets the params of one call and hands the
//! clone to the processor.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use orbit_core::{ConnectionId, Params};
use parking_lot::RwLock;
use serde_json::Value;

/// Connection type used for in-process calls (tasks, tests, other actions).
pub const INTERNAL_CONNECTION: &str = "internal";

/// What a transport knows about a new client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    /// Transport name, e.g. `"web"`, `"websocket"`, `"tcp"`
    pub kind: String,
    /// Preassigned id; generated when absent
    pub id: Option<ConnectionId>,
    /// Peer address
    pub remote_ip: IpAddr,
    /// Peer port
    pub remote_port: u16,
    /// Stable client fingerprint (cookie, header) when the transport has one
    pub fingerprint: Option<String>,
}

impl ConnectionDetails {
    /// Details for a transport of the given kind.
    pub fn new(kind: impl Into<String>, remote_ip: IpAddr, remote_port: u16) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            remote_ip,
            remote_port,
            fingerprint: None,
        }
    }

    /// Set the fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Use a preassigned id.
    #[must_use]
    pub const fn with_id(mut self, id: ConnectionId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Transport primitives a connection is bound to.
pub trait ConnectionTransport: Send + Sync {
    /// Push an out-of-band message to the client.
    fn send_message(&self, connection: &Connection, message: &Value) -> io::Result<()>;

    /// Stream a file to the client.
    fn send_file(&self, connection: &Connection, path: &Path) -> io::Result<()>;

    /// Close the underlying transport.
    fn destroy(&self, _connection: &Connection) {}
}

/// Transport for connections that have no client to talk to.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

impl ConnectionTransport for NoopTransport {
    fn send_message(&self, _connection: &Connection, _message: &Value) -> io::Result<()> {
        Ok(())
    }

    fn send_file(&self, _connection: &Connection, _path: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "internal connections cannot send files",
        ))
    }
}

struct Shared {
    id: ConnectionId,
    kind: String,
    remote_ip: IpAddr,
    remote_port: u16,
    fingerprint: Option<String>,
    connected_at: DateTime<Utc>,
    transport: Arc<dyn ConnectionTransport>,
    rooms: RwLock<Vec<String>>,
    destroyed: AtomicBool,
    total_actions: AtomicU64,
    pending_actions: AtomicUsize,
    message_count: AtomicU64,
}

/// A client session or a single request.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    /// Params of the current call
    pub params: Params,
}

impl Connection {
    /// Bind a new connection to `transport`.
    pub fn new(details: ConnectionDetails, transport: Arc<dyn ConnectionTransport>) -> Self {
        let shared = Shared {
            id: details.id.unwrap_or_else(ConnectionId::v4),
            kind: details.kind,
            remote_ip: details.remote_ip,
            remote_port: details.remote_port,
            fingerprint: details.fingerprint,
            connected_at: Utc::now(),
            transport,
            rooms: RwLock::new(Vec::new()),
            destroyed: AtomicBool::new(false),
            total_actions: AtomicU64::new(0),
            pending_actions: AtomicUsize::new(0),
            message_count: AtomicU64::new(0),
        };
        tracing::debug!(connection = %shared.id, kind = %shared.kind, "connection created");
        Self {
            shared: Arc::new(shared),
            params: Params::new(),
        }
    }

    /// An in-process connection on the loopback address.
    pub fn internal() -> Self {
        Self::new(
            ConnectionDetails::new(INTERNAL_CONNECTION, IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            Arc::new(NoopTransport),
        )
    }

    /// Replace the params of the current call.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Transport name.
    pub fn kind(&self) -> &str {
        &self.shared.kind
    }

    /// Whether this is an in-process connection.
    pub fn is_internal(&self) -> bool {
        self.shared.kind == INTERNAL_CONNECTION
    }

    /// Peer address.
    pub fn remote_ip(&self) -> IpAddr {
        self.shared.remote_ip
    }

    /// Peer port.
    pub fn remote_port(&self) -> u16 {
        self.shared.remote_port
    }

    /// Client fingerprint.
    pub fn fingerprint(&self) -> Option<&str> {
        self.shared.fingerprint.as_deref()
    }

    /// When the connection was created.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.shared.connected_at
    }

    /// Rooms this connection is a member of.
    pub fn rooms(&self) -> Vec<String> {
        self.shared.rooms.read().clone()
    }

    /// Record membership of `room`. Returns false when already a member.
    pub fn add_room(&self, room: impl Into<String>) -> bool {
        let room = room.into();
        let mut rooms = self.shared.rooms.write();
        if rooms.contains(&room) {
            return false;
        }
        rooms.push(room);
        true
    }

    /// Drop membership of `room`. Returns false when not a member.
    pub fn remove_room(&self, room: &str) -> bool {
        let mut rooms = self.shared.rooms.write();
        let before = rooms.len();
        rooms.retain(|r| r != room);
        rooms.len() != before
    }

    /// Send an out-of-band message through the transport.
    pub fn send_message(&self, message: &Value) -> io::Result<()> {
        self.ensure_open()?;
        self.shared.message_count.fetch_add(1, Ordering::AcqRel);
        self.shared.transport.send_message(self, message)
    }

    /// Send a file through the transport.
    pub fn send_file(&self, path: &Path) -> io::Result<()> {
        self.ensure_open()?;
        self.shared.transport.send_file(self, path)
    }

    /// Close the connection. Only the first call reaches the transport.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.rooms.write().clear();
        self.shared.transport.destroy(self);
        tracing::debug!(connection = %self.shared.id, "connection destroyed");
    }

    /// Whether [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    /// Actions started on this connection.
    pub fn total_actions(&self) -> u64 {
        self.shared.total_actions.load(Ordering::Acquire)
    }

    /// Actions currently in flight.
    pub fn pending_actions(&self) -> usize {
        self.shared.pending_actions.load(Ordering::Acquire)
    }

    /// Messages exchanged so far.
    pub fn message_count(&self) -> u64 {
        self.shared.message_count.load(Ordering::Acquire)
    }

    /// Count one incoming call. The returned guard keeps it pending until
    /// dropped.
    pub(crate) fn begin_action(&self) -> PendingAction {
        self.shared.total_actions.fetch_add(1, Ordering::AcqRel);
        self.shared.message_count.fetch_add(1, Ordering::AcqRel);
        self.shared.pending_actions.fetch_add(1, Ordering::AcqRel);
        PendingAction {
            shared: Arc::clone(&self.shared),
        }
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.is_destroyed() {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection was destroyed",
            ))
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .field("remote_ip", &self.shared.remote_ip)
            .field("remote_port", &self.shared.remote_port)
            .field("destroyed", &self.is_destroyed())
            .field("pending_actions", &self.pending_actions())
            .finish_non_exhaustive()
    }
}

/// Decrements the pending counter on drop.
pub(crate) struct PendingAction {
    shared: Arc<Shared>,
}

impl Drop for PendingAction {
    fn drop(&mut self) {
        self.shared.pending_actions.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<Value>>,
        destroyed: AtomicUsize,
    }

    impl ConnectionTransport for Recording {
        fn send_message(&self, _connection: &Connection, message: &Value) -> io::Result<()> {
            self.sent.lock().push(message.clone());
            Ok(())
        }

        fn send_file(&self, _connection: &Connection, _path: &Path) -> io::Result<()> {
            Ok(())
        }

        fn destroy(&self, _connection: &Connection) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn socket(transport: Arc<Recording>) -> Connection {
        Connection::new(
            ConnectionDetails::new("websocket", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 5123)
                .with_fingerprint("abc"),
            transport,
        )
    }

    #[test]
    fn clones_share_state_but_not_params() {
        let conn = socket(Arc::new(Recording::default()));
        let mut call = conn.clone();
        call.params.insert("action".into(), json!("status"));

        assert_eq!(call.id(), conn.id());
        assert!(conn.params.is_empty());

        let guard = call.begin_action();
        assert_eq!(conn.pending_actions(), 1);
        assert_eq!(conn.total_actions(), 1);
        drop(guard);
        assert_eq!(conn.pending_actions(), 0);
        assert_eq!(conn.total_actions(), 1);
    }

    #[test]
    fn send_message_goes_through_transport() {
        let transport = Arc::new(Recording::default());
        let conn = socket(Arc::clone(&transport));

        conn.send_message(&json!({"welcome": true})).unwrap();

        assert_eq!(transport.sent.lock().as_slice(), &[json!({"welcome": true})]);
        assert_eq!(conn.message_count(), 1);
        assert_eq!(conn.fingerprint(), Some("abc"));
    }

    #[test]
    fn destroy_is_once_and_blocks_sends() {
        let transport = Arc::new(Recording::default());
        let conn = socket(Arc::clone(&transport));
        conn.add_room("lobby");

        conn.destroy();
        conn.destroy();

        assert!(conn.is_destroyed());
        assert!(conn.rooms().is_empty());
        assert_eq!(transport.destroyed.load(Ordering::SeqCst), 1);
        let err = conn.send_message(&json!("late")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn rooms_are_a_set() {
        let conn = Connection::internal();
        assert!(conn.add_room("a"));
        assert!(!conn.add_room("a"));
        assert!(conn.add_room("b"));
        assert!(conn.remove_room("a"));
        assert!(!conn.remove_room("a"));
        assert_eq!(conn.rooms(), vec!["b".to_string()]);
    }

    #[test]
    fn internal_connection_cannot_send_files() {
        let conn = Connection::internal();
        assert!(conn.is_internal());
        assert!(conn.send_file(Path::new("/etc/hosts")).is_err());
    }
}
