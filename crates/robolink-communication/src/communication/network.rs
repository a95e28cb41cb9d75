//! Network transport
//!
//! Discovers devices on the local network and holds one TCP session.
//!
//! Discovery is a probe sweep: one UDP datagram to the probe address, then
//! every reply received within the probe window names a device (the reply
//! text is its id, the sender address its IP). The roster is replaced
//! wholesale when a sweep completes.
//!
//! A session is established by connecting to the device's session port and
//! negotiating: the client sends `hello`, the device answers `ok` or
//! `ok <id>`. Only then is the connection reported open.

use super::framing::LineFramer;
use super::{NetworkTransport, OpenOptions, Transport, TransportEvents};
use robolink_core::event_bus::CommunicationEvent;
use robolink_core::{
    emit, thread_safe, thread_safe_rw, AppEvent, ConnectionError, DeviceRoster, DoneCallback,
    OpenCallback, Payload, PortDescriptor, PortKind, Result, ThreadSafe, ThreadSafeRw,
};
use robolink_settings::NetworkSettings;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

const HANDSHAKE_REQUEST: &[u8] = b"hello\n";

const READ_CHUNK: usize = 1024;

struct NetSession {
    id: u64,
    target: IpAddr,
    /// Resolved path; `None` while the handshake is in flight
    path: Option<String>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: oneshot::Sender<Option<DoneCallback>>,
}

/// Network transport: UDP probe discovery plus one TCP session
pub struct NetConnection {
    runtime: Handle,
    settings: NetworkSettings,
    roster: ThreadSafeRw<DeviceRoster>,
    session: ThreadSafe<Option<NetSession>>,
    next_id: AtomicU64,
}

impl NetConnection {
    /// Create a transport that runs its I/O on `runtime`
    pub fn new(runtime: Handle, settings: NetworkSettings) -> Self {
        Self {
            runtime,
            settings,
            roster: thread_safe_rw(DeviceRoster::new()),
            session: thread_safe(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Discovery and session settings in use
    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    /// Check if a session is open
    pub fn is_connected(&self) -> bool {
        self.session_path().is_some()
    }

    /// Path of the open session
    pub fn session_path(&self) -> Option<String> {
        self.session.lock().as_ref().and_then(|s| s.path.clone())
    }

    /// Run one probe sweep to completion and install its roster.
    ///
    /// Returns the number of devices that answered.
    pub async fn sweep(&self) -> Result<usize> {
        sweep_and_store(&self.settings, &self.roster).await
    }

    /// Establish and negotiate a session with the device at `target_ip`
    pub fn promote_connection(
        &self,
        target_ip: IpAddr,
        events: TransportEvents,
        on_open: OpenCallback,
    ) {
        let mut guard = self.session.lock();
        if let Some(busy) = guard.as_ref() {
            let reason = match &busy.path {
                Some(path) => format!("session with {} is already open", path),
                None => format!("session with {} is being negotiated", busy.target),
            };
            drop(guard);
            on_open(Err(ConnectionError::FailedToOpen {
                port: target_ip.to_string(),
                reason,
            }
            .into()));
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        *guard = Some(NetSession {
            id,
            target: target_ip,
            path: None,
            outgoing,
            shutdown,
        });
        drop(guard);

        let settings = self.settings.clone();
        let session = self.session.clone();

        self.runtime.spawn(async move {
            let result = tokio::select! {
                result = negotiate(target_ip, &settings) => result,
                request = &mut shutdown_rx => {
                    tracing::debug!("Negotiation with {} abandoned", target_ip);
                    on_open(Err(ConnectionError::ConnectionLost {
                        reason: format!("{} was disconnected while negotiating", target_ip),
                    }
                    .into()));
                    if let Ok(Some(done)) = request {
                        done();
                    }
                    return;
                }
            };

            let negotiated = match result {
                Ok(negotiated) => negotiated,
                Err(e) => {
                    tracing::warn!("Session with {} not established: {}", target_ip, e);
                    release(&session, id);
                    on_open(Err(e));
                    if let Ok(Some(done)) = shutdown_rx.try_recv() {
                        done();
                    }
                    return;
                }
            };

            let claimed = {
                let mut guard = session.lock();
                match guard.as_mut() {
                    Some(s) if s.id == id => {
                        s.path = Some(negotiated.path.clone());
                        true
                    }
                    _ => false,
                }
            };

            if !claimed {
                on_open(Err(ConnectionError::ConnectionLost {
                    reason: format!("{} was disconnected while negotiating", negotiated.path),
                }
                .into()));
                if let Ok(Some(done)) = shutdown_rx.try_recv() {
                    done();
                }
                return;
            }

            tracing::info!("Session established with {}", negotiated.path);
            on_open(Ok(negotiated.path.clone()));

            run_session(negotiated, id, session, events, outgoing_rx, shutdown_rx).await;
        });
    }

    /// Queue a command on the open session.
    ///
    /// Text payloads are newline-terminated; binary payloads go as-is.
    pub fn send_command(&self, payload: Payload) {
        let bytes = match payload {
            Payload::Text(mut text) => {
                text.push('\n');
                text.into_bytes()
            }
            Payload::Binary(bytes) => bytes,
        };

        let guard = self.session.lock();
        match guard.as_ref().and_then(|s| s.path.as_ref().map(|path| (s, path))) {
            Some((session, path)) => {
                let len = bytes.len();
                if session.outgoing.send(bytes).is_ok() {
                    tracing::debug!("Queued {} bytes for {}", len, path);
                }
            }
            None => tracing::debug!("Dropping {} bytes: no network session", bytes.len()),
        }
    }
}

impl Transport for NetConnection {
    fn kind(&self) -> PortKind {
        PortKind::Network
    }

    fn open(
        &self,
        port: &PortDescriptor,
        _options: OpenOptions,
        events: TransportEvents,
        on_open: OpenCallback,
    ) {
        match port.ip {
            Some(ip) => self.promote_connection(ip, events, on_open),
            None => on_open(Err(ConnectionError::InvalidParameters {
                reason: format!("{} has no device address", port.path),
            }
            .into())),
        }
    }

    fn disconnect(&self, callback: Option<DoneCallback>) {
        // The callback is handed over under the lock so the session task,
        // which releases its slot under the same lock, always finds it.
        let mut guard = self.session.lock();
        let unclaimed = match guard.take() {
            Some(session) => {
                tracing::debug!("Closing session with {}", session.target);
                session.shutdown.send(callback).err().flatten()
            }
            None => callback,
        };
        drop(guard);

        if let Some(callback) = unclaimed {
            callback();
        }
    }

    fn send(&self, payload: Payload) {
        self.send_command(payload);
    }
}

impl NetworkTransport for NetConnection {
    fn ping_robots(&self) {
        let settings = self.settings.clone();
        let roster = self.roster.clone();
        self.runtime.spawn(async move {
            if let Err(e) = sweep_and_store(&settings, &roster).await {
                tracing::warn!("Probe sweep failed: {}", e);
            }
        });
    }

    fn robot_roster(&self) -> DeviceRoster {
        self.roster.read().clone()
    }
}

impl std::fmt::Debug for NetConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetConnection")
            .field("settings", &self.settings)
            .field("session", &self.session_path())
            .finish()
    }
}

async fn sweep_and_store(
    settings: &NetworkSettings,
    roster: &ThreadSafeRw<DeviceRoster>,
) -> Result<usize> {
    let found = probe_sweep(settings).await?;
    let devices = found.len();
    tracing::debug!("Probe sweep found {} device(s)", devices);
    *roster.write() = found;
    emit!(AppEvent::Communication(
        CommunicationEvent::ProbeSweepCompleted { devices }
    ));
    Ok(devices)
}

async fn probe_sweep(settings: &NetworkSettings) -> Result<DeviceRoster> {
    let bind_addr: SocketAddr = match settings.probe_address {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    if settings.probe_address.is_ipv4() {
        socket.set_broadcast(true)?;
    }

    let target = SocketAddr::new(settings.probe_address, settings.discovery_port);
    socket
        .send_to(settings.probe_message.as_bytes(), target)
        .await?;
    tracing::debug!("Probe sent to {}", target);

    let deadline = Instant::now() + Duration::from_millis(settings.probe_window_ms);
    let mut roster = DeviceRoster::new();
    let mut buf = [0u8; 512];

    loop {
        match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => {
                let reply = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                let id = if reply.is_empty() {
                    from.ip().to_string()
                } else {
                    reply
                };
                tracing::trace!("Probe reply from {}: {}", from, id);
                roster.insert(id, from.ip());
            }
            Ok(Err(e)) => {
                tracing::debug!("Probe receive error, ending sweep early: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    Ok(roster)
}

struct Negotiated {
    stream: TcpStream,
    framer: LineFramer,
    path: String,
    early_lines: Vec<String>,
}

async fn negotiate(ip: IpAddr, settings: &NetworkSettings) -> Result<Negotiated> {
    let addr = SocketAddr::new(ip, settings.session_port);
    let timeout_ms = settings.handshake_timeout_ms;

    tokio::time::timeout(Duration::from_millis(timeout_ms), handshake(addr))
        .await
        .map_err(|_| ConnectionError::ConnectionTimeout { timeout_ms })?
}

async fn handshake(addr: SocketAddr) -> Result<Negotiated> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ConnectionError::FailedToOpen {
            port: addr.to_string(),
            reason: e.to_string(),
        })?;
    stream.write_all(HANDSHAKE_REQUEST).await?;

    let mut framer = LineFramer::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(ConnectionError::HandshakeFailed {
                address: addr.ip().to_string(),
                reason: "closed before replying".to_string(),
            }
            .into());
        }

        let mut lines = framer.push(&buf[..n]);
        if lines.is_empty() {
            continue;
        }

        let reply = lines.remove(0);
        let device_id =
            parse_handshake_reply(&reply).ok_or_else(|| ConnectionError::HandshakeFailed {
                address: addr.ip().to_string(),
                reason: format!("unexpected reply {:?}", reply),
            })?;

        return Ok(Negotiated {
            stream,
            framer,
            path: session_path(device_id.as_deref(), addr.ip()),
            early_lines: lines,
        });
    }
}

/// `ok` accepts the session; `ok <id>` also names the device.
fn parse_handshake_reply(line: &str) -> Option<Option<String>> {
    let mut parts = line.trim().splitn(2, char::is_whitespace);
    match parts.next() {
        Some(word) if word.eq_ignore_ascii_case("ok") => Some(
            parts
                .next()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        ),
        _ => None,
    }
}

fn session_path(device_id: Option<&str>, ip: IpAddr) -> String {
    match device_id {
        Some(id) => format!("{}:{}", id, ip),
        None => ip.to_string(),
    }
}

/// Free the session slot if it still belongs to `id`
fn release(session: &ThreadSafe<Option<NetSession>>, id: u64) {
    let mut guard = session.lock();
    if guard.as_ref().is_some_and(|s| s.id == id) {
        guard.take();
    }
}

async fn run_session(
    negotiated: Negotiated,
    id: u64,
    session: ThreadSafe<Option<NetSession>>,
    events: TransportEvents,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: oneshot::Receiver<Option<DoneCallback>>,
) {
    let Negotiated {
        stream,
        mut framer,
        path,
        early_lines,
    } = negotiated;
    let TransportEvents {
        on_line, on_close, ..
    } = events;

    for line in early_lines {
        on_line(line);
    }

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = [0u8; READ_CHUNK];
    let mut done = None;

    loop {
        tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    tracing::info!("{} closed the session", path);
                    break;
                }
                Ok(n) => {
                    for line in framer.push(&buf[..n]) {
                        tracing::trace!("{} <- {}", path, line);
                        on_line(line);
                    }
                }
                Err(e) => {
                    tracing::warn!("Session with {} lost: {}", path, e);
                    break;
                }
            },
            Some(data) = outgoing.recv() => {
                if let Err(e) = writer.write_all(&data).await {
                    tracing::warn!("Write to {} failed: {}", path, e);
                    break;
                }
            }
            request = &mut shutdown => {
                done = request.ok().flatten();
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    on_close();

    release(&session, id);

    // A disconnect that raced the end of the loop left its callback here.
    if done.is_none() {
        done = shutdown.try_recv().ok().flatten();
    }
    if let Some(done) = done {
        done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handshake_reply() {
        assert_eq!(parse_handshake_reply("ok"), Some(None));
        assert_eq!(parse_handshake_reply("OK\r"), Some(None));
        assert_eq!(
            parse_handshake_reply("ok bot1"),
            Some(Some("bot1".to_string()))
        );
        assert_eq!(
            parse_handshake_reply("ok   kitten 2 "),
            Some(Some("kitten 2".to_string()))
        );
        assert_eq!(parse_handshake_reply("busy"), None);
        assert_eq!(parse_handshake_reply("okay"), None);
        assert_eq!(parse_handshake_reply(""), None);
    }

    #[test]
    fn test_session_path() {
        let ip: IpAddr = "192.168.1.5".parse().unwrap();
        assert_eq!(session_path(Some("bot1"), ip), "bot1:192.168.1.5");
        assert_eq!(session_path(None, ip), "192.168.1.5");
    }
}
