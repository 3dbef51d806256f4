//! TCP message channel between cluster peers.
//!
//! Messages are framed with a 4-byte big-endian length prefix followed by a
//! JSON `Envelope`. A background thread accepts inbound connections; each
//! is read on its own short-lived thread and forwarded into the receive
//! channel. Outbound messages are fire-and-forget on ephemeral threads:
//! replies travel as independent envelopes in the reverse direction, so
//! loss, duplication, and reordering are all possible; Raft's timers and
//! term checks absorb them. A delivery failure is logged at debug and is
//! never an error to the caller.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::Message;
use crate::types::NodeId;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("unknown peer: {0}")]
    UnknownPeer(NodeId),
}

/// Wire envelope: a Raft message plus the sender's identity.
#[derive(Serialize, Deserialize)]
struct Envelope<C> {
    from: NodeId,
    message: Message<C>,
}

/// One node's endpoint of the cluster mesh.
pub struct Transport<C> {
    local_id: NodeId,
    peers: HashMap<NodeId, SocketAddr>,
    rx: mpsc::Receiver<(NodeId, Message<C>)>,
    /// Dropping the Transport drops this Arc's last strong count on the
    /// accept thread's next error, letting the listener close.
    _listener: Arc<TcpListener>,
}

impl<C> Transport<C>
where
    C: Send + 'static + Serialize + DeserializeOwned,
{
    /// Bind `addr` and start accepting inbound Raft traffic.
    pub fn bind(
        local_id: NodeId,
        addr: SocketAddr,
        peers: HashMap<NodeId, SocketAddr>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self::start(local_id, listener, peers))
    }

    fn start(
        local_id: NodeId,
        listener: TcpListener,
        peers: HashMap<NodeId, SocketAddr>,
    ) -> Self {
        let listener = Arc::new(listener);
        let (tx, rx) = mpsc::channel();
        let accept_listener = Arc::clone(&listener);
        thread::spawn(move || accept_loop::<C>(accept_listener, tx));
        Self {
            local_id,
            peers,
            rx,
            _listener: listener,
        }
    }

    /// Queue a message for delivery. Returns immediately; only an unknown
    /// peer is a synchronous error. I/O failures during the actual send
    /// are logged and dropped (see module docs).
    pub fn send(&self, to: &NodeId, message: Message<C>) -> Result<(), TransportError> {
        let addr = self
            .peers
            .get(to)
            .copied()
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))?;
        let from = self.local_id.clone();
        let peer = to.clone();
        thread::spawn(move || {
            if let Err(e) = dial_and_send(addr, from, message) {
                debug!(peer = %peer, addr = %addr, error = %e, "raft send failed");
            }
        });
        Ok(())
    }

    /// Block until a message arrives or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<(NodeId, Message<C>)> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self._listener.local_addr()?)
    }
}

fn accept_loop<C>(listener: Arc<TcpListener>, tx: mpsc::Sender<(NodeId, Message<C>)>)
where
    C: Send + 'static + DeserializeOwned,
{
    loop {
        match listener.accept() {
            Ok((stream, remote)) => {
                let tx = tx.clone();
                thread::spawn(move || {
                    // Bound how long a slow or misbehaving sender can hold us.
                    let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
                    match read_envelope::<C>(&stream) {
                        Ok(envelope) => {
                            let _ = tx.send((envelope.from, envelope.message));
                        }
                        Err(e) => debug!(remote = %remote, error = %e, "dropping malformed frame"),
                    }
                });
            }
            // Listener closed (Transport dropped) or unrecoverable error.
            Err(_) => break,
        }
    }
}

/// Read one length-prefixed JSON envelope.
fn read_envelope<C: DeserializeOwned>(mut stream: &TcpStream) -> Result<Envelope<C>, TransportError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Connect, write one length-prefixed JSON envelope, close.
fn dial_and_send<C: Serialize>(
    addr: SocketAddr,
    from: NodeId,
    message: Message<C>,
) -> Result<(), TransportError> {
    let envelope = Envelope { from, message };
    let bytes = serde_json::to_vec(&envelope)?;
    let Ok(len) = u32::try_from(bytes.len()) else {
        return Err(TransportError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "message exceeds frame limit",
        )));
    };
    let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(&bytes)?;
    stream.flush()?;
    Ok(())
}
