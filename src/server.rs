//! One running chat node: consensus event loop, transport, and HTTP front.

use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{info, warn};

use crate::chat::ChatState;
use crate::client_api::{self, ApiRequest};
use crate::config::{Config, ConfigError, ResolvedConfig};
use crate::effect::Effect;
use crate::node::Node;
use crate::runtime::{Event, Runtime};
use crate::transport::{Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("http bind: {0}")]
    HttpBind(#[from] std::io::Error),
}

/// Upper bound on one blocking wait in the event loop. Keeps the HTTP
/// channel responsive even when no Raft traffic arrives.
const MAX_WAIT: Duration = Duration::from_millis(5);

/// A running node. Owns the consensus runtime; everything else reaches it
/// through channels.
pub struct Server {
    runtime: Runtime<Value, ChatState>,
    transport: Transport<Value>,
    api_rx: mpsc::Receiver<ApiRequest>,
}

impl Server {
    /// Validate configuration, bind both listeners, and wire the HTTP
    /// front. Failure here is the only fatal kind this process knows.
    pub fn start(config: Config) -> Result<Self, ServerError> {
        let resolved: ResolvedConfig = config.resolve()?;

        let raft_addr = SocketAddr::from(([0, 0, 0, 0], resolved.raft_port));
        let http_addr = SocketAddr::from(([0, 0, 0, 0], resolved.http_port));

        let node = Node::new(
            resolved.node_id.clone(),
            resolved.peers.keys().cloned().collect(),
        );
        let runtime = Runtime::new(node, ChatState::new(), resolved.timers.clone());
        let transport = Transport::bind(resolved.node_id.clone(), raft_addr, resolved.peers)?;

        let http_listener = TcpListener::bind(http_addr)?;
        let (api_tx, api_rx) = mpsc::channel();
        client_api::start(http_listener, resolved.redirect, api_tx);

        info!(
            node = %resolved.node_id,
            raft = %raft_addr,
            http = %http_addr,
            "node started"
        );

        Ok(Self {
            runtime,
            transport,
            api_rx,
        })
    }

    /// The event loop. Never returns in normal operation; peer and client
    /// failures are absorbed, not raised.
    pub fn run(&mut self) -> Result<(), ServerError> {
        loop {
            // Drain fired timers before blocking so back-to-back expiries
            // are not skipped.
            if let Some(event) = self.runtime.poll_timers() {
                let effects = self.runtime.handle(event);
                self.dispatch(effects);
                continue;
            }

            self.drain_api_requests();

            let wait = self
                .runtime
                .next_deadline()
                .saturating_duration_since(Instant::now())
                .min(MAX_WAIT);

            if let Some((from, message)) = self.transport.recv_timeout(wait) {
                let effects = self.runtime.handle(Event::Message { from, message });
                self.dispatch(effects);
            }
        }
    }

    /// Answer everything the HTTP front has queued since the last pass.
    fn drain_api_requests(&mut self) {
        while let Ok(request) = self.api_rx.try_recv() {
            match request {
                ApiRequest::Submit { command, reply } => {
                    let (outcome, effects) = self.runtime.submit(command);
                    self.dispatch(effects);
                    // A dropped reply means the HTTP handler timed out.
                    let _ = reply.send(outcome);
                }
                ApiRequest::Messages { reply } => {
                    let _ = reply.send(self.runtime.state_machine().snapshot_messages());
                }
            }
        }
    }

    fn dispatch(&self, effects: Vec<Effect<Value>>) {
        for effect in effects {
            if let Effect::Send { to, message } = effect {
                if let Err(e) = self.transport.send(&to, message) {
                    warn!(peer = %to, error = %e, "dropping outbound message");
                }
            }
        }
    }
}
