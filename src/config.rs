//! Per-node configuration and its validation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::runtime::TimerConfig;
use crate::types::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid peer '{0}': expected ID=HOST:PORT")]
    InvalidPeer(String),
    #[error("invalid peer address '{addr}': {reason}")]
    InvalidPeerAddr { addr: String, reason: String },
    #[error("invalid peer http port '{0}': expected ID=PORT")]
    InvalidPeerHttp(String),
    #[error("election timeout range is empty ({min_ms}..{max_ms} ms)")]
    EmptyElectionRange { min_ms: u64, max_ms: u64 },
    #[error("heartbeat interval ({heartbeat_ms} ms) must be shorter than the minimum election timeout ({min_ms} ms)")]
    HeartbeatTooSlow { heartbeat_ms: u64, min_ms: u64 },
}

/// Raw per-node options, as collected from the command line.
#[derive(Clone, Debug)]
pub struct Config {
    pub id: String,
    pub http_port: u16,
    pub raft_port: u16,
    /// Raft endpoints, `ID=HOST:PORT`. An entry naming self is filtered.
    pub peers: Vec<String>,
    /// Leader HTTP ports for local-mode redirects, `ID=PORT`.
    pub peer_http: Vec<String>,
    /// Public hostname fronting the cluster (e.g. a load balancer). When
    /// set, every redirect points here instead of at an individual node.
    pub public_host: Option<String>,
    pub public_scheme: String,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Config {
    /// Parse and validate into the typed form the server consumes.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        if self.election_timeout_min_ms > self.election_timeout_max_ms {
            return Err(ConfigError::EmptyElectionRange {
                min_ms: self.election_timeout_min_ms,
                max_ms: self.election_timeout_max_ms,
            });
        }
        if self.heartbeat_interval_ms >= self.election_timeout_min_ms {
            return Err(ConfigError::HeartbeatTooSlow {
                heartbeat_ms: self.heartbeat_interval_ms,
                min_ms: self.election_timeout_min_ms,
            });
        }

        let node_id = NodeId::from(self.id.as_str());

        let mut peers = HashMap::new();
        for spec in &self.peers {
            let (id, addr) = parse_peer(spec)?;
            if id != node_id {
                peers.insert(id, addr);
            }
        }

        let mut leader_http_ports = HashMap::new();
        for spec in &self.peer_http {
            let (id, port) = parse_peer_http(spec)?;
            leader_http_ports.insert(id, port);
        }

        Ok(ResolvedConfig {
            node_id,
            http_port: self.http_port,
            raft_port: self.raft_port,
            peers,
            redirect: RedirectPolicy {
                public: self
                    .public_host
                    .as_ref()
                    .map(|host| PublicEndpoint {
                        scheme: self.public_scheme.clone(),
                        host: host.clone(),
                    }),
                leader_http_ports,
            },
            timers: TimerConfig {
                election_timeout_min: Duration::from_millis(self.election_timeout_min_ms),
                election_timeout_max: Duration::from_millis(self.election_timeout_max_ms),
                heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            },
        })
    }
}

/// Validated configuration.
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub node_id: NodeId,
    pub http_port: u16,
    pub raft_port: u16,
    pub peers: HashMap<NodeId, SocketAddr>,
    pub redirect: RedirectPolicy,
    pub timers: TimerConfig,
}

/// Where to point a client that reached the wrong node.
#[derive(Clone, Debug, Default)]
pub struct RedirectPolicy {
    pub public: Option<PublicEndpoint>,
    pub leader_http_ports: HashMap<NodeId, u16>,
}

#[derive(Clone, Debug)]
pub struct PublicEndpoint {
    pub scheme: String,
    pub host: String,
}

impl RedirectPolicy {
    /// Location target for `/chat` given a known leader, or None when no
    /// target can be named (the client retries, same as during elections).
    /// Behind a load balancer the public endpoint always wins so private
    /// node addresses never leak into Location headers.
    pub fn chat_location(&self, leader: &NodeId) -> Option<String> {
        if let Some(public) = &self.public {
            return Some(format!("{}://{}/chat", public.scheme, public.host));
        }
        self.leader_http_ports
            .get(leader)
            .map(|port| format!("http://127.0.0.1:{port}/chat"))
    }
}

fn parse_peer(spec: &str) -> Result<(NodeId, SocketAddr), ConfigError> {
    let (id, addr_str) = spec
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidPeer(spec.to_string()))?;
    let addr = addr_str
        .parse()
        .map_err(|e| ConfigError::InvalidPeerAddr {
            addr: addr_str.to_string(),
            reason: format!("{e}"),
        })?;
    Ok((NodeId::from(id), addr))
}

fn parse_peer_http(spec: &str) -> Result<(NodeId, u16), ConfigError> {
    let (id, port_str) = spec
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidPeerHttp(spec.to_string()))?;
    let port = port_str
        .parse()
        .map_err(|_| ConfigError::InvalidPeerHttp(spec.to_string()))?;
    Ok((NodeId::from(id), port))
}
