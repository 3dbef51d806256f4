use clap::Parser;
use tracing_subscriber::EnvFilter;

use dchat::config::Config;
use dchat::server::Server;

#[derive(Parser)]
#[command(name = "dchat", about = "A replicated chat node")]
struct Args {
    /// This node's unique ID (e.g. node0).
    #[arg(long)]
    id: String,

    /// Port for the client-facing HTTP API.
    #[arg(long, default_value_t = 9000)]
    http_port: u16,

    /// Port for Raft RPCs.
    #[arg(long, default_value_t = 10000)]
    raft_port: u16,

    /// A peer's Raft endpoint in the form ID=HOST:PORT. Repeat for each peer.
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// A peer's HTTP port in the form ID=PORT, used to build local-mode
    /// redirects to the leader. Repeat for each peer.
    #[arg(long = "peer-http")]
    peer_http: Vec<String>,

    /// Public hostname fronting the cluster (load balancer). When set,
    /// redirects always point here.
    #[arg(long, env = "DCHAT_PUBLIC_HOST")]
    public_host: Option<String>,

    /// Scheme for public redirects.
    #[arg(long, env = "DCHAT_PUBLIC_SCHEME", default_value = "http")]
    public_scheme: String,

    #[arg(long, default_value_t = 150)]
    election_timeout_min_ms: u64,

    #[arg(long, default_value_t = 300)]
    election_timeout_max_ms: u64,

    #[arg(long, default_value_t = 50)]
    heartbeat_interval_ms: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut server = Server::start(Config {
        id: args.id,
        http_port: args.http_port,
        raft_port: args.raft_port,
        peers: args.peers,
        peer_http: args.peer_http,
        public_host: args.public_host,
        public_scheme: args.public_scheme,
        election_timeout_min_ms: args.election_timeout_min_ms,
        election_timeout_max_ms: args.election_timeout_max_ms,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
    })?;

    server.run()?;
    Ok(())
}
