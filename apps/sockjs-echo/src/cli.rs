use std::net::SocketAddr;

use clap::Parser;

/// Flags override the matching `SOCKJS_*` environment variables.
#[derive(Parser, Debug, Default)]
#[command(name = "sockjs-echo")]
#[command(about = "SockJS echo server exposing every transport")]
pub struct Cli {
    /// Address to listen on (e.g., 0.0.0.0:8081)
    #[arg(short, long)]
    pub addr: Option<SocketAddr>,

    /// Path prefix for the echo endpoint
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Seconds between heartbeat frames on an idle transport
    #[arg(long)]
    pub heartbeat_secs: Option<u64>,

    /// Seconds a detached session waits for a reconnect
    #[arg(long)]
    pub disconnect_secs: Option<u64>,

    /// Bytes written to a streaming response before it is recycled
    #[arg(long)]
    pub response_limit: Option<usize>,

    /// Disable the websocket transport
    #[arg(long)]
    pub no_websocket: bool,

    /// Log filter, same syntax as RUST_LOG
    #[arg(long)]
    pub log: Option<String>,
}
