//! Standalone Art-Net discovery tool.
//! Run with: cargo run -p artnet --bin artnet-discover -- [LOCAL_IP] [TIMEOUT_SECS]
//!
//! LOCAL_IP defaults to the first non-loopback IPv4 interface.
//! Set RUST_LOG=debug to see every datagram.

use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::time::Duration;

use artnet::{broadcast_address, default_local_addr, discover, DiscoveryConfig};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);

    let local_addr = match args.next() {
        Some(s) => match s.parse::<Ipv4Addr>() {
            Ok(ip) => ip,
            Err(e) => {
                eprintln!("Invalid local IP {s:?}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => match default_local_addr() {
            Some(ip) => ip,
            None => {
                eprintln!("No IPv4 interface found, pass LOCAL_IP explicitly");
                return ExitCode::FAILURE;
            }
        },
    };

    let timeout_secs = match args.next().map(|s| s.parse::<f64>()) {
        None => 2.0,
        Some(Ok(t)) if t > 0.0 => t,
        Some(_) => {
            eprintln!("TIMEOUT_SECS must be a positive number");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Polling {} from {} for {:.1}s...",
        broadcast_address(local_addr),
        local_addr,
        timeout_secs
    );

    let config = DiscoveryConfig::new(local_addr).with_timeout(Duration::from_secs_f64(timeout_secs));
    match discover(&config).await {
        Ok(nodes) => {
            if nodes.is_empty() {
                println!("No nodes found.");
            }
            for node in &nodes {
                println!("{:<16} {:<18} {} universe(s)", node.ip, node.name, node.universe_count);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Discovery failed: {e}");
            ExitCode::FAILURE
        }
    }
}
