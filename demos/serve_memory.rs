//! Wires `dmtp-server` to an in-memory store and serves one demo device.
//!
//! # Running
//!
//! ```bash
//! cargo run --example serve_memory
//! ```
//!
//! Connect with any OpenDMTP-speaking client against the printed TCP/UDP
//! port, identifying as account `demo`, device `tracker-1`.

use std::sync::Arc;

use dmtp_server::{Listener, ListenerConfig};
use dmtp_testing::{DeviceSeed, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "tracker-1", 0x0000_0000_0001)));

    let listener = Listener::start(ListenerConfig::new(31_000), store).await?;
    println!("listening for duplex TCP on {}", listener.tcp_addr());
    println!("listening for simplex UDP on {}", listener.udp_addr());
    println!("device identity: account=demo device=tracker-1 unique_id=1");

    tokio::signal::ctrl_c().await?;
    println!("shutting down");
    listener.stop();
    Ok(())
}
