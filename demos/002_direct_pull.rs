//! Direct-duplex connection with pull-style receive.
//!
//! Demonstrates:
//! - Direct WebSocket bootstrap (no polling round trip)
//! - Pulling events one at a time with `receive()`
//! - Multi-argument emit
//!
//! Usage:
//!   cargo run --example 002_direct_pull
//!   cargo run --example 002_direct_pull -- http://localhost:3000/ --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use serde_json::json;

use common::Args;
use socketio_client::{ClientOptions, Result, SocketIoClient};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 002: Direct Pull ===\n");

    // No event handler registered: the read half stays with the client and
    // receive() pulls the next event.
    let options = ClientOptions::new().with_direct_upgrade(true);
    let client = SocketIoClient::new(&args.server, options)?;

    client.connect().await?;
    let info = client.connection_info().expect("connected");
    println!("[Connected] sid={} upgrades={:?}", info.socket_id, info.upgrades);

    client.emit_many("move", [json!(3), json!(4)])?;

    println!("Pulling 5 events...");
    for index in 0..5 {
        let event = client.receive().await?;
        println!("  {index}: {} {:?}", event.name(), event.arguments());
    }

    client.close().await?;
    println!("\nDone.");
    Ok(())
}
