//! Handler-driven chat client.
//!
//! Demonstrates:
//! - Poll-then-upgrade connection bootstrap
//! - Typed event registration
//! - Event handler dispatch
//! - Emitting events
//!
//! Usage:
//!   cargo run --example 001_chat
//!   cargo run --example 001_chat -- http://localhost:3000/ --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use common::Args;
use socketio_client::{ClientOptions, Result, SocketIoClient};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    sender: String,
    text: String,
}

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
    println!("=== 001: Chat ===\n");

    let client = SocketIoClient::new(&args.server, ClientOptions::default())?;
    client.register_event_type::<ChatMessage>("chat");

    client.on_connected(|info| {
        println!("[Connected] sid={}", info.socket_id);
    });
    client.on_event(|event| match event.argument() {
        Some(argument) => match argument.downcast_ref::<ChatMessage>() {
            Some(message) => println!("[{}] {}: {}", event.name(), message.sender, message.text),
            None => println!("[{}] {:?}", event.name(), argument),
        },
        None => println!("[{}]", event.name()),
    });
    client.on_error(|error| {
        eprintln!("[Error] {error}");
    });

    client.connect().await?;

    client.emit(
        "chat",
        ChatMessage {
            sender: "demo".into(),
            text: "hello from rust".into(),
        },
    )?;

    println!("Listening for 10 seconds...");
    sleep(Duration::from_secs(10)).await;

    client.close().await?;
    println!("\nDone.");
    Ok(())
}
