//! Echo client example
//!
//! Connects to a link peripheral, sends a JSON echo request and a `PING`,
//! prints whatever comes back for a few seconds, then disconnects.
//!
//! Run with: cargo run --example echo_client
//!
//! To connect to a peripheral with another name:
//!   cargo run --example echo_client -- --name MY-DEVICE

use ble_line_link::{CentralLink, ConnectionState, Result};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,ble_line_link=debug".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let name = args
        .iter()
        .position(|arg| arg == "--name")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| "BLE-LINK-TEST".to_string());

    let link = CentralLink::new(name.as_str()).await?;

    link.on_receive_json(|doc| println!("[json ] {}", doc));
    link.on_receive_raw(|line| println!("[raw  ] {}", line));

    let mut events = link.subscribe_connection_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event.state == ConnectionState::Connected || event.state == ConnectionState::Disconnected {
                println!("[link ] {} is {}", event.device_name, event.state);
            }
        }
    });

    println!("Connecting to {}...", name);
    link.connect().await?;
    println!("Connected: {}", link.is_connected().await);

    println!("Sending JSON echo");
    link.send_json(&json!({"op": "echo", "msg": "hello from Rust"})).await?;

    println!("Sending PING");
    link.send_raw("PING").await?;

    // Periodic status frames from the device show up here too
    tokio::time::sleep(Duration::from_secs(8)).await;

    println!("Disconnecting");
    link.disconnect().await?;

    Ok(())
}
