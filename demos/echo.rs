//! Echo round trip against a running bridge.
//!
//! Demonstrates:
//! - Connecting with reconnect enabled
//! - Registering a handler from the open listener
//! - Sending with a reply callback
//! - Awaiting a reply with `request_with_timeout`
//!
//! Usage:
//!   cargo run --example echo
//!   cargo run --example echo -- --url http://localhost:8080/eventbus
//!   cargo run --example echo -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use vertx_eventbus_bridge::{EventBus, EventBusOptions, handler, reply_handler};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "http://localhost:8080/eventbus";
const ECHO_ADDRESS: &str = "ClickedViewAsExternalPortal";
const FEED_ADDRESS: &str = "news.feed";

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    url: String,
    debug: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let url = args
            .iter()
            .position(|a| a == "--url")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_else(|| DEFAULT_URL.to_string());

        Self {
            url,
            debug: args.iter().any(|a| a == "--debug"),
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "vertx_eventbus_bridge=trace"
    } else {
        "vertx_eventbus_bridge=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== Event Bus Echo ===\n");
    println!("[1] Connecting to {}", args.url);

    let bus = EventBus::connect_with_options(
        &args.url,
        EventBusOptions::new()
            .with_reconnect(true)
            .with_reply_timeout(Duration::from_secs(10)),
    )
    .context("failed to start bus")?;

    // Subscriptions are per session, so register on every open
    let weak = bus.downgrade();
    bus.on_open(move || {
        let Some(bus) = weak.upgrade() else { return };
        println!("    ✓ Open\n");

        let feed = handler(|result| match result {
            Ok(message) => println!("[feed] {}", message.body),
            Err(failure) => println!("[feed] error: {failure}"),
        });
        if let Err(e) = bus.register_handler(FEED_ADDRESS, None, feed) {
            eprintln!("[feed] register failed: {e}");
        }

        let sent = bus.send(
            ECHO_ADDRESS,
            json!({"hello": "bridge"}),
            None,
            Some(reply_handler(|reply| match reply {
                Ok(message) => println!("[2] Reply: {}", message.body),
                Err(failure) => println!("[2] Failed: {failure}"),
            })),
        );
        if let Err(e) = sent {
            eprintln!("[2] send failed: {e}");
        }
    });

    bus.on_reconnect(|| println!("    ✓ Reconnected"));
    bus.on_close(|event| println!("    ✗ {event}"));
    bus.on_error(|failure| println!("    ✗ Bridge error: {failure}"));

    // Give the first session a moment before using the async API
    tokio::time::sleep(Duration::from_secs(1)).await;

    if bus.state().is_open() {
        println!("[3] Request with timeout...");
        match bus
            .request_with_timeout(ECHO_ADDRESS, json!("ping"), None, Duration::from_secs(5))
            .await
        {
            Ok(message) => println!("    ✓ {}", message.body),
            Err(e) => println!("    ✗ {e}"),
        }
    }

    println!("\nPress Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();

    bus.close();
    println!("Closed.");
    Ok(())
}
