//! Observability client example
//!
//! Exports traces and transport metrics over OTLP while polling a node.
//!
//! Run with: cargo run --example observability_client

use ethrpc::core::ObservabilityConfig;
use ethrpc::{params, HttpTransport, TransportExt};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let otel_config = ObservabilityConfig::new("ethrpc-observability-client")
        .with_endpoint("http://localhost:4317")
        .with_log_level("debug");

    let node = HttpTransport::builder("http://127.0.0.1:8545")
        .with_observability(otel_config)
        .build()?;

    for i in 1..=5 {
        tracing::info!(iteration = i, "polling node");

        let block: String = node.request("eth_blockNumber", params![]).await?;
        let peers: String = node.request("net_peerCount", params![]).await?;
        tracing::info!(iteration = i, %block, %peers, "node status");

        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    println!("View traces at http://localhost:16686 (Jaeger UI)");

    // Give the exporters time to flush
    tokio::time::sleep(Duration::from_secs(2)).await;
    ethrpc::core::shutdown_observability();

    Ok(())
}
