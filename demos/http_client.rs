//! HTTP client example
//!
//! Reads a few values from a node over plain HTTP.
//!
//! Run with: cargo run --example http_client -- http://127.0.0.1:8545

use ethrpc::{params, HttpTransport, Transport, TransportExt};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Block {
    number: String,
    hash: String,
    #[serde(default)]
    transactions: Vec<serde_json::Value>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8545".to_string());

    let node = HttpTransport::builder(url.as_str())
        .timeout(Duration::from_secs(10))
        .debug(true)
        .build()?;

    let chain_id = node.execute("eth_chainId", params![]).await?;
    tracing::info!(%chain_id, "connected to {}", url);

    let block: Option<Block> = node
        .request("eth_getBlockByNumber", params!["latest", false])
        .await?;
    match block {
        Some(block) => println!(
            "latest block {} ({}) with {} transactions",
            block.number,
            block.hash,
            block.transactions.len()
        ),
        None => println!("node has no blocks yet"),
    }

    let balance: String = node
        .request(
            "eth_getBalance",
            params!["0x0000000000000000000000000000000000000000", "latest"],
        )
        .await?;
    println!("zero address balance: {}", balance);

    for record in node.call_log().recent() {
        println!("{} took {:?}", record.method, record.duration);
    }

    Ok(())
}
