//! Ask the run service for the sample user's runs and print the total distance.
//!
//! Run with: cargo run --bin runs_total
//!
//! Requires: an AMQP broker on localhost:5672 and a server consuming
//! `running_queue`.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use runner_rpc::{driver, RpcClient, RpcConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RpcConfig::default();
    let client = RpcClient::connect(config.clone())
        .await
        .with_context(|| format!("connecting to {}", config.transport_uri))?;

    let user = driver::sample_user();
    let report = driver::report_runs(&client, &user).await;

    // Release the connection before surfacing any request error.
    client.close().await?;

    let report = report.context("requesting runs")?;
    println!("{report}");

    Ok(())
}
