//! Relay CLI - host harness for the install referrer pipeline.
//!
//! # Architecture
//!
//! Stands in for the host application process: initializes logging, loads
//! configuration, wires a stdout sink as the embedded runtime, and runs
//! the delivery pipeline once.
//!
//! ```text
//! main() -> RelayConfig::load() -> DeliveryPipeline::spawn()
//!                                        |
//!                  stdout sink <── RuntimeHandle channel
//! ```
//!
//! Runtime events arrive on stdout as JSON lines; diagnostics go to
//! stderr through `tracing`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use relay_client::http::HttpAttributionService;
use relay_config::RelayConfig;
use relay_engine::{DeliveryOutcome, DeliveryPipeline};
use relay_runtime::{ReadinessGate, RuntimeHandle};
use relay_store::FlagStore;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = RelayConfig::load()?;
    let store = FlagStore::open(&config.state_dir(), &config.storage.namespace);
    let service = Arc::new(HttpAttributionService::with_connect_timeout(
        config.service.base_url.clone(),
        Duration::from_secs(config.service.connect_timeout_secs),
    ));
    let gate = Arc::new(ReadinessGate::new());

    // Stand-in embedded runtime: drain events to stdout as JSON lines.
    let (handle, mut events) = RuntimeHandle::channel();
    let sink = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Failed to encode runtime event: {e}"),
            }
        }
    });

    if gate.install(handle).is_err() {
        tracing::warn!("Runtime handle already installed");
    }

    let pipeline = Arc::new(DeliveryPipeline::new(service, gate, store));
    let outcome = Arc::clone(&pipeline).spawn().await?;
    tracing::info!(?outcome, "Relay finished");

    // Dropping the pipeline drops the gate and with it the runtime
    // handle, closing the event channel so the sink drains and exits.
    drop(pipeline);
    let _ = sink.await;

    if let DeliveryOutcome::Failed(reason) = outcome {
        anyhow::bail!("install referrer delivery failed: {reason:?}");
    }
    Ok(())
}
