//! Main entry point for the orderdesk demo service.
//!
//! Seeds an in-memory order store, assembles the desk from configuration and
//! runs a scripted dashboard and guest checkout session against it. The run
//! stops early on Ctrl+C.

use clap::Parser;
use orderdesk_config::Config;
use orderdesk_core::{DeskBuilder, EventBus};
use orderdesk_storage::implementations::memory_orders::MemoryOrderStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

mod script;
mod seed;

/// Command-line arguments for the orderdesk service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/orderdesk.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Number of orders to seed into the store
	#[arg(short, long, default_value_t = 20, env = "ORDERDESK_SEED_ORDERS")]
	orders: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started orderdesk");

	let path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Config path is not valid UTF-8: {}", args.config.display()))?;
	let config = Config::from_file(path).await?;
	tracing::info!("Loaded configuration [{}]", config.desk.id);

	let store = Arc::new(MemoryOrderStore::new());
	seed::seed_orders(&store, args.orders).await;

	let desk = DeskBuilder::new(config).build(store)?;
	let cleanup = desk.spawn_storage_cleanup();
	let events = log_events(desk.event_bus());

	tokio::select! {
		result = script::run(&desk) => {
			tracing::info!("Scripted session finished");
			result?;
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received Ctrl+C");
		}
	}

	desk.shutdown(Some(cleanup)).await?;
	events.abort();
	tracing::info!("Stopped orderdesk");
	Ok(())
}

/// Logs every desk event until the bus closes.
fn log_events(event_bus: &EventBus) -> JoinHandle<()> {
	let mut receiver = event_bus.subscribe();
	tokio::spawn(async move {
		use tokio::sync::broadcast::error::RecvError;
		loop {
			match receiver.recv().await {
				Ok(event) => tracing::debug!(event = ?event, "Desk event"),
				Err(RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "Event logger fell behind")
				},
				Err(RecvError::Closed) => break,
			}
		}
	})
}
