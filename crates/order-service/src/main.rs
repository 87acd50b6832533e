//! Main entry point for the order service.
//!
//! Without a subcommand the binary runs the demo lifecycle: it creates an
//! order dated today, pays it with a random confirmation reference, fulfills
//! it and logs the state after each step. Subcommands run a single operation,
//! which is mostly useful against the file backend.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use order_config::Config;
use order_core::{OrderFactories, OrderService, OrderServiceBuilder};
use order_types::OrderId;
use std::collections::HashMap;
use std::path::PathBuf;

/// Command-line arguments for the order service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
	/// Create, pay and fulfill one order (default)
	Demo,
	/// Create an order
	Create {
		/// Order date as YYYY-MM-DD, defaults to today
		#[arg(long)]
		date: Option<NaiveDate>,
	},
	/// Print a stored order
	Get { id: OrderId },
	/// Pay an order
	Pay {
		id: OrderId,
		/// Payment confirmation reference, generated when omitted
		confirmation_ref: Option<String>,
	},
	/// Fulfill a paid order
	Fulfill { id: OrderId },
	/// Cancel an order
	Cancel { id: OrderId },
}

/// Main entry point for the order service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the order service
/// 5. Runs the requested command
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started order service");

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let service = build_service(config).await?;
	run(&service, args.command.unwrap_or(Command::Demo)).await?;

	tracing::info!("Stopped order service");
	Ok(())
}

/// Builds the order service with every bundled storage backend registered.
async fn build_service(config: Config) -> Result<OrderService, Box<dyn std::error::Error>> {
	let mut storage_factories = HashMap::new();
	for (name, factory) in order_storage::get_all_implementations() {
		tracing::debug!("Registering storage implementation: {}", name);
		storage_factories.insert(name.to_string(), factory);
	}

	let service = OrderServiceBuilder::new(config)
		.build(OrderFactories { storage_factories })
		.await?;
	Ok(service)
}

async fn run(service: &OrderService, command: Command) -> Result<(), Box<dyn std::error::Error>> {
	match command {
		Command::Demo => run_demo(service).await,
		Command::Create { date } => {
			let order = service
				.create(date.unwrap_or_else(|| Local::now().date_naive()))
				.await?;
			println!("{}", serde_json::to_string_pretty(&order)?);
			Ok(())
		},
		Command::Get { id } => {
			let order = service.get(id).await?;
			println!("{}", serde_json::to_string_pretty(&order)?);
			Ok(())
		},
		Command::Pay {
			id,
			confirmation_ref,
		} => {
			let confirmation_ref = confirmation_ref.unwrap_or_else(new_confirmation_ref);
			println!("{}", service.pay(id, &confirmation_ref).await?);
			Ok(())
		},
		Command::Fulfill { id } => {
			println!("{}", service.fulfill(id).await?);
			Ok(())
		},
		Command::Cancel { id } => {
			println!("{}", service.cancel(id).await?);
			Ok(())
		},
	}
}

/// Walks one order through SUBMITTED -> PAID -> FULFILLED.
async fn run_demo(service: &OrderService) -> Result<(), Box<dyn std::error::Error>> {
	let order = service.create(Local::now().date_naive()).await?;
	tracing::info!(order_id = %order.id, "Order state: {}", order.state);

	let confirmation_ref = new_confirmation_ref();
	service.pay(order.id, &confirmation_ref).await?;
	tracing::info!(
		order_id = %order.id,
		confirmation = %confirmation_ref,
		"Order state after paying: {}",
		service.get(order.id).await?.state
	);

	service.fulfill(order.id).await?;
	tracing::info!(
		order_id = %order.id,
		"Order state after fulfilling: {}",
		service.get(order.id).await?.state
	);

	Ok(())
}

fn new_confirmation_ref() -> String {
	uuid::Uuid::new_v4().to_string()
}
