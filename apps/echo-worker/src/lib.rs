use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use echo_storage::{db::Db, qdrant::QdrantIndex};
use echo_sync::service::SyncService;

#[derive(Debug, Parser)]
#[command(
	version = echo_cli::VERSION,
	rename_all = "kebab",
	styles = echo_cli::styles(),
)]
pub struct Args {
	/// Optional; every setting has a default.
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: Option<PathBuf>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = echo_config::load_or_default(args.config.as_deref())?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Arc::new(Db::connect(&config.storage.postgres).await?);

	db.ensure_schema().await?;

	let index = Arc::new(QdrantIndex::new(&config.storage.qdrant)?);

	index.ensure_collection().await?;

	let service = SyncService::new(&config, db, index)?;

	service.start().await?;
	tracing::info!("Sync worker running. Press ctrl-c to stop.");

	tokio::signal::ctrl_c().await?;
	tracing::info!("Shutting down.");

	service.stop().await;

	Ok(())
}
