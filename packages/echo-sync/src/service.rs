use std::sync::Arc;

use echo_storage::{db::Db, qdrant::QdrantIndex};

use crate::{
	Result,
	content::{ContentFetcher, HttpContentFetcher},
	engine::{ReindexOptions, SyncEngine},
	index::QdrantSearchIndex,
	listener::ChangeListener,
	repo::PgPostRepository,
	store::PgEventStore,
	worker::SyncWorker,
};

/// Wires the pipeline against the real collaborators. The whole surface the
/// host application sees is `start`/`stop`.
pub struct SyncService {
	engine: Arc<SyncEngine>,
	worker: SyncWorker,
	seed_on_start: bool,
	auto_fix_content: bool,
	reindex_batch_size: i64,
}
impl SyncService {
	pub fn new(cfg: &echo_config::Config, db: Arc<Db>, index: Arc<QdrantIndex>) -> Result<Self> {
		let store = Arc::new(PgEventStore::new(db.clone()));
		let repo = Arc::new(PgPostRepository::new(db.clone()));
		let search = Arc::new(QdrantSearchIndex::new(index));
		let fetcher: Option<Arc<dyn ContentFetcher>> = if cfg.content_repair.api_base.is_empty() {
			None
		} else {
			Some(Arc::new(HttpContentFetcher::new(&cfg.content_repair)?))
		};
		let engine = Arc::new(SyncEngine::new(
			repo,
			search,
			fetcher,
			cfg.sync.allowed_categories.clone(),
		));
		let listener = ChangeListener::new(db, &cfg.sync.channel);
		let worker = SyncWorker::new(store, engine.clone(), Some(listener), &cfg.sync);

		Ok(Self {
			engine,
			worker,
			seed_on_start: cfg.sync.seed_on_start,
			auto_fix_content: cfg.sync.auto_fix_content,
			reindex_batch_size: i64::from(cfg.sync.reindex_batch_size),
		})
	}

	pub async fn start(&self) -> Result<()> {
		if self.seed_on_start {
			tracing::info!("Seeding the index with a full reindex.");

			self.engine
				.sync_all_posts(&ReindexOptions {
					batch_size: self.reindex_batch_size,
					fix_missing_content: self.auto_fix_content,
					progress: Some(Box::new(|processed, total, repaired| {
						tracing::info!(processed, total, repaired, "Reindex progress.");
					})),
				})
				.await?;
		}

		self.worker.start().await
	}

	/// Awaited during graceful shutdown; in-flight applies run to
	/// completion.
	pub async fn stop(&self) {
		self.worker.stop().await;
	}

	/// The engine, for host-driven backfills outside the worker loop.
	pub fn engine(&self) -> &Arc<SyncEngine> {
		&self.engine
	}
}
