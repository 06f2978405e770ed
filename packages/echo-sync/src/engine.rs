use std::sync::Arc;

use async_trait::async_trait;

use echo_storage::models::{ChangeAction, Post, PostDocument};

use crate::{Result, content::ContentFetcher, index::SearchIndex, repo::PostRepository};

/// The worker-facing seam of the engine.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
	async fn apply(&self, entity_id: &str, action: ChangeAction) -> Result<()>;
}

pub type ProgressFn = dyn Fn(u64, u64, u64) + Send + Sync;

pub struct ReindexOptions {
	pub batch_size: i64,
	/// Backfill rows whose derived content is missing before projecting
	/// them. Requires a configured content fetcher.
	pub fix_missing_content: bool,
	/// Invoked after each page with `(processed, total, repaired)`.
	pub progress: Option<Box<ProgressFn>>,
}
impl Default for ReindexOptions {
	fn default() -> Self {
		Self { batch_size: 200, fix_missing_content: false, progress: None }
	}
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReindexReport {
	pub processed: u64,
	pub total: u64,
	pub repaired: u64,
}

/// Projects authoritative post state into the search index. Events carry no
/// payload worth trusting: every apply re-reads the row, so stale or
/// out-of-order events still converge on the correct final state.
pub struct SyncEngine {
	repo: Arc<dyn PostRepository>,
	index: Arc<dyn SearchIndex>,
	fetcher: Option<Arc<dyn ContentFetcher>>,
	allowed_categories: Vec<String>,
}
impl SyncEngine {
	pub fn new(
		repo: Arc<dyn PostRepository>,
		index: Arc<dyn SearchIndex>,
		fetcher: Option<Arc<dyn ContentFetcher>>,
		allowed_categories: Vec<String>,
	) -> Self {
		Self { repo, index, fetcher, allowed_categories }
	}

	fn is_visible(&self, post: &Post) -> bool {
		!post.deleted
			&& (self.allowed_categories.is_empty()
				|| self.allowed_categories.iter().any(|category| category == &post.category))
	}

	fn document(post: &Post, deleted: bool) -> PostDocument {
		PostDocument {
			id: post.id.clone(),
			thread_id: post.thread_id.clone(),
			title: post.title.clone(),
			body: post.body.clone(),
			category: post.category.clone(),
			author: post.author.clone(),
			content: post.content.clone(),
			deleted,
			updated_at: post.updated_at,
		}
	}

	/// Full reindex for cold start or backfill. Pages through the whole
	/// table (hidden rows included, projected as soft-deleted documents) and
	/// issues one bulk index write per page. A bad row never fails the run;
	/// repair errors are logged and the row is skipped.
	pub async fn sync_all_posts(&self, opts: &ReindexOptions) -> Result<ReindexReport> {
		let total = self.repo.count(true).await? as u64;
		let mut report = ReindexReport { total, ..Default::default() };
		let mut offset = 0_i64;

		loop {
			let mut rows = self.repo.list_page(opts.batch_size, offset, true).await?;

			if rows.is_empty() {
				break;
			}

			if opts.fix_missing_content && let Some(fetcher) = &self.fetcher {
				let repaired = self.repair_batch(fetcher.as_ref(), &rows).await;

				if repaired > 0 {
					report.repaired += repaired;

					// Re-read the page so the projection picks up the fixes.
					let ids = rows.iter().map(|post| post.id.clone()).collect::<Vec<_>>();

					rows = self.repo.find_by_ids(&ids, true).await?;
				}
			}

			let docs = rows
				.iter()
				.map(|post| Self::document(post, !self.is_visible(post)))
				.collect::<Vec<_>>();

			self.index.upsert(&docs).await?;

			report.processed += rows.len() as u64;

			if let Some(progress) = &opts.progress {
				progress(report.processed, report.total, report.repaired);
			}

			offset += opts.batch_size;
		}

		tracing::info!(
			processed = report.processed,
			repaired = report.repaired,
			"Full reindex finished."
		);

		Ok(report)
	}

	async fn repair_batch(&self, fetcher: &dyn ContentFetcher, rows: &[Post]) -> u64 {
		let mut repaired = 0;

		for post in rows.iter().filter(|post| post.content.is_none()) {
			match fetcher.fetch(&post.thread_id, &post.id).await {
				Ok(Some(content)) => match self.repo.save_content(&post.id, &content).await {
					Ok(()) => repaired += 1,
					Err(err) => {
						tracing::warn!(
							post_id = post.id.as_str(),
							error = %err,
							"Failed to persist repaired content. Skipping the row."
						);
					},
				},
				Ok(None) => {},
				Err(err) => {
					tracing::warn!(
						post_id = post.id.as_str(),
						error = %err,
						"Content repair failed. Skipping the row."
					);
				},
			}
		}

		repaired
	}
}
#[async_trait]
impl ChangeApplier for SyncEngine {
	async fn apply(&self, entity_id: &str, action: ChangeAction) -> Result<()> {
		if action == ChangeAction::Delete {
			self.index.mark_deleted(entity_id).await?;

			return Ok(());
		}

		// Insert and update both reduce to a fresh read of the row.
		let Some(post) = self.repo.find_by_id(entity_id, true).await? else {
			tracing::info!(entity_id, "Post is gone. Reconciling with a soft delete.");

			self.index.mark_deleted(entity_id).await?;

			return Ok(());
		};

		if !self.is_visible(&post) {
			self.index.mark_deleted(entity_id).await?;

			return Ok(());
		}

		self.index.upsert(&[Self::document(&post, false)]).await?;

		Ok(())
	}
}
