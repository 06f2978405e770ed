use std::sync::Arc;

use async_trait::async_trait;

use echo_storage::{models::PostDocument, qdrant::QdrantIndex};

use crate::Result;

/// The search index seam. Documents are addressed by the post id; deletion
/// is always the soft flag, never removal, so document identity survives.
#[async_trait]
pub trait SearchIndex: Send + Sync {
	/// One bulk write per call. Upserts are idempotent in effect.
	async fn upsert(&self, docs: &[PostDocument]) -> Result<()>;

	/// Flags the document as deleted while keeping it resolvable.
	async fn mark_deleted(&self, post_id: &str) -> Result<()>;
}

pub struct QdrantSearchIndex {
	index: Arc<QdrantIndex>,
}
impl QdrantSearchIndex {
	pub fn new(index: Arc<QdrantIndex>) -> Self {
		Self { index }
	}
}
#[async_trait]
impl SearchIndex for QdrantSearchIndex {
	async fn upsert(&self, docs: &[PostDocument]) -> Result<()> {
		Ok(self.index.upsert_documents(docs).await?)
	}

	async fn mark_deleted(&self, post_id: &str) -> Result<()> {
		Ok(self.index.mark_deleted(post_id).await?)
	}
}
