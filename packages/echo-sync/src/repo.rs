use std::sync::Arc;

use async_trait::async_trait;

use echo_storage::{db::Db, models::Post, posts};

use crate::Result;

/// Read path into the primary store. `include_hidden` exposes rows that
/// end-user views filter out; the engine always reads with it set so the
/// projection reflects authoritative state.
#[async_trait]
pub trait PostRepository: Send + Sync {
	async fn find_by_id(&self, id: &str, include_hidden: bool) -> Result<Option<Post>>;
	async fn find_by_ids(&self, ids: &[String], include_hidden: bool) -> Result<Vec<Post>>;
	async fn list_page(&self, limit: i64, offset: i64, include_hidden: bool) -> Result<Vec<Post>>;
	async fn count(&self, include_hidden: bool) -> Result<i64>;
	/// The single primary-store write: persisting repaired derived content.
	async fn save_content(&self, id: &str, content: &str) -> Result<()>;
}

pub struct PgPostRepository {
	db: Arc<Db>,
}
impl PgPostRepository {
	pub fn new(db: Arc<Db>) -> Self {
		Self { db }
	}
}
#[async_trait]
impl PostRepository for PgPostRepository {
	async fn find_by_id(&self, id: &str, include_hidden: bool) -> Result<Option<Post>> {
		Ok(posts::find_by_id(&self.db, id, include_hidden).await?)
	}

	async fn find_by_ids(&self, ids: &[String], include_hidden: bool) -> Result<Vec<Post>> {
		Ok(posts::find_by_ids(&self.db, ids, include_hidden).await?)
	}

	async fn list_page(&self, limit: i64, offset: i64, include_hidden: bool) -> Result<Vec<Post>> {
		Ok(posts::list_page(&self.db, limit, offset, include_hidden).await?)
	}

	async fn count(&self, include_hidden: bool) -> Result<i64> {
		Ok(posts::count(&self.db, include_hidden).await?)
	}

	async fn save_content(&self, id: &str, content: &str) -> Result<()> {
		Ok(posts::save_content(&self.db, id, content).await?)
	}
}
