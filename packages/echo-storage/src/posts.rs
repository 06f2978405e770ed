use crate::{Result, db::Db, models::Post};

const POST_COLUMNS: &str = "\
	id,
	thread_id,
	title,
	body,
	category,
	author,
	content,
	deleted,
	created_at,
	updated_at";

pub async fn find_by_id(db: &Db, id: &str, include_hidden: bool) -> Result<Option<Post>> {
	let post = sqlx::query_as::<_, Post>(&format!(
		"\
SELECT
{POST_COLUMNS}
FROM posts
WHERE id = $1 AND ($2 OR NOT deleted)",
	))
	.bind(id)
	.bind(include_hidden)
	.fetch_optional(&db.pool)
	.await?;

	Ok(post)
}

pub async fn find_by_ids(db: &Db, ids: &[String], include_hidden: bool) -> Result<Vec<Post>> {
	if ids.is_empty() {
		return Ok(Vec::new());
	}

	let posts = sqlx::query_as::<_, Post>(&format!(
		"\
SELECT
{POST_COLUMNS}
FROM posts
WHERE id = ANY($1) AND ($2 OR NOT deleted)
ORDER BY id ASC",
	))
	.bind(ids)
	.bind(include_hidden)
	.fetch_all(&db.pool)
	.await?;

	Ok(posts)
}

/// Stable id-ordered paging for the full reindex.
pub async fn list_page(
	db: &Db,
	limit: i64,
	offset: i64,
	include_hidden: bool,
) -> Result<Vec<Post>> {
	let posts = sqlx::query_as::<_, Post>(&format!(
		"\
SELECT
{POST_COLUMNS}
FROM posts
WHERE $3 OR NOT deleted
ORDER BY id ASC
LIMIT $1 OFFSET $2",
	))
	.bind(limit)
	.bind(offset)
	.bind(include_hidden)
	.fetch_all(&db.pool)
	.await?;

	Ok(posts)
}

pub async fn count(db: &Db, include_hidden: bool) -> Result<i64> {
	let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE $1 OR NOT deleted")
		.bind(include_hidden)
		.fetch_one(&db.pool)
		.await?;

	Ok(count)
}

/// The only write this system performs against the primary store: storing
/// derived content backfilled by the repair fetcher.
pub async fn save_content(db: &Db, id: &str, content: &str) -> Result<()> {
	sqlx::query("UPDATE posts SET content = $1, updated_at = now() WHERE id = $2")
		.bind(content)
		.bind(id)
		.execute(&db.pool)
		.await?;

	Ok(())
}
