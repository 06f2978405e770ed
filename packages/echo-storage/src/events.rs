use sqlx::FromRow;
use time::OffsetDateTime;

use crate::{
	Error, Result,
	db::Db,
	models::{ChangeAction, ChangeEvent},
};

#[derive(FromRow)]
struct ChangeEventRow {
	id: i64,
	entity_id: String,
	action: String,
	retries: i32,
	last_error: Option<String>,
	created_at: OffsetDateTime,
}
impl TryFrom<ChangeEventRow> for ChangeEvent {
	type Error = Error;

	fn try_from(row: ChangeEventRow) -> Result<Self> {
		let action = ChangeAction::parse(&row.action).ok_or_else(|| {
			Error::InvalidArgument(format!("Unsupported change action: {}.", row.action))
		})?;

		Ok(Self {
			id: row.id,
			entity_id: row.entity_id,
			action,
			retries: row.retries,
			last_error: row.last_error,
			created_at: row.created_at,
		})
	}
}

/// Inserts an event row the way the posts trigger does. Hosts without the
/// trigger (and the integration tests) append through this instead.
pub async fn append_event(db: &Db, entity_id: &str, action: ChangeAction) -> Result<i64> {
	let (id,): (i64,) =
		sqlx::query_as("INSERT INTO change_events (entity_id, action) VALUES ($1, $2) RETURNING id")
			.bind(entity_id)
			.bind(action.as_str())
			.fetch_one(&db.pool)
			.await?;

	Ok(id)
}

/// Distinct entity ids still under the retry cap, oldest mutations first.
pub async fn pending_entities(db: &Db, limit: i64, max_retries: i32) -> Result<Vec<String>> {
	let ids: Vec<(String,)> = sqlx::query_as(
		"\
SELECT entity_id
FROM change_events
WHERE retries < $1
GROUP BY entity_id
ORDER BY MIN(created_at) ASC, MIN(id) ASC
LIMIT $2",
	)
	.bind(max_retries)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(ids.into_iter().map(|(id,)| id).collect())
}

/// The highest-id event for the entity under the retry cap. Intermediate
/// events are informationally irrelevant (state is re-read before
/// projection) but their rows stay until acked.
pub async fn latest_event(
	db: &Db,
	entity_id: &str,
	max_retries: i32,
) -> Result<Option<ChangeEvent>> {
	let row = sqlx::query_as::<_, ChangeEventRow>(
		"\
SELECT
	id,
	entity_id,
	action,
	retries,
	last_error,
	created_at
FROM change_events
WHERE entity_id = $1 AND retries < $2
ORDER BY id DESC
LIMIT 1",
	)
	.bind(entity_id)
	.bind(max_retries)
	.fetch_optional(&db.pool)
	.await?;

	row.map(ChangeEvent::try_from).transpose()
}

/// Watermark ack: removes every event for the entity up to and including
/// `upto_event_id`. Callers must pass an id obtained from `latest_event` for
/// the same entity; event ids are monotonically increasing, so everything at
/// or below the watermark has been superseded by the state just applied.
pub async fn ack_through(db: &Db, entity_id: &str, upto_event_id: i64) -> Result<u64> {
	let result = sqlx::query("DELETE FROM change_events WHERE entity_id = $1 AND id <= $2")
		.bind(entity_id)
		.bind(upto_event_id)
		.execute(&db.pool)
		.await?;

	Ok(result.rows_affected())
}

/// Failure bookkeeping on the specific event row. The row is never deleted
/// on failure so operators can inspect `last_error`.
pub async fn mark_failed(db: &Db, event_id: i64, retries: i32, error: &str) -> Result<()> {
	sqlx::query("UPDATE change_events SET retries = $1, last_error = $2 WHERE id = $3")
		.bind(retries)
		.bind(error)
		.bind(event_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}
