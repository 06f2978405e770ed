use std::sync::Arc;

use async_trait::async_trait;

use echo_storage::{
	db::Db,
	events,
	models::{ChangeAction, ChangeEvent},
};

use crate::Result;

const MAX_EVENT_ERROR_CHARS: usize = 500;

/// The durable queue seam. Failures of any operation propagate to the
/// caller; there is no recovery at this layer.
#[async_trait]
pub trait EventStore: Send + Sync {
	/// Distinct entity ids with `retries < max_retries`, oldest first, at
	/// most `limit` of them.
	async fn pending_entities(&self, limit: i64, max_retries: i32) -> Result<Vec<String>>;

	/// The newest event for the entity under the retry cap. This is the
	/// coalescing point: intermediate events are never dispatched.
	async fn latest_event(&self, entity_id: &str, max_retries: i32)
	-> Result<Option<ChangeEvent>>;

	/// Watermark ack. Precondition: `upto_event_id` was returned by
	/// `latest_event` for this entity, so event ids at or below it are
	/// superseded by the state just applied.
	async fn ack_through(&self, entity_id: &str, upto_event_id: i64) -> Result<()>;

	/// Records a failed attempt on the event row, leaving it in place.
	async fn mark_failed(&self, event_id: i64, retries: i32, error: &str) -> Result<()>;

	/// Appends an event the way the posts trigger does.
	async fn append(&self, entity_id: &str, action: ChangeAction) -> Result<i64>;
}

pub struct PgEventStore {
	db: Arc<Db>,
}
impl PgEventStore {
	pub fn new(db: Arc<Db>) -> Self {
		Self { db }
	}
}
#[async_trait]
impl EventStore for PgEventStore {
	async fn pending_entities(&self, limit: i64, max_retries: i32) -> Result<Vec<String>> {
		Ok(events::pending_entities(&self.db, limit, max_retries).await?)
	}

	async fn latest_event(
		&self,
		entity_id: &str,
		max_retries: i32,
	) -> Result<Option<ChangeEvent>> {
		Ok(events::latest_event(&self.db, entity_id, max_retries).await?)
	}

	async fn ack_through(&self, entity_id: &str, upto_event_id: i64) -> Result<()> {
		events::ack_through(&self.db, entity_id, upto_event_id).await?;

		Ok(())
	}

	async fn mark_failed(&self, event_id: i64, retries: i32, error: &str) -> Result<()> {
		let sanitized = sanitize_event_error(error);

		Ok(events::mark_failed(&self.db, event_id, retries, &sanitized).await?)
	}

	async fn append(&self, entity_id: &str, action: ChangeAction) -> Result<i64> {
		Ok(events::append_event(&self.db, entity_id, action).await?)
	}
}

/// Error text lands in an operator-visible column; strip obvious credential
/// material and bound the length.
pub fn sanitize_event_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = match raw.split(sep).next() {
					Some(prefix) => prefix,
					None => raw,
				};

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_EVENT_ERROR_CHARS {
		out = out.chars().take(MAX_EVENT_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
