use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub sync: Sync,
	pub content_repair: ContentRepair,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Service {
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { log_level: "info".to_string() }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}
impl Default for Postgres {
	fn default() -> Self {
		Self { dsn: "postgres://localhost:5432/echo".to_string(), pool_max_conns: 8 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
}
impl Default for Qdrant {
	fn default() -> Self {
		Self { url: "http://localhost:6334".to_string(), collection: "posts".to_string() }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sync {
	/// Upper bound on concurrently processed entities.
	pub concurrency: u32,
	/// Interval of the event-table poll, the correctness fallback to notifications.
	pub poll_interval_ms: u64,
	/// Events reaching this retry count are left for operator inspection.
	pub max_retries: u32,
	/// Postgres notification channel written by the posts trigger.
	pub channel: String,
	/// Run a full reindex before the worker starts serving events.
	pub seed_on_start: bool,
	/// During a reindex, backfill posts whose derived content is missing.
	pub auto_fix_content: bool,
	pub reindex_batch_size: u32,
	/// Categories projected into the index. Empty means every category.
	pub allowed_categories: Vec<String>,
}
impl Default for Sync {
	fn default() -> Self {
		Self {
			concurrency: 8,
			poll_interval_ms: 1_000,
			max_retries: 5,
			channel: "post_sync_channel".to_string(),
			seed_on_start: false,
			auto_fix_content: false,
			reindex_batch_size: 200,
			allowed_categories: Vec::new(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ContentRepair {
	/// Base URL of the content service. Empty disables self-repair.
	pub api_base: String,
	pub timeout_ms: u64,
	/// Minimum spacing between content fetches.
	pub min_interval_ms: u64,
	/// Attempts spent on throttling responses before giving up on a fetch.
	pub max_throttle_retries: u32,
}
impl Default for ContentRepair {
	fn default() -> Self {
		Self {
			api_base: String::new(),
			timeout_ms: 10_000,
			min_interval_ms: 1_000,
			max_throttle_retries: 5,
		}
	}
}
