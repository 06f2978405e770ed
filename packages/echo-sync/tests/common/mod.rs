#![allow(dead_code)]

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	sync::{
		Mutex,
		atomic::{AtomicI64, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;
use ::time::OffsetDateTime;
use tokio::time::{self, Instant};

use echo_storage::models::{ChangeAction, ChangeEvent, Post, PostDocument};
use echo_sync::{
	Error, Result, content::ContentFetcher, engine::ChangeApplier, index::SearchIndex,
	repo::PostRepository, store::EventStore,
};

pub fn make_post(id: &str, category: &str, deleted: bool, content: Option<&str>) -> Post {
	Post {
		id: id.to_string(),
		thread_id: format!("t-{id}"),
		title: format!("Post {id}"),
		body: "Body".to_string(),
		category: category.to_string(),
		author: "ada".to_string(),
		content: content.map(str::to_string),
		deleted,
		created_at: OffsetDateTime::UNIX_EPOCH,
		updated_at: OffsetDateTime::UNIX_EPOCH,
	}
}

pub fn sync_cfg(concurrency: u32, max_retries: u32) -> echo_config::Sync {
	echo_config::Sync { concurrency, max_retries, ..Default::default() }
}

/// Polls a condition under paused tokio time; panics if it never holds.
pub async fn wait_until<F>(condition: F)
where
	F: Fn() -> bool,
{
	for _ in 0..3_000 {
		if condition() {
			return;
		}

		time::sleep(Duration::from_millis(10)).await;
	}

	panic!("Condition did not hold within the allotted virtual time.");
}

#[derive(Default)]
pub struct MemoryEventStore {
	events: Mutex<Vec<ChangeEvent>>,
	next_id: AtomicI64,
	mark_failed_retries: Mutex<Vec<i32>>,
}
impl MemoryEventStore {
	pub fn new() -> Self {
		Self { next_id: AtomicI64::new(1), ..Default::default() }
	}

	pub fn events(&self) -> Vec<ChangeEvent> {
		self.events.lock().unwrap().clone()
	}

	pub fn is_empty(&self) -> bool {
		self.events.lock().unwrap().is_empty()
	}

	pub fn mark_failed_retries(&self) -> Vec<i32> {
		self.mark_failed_retries.lock().unwrap().clone()
	}
}
#[async_trait]
impl EventStore for MemoryEventStore {
	async fn pending_entities(&self, limit: i64, max_retries: i32) -> Result<Vec<String>> {
		let events = self.events.lock().unwrap();
		let mut seen = HashSet::new();
		let mut out = Vec::new();

		for event in events.iter().filter(|event| event.retries < max_retries) {
			if seen.insert(event.entity_id.clone()) {
				out.push(event.entity_id.clone());
			}
			if out.len() as i64 >= limit {
				break;
			}
		}

		Ok(out)
	}

	async fn latest_event(
		&self,
		entity_id: &str,
		max_retries: i32,
	) -> Result<Option<ChangeEvent>> {
		let events = self.events.lock().unwrap();

		Ok(events
			.iter()
			.filter(|event| event.entity_id == entity_id && event.retries < max_retries)
			.max_by_key(|event| event.id)
			.cloned())
	}

	async fn ack_through(&self, entity_id: &str, upto_event_id: i64) -> Result<()> {
		let mut events = self.events.lock().unwrap();

		events.retain(|event| event.entity_id != entity_id || event.id > upto_event_id);

		Ok(())
	}

	async fn mark_failed(&self, event_id: i64, retries: i32, error: &str) -> Result<()> {
		let mut events = self.events.lock().unwrap();

		if let Some(event) = events.iter_mut().find(|event| event.id == event_id) {
			event.retries = retries;
			event.last_error = Some(error.to_string());
		}

		self.mark_failed_retries.lock().unwrap().push(retries);

		Ok(())
	}

	async fn append(&self, entity_id: &str, action: ChangeAction) -> Result<i64> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let mut events = self.events.lock().unwrap();

		events.push(ChangeEvent {
			id,
			entity_id: entity_id.to_string(),
			action,
			retries: 0,
			last_error: None,
			created_at: OffsetDateTime::now_utc(),
		});

		Ok(id)
	}
}

#[derive(Default)]
pub struct MemoryPosts {
	rows: Mutex<BTreeMap<String, Post>>,
	saved_content: Mutex<Vec<(String, String)>>,
}
impl MemoryPosts {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, post: Post) {
		self.rows.lock().unwrap().insert(post.id.clone(), post);
	}

	pub fn remove(&self, id: &str) {
		self.rows.lock().unwrap().remove(id);
	}

	pub fn saved_content(&self) -> Vec<(String, String)> {
		self.saved_content.lock().unwrap().clone()
	}
}
#[async_trait]
impl PostRepository for MemoryPosts {
	async fn find_by_id(&self, id: &str, include_hidden: bool) -> Result<Option<Post>> {
		let rows = self.rows.lock().unwrap();

		Ok(rows.get(id).filter(|post| include_hidden || !post.deleted).cloned())
	}

	async fn find_by_ids(&self, ids: &[String], include_hidden: bool) -> Result<Vec<Post>> {
		let rows = self.rows.lock().unwrap();

		Ok(ids
			.iter()
			.filter_map(|id| rows.get(id))
			.filter(|post| include_hidden || !post.deleted)
			.cloned()
			.collect())
	}

	async fn list_page(&self, limit: i64, offset: i64, include_hidden: bool) -> Result<Vec<Post>> {
		let rows = self.rows.lock().unwrap();

		Ok(rows
			.values()
			.filter(|post| include_hidden || !post.deleted)
			.skip(offset as usize)
			.take(limit as usize)
			.cloned()
			.collect())
	}

	async fn count(&self, include_hidden: bool) -> Result<i64> {
		let rows = self.rows.lock().unwrap();

		Ok(rows.values().filter(|post| include_hidden || !post.deleted).count() as i64)
	}

	async fn save_content(&self, id: &str, content: &str) -> Result<()> {
		let mut rows = self.rows.lock().unwrap();

		if let Some(post) = rows.get_mut(id) {
			post.content = Some(content.to_string());
		}

		self.saved_content.lock().unwrap().push((id.to_string(), content.to_string()));

		Ok(())
	}
}

/// In-memory index that records every bulk call (instant + document ids) and
/// can be told to fail the next N upserts.
#[derive(Default)]
pub struct RecordingIndex {
	docs: Mutex<HashMap<String, PostDocument>>,
	calls: Mutex<Vec<(Instant, Vec<String>)>>,
	fail_upserts: Mutex<u32>,
}
impl RecordingIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn fail_next_upserts(&self, count: u32) {
		*self.fail_upserts.lock().unwrap() = count;
	}

	pub fn get(&self, id: &str) -> Option<PostDocument> {
		self.docs.lock().unwrap().get(id).cloned()
	}

	pub fn len(&self) -> usize {
		self.docs.lock().unwrap().len()
	}

	pub fn upsert_attempts(&self) -> usize {
		self.calls.lock().unwrap().len()
	}

	pub fn attempt_instants(&self) -> Vec<Instant> {
		self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
	}

	pub fn attempted_ids(&self) -> Vec<Vec<String>> {
		self.calls.lock().unwrap().iter().map(|(_, ids)| ids.clone()).collect()
	}
}
#[async_trait]
impl SearchIndex for RecordingIndex {
	async fn upsert(&self, docs: &[PostDocument]) -> Result<()> {
		self.calls
			.lock()
			.unwrap()
			.push((Instant::now(), docs.iter().map(|doc| doc.id.clone()).collect()));

		{
			let mut fail = self.fail_upserts.lock().unwrap();

			if *fail > 0 {
				*fail -= 1;

				return Err(Error::Message("index unavailable".to_string()));
			}
		}

		let mut stored = self.docs.lock().unwrap();

		for doc in docs {
			stored.insert(doc.id.clone(), doc.clone());
		}

		Ok(())
	}

	async fn mark_deleted(&self, post_id: &str) -> Result<()> {
		let mut stored = self.docs.lock().unwrap();

		match stored.get_mut(post_id) {
			Some(doc) => doc.deleted = true,
			None => {
				// Soft delete of a document that was never written: keep a
				// tombstone so the id stays resolvable.
				stored.insert(post_id.to_string(), PostDocument {
					id: post_id.to_string(),
					thread_id: String::new(),
					title: String::new(),
					body: String::new(),
					category: String::new(),
					author: String::new(),
					content: None,
					deleted: true,
					updated_at: OffsetDateTime::UNIX_EPOCH,
				});
			},
		}

		Ok(())
	}
}

/// Scripted applier for worker tests that bypass the engine: optional
/// per-call delay, scripted leading failures, and per-entity overlap
/// tracking.
#[derive(Default)]
pub struct ScriptedApplier {
	delay: Option<Duration>,
	fail_first: Mutex<u32>,
	calls: Mutex<Vec<(String, ChangeAction, Instant)>>,
	running: Mutex<HashMap<String, u32>>,
	max_overlap: Mutex<HashMap<String, u32>>,
	global_running: Mutex<u32>,
	global_max: Mutex<u32>,
}
impl ScriptedApplier {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_delay(delay: Duration) -> Self {
		Self { delay: Some(delay), ..Default::default() }
	}

	pub fn fail_first(&self, count: u32) {
		*self.fail_first.lock().unwrap() = count;
	}

	pub fn calls(&self) -> Vec<(String, ChangeAction, Instant)> {
		self.calls.lock().unwrap().clone()
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().unwrap().len()
	}

	pub fn max_overlap_for(&self, entity_id: &str) -> u32 {
		self.max_overlap.lock().unwrap().get(entity_id).copied().unwrap_or(0)
	}

	pub fn max_global_overlap(&self) -> u32 {
		*self.global_max.lock().unwrap()
	}
}
#[async_trait]
impl ChangeApplier for ScriptedApplier {
	async fn apply(&self, entity_id: &str, action: ChangeAction) -> Result<()> {
		self.calls.lock().unwrap().push((entity_id.to_string(), action, Instant::now()));

		{
			let mut running = self.running.lock().unwrap();
			let slot = running.entry(entity_id.to_string()).or_insert(0);

			*slot += 1;

			let mut max = self.max_overlap.lock().unwrap();
			let best = max.entry(entity_id.to_string()).or_insert(0);

			*best = (*best).max(*slot);

			let mut global = self.global_running.lock().unwrap();

			*global += 1;

			let mut global_max = self.global_max.lock().unwrap();

			*global_max = (*global_max).max(*global);
		}

		if let Some(delay) = self.delay {
			time::sleep(delay).await;
		}

		{
			let mut running = self.running.lock().unwrap();

			if let Some(slot) = running.get_mut(entity_id) {
				*slot -= 1;
			}

			let mut global = self.global_running.lock().unwrap();

			*global -= 1;
		}

		let mut fail = self.fail_first.lock().unwrap();

		if *fail > 0 {
			*fail -= 1;

			return Err(Error::Message("scripted failure".to_string()));
		}

		Ok(())
	}
}

/// Content source stub: canned content per post id, optional failing ids.
#[derive(Default)]
pub struct StubFetcher {
	content: Mutex<HashMap<String, String>>,
	failing: Mutex<HashSet<String>>,
	requests: Mutex<Vec<(String, String)>>,
}
impl StubFetcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_content(&self, post_id: &str, content: &str) {
		self.content.lock().unwrap().insert(post_id.to_string(), content.to_string());
	}

	pub fn fail_for(&self, post_id: &str) {
		self.failing.lock().unwrap().insert(post_id.to_string());
	}

	pub fn requests(&self) -> Vec<(String, String)> {
		self.requests.lock().unwrap().clone()
	}
}
#[async_trait]
impl ContentFetcher for StubFetcher {
	async fn fetch(&self, thread_id: &str, post_id: &str) -> Result<Option<String>> {
		self.requests.lock().unwrap().push((thread_id.to_string(), post_id.to_string()));

		if self.failing.lock().unwrap().contains(post_id) {
			return Err(Error::Message("content service unavailable".to_string()));
		}

		Ok(self.content.lock().unwrap().get(post_id).cloned())
	}
}
