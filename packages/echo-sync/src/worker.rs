use std::{
	collections::{HashMap, HashSet, VecDeque},
	sync::{Arc, Mutex, MutexGuard},
	time::Duration,
};

use tokio::{
	sync::{Mutex as AsyncMutex, Notify, watch},
	task::JoinHandle,
	time::{self, Instant},
};

use crate::{Result, engine::ChangeApplier, listener::ChangeListener, store::EventStore};

/// Waits between consecutive failures of one entity, indexed by failure
/// count and clamped at the last entry.
pub const BACKOFF_STEPS: [Duration; 4] = [
	Duration::from_secs(1),
	Duration::from_secs(5),
	Duration::from_secs(30),
	Duration::from_secs(60),
];

pub fn backoff(next_retries: i32) -> Duration {
	let index = usize::min(next_retries.max(1) as usize - 1, BACKOFF_STEPS.len() - 1);

	BACKOFF_STEPS[index]
}

struct WorkerState {
	running: bool,
	queue: VecDeque<String>,
	queued: HashSet<String>,
	cooldown: HashMap<String, Instant>,
	inflight: HashSet<String>,
	active: u32,
}

struct Inner {
	store: Arc<dyn EventStore>,
	applier: Arc<dyn ChangeApplier>,
	listener: Option<ChangeListener>,
	concurrency: u32,
	poll_interval: Duration,
	max_retries: i32,
	state: Mutex<WorkerState>,
	idle: Notify,
	shutdown: watch::Sender<bool>,
}
impl Inner {
	fn lock(&self) -> MutexGuard<'_, WorkerState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

/// Orchestrates the pipeline: an in-memory deduplicating queue fed by the
/// listener and the periodic poll, drained under a concurrency limit, with
/// per-entity cooldown on failure. The `inflight` set guarantees at most one
/// apply per entity at any time; an id enqueued mid-flight stays queued and
/// is dispatched after the current attempt completes.
pub struct SyncWorker {
	inner: Arc<Inner>,
	poll_handle: AsyncMutex<Option<JoinHandle<()>>>,
}
impl SyncWorker {
	pub fn new(
		store: Arc<dyn EventStore>,
		applier: Arc<dyn ChangeApplier>,
		listener: Option<ChangeListener>,
		cfg: &echo_config::Sync,
	) -> Self {
		let (shutdown, _) = watch::channel(false);

		Self {
			inner: Arc::new(Inner {
				store,
				applier,
				listener,
				concurrency: cfg.concurrency,
				poll_interval: Duration::from_millis(cfg.poll_interval_ms),
				max_retries: cfg.max_retries as i32,
				state: Mutex::new(WorkerState {
					running: false,
					queue: VecDeque::new(),
					queued: HashSet::new(),
					cooldown: HashMap::new(),
					inflight: HashSet::new(),
					active: 0,
				}),
				idle: Notify::new(),
				shutdown,
			}),
			poll_handle: AsyncMutex::new(None),
		}
	}

	/// Starts the listener (when configured), runs one immediate poll, then
	/// keeps polling on the configured interval. The poll path alone is
	/// sufficient for liveness; notifications only cut latency.
	pub async fn start(&self) -> Result<()> {
		self.inner.lock().running = true;

		if let Some(listener) = &self.inner.listener {
			let inner = self.inner.clone();

			listener.start(move |entity_id| enqueue(&inner, &entity_id)).await?;
		}

		poll_once(&self.inner).await;

		let inner = self.inner.clone();
		let mut shutdown = self.inner.shutdown.subscribe();
		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = shutdown.changed() => break,
					_ = time::sleep(inner.poll_interval) => poll_once(&inner).await,
				}
			}
		});

		*self.poll_handle.lock().await = Some(handle);

		Ok(())
	}

	/// Cooperative shutdown: stops intake (poll loop and listener) and waits
	/// for in-flight applies to finish. Nothing is cancelled mid-apply.
	pub async fn stop(&self) {
		self.inner.lock().running = false;

		let _ = self.inner.shutdown.send(true);

		if let Some(handle) = self.poll_handle.lock().await.take() {
			let _ = handle.await;
		}
		if let Some(listener) = &self.inner.listener {
			listener.stop().await;
		}

		loop {
			let notified = self.inner.idle.notified();

			if self.inner.lock().active == 0 {
				break;
			}

			notified.await;
		}
	}

	pub fn enqueue(&self, entity_id: &str) {
		enqueue(&self.inner, entity_id);
	}
}

fn enqueue(inner: &Arc<Inner>, entity_id: &str) {
	{
		let mut state = inner.lock();

		if !state.running {
			return;
		}
		if let Some(retry_at) = state.cooldown.get(entity_id) {
			// Backoff suppression: the entity retries when its cooldown
			// task fires, not before.
			if Instant::now() < *retry_at {
				return;
			}

			state.cooldown.remove(entity_id);
		}
		if !state.queued.insert(entity_id.to_string()) {
			return;
		}

		state.queue.push_back(entity_id.to_string());
	}

	drain(inner);
}

/// The sole concurrency-limiting mechanism: a counting semaphore over
/// spawned per-entity tasks, not a pool with its own queue.
fn drain(inner: &Arc<Inner>) {
	loop {
		let entity = {
			let mut state = inner.lock();

			if !state.running || state.active >= inner.concurrency {
				return;
			}

			let mut picked = None;

			for _ in 0..state.queue.len() {
				let Some(candidate) = state.queue.pop_front() else {
					break;
				};

				if state.inflight.contains(&candidate) {
					// Still being processed; keep it pending for the next
					// drain so applies for one entity never overlap.
					state.queue.push_back(candidate);

					continue;
				}
				if let Some(retry_at) = state.cooldown.get(&candidate) {
					// Queued before its attempt failed. Drop it; the
					// scheduled retry re-enqueues once the cooldown ends.
					if Instant::now() < *retry_at {
						state.queued.remove(&candidate);

						continue;
					}

					state.cooldown.remove(&candidate);
				}

				picked = Some(candidate);

				break;
			}

			let Some(entity) = picked else {
				return;
			};

			state.queued.remove(&entity);
			state.inflight.insert(entity.clone());
			state.active += 1;

			entity
		};
		let inner = inner.clone();

		tokio::spawn(process(inner, entity));
	}
}

async fn process(inner: Arc<Inner>, entity_id: String) {
	if let Err(err) = process_entity(&inner, &entity_id).await {
		tracing::error!(entity_id = entity_id.as_str(), error = %err, "Sync cycle failed.");
	}

	let idle = {
		let mut state = inner.lock();

		state.inflight.remove(&entity_id);
		state.active -= 1;

		state.active == 0
	};

	if idle {
		inner.idle.notify_waiters();
	}

	drain(&inner);
}

async fn process_entity(inner: &Arc<Inner>, entity_id: &str) -> Result<()> {
	// Coalescing: only the newest event is dispatched; the engine re-reads
	// current state anyway.
	let Some(event) = inner.store.latest_event(entity_id, inner.max_retries).await? else {
		return Ok(());
	};

	debug_assert_eq!(event.entity_id, entity_id);

	match inner.applier.apply(&event.entity_id, event.action).await {
		Ok(()) => {
			inner.store.ack_through(&event.entity_id, event.id).await?;
			inner.lock().cooldown.remove(entity_id);
		},
		Err(err) => {
			let next_retries = event.retries + 1;

			inner.store.mark_failed(event.id, next_retries, &err.to_string()).await?;

			if next_retries < inner.max_retries {
				let delay = backoff(next_retries);

				tracing::warn!(
					entity_id,
					retries = next_retries,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"Entity sync failed. Scheduling a retry."
				);

				inner.lock().cooldown.insert(entity_id.to_string(), Instant::now() + delay);

				let inner = inner.clone();
				let entity = entity_id.to_string();

				tokio::spawn(async move {
					time::sleep(delay).await;

					enqueue(&inner, &entity);
				});
			} else {
				tracing::error!(
					entity_id,
					retries = next_retries,
					error = %err,
					"Entity sync failed permanently. Leaving the event for inspection."
				);
			}
		},
	}

	Ok(())
}

async fn poll_once(inner: &Arc<Inner>) {
	let limit = i64::from(inner.concurrency) * 2;

	match inner.store.pending_entities(limit, inner.max_retries).await {
		Ok(ids) =>
			for id in ids {
				enqueue(inner, &id);
			},
		Err(err) => {
			tracing::error!(error = %err, "Pending event poll failed.");
		},
	}
}
