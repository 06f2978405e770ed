use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use sqlx::postgres::PgListener;
use tokio::{
	sync::{Mutex as AsyncMutex, watch},
	task::JoinHandle,
	time,
};

use echo_storage::db::Db;

use crate::{Result, notification::NotificationPayload};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListenerState {
	Disconnected,
	Connecting,
	Listening,
	ShuttingDown,
}

/// Subscribes to the notification channel the posts trigger fires on and
/// hands each resolved entity id to the worker. Purely a latency
/// optimization: messages delivered while disconnected are lost, and the
/// worker's poll path covers for them.
pub struct ChangeListener {
	db: Arc<Db>,
	channel: String,
	state: Arc<Mutex<ListenerState>>,
	shutdown: watch::Sender<bool>,
	handle: AsyncMutex<Option<JoinHandle<()>>>,
}
impl ChangeListener {
	pub fn new(db: Arc<Db>, channel: &str) -> Self {
		let (shutdown, _) = watch::channel(false);

		Self {
			db,
			channel: channel.to_string(),
			state: Arc::new(Mutex::new(ListenerState::Disconnected)),
			shutdown,
			handle: AsyncMutex::new(None),
		}
	}

	pub fn state(&self) -> ListenerState {
		*self.state.lock().unwrap_or_else(|err| err.into_inner())
	}

	/// Spawns the supervised listen loop. The callback runs synchronously,
	/// once per delivered message; buffering and deduplication are the
	/// worker's concern.
	pub async fn start<F>(&self, callback: F) -> Result<()>
	where
		F: Fn(String) + Send + Sync + 'static,
	{
		let db = self.db.clone();
		let channel = self.channel.clone();
		let state = self.state.clone();
		let shutdown = self.shutdown.subscribe();
		let task = tokio::spawn(run_loop(db, channel, state, shutdown, callback));

		*self.handle.lock().await = Some(task);

		Ok(())
	}

	/// Suppresses reconnects and waits for the loop to wind down. Dropping
	/// the inner `PgListener` unsubscribes and closes the connection.
	pub async fn stop(&self) {
		let _ = self.shutdown.send(true);

		if let Some(handle) = self.handle.lock().await.take() {
			let _ = handle.await;
		}

		set_state(&self.state, ListenerState::ShuttingDown);
	}
}

fn set_state(state: &Arc<Mutex<ListenerState>>, next: ListenerState) {
	*state.lock().unwrap_or_else(|err| err.into_inner()) = next;
}

async fn run_loop<F>(
	db: Arc<Db>,
	channel: String,
	state: Arc<Mutex<ListenerState>>,
	mut shutdown: watch::Receiver<bool>,
	callback: F,
) where
	F: Fn(String) + Send + Sync + 'static,
{
	loop {
		if *shutdown.borrow() {
			break;
		}

		set_state(&state, ListenerState::Connecting);

		match connect(&db, &channel).await {
			Ok(mut listener) => {
				set_state(&state, ListenerState::Listening);
				tracing::info!(channel = channel.as_str(), "Listening for change notifications.");

				loop {
					tokio::select! {
						_ = shutdown.changed() => {
							set_state(&state, ListenerState::ShuttingDown);

							return;
						},
						received = listener.try_recv() => match received {
							Ok(Some(notification)) => {
								let payload = NotificationPayload::parse(notification.payload());

								if let NotificationPayload::Fallback { raw } = &payload {
									tracing::debug!(
										payload = raw.as_str(),
										"Unstructured notification payload. Treating it as an entity id."
									);
								}

								callback(payload.entity_id().to_string());
							},
							Ok(None) => {
								tracing::warn!("Notification connection lost.");

								break;
							},
							Err(err) => {
								tracing::error!(error = %err, "Notification receive failed.");

								break;
							},
						},
					}
				}
			},
			Err(err) => {
				tracing::error!(error = %err, "Failed to connect the notification listener.");
			},
		}

		if *shutdown.borrow() {
			break;
		}

		set_state(&state, ListenerState::Disconnected);

		tokio::select! {
			_ = shutdown.changed() => break,
			_ = time::sleep(RECONNECT_DELAY) => {},
		}
	}

	set_state(&state, ListenerState::ShuttingDown);
}

async fn connect(db: &Arc<Db>, channel: &str) -> Result<PgListener> {
	let mut listener = PgListener::connect_with(&db.pool).await?;

	listener.listen(channel).await?;

	Ok(listener)
}
