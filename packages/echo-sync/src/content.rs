use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header};
use tokio::{sync::Mutex, time, time::Instant};

use crate::{Error, Result};

/// Third-party source of derived post content, used by reindex self-repair.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
	/// `None` means the source has no content for this post; that is not an
	/// error.
	async fn fetch(&self, thread_id: &str, post_id: &str) -> Result<Option<String>>;
}

pub struct HttpContentFetcher {
	client: Client,
	api_base: String,
	min_interval: Duration,
	max_throttle_retries: u32,
	last_call: Mutex<Option<Instant>>,
}
impl HttpContentFetcher {
	pub fn new(cfg: &echo_config::ContentRepair) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self {
			client,
			api_base: cfg.api_base.clone(),
			min_interval: Duration::from_millis(cfg.min_interval_ms),
			max_throttle_retries: cfg.max_throttle_retries,
			last_call: Mutex::new(None),
		})
	}

	/// Enforces the minimum spacing between calls. The lock is held across
	/// the sleep so concurrent callers queue up behind it.
	async fn wait_for_slot(&self) {
		let mut last_call = self.last_call.lock().await;

		if let Some(last) = *last_call {
			let elapsed = last.elapsed();

			if elapsed < self.min_interval {
				time::sleep(self.min_interval - elapsed).await;
			}
		}

		*last_call = Some(Instant::now());
	}
}
#[async_trait]
impl ContentFetcher for HttpContentFetcher {
	async fn fetch(&self, thread_id: &str, post_id: &str) -> Result<Option<String>> {
		let url = format!("{}/threads/{thread_id}/posts/{post_id}/content", self.api_base);

		for _ in 0..self.max_throttle_retries {
			self.wait_for_slot().await;

			let res = self.client.get(&url).send().await?;

			match res.status() {
				StatusCode::NOT_FOUND => return Ok(None),
				StatusCode::TOO_MANY_REQUESTS => {
					let delay = retry_after(&res).unwrap_or(self.min_interval);

					tracing::warn!(
						post_id,
						delay_ms = delay.as_millis() as u64,
						"Content service throttled the fetch. Backing off."
					);
					time::sleep(delay).await;
				},
				_ => {
					let res = res.error_for_status()?;

					return Ok(Some(res.text().await?));
				},
			}
		}

		Err(Error::Message(format!(
			"Content fetch for post {post_id} still throttled after {} attempts.",
			self.max_throttle_retries
		)))
	}
}

fn retry_after(res: &Response) -> Option<Duration> {
	res.headers()
		.get(header::RETRY_AFTER)?
		.to_str()
		.ok()?
		.trim()
		.parse::<u64>()
		.ok()
		.map(Duration::from_secs)
}
