mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, ContentRepair, Postgres, Qdrant, Service, Storage, Sync};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

/// Every field has a default, so the absence of a config file is itself a
/// valid configuration.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
	match path {
		Some(path) => load(path),
		None => {
			let mut cfg = Config::default();

			normalize(&mut cfg);

			validate(&cfg)?;

			Ok(cfg)
		},
	}
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.sync.concurrency == 0 {
		return Err(Error::Validation {
			message: "sync.concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "sync.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.max_retries == 0 {
		return Err(Error::Validation {
			message: "sync.max_retries must be greater than zero.".to_string(),
		});
	}
	if cfg.sync.channel.is_empty() {
		return Err(Error::Validation { message: "sync.channel must be non-empty.".to_string() });
	}
	if cfg.sync.reindex_batch_size == 0 {
		return Err(Error::Validation {
			message: "sync.reindex_batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.content_repair.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "content_repair.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.content_repair.min_interval_ms == 0 {
		return Err(Error::Validation {
			message: "content_repair.min_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.content_repair.max_throttle_retries == 0 {
		return Err(Error::Validation {
			message: "content_repair.max_throttle_retries must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let channel = cfg.sync.channel.trim();

	if channel.len() != cfg.sync.channel.len() {
		cfg.sync.channel = channel.to_string();
	}

	while cfg.content_repair.api_base.ends_with('/') {
		cfg.content_repair.api_base.pop();
	}
}
