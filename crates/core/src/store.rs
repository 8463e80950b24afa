//! File storage for persisted state (credentials, room registry).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File paths for persisted state.
///
/// Defaults to XDG directories (`~/.config/raumwart/`, `~/.cache/raumwart/`);
/// an explicit data dir overrides both (used by `--data-dir` and tests).
#[derive(Debug, Clone)]
pub struct StatePaths {
	pub credentials: PathBuf,
	pub rooms: PathBuf,
}

impl StatePaths {
	pub fn new(data_dir: Option<&Path>) -> Self {
		if let Some(dir) = data_dir {
			return Self {
				credentials: dir.join("credentials.json"),
				rooms: dir.join("rooms.json"),
			};
		}

		let config_home = std::env::var_os("XDG_CONFIG_HOME")
			.map(PathBuf::from)
			.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
			.unwrap_or_else(|| PathBuf::from("."));

		let cache_home = std::env::var_os("XDG_CACHE_HOME")
			.map(PathBuf::from)
			.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")))
			.unwrap_or_else(|| PathBuf::from("."));

		Self {
			credentials: config_home.join("raumwart/credentials.json"),
			rooms: cache_home.join("raumwart/rooms.json"),
		}
	}
}

pub(crate) fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
	fs::read_to_string(path)
		.ok()
		.and_then(|content| serde_json::from_str(&content).ok())
}

/// Whole-document replace: write a sibling temp file, flush it, then rename
/// over the target. A crash mid-save leaves the previous document intact.
pub(crate) fn save_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	let tmp = path.with_extension("json.tmp");
	{
		use std::io::Write;
		let mut file = fs::File::create(&tmp)?;
		file.write_all(serde_json::to_string_pretty(data)?.as_bytes())?;
		file.sync_all()?;
	}
	fs::rename(&tmp, path)?;
	Ok(())
}

/// Like [`save_json`] but owner-only on unix; used for credential material.
pub(crate) fn save_secrets<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
	save_json(path, data)?;
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
	}
	Ok(())
}
