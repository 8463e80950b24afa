//! Per-user session credentials and their persisted store.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::store;

/// Authentication material for one portal user.
///
/// Written wholesale by the login flow and overwritten wholesale on
/// re-authentication; individual fields are never patched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
	/// Anti-forgery token sent as the `X-XSRF-TOKEN` header.
	pub xsrf_token: String,
	/// Value of the `zeitwart_session` cookie.
	pub session_cookie: String,
	pub user_id: u64,
}

impl Credentials {
	/// A record with an empty token, empty cookie or zero user id cannot
	/// authenticate anything and counts as absent.
	pub fn is_valid(&self) -> bool {
		!self.xsrf_token.is_empty() && !self.session_cookie.is_empty() && self.user_id != 0
	}
}

/// Persisted per-username credentials map.
#[derive(Debug)]
pub struct CredentialStore {
	records: HashMap<String, Credentials>,
	path: PathBuf,
}

impl CredentialStore {
	/// Loads the store from `path`. A missing or unreadable file recovers
	/// to an empty store; that is a diagnostic, not an error.
	pub fn load(path: PathBuf) -> Self {
		let records = match store::load_json(&path) {
			Some(records) => records,
			None => {
				warn!(path = %path.display(), "credential store missing or unreadable, starting empty");
				HashMap::new()
			}
		};
		Self { records, path }
	}

	pub fn get(&self, user: &str) -> Option<&Credentials> {
		self.records.get(user)
	}

	/// True iff a valid record exists for `user`.
	pub fn is_valid(&self, user: &str) -> bool {
		self.records.get(user).is_some_and(Credentials::is_valid)
	}

	/// Replaces the record for `user` and persists immediately.
	pub fn put(&mut self, user: &str, credentials: Credentials) -> Result<()> {
		self.records.insert(user.to_string(), credentials);
		store::save_secrets(&self.path, &self.records)
	}

	/// Clears the store to the empty baseline and persists it.
	pub fn reset(&mut self) -> Result<()> {
		self.records.clear();
		store::save_secrets(&self.path, &self.records)
	}
}
