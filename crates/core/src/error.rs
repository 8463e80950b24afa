use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// A login checkpoint exceeded its wait budget.
	#[error("login timed out waiting for {checkpoint}")]
	LoginTimeout { checkpoint: &'static str },

	#[error("login failed: {0}")]
	Login(String),

	#[error("no room matches the requested constraints")]
	NoRoomAvailable,

	#[error("room {number} is not free or not known")]
	RoomUnavailable { number: u32 },

	#[error("malformed portal response: {0}")]
	Malformed(String),

	#[error(transparent)]
	Http(#[from] reqwest::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Selection failures that the CLI reports with the localized
	/// "no room available" message.
	pub fn is_no_room(&self) -> bool {
		matches!(self, Error::NoRoomAvailable | Error::RoomUnavailable { .. })
	}

	/// Login failures of either flavor.
	pub fn is_login_failure(&self) -> bool {
		matches!(self, Error::LoginTimeout { .. } | Error::Login(_))
	}
}
