//! Login-flow contract. The CLI supplies the browser-driven
//! implementation; the workflow only sees this trait.

use std::time::Duration;

use crate::credentials::Credentials;
use crate::error::Result;

/// Default wait budget per login checkpoint.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Obtains fresh authentication material for one user.
///
/// Implementations are atomic: they either yield a complete, valid
/// [`Credentials`] record or fail. Partial extraction is never surfaced as
/// success. Waits are bounded by `timeout` at every checkpoint, failing
/// with [`crate::Error::LoginTimeout`].
#[allow(async_fn_in_trait)]
pub trait LoginFlow {
	async fn authenticate(&self, user: &str, password: &str, timeout: Duration) -> Result<Credentials>;
}
