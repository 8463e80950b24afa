//! Browser-driven login against the portal's SSO form.
//!
//! The portal fronts a JavaScript-only SSO form, so fresh credentials are
//! harvested from a real (headless by default) Chromium driven over the
//! DevTools protocol: the user id from the current-user API response, the
//! anti-forgery token from the settings request's headers, and the session
//! cookie from the browser's jar.

mod browser;
mod cdp;

use std::future::Future;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info};

use raumwart::api::{SESSION_COOKIE, XSRF_HEADER};
use raumwart::auth::LoginFlow;
use raumwart::credentials::Credentials;
use raumwart::error::{Error, Result};

const USER_FIELD: &str = "#Ecom_User_ID";
const PASSWORD_FIELD: &str = "#Ecom_Password";
const LOGIN_BUTTON: &str = "#loginButton2";
const CURRENT_USER_PATH: &str = "/api/v1/users/current";
const SETTINGS_PATH: &str = "/api/v1/settings/zeitwart";

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct BrowserLogin {
	base_url: String,
	headless: bool,
}

impl BrowserLogin {
	pub fn new(base_url: impl Into<String>, headless: bool) -> Self {
		Self {
			base_url: base_url.into(),
			headless,
		}
	}

	async fn run_flow(&self, user: &str, password: &str, timeout: Duration) -> Result<Credentials> {
		info!("session expired or absent, logging in via browser");
		let browser = browser::Browser::launch(self.headless)
			.await
			.map_err(login_err)?;
		let outcome = self.drive(&browser, user, password, timeout).await;
		browser.shutdown().await;
		outcome
	}

	async fn drive(
		&self,
		browser: &browser::Browser,
		user: &str,
		password: &str,
		timeout: Duration,
	) -> Result<Credentials> {
		let mut session = browser.open_tab(&self.base_url).await.map_err(login_err)?;
		session
			.call("Network.enable", json!({}))
			.await
			.map_err(login_err)?;
		session
			.call("Page.enable", json!({}))
			.await
			.map_err(login_err)?;
		session
			.call("Page.navigate", json!({ "url": self.base_url }))
			.await
			.map_err(login_err)?;

		checkpoint(timeout, "login form", wait_for_form(&mut session)).await?;
		// The form's scripts keep settling briefly after the fields render.
		tokio::time::sleep(Duration::from_secs(1)).await;

		submit_form(&mut session, user, password)
			.await
			.map_err(login_err)?;

		let capture = checkpoint(timeout, "login API responses", capture_network(&mut session)).await?;
		let session_cookie = checkpoint(timeout, "session cookie", read_session_cookie(&mut session)).await?;

		let credentials = Credentials {
			xsrf_token: capture.xsrf_token,
			session_cookie,
			user_id: capture.user_id,
		};
		if !credentials.is_valid() {
			return Err(Error::Login("login produced incomplete credentials".into()));
		}
		info!(user_id = credentials.user_id, "login succeeded");
		Ok(credentials)
	}
}

impl LoginFlow for BrowserLogin {
	async fn authenticate(&self, user: &str, password: &str, timeout: Duration) -> Result<Credentials> {
		self.run_flow(user, password, timeout).await
	}
}

fn login_err(err: anyhow::Error) -> Error {
	Error::Login(format!("{err:#}"))
}

/// Bounds one wait of the flow; exceeding the budget is a
/// [`Error::LoginTimeout`] naming the checkpoint.
async fn checkpoint<T>(
	budget: Duration,
	name: &'static str,
	wait: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
	match tokio::time::timeout(budget, wait).await {
		Ok(outcome) => outcome.map_err(login_err),
		Err(_) => Err(Error::LoginTimeout { checkpoint: name }),
	}
}

async fn wait_for_form(session: &mut cdp::CdpSession) -> anyhow::Result<()> {
	let probe = format!(
		"!!document.querySelector({USER_FIELD:?}) && !!document.querySelector({PASSWORD_FIELD:?}) && !!document.querySelector({LOGIN_BUTTON:?})"
	);
	loop {
		if evaluate_bool(session, &probe).await? {
			debug!("login form rendered");
			return Ok(());
		}
		tokio::time::sleep(POLL_INTERVAL).await;
	}
}

async fn evaluate_bool(session: &mut cdp::CdpSession, expression: &str) -> anyhow::Result<bool> {
	let result = session
		.call(
			"Runtime.evaluate",
			json!({ "expression": expression, "returnByValue": true }),
		)
		.await?;
	Ok(result["result"]["value"].as_bool().unwrap_or(false))
}

async fn submit_form(session: &mut cdp::CdpSession, user: &str, password: &str) -> anyhow::Result<()> {
	let user_json = serde_json::to_string(user)?;
	let password_json = serde_json::to_string(password)?;
	let script = format!(
		r#"(() => {{
			const user = document.querySelector({USER_FIELD:?});
			const password = document.querySelector({PASSWORD_FIELD:?});
			user.value = {user_json};
			password.value = {password_json};
			user.dispatchEvent(new Event('input', {{ bubbles: true }}));
			password.dispatchEvent(new Event('input', {{ bubbles: true }}));
			document.querySelector({LOGIN_BUTTON:?}).click();
		}})()"#
	);
	session
		.call("Runtime.evaluate", json!({ "expression": script }))
		.await?;
	debug!("login form submitted");
	Ok(())
}

struct NetworkCapture {
	user_id: u64,
	xsrf_token: String,
}

/// Watches post-submit traffic for the two responses that carry the
/// credential material.
async fn capture_network(session: &mut cdp::CdpSession) -> anyhow::Result<NetworkCapture> {
	let mut user_id = None;
	let mut xsrf_token = None;

	while user_id.is_none() || xsrf_token.is_none() {
		let event = session.next_event().await?;
		match event.method.as_str() {
			"Network.requestWillBeSent" => {
				let url = event.params["request"]["url"].as_str().unwrap_or_default();
				if url.contains(SETTINGS_PATH) {
					if let Some(token) = header_value(&event.params["request"]["headers"], XSRF_HEADER) {
						debug!("captured anti-forgery token");
						xsrf_token = Some(token.to_string());
					}
				}
			}
			"Network.responseReceived" => {
				let url = event.params["response"]["url"].as_str().unwrap_or_default();
				if url.contains(CURRENT_USER_PATH) {
					let request_id = event.params["requestId"].clone();
					let body = session
						.call("Network.getResponseBody", json!({ "requestId": request_id }))
						.await?;
					let text = body["body"].as_str().unwrap_or_default();
					let value: Value = serde_json::from_str(text)?;
					user_id = value["data"]["id"].as_u64();
					debug!(?user_id, "captured current user id");
				}
			}
			_ => {}
		}
	}

	Ok(NetworkCapture {
		user_id: user_id.unwrap_or_default(),
		xsrf_token: xsrf_token.unwrap_or_default(),
	})
}

/// Browsers report header names with arbitrary casing.
fn header_value<'a>(headers: &'a Value, name: &str) -> Option<&'a str> {
	headers
		.as_object()?
		.iter()
		.find(|(key, _)| key.eq_ignore_ascii_case(name))
		.and_then(|(_, value)| value.as_str())
}

async fn read_session_cookie(session: &mut cdp::CdpSession) -> anyhow::Result<String> {
	loop {
		let result = session.call("Network.getCookies", json!({})).await?;
		let cookie = result["cookies"]
			.as_array()
			.and_then(|cookies| cookies.iter().find(|c| c["name"] == SESSION_COOKIE))
			.and_then(|c| c["value"].as_str());
		if let Some(value) = cookie {
			return Ok(value.to_string());
		}
		tokio::time::sleep(POLL_INTERVAL).await;
	}
}
