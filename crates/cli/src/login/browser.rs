//! Chromium discovery and lifecycle for the login flow.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::debug;

use super::cdp::CdpSession;

/// `/json/new` response subset from the DevTools HTTP endpoint.
#[derive(Debug, Deserialize)]
struct TargetInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	web_socket_debugger_url: String,
}

/// A Chromium instance owned by one login attempt. The process is killed
/// on drop as well, so an aborted flow never leaks a browser.
pub struct Browser {
	child: Child,
	port: u16,
	profile_dir: PathBuf,
	http: reqwest::Client,
}

impl Browser {
	pub async fn launch(headless: bool) -> Result<Self> {
		let executable = find_chromium_executable()
			.ok_or_else(|| anyhow!("no Chromium-based browser found on this system"))?;
		let port = free_port()?;
		let profile_dir = std::env::temp_dir().join(format!("raumwart-login-{}", std::process::id()));

		let mut command = Command::new(&executable);
		command
			.arg(format!("--remote-debugging-port={port}"))
			.arg(format!("--user-data-dir={}", profile_dir.display()))
			.arg("--no-first-run")
			.arg("--no-default-browser-check")
			.arg("--disable-extensions");
		if headless {
			command.arg("--headless=new");
		}
		command.stdout(Stdio::null()).stderr(Stdio::null());
		command.kill_on_drop(true);
		let child = command
			.spawn()
			.with_context(|| format!("failed to launch {executable}"))?;
		debug!(%executable, port, "launched login browser");

		let http = reqwest::Client::builder()
			.timeout(Duration::from_millis(400))
			.build()?;
		let browser = Self { child, port, profile_dir, http };
		browser.wait_for_devtools().await?;
		Ok(browser)
	}

	/// Polls `/json/version` until the DevTools endpoint answers.
	async fn wait_for_devtools(&self) -> Result<()> {
		for _ in 0..50 {
			let probe = self
				.http
				.get(format!("http://127.0.0.1:{}/json/version", self.port))
				.send()
				.await;
			if probe.is_ok_and(|response| response.status().is_success()) {
				return Ok(());
			}
			tokio::time::sleep(Duration::from_millis(200)).await;
		}
		bail!("devtools endpoint on port {} never came up", self.port)
	}

	/// Opens a fresh tab on `url` and attaches a DevTools session to it.
	pub async fn open_tab(&self, url: &str) -> Result<CdpSession> {
		let response = self
			.http
			.put(format!("http://127.0.0.1:{}/json/new?{}", self.port, url))
			.timeout(Duration::from_secs(2))
			.send()
			.await?
			.error_for_status()?;
		let target: TargetInfo = response.json().await?;
		CdpSession::connect(&target.web_socket_debugger_url).await
	}

	pub async fn shutdown(mut self) {
		let _ = self.child.kill().await;
		let _ = tokio::fs::remove_dir_all(&self.profile_dir).await;
	}
}

fn free_port() -> Result<u16> {
	let listener = TcpListener::bind(("127.0.0.1", 0))?;
	Ok(listener.local_addr()?.port())
}

fn find_chromium_executable() -> Option<String> {
	let candidates: &[&str] = if cfg!(target_os = "macos") {
		&[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
		]
	} else {
		&[
			"google-chrome-stable",
			"google-chrome",
			"chromium-browser",
			"chromium",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/usr/bin/chromium-browser",
			"/usr/bin/chromium",
			"/snap/bin/chromium",
		]
	};

	for candidate in candidates {
		if candidate.starts_with('/') {
			if std::path::Path::new(candidate).exists() {
				return Some((*candidate).to_string());
			}
		} else if which::which(candidate).is_ok() {
			return Some((*candidate).to_string());
		}
	}

	None
}
