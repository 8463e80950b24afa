//! Minimal DevTools-protocol session over a websocket.

use std::collections::VecDeque;

use anyhow::{Context as _, Result, anyhow, bail};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::trace;

/// An event pushed by the browser outside any method call.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// One page-scoped DevTools connection. Events arriving while a method
/// call is in flight are buffered and replayed by [`CdpSession::next_event`].
pub struct CdpSession {
	ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
	next_id: u64,
	pending_events: VecDeque<CdpEvent>,
}

impl CdpSession {
	pub async fn connect(url: &str) -> Result<Self> {
		let (ws, _) = connect_async(url)
			.await
			.with_context(|| format!("websocket connect to {url}"))?;
		Ok(Self {
			ws,
			next_id: 0,
			pending_events: VecDeque::new(),
		})
	}

	/// Calls `method` and waits for its response.
	pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
		self.next_id += 1;
		let id = self.next_id;
		let message = json!({ "id": id, "method": method, "params": params });
		trace!(%method, id, "cdp call");
		self.ws.send(Message::Text(message.to_string())).await?;

		loop {
			let frame = self.read_frame().await?;
			if frame.get("id").and_then(Value::as_u64) == Some(id) {
				if let Some(error) = frame.get("error") {
					bail!("{method} failed: {error}");
				}
				return Ok(frame.get("result").cloned().unwrap_or(Value::Null));
			}
			self.buffer_event(frame);
		}
	}

	/// Next browser event, in arrival order.
	pub async fn next_event(&mut self) -> Result<CdpEvent> {
		loop {
			if let Some(event) = self.pending_events.pop_front() {
				return Ok(event);
			}
			let frame = self.read_frame().await?;
			self.buffer_event(frame);
		}
	}

	async fn read_frame(&mut self) -> Result<Value> {
		loop {
			let message = self
				.ws
				.next()
				.await
				.ok_or_else(|| anyhow!("browser closed the devtools connection"))??;
			match message {
				Message::Text(text) => return Ok(serde_json::from_str(&text)?),
				Message::Close(_) => bail!("browser closed the devtools connection"),
				_ => continue,
			}
		}
	}

	fn buffer_event(&mut self, frame: Value) {
		if frame.get("method").is_some() {
			if let Ok(event) = serde_json::from_value::<CdpEvent>(frame) {
				trace!(method = %event.method, "cdp event");
				self.pending_events.push_back(event);
			}
		}
	}
}
