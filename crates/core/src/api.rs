//! HTTP client for the Zeitwart portal and its wire formats.
//!
//! Fetching and decoding are deliberately separate: every endpoint returns
//! a raw [`ApiResponse`] first, because any of them can come back as a
//! session-expiry page instead of data, and the workflow has to sniff that
//! before decoding.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use regex_lite::Regex;
use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::availability::BookingPlan;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::registry::ROOM_ALLOW_LIST;
use crate::room::{EventSlot, Room};

pub const DEFAULT_BASE_URL: &str = "https://zeitwart.hs-osnabrueck.de";
pub const SESSION_COOKIE: &str = "zeitwart_session";
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";

/// `<title>` of the HTML error page served once a session lapses.
const PAGE_EXPIRED_TITLE: &str = "Page Expired";
/// JSON `message` served when the anti-forgery token no longer matches.
const CSRF_MISMATCH_MESSAGE: &str = "CSRF token mismatch.";

/// Raw portal response body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
	pub body: String,
}

impl ApiResponse {
	pub fn new(body: impl Into<String>) -> Self {
		Self { body: body.into() }
	}

	/// A lapsed session comes back as either an HTML error page or a JSON
	/// CSRF complaint, depending on the endpoint.
	pub fn session_expired(&self) -> bool {
		if html_title(&self.body).is_some_and(|title| title == PAGE_EXPIRED_TITLE) {
			return true;
		}
		serde_json::from_str::<Value>(&self.body)
			.ok()
			.and_then(|value| {
				value
					.get("message")
					.and_then(Value::as_str)
					.map(|message| message == CSRF_MISMATCH_MESSAGE)
			})
			.unwrap_or(false)
	}
}

fn html_title(body: &str) -> Option<String> {
	static TITLE_RE: OnceLock<Option<Regex>> = OnceLock::new();
	let re = TITLE_RE
		.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok())
		.as_ref()?;
	re.captures(body).map(|captures| captures[1].trim().to_string())
}

// --- wire formats ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
	data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct AttrValue<T> {
	value: T,
}

/// Some numeric attributes arrive as JSON strings; accept both shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
	Number(u32),
	String(String),
}

impl NumberOrString {
	fn as_u32(&self, field: &str) -> Result<u32> {
		match self {
			NumberOrString::Number(n) => Ok(*n),
			NumberOrString::String(s) => s
				.trim()
				.parse()
				.map_err(|_| Error::Malformed(format!("{field} is not a number: {s:?}"))),
		}
	}
}

#[derive(Debug, Deserialize)]
struct RoomAttributes {
	description: AttrValue<String>,
	/// Missing for some rooms; null and absent both mean "no floor".
	#[serde(default)]
	floor: Option<AttrValue<Option<String>>>,
	min_seats: AttrValue<NumberOrString>,
	max_seats: AttrValue<NumberOrString>,
}

#[derive(Debug, Deserialize)]
struct RoomRecord {
	id: u32,
	name: String,
	slug: String,
	model_attributes: RoomAttributes,
	units: Vec<UnitRef>,
}

#[derive(Debug, Deserialize)]
struct UnitRef {
	id: u64,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
	start: String,
	end: String,
	rooms: Vec<RoomRef>,
}

#[derive(Debug, Deserialize)]
struct RoomRef {
	id: u32,
}

/// Decodes the room listing envelope into registry rooms. The allow-list
/// is applied later by the registry, not here.
pub fn parse_room_listing(body: &str) -> Result<Vec<Room>> {
	let envelope: Envelope<RoomRecord> = serde_json::from_str(body)?;
	envelope
		.data
		.into_iter()
		.map(|record| {
			let unit = record
				.units
				.first()
				.map(|unit| unit.id)
				.ok_or_else(|| Error::Malformed(format!("room {} has no scheduling unit", record.id)))?;
			Ok(Room {
				id: record.id,
				name: record.name,
				slug: record.slug,
				description: record.model_attributes.description.value,
				floor: record.model_attributes.floor.and_then(|attr| attr.value),
				min_seats: record.model_attributes.min_seats.value.as_u32("min_seats")?,
				max_seats: record.model_attributes.max_seats.value.as_u32("max_seats")?,
				unit,
				events: Vec::new(),
			})
		})
		.collect()
}

/// Decodes the day's event envelope into `(room id, slot)` pairs. The
/// first entry of an event's `rooms` list owns it; events without one are
/// dropped with a diagnostic.
pub fn parse_event_listing(body: &str) -> Result<Vec<(u32, EventSlot)>> {
	let envelope: Envelope<EventRecord> = serde_json::from_str(body)?;
	let mut events = Vec::with_capacity(envelope.data.len());
	for record in envelope.data {
		let Some(owner) = record.rooms.first() else {
			warn!(start = %record.start, "event without an owning room, dropping");
			continue;
		};
		events.push((
			owner.id,
			EventSlot {
				start: parse_portal_datetime(&record.start)?,
				end: parse_portal_datetime(&record.end)?,
			},
		));
	}
	Ok(events)
}

/// The portal serves ISO-8601 with either a `T` or a space separator, with
/// or without fractional seconds. No timezone handling: values are naive
/// local datetimes throughout.
pub fn parse_portal_datetime(raw: &str) -> Result<NaiveDateTime> {
	const FORMATS: &[&str] = &[
		"%Y-%m-%dT%H:%M:%S%.f",
		"%Y-%m-%d %H:%M:%S%.f",
		"%Y-%m-%dT%H:%M",
		"%Y-%m-%d %H:%M",
	];
	for format in FORMATS {
		if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
			return Ok(parsed);
		}
	}
	Err(Error::Malformed(format!("unparseable datetime {raw:?}")))
}

// --- booking payload ------------------------------------------------------

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BookingOptions {
	pub personal_message: String,
	pub send_mail_to_admin: bool,
	pub send_mail_to_users: bool,
}

/// Body of the events-creation endpoint, shaped exactly as the portal's
/// own frontend submits it.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BookingRequest {
	pub name: String,
	pub start_date: String,
	pub start_time: String,
	pub end_date: String,
	pub end_time: String,
	pub room_ids: Vec<u32>,
	pub user_ids: Vec<u64>,
	pub unit_id: u64,
	pub repeat: String,
	pub repeat_until: String,
	pub options: BookingOptions,
}

impl BookingRequest {
	pub fn from_plan(plan: &BookingPlan, user_id: u64) -> Self {
		let date = plan.start.date().format("%Y-%m-%d").to_string();
		Self {
			name: String::new(),
			start_date: date.clone(),
			start_time: plan.start.format("%H:%M").to_string(),
			// Bookings never cross midnight: the window is capped well
			// before closing time.
			end_date: date,
			end_time: plan.end.format("%H:%M").to_string(),
			room_ids: vec![plan.room_id],
			user_ids: vec![user_id],
			unit_id: plan.unit,
			repeat: String::new(),
			repeat_until: String::new(),
			options: BookingOptions {
				personal_message: String::new(),
				send_mail_to_admin: false,
				send_mail_to_users: true,
			},
		}
	}
}

// --- portal client --------------------------------------------------------

/// Seam between the workflow and the network; the tests script this.
#[allow(async_fn_in_trait)]
pub trait Portal {
	async fn fetch_rooms(&self, credentials: &Credentials) -> Result<ApiResponse>;
	async fn fetch_events(&self, credentials: &Credentials, date: NaiveDate) -> Result<ApiResponse>;
	async fn create_booking(&self, credentials: &Credentials, request: &BookingRequest) -> Result<ApiResponse>;
}

#[derive(Debug, Clone)]
pub struct PortalClient {
	http: reqwest::Client,
	base_url: String,
}

impl PortalClient {
	pub fn new(base_url: impl Into<String>) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(30))
			.build()?;
		Ok(Self {
			http,
			base_url: base_url.into().trim_end_matches('/').to_string(),
		})
	}

	/// Headers and cookie every authenticated portal request carries.
	fn authed(&self, request: reqwest::RequestBuilder, credentials: &Credentials) -> reqwest::RequestBuilder {
		request
			.header(XSRF_HEADER, &credentials.xsrf_token)
			.header(header::ACCEPT, "application/json")
			.header(header::ORIGIN, &self.base_url)
			.header(
				header::COOKIE,
				format!("{SESSION_COOKIE}={}", credentials.session_cookie),
			)
	}
}

impl Portal for PortalClient {
	async fn fetch_rooms(&self, credentials: &Credentials) -> Result<ApiResponse> {
		let url = format!(
			"{}/api/v1/users/{}/rooms?page=1&itemsPerPage=99&filter_homepage=2&columns[]=events",
			self.base_url, credentials.user_id
		);
		let response = self.authed(self.http.get(&url), credentials).send().await?;
		Ok(ApiResponse::new(response.text().await?))
	}

	async fn fetch_events(&self, credentials: &Credentials, date: NaiveDate) -> Result<ApiResponse> {
		let url = format!(
			"{}/api/v1/home/filter/{}",
			self.base_url,
			date.format("%Y-%m-%d")
		);
		let response = self
			.authed(self.http.post(&url), credentials)
			.json(&serde_json::json!({ "rooms": ROOM_ALLOW_LIST }))
			.send()
			.await?;
		Ok(ApiResponse::new(response.text().await?))
	}

	async fn create_booking(&self, credentials: &Credentials, request: &BookingRequest) -> Result<ApiResponse> {
		let url = format!("{}/api/v1/events", self.base_url);
		let response = self
			.authed(self.http.post(&url), credentials)
			.json(request)
			.send()
			.await?;
		Ok(ApiResponse::new(response.text().await?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::NaiveDate;
	use serde_json::json;

	#[test]
	fn expired_html_page_is_detected() {
		let response = ApiResponse::new(
			"<html><head>\n<TITLE> Page Expired </TITLE></head><body></body></html>",
		);
		assert!(response.session_expired());
	}

	#[test]
	fn csrf_mismatch_message_is_detected() {
		let response = ApiResponse::new(json!({ "message": "CSRF token mismatch." }).to_string());
		assert!(response.session_expired());
	}

	#[test]
	fn ordinary_responses_are_not_expired() {
		assert!(!ApiResponse::new(json!({ "data": [] }).to_string()).session_expired());
		assert!(!ApiResponse::new("<html><title>Zeitwart</title></html>").session_expired());
		assert!(!ApiResponse::new(json!({ "message": "Created." }).to_string()).session_expired());
		assert!(!ApiResponse::new("").session_expired());
	}

	fn listing(records: Vec<Value>) -> String {
		json!({ "data": records }).to_string()
	}

	fn record(id: u32) -> Value {
		json!({
			"id": id,
			"name": format!("Lernraum SL {id:04}"),
			"slug": format!("lernraum-sl-{id}"),
			"model_attributes": {
				"description": { "value": "Gruppenraum" },
				"floor": { "value": "EG" },
				"min_seats": { "value": 4 },
				"max_seats": { "value": 8 }
			},
			"units": [ { "id": 2 } ]
		})
	}

	#[test]
	fn room_listing_decodes_records() {
		let rooms = parse_room_listing(&listing(vec![record(5)])).unwrap();
		assert_eq!(rooms.len(), 1);
		let room = &rooms[0];
		assert_eq!(room.id, 5);
		assert_eq!(room.name, "Lernraum SL 0005");
		assert_eq!(room.description, "Gruppenraum");
		assert_eq!(room.floor.as_deref(), Some("EG"));
		assert_eq!((room.min_seats, room.max_seats), (4, 8));
		assert_eq!(room.unit, 2);
		assert!(room.events.is_empty());
	}

	#[test]
	fn missing_or_null_floor_is_none() {
		let mut without = record(5);
		without["model_attributes"]
			.as_object_mut()
			.unwrap()
			.remove("floor");
		let mut with_null = record(6);
		with_null["model_attributes"]["floor"] = json!({ "value": null });

		let rooms = parse_room_listing(&listing(vec![without, with_null])).unwrap();
		assert_eq!(rooms[0].floor, None);
		assert_eq!(rooms[1].floor, None);
	}

	#[test]
	fn stringly_typed_seat_counts_are_coerced() {
		let mut stringly = record(5);
		stringly["model_attributes"]["min_seats"] = json!({ "value": "12" });
		let rooms = parse_room_listing(&listing(vec![stringly])).unwrap();
		assert_eq!(rooms[0].min_seats, 12);

		let mut junk = record(5);
		junk["model_attributes"]["min_seats"] = json!({ "value": "a dozen" });
		assert!(parse_room_listing(&listing(vec![junk])).is_err());
	}

	#[test]
	fn room_without_unit_is_malformed() {
		let mut record = record(5);
		record["units"] = json!([]);
		assert!(matches!(
			parse_room_listing(&listing(vec![record])),
			Err(Error::Malformed(_))
		));
	}

	#[test]
	fn event_listing_assigns_the_first_room_and_drops_orphans() {
		let body = json!({ "data": [
			{ "start": "2026-09-01 10:00:00", "end": "2026-09-01 11:30:00",
			  "rooms": [ { "id": 5 }, { "id": 6 } ] },
			{ "start": "2026-09-01 12:00:00", "end": "2026-09-01 13:00:00", "rooms": [] },
		]})
		.to_string();

		let events = parse_event_listing(&body).unwrap();
		assert_eq!(events.len(), 1);
		let (room_id, slot) = events[0];
		assert_eq!(room_id, 5);
		assert_eq!(slot.start.to_string(), "2026-09-01 10:00:00");
		assert_eq!(slot.end.to_string(), "2026-09-01 11:30:00");
	}

	#[test]
	fn portal_datetimes_parse_both_separators() {
		for raw in [
			"2026-09-01T10:00:00",
			"2026-09-01 10:00:00",
			"2026-09-01T10:00",
			"2026-09-01 10:00:00.000000",
		] {
			let parsed = parse_portal_datetime(raw).unwrap();
			assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
		}
		assert!(parse_portal_datetime("morgen um zehn").is_err());
	}

	#[test]
	fn booking_request_matches_the_frontend_payload() {
		let plan = BookingPlan {
			room_id: 5,
			room_name: "Lernraum SL 0113".into(),
			unit: 2,
			start: parse_portal_datetime("2026-09-01 13:30:00").unwrap(),
			end: parse_portal_datetime("2026-09-01 15:00:00").unwrap(),
		};
		let request = BookingRequest::from_plan(&plan, 42);
		let encoded = serde_json::to_value(&request).unwrap();
		assert_eq!(
			encoded,
			json!({
				"name": "",
				"start_date": "2026-09-01",
				"start_time": "13:30",
				"end_date": "2026-09-01",
				"end_time": "15:00",
				"room_ids": [5],
				"user_ids": [42],
				"unit_id": 2,
				"repeat": "",
				"repeat_until": "",
				"options": {
					"personal_message": "",
					"send_mail_to_admin": false,
					"send_mail_to_users": true
				}
			})
		);
	}
}
