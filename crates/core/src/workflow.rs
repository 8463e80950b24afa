//! End-to-end booking orchestration with session-expiry recovery.

use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::api::{ApiResponse, BookingRequest, Portal, parse_event_listing, parse_room_listing};
use crate::auth::LoginFlow;
use crate::availability::{self, BookingPlan, RoomChoice};
use crate::credentials::{Credentials, CredentialStore};
use crate::error::{Error, Result};
use crate::registry::RoomRegistry;
use crate::room::Room;

#[derive(Debug, Clone)]
pub struct WorkflowOptions {
	pub user: String,
	pub password: String,
	/// Full room refresh once the cached registry is older than this.
	pub registry_max_age_days: i64,
	/// Wait budget per login checkpoint.
	pub login_timeout: Duration,
}

/// The one authenticated operation currently in flight; lets the
/// expiry-retry wrapper reissue the identical request once.
enum PortalOp<'a> {
	FetchRooms,
	FetchEvents(NaiveDate),
	CreateBooking(&'a BookingRequest),
}

impl PortalOp<'_> {
	fn name(&self) -> &'static str {
		match self {
			PortalOp::FetchRooms => "room refresh",
			PortalOp::FetchEvents(_) => "event refresh",
			PortalOp::CreateBooking(_) => "booking",
		}
	}
}

/// Orchestrates credential store, registry, portal and login flow for one
/// booking run.
pub struct BookingWorkflow<P, L> {
	portal: P,
	login: L,
	credentials: CredentialStore,
	registry: RoomRegistry,
	options: WorkflowOptions,
}

impl<P: Portal, L: LoginFlow> BookingWorkflow<P, L> {
	pub fn new(
		portal: P,
		login: L,
		credentials: CredentialStore,
		registry: RoomRegistry,
		options: WorkflowOptions,
	) -> Self {
		Self { portal, login, credentials, registry, options }
	}

	pub fn registry(&self) -> &RoomRegistry {
		&self.registry
	}

	/// Makes sure a valid session exists before any room data is touched.
	///
	/// Without one the cached registry's provenance is unknown, so it is
	/// reset alongside the forced authentication.
	pub async fn ensure_session(&mut self) -> Result<()> {
		if self.credentials.is_valid(&self.options.user) {
			return Ok(());
		}
		warn!(user = %self.options.user, "no valid session, rebuilding local state");
		self.registry.reset()?;
		self.authenticate().await
	}

	async fn authenticate(&mut self) -> Result<()> {
		info!(user = %self.options.user, "logging in");
		let credentials = self
			.login
			.authenticate(&self.options.user, &self.options.password, self.options.login_timeout)
			.await?;
		self.credentials.put(&self.options.user, credentials)
	}

	fn current_credentials(&self) -> Result<Credentials> {
		self.credentials
			.get(&self.options.user)
			.cloned()
			.ok_or_else(|| Error::Login(format!("no credentials for {}", self.options.user)))
	}

	async fn issue(&self, op: &PortalOp<'_>, credentials: &Credentials) -> Result<ApiResponse> {
		match op {
			PortalOp::FetchRooms => self.portal.fetch_rooms(credentials).await,
			PortalOp::FetchEvents(date) => self.portal.fetch_events(credentials, *date).await,
			PortalOp::CreateBooking(request) => self.portal.create_booking(credentials, request).await,
		}
	}

	/// Issues `op`, re-authenticating exactly once if the portal reports a
	/// lapsed session. A second lapse fails the operation instead of
	/// looping.
	async fn with_relogin(&mut self, op: PortalOp<'_>) -> Result<ApiResponse> {
		let credentials = self.current_credentials()?;
		let response = self.issue(&op, &credentials).await?;
		if !response.session_expired() {
			return Ok(response);
		}

		warn!("session expired during {}, logging in again", op.name());
		self.authenticate().await?;

		let credentials = self.current_credentials()?;
		let response = self.issue(&op, &credentials).await?;
		if response.session_expired() {
			return Err(Error::Login(format!(
				"session still expired after re-login during {}",
				op.name()
			)));
		}
		Ok(response)
	}

	/// Full room refresh when the cached registry is empty or stale.
	/// Returns whether a refresh happened.
	pub async fn refresh_rooms_if_stale(&mut self) -> Result<bool> {
		let now = Local::now().naive_local();
		if !self.registry.is_stale(now, self.options.registry_max_age_days) {
			return Ok(false);
		}
		info!("room registry stale, refreshing");
		self.refresh_rooms().await?;
		Ok(true)
	}

	pub async fn refresh_rooms(&mut self) -> Result<()> {
		let response = self.with_relogin(PortalOp::FetchRooms).await?;
		let rooms = parse_room_listing(&response.body)?;
		self.registry.rebuild_rooms(rooms)
	}

	pub async fn refresh_events(&mut self, date: NaiveDate) -> Result<()> {
		let response = self.with_relogin(PortalOp::FetchEvents(date)).await?;
		let events = parse_event_listing(&response.body)?;
		self.registry.rebuild_events(events)
	}

	/// Startup sequence for one run: session, registry, the day's events.
	pub async fn prepare(&mut self, date: NaiveDate) -> Result<()> {
		self.ensure_session().await?;
		self.refresh_rooms_if_stale().await?;
		self.refresh_events(date).await
	}

	pub fn available_rooms(&self, at: NaiveDateTime) -> Vec<&Room> {
		availability::available_rooms(&self.registry, at)
	}

	pub fn plan_booking(&self, at: NaiveDateTime, choice: RoomChoice) -> Result<BookingPlan> {
		let room = availability::select_room(&self.registry, at, choice)?;
		Ok(availability::plan_booking(room, at))
	}

	/// Submits the booking and returns the portal's raw response body.
	/// A single request: it either lands or the run aborts with no local
	/// state touched.
	pub async fn book(&mut self, plan: &BookingPlan) -> Result<String> {
		let user_id = self.current_credentials()?.user_id;
		let request = BookingRequest::from_plan(plan, user_id);
		let response = self.with_relogin(PortalOp::CreateBooking(&request)).await?;
		Ok(response.body)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::auth::DEFAULT_LOGIN_TIMEOUT;
	use std::cell::{Cell, RefCell};
	use std::collections::VecDeque;
	use serde_json::json;
	use tempfile::TempDir;

	#[derive(Default)]
	struct FakePortal {
		rooms: RefCell<VecDeque<ApiResponse>>,
		events: RefCell<VecDeque<ApiResponse>>,
		bookings: RefCell<VecDeque<ApiResponse>>,
		booking_calls: Cell<usize>,
	}

	impl Portal for FakePortal {
		async fn fetch_rooms(&self, _credentials: &Credentials) -> Result<ApiResponse> {
			self.rooms
				.borrow_mut()
				.pop_front()
				.ok_or_else(|| Error::Malformed("unexpected fetch_rooms".into()))
		}

		async fn fetch_events(&self, _credentials: &Credentials, _date: NaiveDate) -> Result<ApiResponse> {
			self.events
				.borrow_mut()
				.pop_front()
				.ok_or_else(|| Error::Malformed("unexpected fetch_events".into()))
		}

		async fn create_booking(&self, _credentials: &Credentials, _request: &BookingRequest) -> Result<ApiResponse> {
			self.booking_calls.set(self.booking_calls.get() + 1);
			self.bookings
				.borrow_mut()
				.pop_front()
				.ok_or_else(|| Error::Malformed("unexpected create_booking".into()))
		}
	}

	struct FakeLogin {
		calls: Cell<usize>,
		fail: bool,
	}

	impl FakeLogin {
		fn new() -> Self {
			Self { calls: Cell::new(0), fail: false }
		}

		fn failing() -> Self {
			Self { calls: Cell::new(0), fail: true }
		}
	}

	impl LoginFlow for FakeLogin {
		async fn authenticate(&self, _user: &str, _password: &str, _timeout: Duration) -> Result<Credentials> {
			self.calls.set(self.calls.get() + 1);
			if self.fail {
				return Err(Error::LoginTimeout { checkpoint: "login form" });
			}
			Ok(Credentials {
				xsrf_token: "fresh-token".into(),
				session_cookie: "fresh-cookie".into(),
				user_id: 7,
			})
		}
	}

	fn expired() -> ApiResponse {
		ApiResponse::new("<html><head><title>Page Expired</title></head></html>")
	}

	fn room_listing() -> ApiResponse {
		ApiResponse::new(
			json!({ "data": [ {
				"id": 5,
				"name": "Lernraum SL 0113",
				"slug": "lernraum-sl-0113",
				"model_attributes": {
					"description": { "value": "Gruppenraum" },
					"min_seats": { "value": 2 },
					"max_seats": { "value": 6 }
				},
				"units": [ { "id": 2 } ]
			} ]})
			.to_string(),
		)
	}

	fn event_listing() -> ApiResponse {
		ApiResponse::new(
			json!({ "data": [ {
				"start": "2026-09-01 09:00:00",
				"end": "2026-09-01 10:00:00",
				"rooms": [ { "id": 5 } ]
			} ]})
			.to_string(),
		)
	}

	fn valid_credentials() -> Credentials {
		Credentials {
			xsrf_token: "token".into(),
			session_cookie: "cookie".into(),
			user_id: 7,
		}
	}

	fn workflow(tmp: &TempDir, portal: FakePortal, login: FakeLogin, seeded: bool) -> BookingWorkflow<FakePortal, FakeLogin> {
		let mut credentials = CredentialStore::load(tmp.path().join("credentials.json"));
		if seeded {
			credentials.put("anna", valid_credentials()).unwrap();
		}
		let registry = RoomRegistry::load(tmp.path().join("rooms.json"));
		BookingWorkflow::new(
			portal,
			login,
			credentials,
			registry,
			WorkflowOptions {
				user: "anna".into(),
				password: "secret".into(),
				registry_max_age_days: 7,
				login_timeout: DEFAULT_LOGIN_TIMEOUT,
			},
		)
	}

	fn dt(s: &str) -> NaiveDateTime {
		NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
	}

	#[tokio::test]
	async fn expired_then_ok_re_authenticates_once_and_uses_second_response() {
		let tmp = TempDir::new().unwrap();
		let portal = FakePortal::default();
		portal.rooms.borrow_mut().push_back(expired());
		portal.rooms.borrow_mut().push_back(room_listing());

		let mut workflow = workflow(&tmp, portal, FakeLogin::new(), true);
		workflow.refresh_rooms().await.unwrap();

		assert_eq!(workflow.login.calls.get(), 1);
		assert!(workflow.registry().get(5).is_some());
		// The fresh credentials were persisted.
		assert_eq!(workflow.credentials.get("anna").unwrap().xsrf_token, "fresh-token");
	}

	#[tokio::test]
	async fn expired_twice_is_a_login_error_with_no_second_retry() {
		let tmp = TempDir::new().unwrap();
		let portal = FakePortal::default();
		portal.rooms.borrow_mut().push_back(expired());
		portal.rooms.borrow_mut().push_back(expired());

		let mut workflow = workflow(&tmp, portal, FakeLogin::new(), true);
		let err = workflow.refresh_rooms().await.unwrap_err();

		assert!(matches!(err, Error::Login(_)));
		assert_eq!(workflow.login.calls.get(), 1);
		assert!(workflow.portal.rooms.borrow().is_empty(), "exactly two issues");
	}

	#[tokio::test]
	async fn failed_re_authentication_aborts_the_operation() {
		let tmp = TempDir::new().unwrap();
		let portal = FakePortal::default();
		portal.rooms.borrow_mut().push_back(expired());

		let mut workflow = workflow(&tmp, portal, FakeLogin::failing(), true);
		let err = workflow.refresh_rooms().await.unwrap_err();

		assert!(matches!(err, Error::LoginTimeout { .. }));
		assert_eq!(workflow.login.calls.get(), 1);
	}

	#[tokio::test]
	async fn invalid_session_resets_the_persisted_registry_and_logs_in() {
		let tmp = TempDir::new().unwrap();
		let rooms_path = tmp.path().join("rooms.json");

		// Seed a cached registry from an earlier run.
		{
			let mut registry = RoomRegistry::load(rooms_path.clone());
			registry
				.rebuild_rooms(parse_room_listing(&room_listing().body).unwrap())
				.unwrap();
		}

		let mut workflow = workflow(&tmp, FakePortal::default(), FakeLogin::new(), false);
		workflow.ensure_session().await.unwrap();

		assert_eq!(workflow.login.calls.get(), 1);
		assert!(workflow.registry().rooms().is_empty());
		let on_disk = RoomRegistry::load(rooms_path);
		assert!(on_disk.rooms().is_empty());
	}

	#[tokio::test]
	async fn valid_session_skips_authentication() {
		let tmp = TempDir::new().unwrap();
		let mut workflow = workflow(&tmp, FakePortal::default(), FakeLogin::new(), true);
		workflow.ensure_session().await.unwrap();
		assert_eq!(workflow.login.calls.get(), 0);
	}

	#[tokio::test]
	async fn prepare_populates_rooms_and_events() {
		let tmp = TempDir::new().unwrap();
		let portal = FakePortal::default();
		portal.rooms.borrow_mut().push_back(room_listing());
		portal.events.borrow_mut().push_back(event_listing());

		let mut workflow = workflow(&tmp, portal, FakeLogin::new(), true);
		workflow
			.prepare(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap())
			.await
			.unwrap();

		let room = workflow.registry().get(5).unwrap();
		assert_eq!(room.events.len(), 1);
		assert!(room.occupied(dt("2026-09-01 09:30")));
	}

	#[tokio::test]
	async fn no_candidates_means_no_booking_request_is_sent() {
		let tmp = TempDir::new().unwrap();
		let portal = FakePortal::default();
		portal.rooms.borrow_mut().push_back(room_listing());
		portal.events.borrow_mut().push_back(event_listing());

		let mut workflow = workflow(&tmp, portal, FakeLogin::new(), true);
		workflow
			.prepare(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap())
			.await
			.unwrap();

		// The only room is occupied at 09:30.
		let err = workflow
			.plan_booking(dt("2026-09-01 09:30"), RoomChoice::MinSeats(1))
			.unwrap_err();
		assert!(matches!(err, Error::NoRoomAvailable));
		assert_eq!(workflow.portal.booking_calls.get(), 0);
	}

	#[tokio::test]
	async fn booking_returns_the_raw_response_body() {
		let tmp = TempDir::new().unwrap();
		let portal = FakePortal::default();
		portal.rooms.borrow_mut().push_back(room_listing());
		portal.events.borrow_mut().push_back(event_listing());
		portal
			.bookings
			.borrow_mut()
			.push_back(ApiResponse::new(json!({ "message": "Created." }).to_string()));

		let mut workflow = workflow(&tmp, portal, FakeLogin::new(), true);
		workflow
			.prepare(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap())
			.await
			.unwrap();

		let plan = workflow
			.plan_booking(dt("2026-09-01 13:30"), RoomChoice::MinSeats(2))
			.unwrap();
		assert_eq!(plan.room_id, 5);
		assert_eq!(plan.end, dt("2026-09-01 17:30")); // 4h cap, nothing later that day

		let body = workflow.book(&plan).await.unwrap();
		assert_eq!(body, json!({ "message": "Created." }).to_string());
		assert_eq!(workflow.portal.booking_calls.get(), 1);
	}
}
