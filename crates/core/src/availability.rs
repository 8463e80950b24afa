//! Room selection over the registry for a target datetime.

use chrono::{Duration, NaiveDateTime};

use crate::error::{Error, Result};
use crate::registry::RoomRegistry;
use crate::room::Room;

/// Longest bookable window from the requested start.
pub const MAX_BOOKING_HOURS: i64 = 4;

/// How the target room is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomChoice {
	/// Any free room seating at least this many.
	MinSeats(u32),
	/// The room whose display-name suffix matches this number.
	Number(u32),
}

/// A booking window for one room. Lives only within one invocation and is
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingPlan {
	pub room_id: u32,
	pub room_name: String,
	pub unit: u64,
	pub start: NaiveDateTime,
	pub end: NaiveDateTime,
}

/// Rooms free at `at`, in ascending id order.
pub fn available_rooms(registry: &RoomRegistry, at: NaiveDateTime) -> Vec<&Room> {
	registry
		.rooms()
		.values()
		.filter(|room| !room.occupied(at))
		.collect()
}

/// Picks a room per `choice` among the rooms free at `at`.
///
/// With [`RoomChoice::MinSeats`], the candidate that stays free the
/// longest wins (greedy longest-available-from-now); on equal boundaries
/// the highest room id is kept, which is deterministic over the ordered
/// registry.
pub fn select_room<'a>(registry: &'a RoomRegistry, at: NaiveDateTime, choice: RoomChoice) -> Result<&'a Room> {
	let candidates = available_rooms(registry, at);
	match choice {
		RoomChoice::Number(number) => candidates
			.into_iter()
			.find(|room| room.room_number() == Some(number))
			.ok_or(Error::RoomUnavailable { number }),
		RoomChoice::MinSeats(min_seats) => candidates
			.into_iter()
			.filter(|room| room.min_seats >= min_seats)
			.max_by_key(|room| room.next_boundary(at))
			.ok_or(Error::NoRoomAvailable),
	}
}

/// The booking runs until the room's next occupied slot, capped at
/// [`MAX_BOOKING_HOURS`] from the start.
pub fn plan_booking(room: &Room, start: NaiveDateTime) -> BookingPlan {
	let cap = start + Duration::hours(MAX_BOOKING_HOURS);
	BookingPlan {
		room_id: room.id,
		room_name: room.name.clone(),
		unit: room.unit,
		start,
		end: room.next_boundary(start).min(cap),
	}
}
