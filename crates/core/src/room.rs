//! Rooms and their occupancy events.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Rooms close at 22:00; used as the "free for the rest of the day"
/// sentinel when no further event is scheduled.
pub const CLOSING_HOUR: u32 = 22;

/// Closing time on `date`, as a plain datetime value.
pub fn closing_time(date: NaiveDate) -> NaiveDateTime {
	date.and_hms_opt(CLOSING_HOUR, 0, 0)
		.unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

/// One occupancy slot, half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventSlot {
	pub start: NaiveDateTime,
	pub end: NaiveDateTime,
}

/// A bookable room with its static attributes and the current day's
/// occupancy slots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
	pub id: u32,
	pub name: String,
	pub description: String,
	pub slug: String,
	#[serde(default)]
	pub floor: Option<String>,
	pub min_seats: u32,
	pub max_seats: u32,
	/// Scheduling-unit id required by the booking endpoint.
	pub unit: u64,
	#[serde(default)]
	pub events: Vec<EventSlot>,
}

impl Room {
	/// True iff `at` falls inside any event slot. Slots may overlap and are
	/// not required to be sorted.
	pub fn occupied(&self, at: NaiveDateTime) -> bool {
		self.events.iter().any(|slot| slot.start <= at && at < slot.end)
	}

	/// Earliest event start strictly after `at`, or closing time on `at`'s
	/// calendar date if nothing else is scheduled.
	pub fn next_boundary(&self, at: NaiveDateTime) -> NaiveDateTime {
		self.events
			.iter()
			.map(|slot| slot.start)
			.filter(|start| *start > at)
			.min()
			.unwrap_or_else(|| closing_time(at.date()))
	}

	/// Numeric suffix of the display name ("Lernraum SL 0113" -> 113).
	/// At most the last three digits count, matching how the portal labels
	/// its rooms.
	pub fn room_number(&self) -> Option<u32> {
		let run: String = self
			.name
			.chars()
			.rev()
			.take_while(|c| c.is_ascii_digit())
			.take(3)
			.collect::<Vec<_>>()
			.into_iter()
			.rev()
			.collect();
		if run.is_empty() { None } else { run.parse().ok() }
	}
}
