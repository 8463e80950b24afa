//! Persisted registry of bookable rooms and their occupancy events.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::room::{EventSlot, Room};
use crate::store;

/// Bookable room ids for the building; everything else in the portal's
/// listing is ignored.
pub const ROOM_ALLOW_LIST: &[u32] = &[
	1, 3, 2, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
	27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 41, 42, 43, 44, 45,
];

/// Room map plus the staleness stamp, persisted together as one document.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomRegistry {
	rooms: BTreeMap<u32, Room>,
	last_updated: NaiveDateTime,
	#[serde(skip)]
	path: PathBuf,
}

impl RoomRegistry {
	/// Loads the registry from `path`; a missing or unreadable file
	/// recovers to an empty registry with a diagnostic.
	pub fn load(path: PathBuf) -> Self {
		match store::load_json::<RoomRegistry>(&path) {
			Some(mut registry) => {
				registry.path = path;
				registry
			}
			None => {
				warn!(path = %path.display(), "room registry missing or unreadable, starting empty");
				Self {
					rooms: BTreeMap::new(),
					last_updated: Local::now().naive_local(),
					path,
				}
			}
		}
	}

	pub fn rooms(&self) -> &BTreeMap<u32, Room> {
		&self.rooms
	}

	pub fn get(&self, id: u32) -> Option<&Room> {
		self.rooms.get(&id)
	}

	pub fn last_updated(&self) -> NaiveDateTime {
		self.last_updated
	}

	/// Staleness policy: a registry needs a full refresh when it is empty
	/// or older than `max_age_days`.
	pub fn is_stale(&self, now: NaiveDateTime, max_age_days: i64) -> bool {
		self.rooms.is_empty() || now > self.last_updated + Duration::days(max_age_days)
	}

	/// Replaces every room's static attributes from a fresh listing,
	/// filtered to the allow-list. Prior events are discarded; callers
	/// refresh them separately. Stamps and persists.
	pub fn rebuild_rooms(&mut self, rooms: impl IntoIterator<Item = Room>) -> Result<()> {
		self.rooms = rooms
			.into_iter()
			.filter(|room| ROOM_ALLOW_LIST.contains(&room.id))
			.map(|mut room| {
				room.events.clear();
				(room.id, room)
			})
			.collect();
		self.last_updated = Local::now().naive_local();
		debug!(rooms = self.rooms.len(), "room registry rebuilt");
		self.save()
	}

	/// Wholesale event rebuild for one day: clears EVERY room's slots,
	/// then assigns each fetched event to its owning room. Events whose
	/// room id is not in the registry are dropped. Persists.
	pub fn rebuild_events(&mut self, events: impl IntoIterator<Item = (u32, EventSlot)>) -> Result<()> {
		for room in self.rooms.values_mut() {
			room.events.clear();
		}
		for (room_id, slot) in events {
			match self.rooms.get_mut(&room_id) {
				Some(room) => room.events.push(slot),
				None => debug!(room_id, "event for unknown room, dropping"),
			}
		}
		self.save()
	}

	/// Clears the persisted registry to the empty baseline. Used when the
	/// session is invalid and the cached data's provenance is unknown.
	pub fn reset(&mut self) -> Result<()> {
		self.rooms.clear();
		self.last_updated = Local::now().naive_local();
		self.save()
	}

	fn save(&self) -> Result<()> {
		store::save_json(&self.path, self)
	}
}
