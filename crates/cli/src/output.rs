//! Human-facing output, kept in the portal's language like the original
//! frontend.

use chrono::NaiveDateTime;
use colored::Colorize;

use raumwart::availability::BookingPlan;
use raumwart::room::Room;

pub const NO_ROOM_AVAILABLE: &str = "Kein Raum verfügbar";

pub fn print_available(rooms: &[&Room], at: NaiveDateTime) {
	println!("{}", "Verfügbare Räume:".bold());
	for room in rooms {
		print_room(room, at);
	}
}

pub fn print_chosen(room: &Room, at: NaiveDateTime) {
	println!("{}", "Ausgewählter Raum:".bold());
	print_room(room, at);
}

fn print_room(room: &Room, at: NaiveDateTime) {
	println!(
		"{:>2} : {} frei bis {} | {}",
		room.id,
		room.name,
		room.next_boundary(at).format("%H:%M"),
		room.description
	);
}

pub fn print_plan(plan: &BookingPlan) {
	println!("Datum: {}", plan.start.date());
	println!("Startzeit: {}", plan.start.format("%H:%M"));
	println!("Endzeit: {}", plan.end.format("%H:%M"));
}
