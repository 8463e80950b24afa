use std::path::PathBuf;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use clap::Parser;

use raumwart::availability::RoomChoice;

#[derive(Parser, Debug)]
#[command(name = "raumwart")]
#[command(about = "Finds and books a free room in the Zeitwart facility portal")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Portal username
	#[arg(short, long)]
	pub user: String,

	/// Portal password
	#[arg(short, long)]
	pub password: String,

	/// Re-fetch static room data after this many days
	#[arg(short = 'i', long, default_value_t = 7, value_name = "DAYS")]
	pub update_interval: i64,

	/// Book this many days ahead of the given date
	#[arg(short = 'b', long, default_value_t = 0, value_name = "DAYS")]
	pub booking_interval: i64,

	/// Target date (ISO, default today)
	#[arg(short, long, default_value_t = Local::now().date_naive())]
	pub date: NaiveDate,

	/// Target time (HH:MM or HH:MM:SS, default now)
	#[arg(short, long, value_parser = parse_clock, default_value_t = Local::now().time())]
	pub time: NaiveTime,

	/// Book any free room seating at least this many
	#[arg(short, long, default_value_t = 1, group = "room_choice", value_name = "SEATS")]
	pub min_seats: u32,

	/// Book the room with this number (display-name suffix)
	#[arg(short, long, group = "room_choice", value_name = "NUMBER")]
	pub room_number: Option<u32>,

	/// Portal base URL
	#[arg(long, default_value = raumwart::api::DEFAULT_BASE_URL, value_name = "URL")]
	pub base_url: String,

	/// Directory for persisted state (defaults to XDG config/cache dirs)
	#[arg(long, value_name = "DIR")]
	pub data_dir: Option<PathBuf>,

	/// Run the login browser with a visible window
	#[arg(long)]
	pub headed: bool,

	/// Seconds to wait at each login checkpoint
	#[arg(long, default_value_t = 10, value_name = "SECS")]
	pub login_timeout: u64,
}

impl Cli {
	/// Target datetime of the booking: date + time, shifted by the
	/// look-ahead offset.
	pub fn booking_datetime(&self) -> NaiveDateTime {
		self.date.and_time(self.time) + Duration::days(self.booking_interval)
	}

	pub fn choice(&self) -> RoomChoice {
		match self.room_number {
			Some(number) => RoomChoice::Number(number),
			None => RoomChoice::MinSeats(self.min_seats),
		}
	}
}

fn parse_clock(raw: &str) -> Result<NaiveTime, String> {
	for format in ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"] {
		if let Ok(time) = NaiveTime::parse_from_str(raw, format) {
			return Ok(time);
		}
	}
	Err(format!("invalid time {raw:?}, expected HH:MM or HH:MM:SS"))
}
