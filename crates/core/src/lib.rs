//! Core logic for raumwart, a booking assistant for the Zeitwart
//! facility-management portal: persisted session credentials, a cached room
//! registry, interval-based availability computation and the booking
//! workflow that ties them together.
//!
//! Network access goes through the [`api::Portal`] seam and fresh logins
//! through [`auth::LoginFlow`], so everything above them is testable
//! without a portal or a browser.

pub mod api;
pub mod auth;
pub mod availability;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod room;
pub mod store;
pub mod workflow;

pub use error::{Error, Result};
