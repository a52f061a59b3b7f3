//! Small shared helpers for the MRAudio workspace.
//!
//! Nothing in here knows about zones, queues, or outputs. The crate exists
//! so that leaf crates do not grow copies of the same three helpers.

mod net;
mod time;
mod token;

pub use net::guess_local_ip;
pub use time::{format_hhmmss, ms_to_seconds, parse_time_flexible, seconds_to_ms};
pub use token::TokenCounter;
