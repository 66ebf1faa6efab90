//! Wall-clock helpers
//!
//! All persisted records carry UTC timestamps. Run identifiers embed a
//! compact, sortable rendering of the run's start time.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use sim_records::format_run_timestamp;
//!
//! let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
//! assert_eq!(format_run_timestamp(&ts), "2024_01_01-12:00:00");
//! ```

use chrono::{DateTime, Utc};

/// Layout used when a timestamp is embedded in an identifier.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y_%m_%d-%H:%M:%S";

/// Current UTC time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Renders a timestamp in [`RUN_TIMESTAMP_FORMAT`].
pub fn format_run_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(RUN_TIMESTAMP_FORMAT).to_string()
}
