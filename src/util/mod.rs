mod time;

pub use time::{LOG_TIME_FORMAT, format_local, local_rfc3339, now_local};
