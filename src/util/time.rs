use chrono::{DateTime, Local, Utc};

pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

pub fn now_local() -> DateTime<Local> {
    Local::now()
}

pub fn format_local(time: &DateTime<Local>, pattern: &str) -> String {
    time.format(pattern).to_string()
}

/// 状态接口里使用的 RFC 3339 本地时间
pub fn local_rfc3339(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).to_rfc3339()
}
