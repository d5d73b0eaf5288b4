use std::time::{SystemTime, UNIX_EPOCH};

pub fn unix_now_nanos() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system time before unix epoch").as_nanos() as u64
}

pub fn unix_now_millis() -> u64 {
    unix_now_nanos() / 1_000_000
}
