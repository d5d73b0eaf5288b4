use crate::time;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Nanoseconds per expiration tick (4 seconds).
pub const TICK_NANOS: u64 = 4_000_000_000;

/// An absolute expiration time in units of 4 seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Tick(pub u32);

impl Tick {
    pub fn value(self) -> u32 {
        self.0
    }

    /// The tick containing the given instant.
    pub fn from_unix_nanos(nanos: u64) -> Self {
        Self((nanos / TICK_NANOS) as u32)
    }

    pub fn now() -> Self {
        Self::from_unix_nanos(time::unix_now_nanos())
    }

    /// Start of the tick, i.e. the instant the reservation expires.
    pub fn to_unix_nanos(self) -> u64 {
        self.0 as u64 * TICK_NANOS
    }

    pub fn to_unix_millis(self) -> u64 {
        self.to_unix_nanos() / 1_000_000
    }

    /// A reservation carrying this tick is valid while `now <= expiration`.
    pub fn is_expired_at(self, now_nanos: u64) -> bool {
        now_nanos > self.to_unix_nanos()
    }

    pub fn is_expired(self) -> bool {
        self.is_expired_at(time::unix_now_nanos())
    }

    pub fn plus(self, ticks: u32) -> Self {
        Self(self.0.saturating_add(ticks))
    }
}

impl Display for Tick {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
