//! Creation and verification of the 64-bit reservation packet timestamp.
//!
//! The upper half carries `ts_rel`, the send time in 4 ns steps relative to
//! the start of the 16 second window preceding the expiration tick. The
//! lower half is a packet id, either a flat counter or a core id with a
//! 24-bit per-core counter.

use colibri_base::{time, Tick};
use thiserror::Error;

/// Window before the expiration in which packets can be sent.
const SEND_WINDOW_NANOS: u64 = 16_000_000_000;
/// Granularity of `ts_rel` in nanoseconds.
const TS_REL_UNIT_NANOS: u64 = 4;

pub const DEFAULT_PACKET_LIFETIME_MS: u64 = 2000;
pub const DEFAULT_CLOCK_SKEW_MS: u64 = 1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("expiration tick {0} lies in the past")]
    Expired(Tick),
    #[error("expiration tick {0} lies more than 16s in the future")]
    TooFarInFuture(Tick),
}

pub fn pack_timestamp(ts_rel: u32, pck_id: u32) -> u64 {
    (ts_rel as u64) << 32 | pck_id as u64
}

/// Packet id variant carrying the sending core and a 24-bit counter.
pub fn pack_timestamp_core(ts_rel: u32, core_id: u8, core_counter: u32) -> u64 {
    pack_timestamp(ts_rel, (core_id as u32) << 24 | (core_counter & 0x00ff_ffff))
}

pub fn unpack_timestamp(packet_timestamp: u64) -> (u32, u8, u32) {
    let ts_rel = (packet_timestamp >> 32) as u32;
    let pck_id = packet_timestamp as u32;
    (ts_rel, (pck_id >> 24) as u8, pck_id & 0x00ff_ffff)
}

/// Start of the send window for an expiration tick.
fn window_base_nanos(exp_tick: Tick) -> u64 {
    exp_tick.to_unix_nanos().saturating_sub(SEND_WINDOW_NANOS)
}

/// Encodes `now` as an offset into the send window of `exp_tick`.
pub fn create_ts_rel_at(exp_tick: Tick, now_nanos: u64) -> Result<u32, TimestampError> {
    let expiration = exp_tick.to_unix_nanos();
    if now_nanos > expiration {
        return Err(TimestampError::Expired(exp_tick));
    }
    let base = window_base_nanos(exp_tick);
    if now_nanos < base {
        return Err(TimestampError::TooFarInFuture(exp_tick));
    }
    let diff = (now_nanos - base) / TS_REL_UNIT_NANOS;
    Ok(diff.saturating_sub(1) as u32)
}

pub fn create_ts_rel(exp_tick: Tick) -> Result<u32, TimestampError> {
    create_ts_rel_at(exp_tick, time::unix_now_nanos())
}

/// The send time encoded by an expiration tick and packet timestamp, in
/// milliseconds since the Unix epoch.
pub fn sender_time_millis(exp_tick: Tick, packet_timestamp: u64) -> u64 {
    let (ts_rel, _, _) = unpack_timestamp(packet_timestamp);
    (window_base_nanos(exp_tick) + (1 + ts_rel as u64) * TS_REL_UNIT_NANOS) / 1_000_000
}

/// A packet is fresh while its send time is no older than the packet
/// lifetime and no newer than the clock skew allows.
pub fn verify_timestamp_at(exp_tick: Tick, packet_timestamp: u64, now_millis: u64, lifetime_ms: u64, skew_ms: u64) -> bool {
    let sender_ms = sender_time_millis(exp_tick, packet_timestamp);
    now_millis >= sender_ms.saturating_sub(skew_ms) && now_millis <= sender_ms + lifetime_ms + skew_ms
}

pub fn verify_timestamp(exp_tick: Tick, packet_timestamp: u64, lifetime_ms: u64, skew_ms: u64) -> bool {
    verify_timestamp_at(exp_tick, packet_timestamp, time::unix_now_millis(), lifetime_ms, skew_ms)
}
