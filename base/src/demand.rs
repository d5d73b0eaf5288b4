//! Shared demand algebra used by both the aggregate maintenance in the store
//! and the admission engines. Keeping the rounding in one place is what makes
//! the aggregate-driven and the reservation-iterating computations agree
//! exactly.

use crate::{Capacities, Reservation};

/// Capped requested demand of a reservation: its maximum requested bandwidth
/// bounded by the capacities of the interfaces it crosses.
pub fn cap_req_dem(rsv: &Reservation, caps: &dyn Capacities) -> u64 {
    rsv.max_requested_bw().min(caps.capacity_ingress(rsv.ingress)).min(caps.capacity_egress(rsv.egress))
}

/// Saturating scaling factor `min(cap, dem) / dem`, or 1 when there is no
/// demand. Always in (0, 1].
pub fn scal_fctr(cap: u64, dem: u64) -> f64 {
    if dem == 0 {
        1.0
    } else {
        cap.min(dem) as f64 / dem as f64
    }
}

/// A source's contribution to the transit demand between one interface pair:
/// its source demand scaled by the smaller of the two interface factors,
/// rounded to whole kbps.
pub fn scaled_src_dem(in_scal: f64, eg_scal: f64, src_dem: u64) -> u64 {
    (in_scal.min(eg_scal) * src_dem as f64).round() as u64
}

/// A source's contribution to the transit allocation between one interface
/// pair, rounded to whole kbps.
pub fn scaled_src_alloc(eg_scal: f64, src_alloc: u64) -> u64 {
    (eg_scal * src_alloc as f64).round() as u64
}
