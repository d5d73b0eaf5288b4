use crate::{AsId, BwCls, SegmentId, Tick};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Live indices per reservation are bounded by the 4-bit index number space.
pub const MAX_INDICES: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error("index {0} not found")]
    IndexNotFound(IndexNumber),
    #[error("index {0} is not confirmed")]
    IndexNotConfirmed(IndexNumber),
    #[error("index {0} is not pending")]
    IndexNotPending(IndexNumber),
    #[error("reservation already holds {MAX_INDICES} indices")]
    TooManyIndices,
    #[error("allocated class {alloc} exceeds maximum class {max}")]
    AllocAboveMax { alloc: BwCls, max: BwCls },
}

/// 4-bit index number, advancing mod 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IndexNumber(u8);

impl IndexNumber {
    pub fn new(v: u8) -> Self {
        Self(v % 16)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn next(self) -> Self {
        Self((self.0 + 1) % 16)
    }
}

impl Display for IndexNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Pending,
    Confirmed,
    Active,
}

/// A versioned bandwidth allocation inside a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationIndex {
    pub idx: IndexNumber,
    pub expiration: Tick,
    pub min_bw: BwCls,
    pub max_bw: BwCls,
    pub alloc_bw: BwCls,
    pub state: IndexState,
}

impl ReservationIndex {
    /// Allocated bandwidth counts against interface usage once the index is
    /// confirmed or active.
    pub fn blocks_bandwidth(&self) -> bool {
        matches!(self.state, IndexState::Confirmed | IndexState::Active)
    }
}

/// End-point properties of the reservation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathEndProps(u8);

impl PathEndProps {
    pub const START_LOCAL: u8 = 0x01;
    pub const START_TRANSFER: u8 = 0x02;
    pub const END_LOCAL: u8 = 0x10;
    pub const END_TRANSFER: u8 = 0x20;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn start_local(self) -> bool {
        self.0 & Self::START_LOCAL != 0
    }

    pub fn end_local(self) -> bool {
        self.0 & Self::END_LOCAL != 0
    }
}

/// Traffic split class between control and data plane usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SplitCls(pub u8);

/// Request latency class of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RlcCls(pub u8);

/// One AS hop of the reservation path as seen from the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub as_id: AsId,
    pub ingress: u16,
    pub egress: u16,
}

/// A segment reservation at a transit AS: the interface pair it crosses plus
/// its ordered index sequence. Index invariants (numbering, single active
/// index, alloc <= max) are enforced by the mutating methods, which is why
/// `indices` is private.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: SegmentId,
    pub ingress: u16,
    pub egress: u16,
    pub path: Vec<PathStep>,
    pub end_props: PathEndProps,
    pub traffic_split: SplitCls,
    indices: Vec<ReservationIndex>,
}

impl Reservation {
    pub fn new(id: SegmentId, ingress: u16, egress: u16) -> Self {
        Self { id, ingress, egress, path: Vec::new(), end_props: PathEndProps::default(), traffic_split: SplitCls(0), indices: Vec::new() }
    }

    pub fn indices(&self) -> &[ReservationIndex] {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The destination AS, taken from the last path step when known.
    pub fn dst_as(&self) -> Option<AsId> {
        self.path.last().map(|s| s.as_id)
    }

    fn next_index_number(&self) -> IndexNumber {
        self.indices.last().map(|i| i.idx.next()).unwrap_or_default()
    }

    /// Appends a new pending index with the next index number.
    pub fn add_index(&mut self, expiration: Tick, min_bw: BwCls, max_bw: BwCls, alloc_bw: BwCls) -> Result<IndexNumber, ReservationError> {
        if self.indices.len() >= MAX_INDICES {
            return Err(ReservationError::TooManyIndices);
        }
        if alloc_bw > max_bw {
            return Err(ReservationError::AllocAboveMax { alloc: alloc_bw, max: max_bw });
        }
        let idx = self.next_index_number();
        self.indices.push(ReservationIndex { idx, expiration, min_bw, max_bw, alloc_bw, state: IndexState::Pending });
        Ok(idx)
    }

    fn position(&self, idx: IndexNumber) -> Result<usize, ReservationError> {
        self.indices.iter().position(|i| i.idx == idx).ok_or(ReservationError::IndexNotFound(idx))
    }

    pub fn set_index_confirmed(&mut self, idx: IndexNumber) -> Result<(), ReservationError> {
        let pos = self.position(idx)?;
        if self.indices[pos].state != IndexState::Pending {
            return Err(ReservationError::IndexNotPending(idx));
        }
        self.indices[pos].state = IndexState::Confirmed;
        Ok(())
    }

    /// Activates a confirmed index. All older indices are dropped, which
    /// keeps at most one index active at any time.
    pub fn set_index_active(&mut self, idx: IndexNumber) -> Result<(), ReservationError> {
        let pos = self.position(idx)?;
        if self.indices[pos].state != IndexState::Confirmed {
            return Err(ReservationError::IndexNotConfirmed(idx));
        }
        self.indices[pos].state = IndexState::Active;
        self.indices.drain(..pos);
        Ok(())
    }

    pub fn active_index(&self) -> Option<&ReservationIndex> {
        self.indices.iter().find(|i| i.state == IndexState::Active)
    }

    /// Drops indices that expired before `now`. Returns how many were removed.
    pub fn remove_expired(&mut self, now: Tick) -> usize {
        let before = self.indices.len();
        self.indices.retain(|i| i.expiration >= now);
        before - self.indices.len()
    }

    /// Largest requested bandwidth over all indices, in kbps.
    pub fn max_requested_bw(&self) -> u64 {
        self.indices.iter().map(|i| i.max_bw.to_kbps()).max().unwrap_or(0)
    }

    /// Largest bandwidth blocked on the interfaces, in kbps: the maximum
    /// allocation over active and confirmed indices.
    pub fn max_blocked_bw(&self) -> u64 {
        self.indices.iter().filter(|i| i.blocks_bandwidth()).map(|i| i.alloc_bw.to_kbps()).max().unwrap_or(0)
    }
}
