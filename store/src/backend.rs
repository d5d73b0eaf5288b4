use async_trait::async_trait;
use colibri_base::{AsId, PathStep, Reservation, ReservationError, SegmentId, Tick};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("reservation {0} not found")]
    NotFound(SegmentId),
    #[error("suffix space exhausted for source {0}")]
    SuffixExhausted(AsId),
    #[error("transaction already finished")]
    TransactionFinished,
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),
    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

/// `srcDem` and `srcAlloc` for one (source, ingress, egress) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceState {
    pub src_dem: u64,
    pub src_alloc: u64,
}

/// Operations available to the AS that originates a reservation.
#[async_trait]
pub trait ReserverStore {
    /// All reservations starting at `src` and ending at `dst`.
    async fn rsvs_from_src_dst(&self, token: &CancellationToken, src: AsId, dst: AsId) -> Result<Vec<Reservation>, StoreError>;

    /// The reservation following exactly this path, if any.
    async fn rsv_from_path(&self, token: &CancellationToken, path: &[PathStep]) -> Result<Option<Reservation>, StoreError>;

    /// Stores `rsv` under a fresh, unused suffix and returns the assigned id.
    async fn new_rsv(&self, token: &CancellationToken, rsv: Reservation) -> Result<SegmentId, StoreError>;
}

/// Operations available to an AS that only transits reservations.
#[async_trait]
pub trait TransitStore {
    async fn all_rsvs(&self, token: &CancellationToken) -> Result<Vec<Reservation>, StoreError>;

    /// Reservations entering at `ingress` and leaving at `egress`; a `None`
    /// side matches any interface.
    async fn rsvs_from_if_pair(
        &self,
        token: &CancellationToken,
        ingress: Option<u16>,
        egress: Option<u16>,
    ) -> Result<Vec<Reservation>, StoreError>;
}

/// Operations shared by reserver and transit roles.
#[async_trait]
pub trait CommonStore {
    async fn rsv_from_id(&self, token: &CancellationToken, id: &SegmentId) -> Result<Option<Reservation>, StoreError>;

    /// Upserts the reservation. Aggregates are brought in sync within the
    /// same transaction.
    async fn persist_rsv(&self, token: &CancellationToken, rsv: &Reservation) -> Result<(), StoreError>;

    async fn delete_rsv(&self, token: &CancellationToken, id: &SegmentId) -> Result<(), StoreError>;

    /// Drops indices expired before `now` and returns how many were removed.
    /// A reservation left without indices is deleted.
    async fn delete_expired_indices(&self, token: &CancellationToken, now: Tick) -> Result<usize, StoreError>;
}

/// Read access to the aggregate tables kept in sync with the reservations.
/// These are what make admission O(1) in the number of reservations.
#[async_trait]
pub trait AggregateStore {
    /// Total bandwidth blocked on an ingress interface, in kbps.
    async fn usage_ingress(&self, token: &CancellationToken, ifid: u16) -> Result<u64, StoreError>;

    /// Total bandwidth blocked on an egress interface, in kbps.
    async fn usage_egress(&self, token: &CancellationToken, ifid: u16) -> Result<u64, StoreError>;

    async fn source_state(&self, token: &CancellationToken, src: AsId, ingress: u16, egress: u16)
        -> Result<SourceState, StoreError>;

    /// Capped requested demand of `src` entering at `ingress`, summed over
    /// egress interfaces.
    async fn in_demand(&self, token: &CancellationToken, src: AsId, ingress: u16) -> Result<u64, StoreError>;

    /// Capped requested demand of `src` leaving at `egress`, summed over
    /// ingress interfaces.
    async fn eg_demand(&self, token: &CancellationToken, src: AsId, egress: u16) -> Result<u64, StoreError>;

    /// Adjusted transit demand between the interface pair.
    async fn transit_demand(&self, token: &CancellationToken, ingress: u16, egress: u16) -> Result<u64, StoreError>;

    /// Scaled transit allocation between the interface pair, the denominator
    /// of the link ratio.
    async fn transit_alloc(&self, token: &CancellationToken, ingress: u16, egress: u16) -> Result<u64, StoreError>;
}

/// The full storage surface of a COLIBRI service.
pub trait ColibriStorage: ReserverStore + TransitStore + CommonStore + AggregateStore + Send + Sync {}

impl<T: ReserverStore + TransitStore + CommonStore + AggregateStore + Send + Sync> ColibriStorage for T {}

/// A transaction over the storage with snapshot isolation: reads observe the
/// state at `begin_transaction`, writes become visible atomically at commit.
#[async_trait]
pub trait StoreTransaction: ColibriStorage {
    async fn commit(self: Box<Self>, token: &CancellationToken) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// A reservation backend. Direct calls are single-operation transactions.
#[async_trait]
pub trait ReservationDb: ColibriStorage {
    async fn begin_transaction(&self, token: &CancellationToken) -> Result<Box<dyn StoreTransaction>, StoreError>;
}
