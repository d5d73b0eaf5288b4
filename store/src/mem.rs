//! In-memory reservation backend. Transactions clone the state and swap it
//! back on commit, which gives readers snapshot isolation without any
//! fine-grained locking: they observe either the pre- or the post-state.

use crate::aggregate::AggregateTables;
use crate::backend::{
    AggregateStore, CommonStore, ReservationDb, ReserverStore, SourceState, StoreError, StoreTransaction, TransitStore,
};
use async_trait::async_trait;
use colibri_base::{AsId, Capacities, PathStep, Reservation, SegmentId, Tick};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn ensure_live(token: &CancellationToken) -> Result<(), StoreError> {
    if token.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    rsvs: BTreeMap<SegmentId, Reservation>,
    aggr: AggregateTables,
    next_suffix: u32,
}

impl StoreState {
    fn from_src_dst(&self, src: AsId, dst: AsId) -> Vec<Reservation> {
        self.rsvs.values().filter(|r| r.id.src == src && r.dst_as() == Some(dst)).cloned().collect()
    }

    fn from_path(&self, path: &[PathStep]) -> Option<Reservation> {
        self.rsvs.values().find(|r| !r.path.is_empty() && r.path == path).cloned()
    }

    fn from_if_pair(&self, ingress: Option<u16>, egress: Option<u16>) -> Vec<Reservation> {
        self.rsvs
            .values()
            .filter(|r| ingress.map(|i| r.ingress == i).unwrap_or(true) && egress.map(|e| r.egress == e).unwrap_or(true))
            .cloned()
            .collect()
    }

    fn persist(&mut self, caps: &dyn Capacities, rsv: &Reservation) {
        if rsv.is_empty() {
            self.delete(caps, &rsv.id);
            return;
        }
        let old = self.rsvs.get(&rsv.id).cloned();
        self.aggr.update(old.as_ref(), Some(rsv), caps);
        self.rsvs.insert(rsv.id, rsv.clone());
    }

    fn delete(&mut self, caps: &dyn Capacities, id: &SegmentId) {
        if let Some(old) = self.rsvs.remove(id) {
            self.aggr.update(Some(&old), None, caps);
        }
    }

    fn delete_expired(&mut self, caps: &dyn Capacities, now: Tick) -> usize {
        let ids: Vec<SegmentId> = self.rsvs.keys().copied().collect();
        let mut removed = 0;
        for id in ids {
            let Some(mut rsv) = self.rsvs.get(&id).cloned() else { continue };
            let n = rsv.remove_expired(now);
            if n == 0 {
                continue;
            }
            removed += n;
            self.persist(caps, &rsv);
        }
        removed
    }

    fn free_suffix(&mut self, src: AsId) -> Result<[u8; 4], StoreError> {
        let start = self.next_suffix;
        loop {
            let suffix = self.next_suffix.to_be_bytes();
            self.next_suffix = self.next_suffix.wrapping_add(1);
            if !self.rsvs.contains_key(&SegmentId::new(src, suffix)) {
                return Ok(suffix);
            }
            if self.next_suffix == start {
                return Err(StoreError::SuffixExhausted(src));
            }
        }
    }

    fn new_rsv(&mut self, caps: &dyn Capacities, mut rsv: Reservation) -> Result<SegmentId, StoreError> {
        rsv.id.suffix = self.free_suffix(rsv.id.src)?;
        self.persist(caps, &rsv);
        Ok(rsv.id)
    }

}

/// Shared in-memory backend.
#[derive(Clone)]
pub struct MemStore {
    caps: Arc<dyn Capacities>,
    state: Arc<RwLock<StoreState>>,
}

impl MemStore {
    pub fn new(caps: Arc<dyn Capacities>) -> Self {
        Self { caps, state: Arc::new(RwLock::new(StoreState::default())) }
    }

    /// Rederives every aggregate table from the reservation set. Test hook
    /// for the consistency invariant.
    pub fn rederived_aggregates_match(&self) -> bool {
        let state = self.state.read();
        state.aggr == AggregateTables::derive(state.rsvs.values(), self.caps.as_ref())
    }

    pub fn reservation_count(&self) -> usize {
        self.state.read().rsvs.len()
    }
}

#[async_trait]
impl ReserverStore for MemStore {
    async fn rsvs_from_src_dst(&self, token: &CancellationToken, src: AsId, dst: AsId) -> Result<Vec<Reservation>, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().from_src_dst(src, dst))
    }

    async fn rsv_from_path(&self, token: &CancellationToken, path: &[PathStep]) -> Result<Option<Reservation>, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().from_path(path))
    }

    async fn new_rsv(&self, token: &CancellationToken, rsv: Reservation) -> Result<SegmentId, StoreError> {
        ensure_live(token)?;
        let id = self.state.write().new_rsv(self.caps.as_ref(), rsv)?;
        debug!("store.event=new_rsv id={id}");
        Ok(id)
    }
}

#[async_trait]
impl TransitStore for MemStore {
    async fn all_rsvs(&self, token: &CancellationToken) -> Result<Vec<Reservation>, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().rsvs.values().cloned().collect())
    }

    async fn rsvs_from_if_pair(
        &self,
        token: &CancellationToken,
        ingress: Option<u16>,
        egress: Option<u16>,
    ) -> Result<Vec<Reservation>, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().from_if_pair(ingress, egress))
    }
}

#[async_trait]
impl CommonStore for MemStore {
    async fn rsv_from_id(&self, token: &CancellationToken, id: &SegmentId) -> Result<Option<Reservation>, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().rsvs.get(id).cloned())
    }

    async fn persist_rsv(&self, token: &CancellationToken, rsv: &Reservation) -> Result<(), StoreError> {
        ensure_live(token)?;
        self.state.write().persist(self.caps.as_ref(), rsv);
        Ok(())
    }

    async fn delete_rsv(&self, token: &CancellationToken, id: &SegmentId) -> Result<(), StoreError> {
        ensure_live(token)?;
        self.state.write().delete(self.caps.as_ref(), id);
        Ok(())
    }

    async fn delete_expired_indices(&self, token: &CancellationToken, now: Tick) -> Result<usize, StoreError> {
        ensure_live(token)?;
        let removed = self.state.write().delete_expired(self.caps.as_ref(), now);
        if removed > 0 {
            debug!("store.event=expired_indices removed={removed} now_tick={now}");
        }
        Ok(removed)
    }
}

#[async_trait]
impl AggregateStore for MemStore {
    async fn usage_ingress(&self, token: &CancellationToken, ifid: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().aggr.usage_in.get(&ifid).copied().unwrap_or(0))
    }

    async fn usage_egress(&self, token: &CancellationToken, ifid: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().aggr.usage_eg.get(&ifid).copied().unwrap_or(0))
    }

    async fn source_state(
        &self,
        token: &CancellationToken,
        src: AsId,
        ingress: u16,
        egress: u16,
    ) -> Result<SourceState, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().aggr.src_state.get(&(src, ingress, egress)).copied().unwrap_or_default())
    }

    async fn in_demand(&self, token: &CancellationToken, src: AsId, ingress: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().aggr.in_dem.get(&(src, ingress)).copied().unwrap_or(0))
    }

    async fn eg_demand(&self, token: &CancellationToken, src: AsId, egress: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().aggr.eg_dem.get(&(src, egress)).copied().unwrap_or(0))
    }

    async fn transit_demand(&self, token: &CancellationToken, ingress: u16, egress: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().aggr.transit_dem.get(&(ingress, egress)).copied().unwrap_or(0))
    }

    async fn transit_alloc(&self, token: &CancellationToken, ingress: u16, egress: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        Ok(self.state.read().aggr.transit_alloc.get(&(ingress, egress)).copied().unwrap_or(0))
    }
}

#[async_trait]
impl ReservationDb for MemStore {
    async fn begin_transaction(&self, token: &CancellationToken) -> Result<Box<dyn StoreTransaction>, StoreError> {
        ensure_live(token)?;
        let snapshot = self.state.read().clone();
        Ok(Box::new(MemTransaction { caps: self.caps.clone(), shared: self.state.clone(), working: Mutex::new(Some(snapshot)) }))
    }
}

/// A snapshot-isolated transaction over a [`MemStore`].
pub struct MemTransaction {
    caps: Arc<dyn Capacities>,
    shared: Arc<RwLock<StoreState>>,
    working: Mutex<Option<StoreState>>,
}

impl MemTransaction {
    fn with_state<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T, StoreError> {
        let guard = self.working.lock();
        guard.as_ref().map(f).ok_or(StoreError::TransactionFinished)
    }

    fn with_state_mut<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> Result<T, StoreError> {
        let mut guard = self.working.lock();
        guard.as_mut().map(f).ok_or(StoreError::TransactionFinished)
    }
}

#[async_trait]
impl ReserverStore for MemTransaction {
    async fn rsvs_from_src_dst(&self, token: &CancellationToken, src: AsId, dst: AsId) -> Result<Vec<Reservation>, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.from_src_dst(src, dst))
    }

    async fn rsv_from_path(&self, token: &CancellationToken, path: &[PathStep]) -> Result<Option<Reservation>, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.from_path(path))
    }

    async fn new_rsv(&self, token: &CancellationToken, rsv: Reservation) -> Result<SegmentId, StoreError> {
        ensure_live(token)?;
        self.with_state_mut(|s| s.new_rsv(self.caps.as_ref(), rsv))?
    }
}

#[async_trait]
impl TransitStore for MemTransaction {
    async fn all_rsvs(&self, token: &CancellationToken) -> Result<Vec<Reservation>, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.rsvs.values().cloned().collect())
    }

    async fn rsvs_from_if_pair(
        &self,
        token: &CancellationToken,
        ingress: Option<u16>,
        egress: Option<u16>,
    ) -> Result<Vec<Reservation>, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.from_if_pair(ingress, egress))
    }
}

#[async_trait]
impl CommonStore for MemTransaction {
    async fn rsv_from_id(&self, token: &CancellationToken, id: &SegmentId) -> Result<Option<Reservation>, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.rsvs.get(id).cloned())
    }

    async fn persist_rsv(&self, token: &CancellationToken, rsv: &Reservation) -> Result<(), StoreError> {
        ensure_live(token)?;
        self.with_state_mut(|s| s.persist(self.caps.as_ref(), rsv))
    }

    async fn delete_rsv(&self, token: &CancellationToken, id: &SegmentId) -> Result<(), StoreError> {
        ensure_live(token)?;
        self.with_state_mut(|s| s.delete(self.caps.as_ref(), id))
    }

    async fn delete_expired_indices(&self, token: &CancellationToken, now: Tick) -> Result<usize, StoreError> {
        ensure_live(token)?;
        self.with_state_mut(|s| s.delete_expired(self.caps.as_ref(), now))
    }
}

#[async_trait]
impl AggregateStore for MemTransaction {
    async fn usage_ingress(&self, token: &CancellationToken, ifid: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.aggr.usage_in.get(&ifid).copied().unwrap_or(0))
    }

    async fn usage_egress(&self, token: &CancellationToken, ifid: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.aggr.usage_eg.get(&ifid).copied().unwrap_or(0))
    }

    async fn source_state(
        &self,
        token: &CancellationToken,
        src: AsId,
        ingress: u16,
        egress: u16,
    ) -> Result<SourceState, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.aggr.src_state.get(&(src, ingress, egress)).copied().unwrap_or_default())
    }

    async fn in_demand(&self, token: &CancellationToken, src: AsId, ingress: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.aggr.in_dem.get(&(src, ingress)).copied().unwrap_or(0))
    }

    async fn eg_demand(&self, token: &CancellationToken, src: AsId, egress: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.aggr.eg_dem.get(&(src, egress)).copied().unwrap_or(0))
    }

    async fn transit_demand(&self, token: &CancellationToken, ingress: u16, egress: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.aggr.transit_dem.get(&(ingress, egress)).copied().unwrap_or(0))
    }

    async fn transit_alloc(&self, token: &CancellationToken, ingress: u16, egress: u16) -> Result<u64, StoreError> {
        ensure_live(token)?;
        self.with_state(|s| s.aggr.transit_alloc.get(&(ingress, egress)).copied().unwrap_or(0))
    }
}

#[async_trait]
impl StoreTransaction for MemTransaction {
    async fn commit(self: Box<Self>, token: &CancellationToken) -> Result<(), StoreError> {
        ensure_live(token)?;
        let state = self.working.lock().take().ok_or(StoreError::TransactionFinished)?;
        *self.shared.write() = state;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.working.lock().take().ok_or(StoreError::TransactionFinished)?;
        Ok(())
    }
}
