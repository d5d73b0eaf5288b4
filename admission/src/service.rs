//! Control-plane entry point for segment setup requests: runs admission and,
//! on success, commits the granted index to the store in one transaction.

use crate::{Admitter, AdmissionError};
use colibri_base::{AllocationBead, IndexNumber, Reservation, ReservationError, SegmentId, SetupRequest, Tick};
use colibri_store::{CommonStore, ReservationDb, StoreError, StoreTransaction};
use log::{debug, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct SetupService<D> {
    db: Arc<D>,
    admitter: Arc<dyn Admitter>,
}

impl<D: ReservationDb> SetupService<D> {
    pub fn new(db: Arc<D>, admitter: Arc<dyn Admitter>) -> Self {
        Self { db, admitter }
    }

    /// Admits a segment setup request and, when granted, persists the new
    /// pending index (creating the reservation if this id is unknown) in the
    /// same transaction. Denial and store failures leave the store unchanged.
    pub async fn admit_segment_reservation(
        &self,
        token: &CancellationToken,
        req: &mut SetupRequest,
        expiration: Tick,
    ) -> Result<AllocationBead, AdmissionError> {
        let id = req.id;
        let map_err = move |op| AdmissionError::storage(id, op);
        let tx = self.db.begin_transaction(token).await.map_err(map_err("begin_transaction"))?;

        let bead = match self.admitter.admit(token, tx.as_ref(), req).await {
            Ok(bead) => bead,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        };

        let result = Self::commit_index(token, tx.as_ref(), req, expiration, bead).await;
        match result {
            Ok(()) => {
                tx.commit(token).await.map_err(map_err("commit"))?;
                info!("admission.event=committed id={} alloc={} max={}", req.id, bead.alloc, bead.max);
                Ok(bead)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(map_err("persist_rsv")(err))
            }
        }
    }

    async fn commit_index(
        token: &CancellationToken,
        tx: &dyn StoreTransaction,
        req: &SetupRequest,
        expiration: Tick,
        bead: AllocationBead,
    ) -> Result<(), StoreError> {
        let mut rsv = match tx.rsv_from_id(token, &req.id).await? {
            Some(rsv) => rsv,
            None => {
                let mut rsv = Reservation::new(req.id, req.ingress, req.egress);
                rsv.traffic_split = req.split_cls;
                rsv.end_props = req.path_props;
                rsv
            }
        };
        rsv.add_index(expiration, req.min_bw, bead.max, bead.alloc)?;
        tx.persist_rsv(token, &rsv).await
    }

    /// Confirms a pending index once the setup response travelled back.
    pub async fn confirm_segment_index(
        &self,
        token: &CancellationToken,
        id: &SegmentId,
        idx: IndexNumber,
    ) -> Result<(), StoreError> {
        self.mutate_reservation(token, id, |rsv| rsv.set_index_confirmed(idx)).await
    }

    /// Activates a confirmed index; older indices are dropped by the
    /// reservation itself.
    pub async fn activate_segment_index(
        &self,
        token: &CancellationToken,
        id: &SegmentId,
        idx: IndexNumber,
    ) -> Result<(), StoreError> {
        self.mutate_reservation(token, id, |rsv| rsv.set_index_active(idx)).await
    }

    /// Tears the whole reservation down.
    pub async fn teardown_segment_reservation(&self, token: &CancellationToken, id: &SegmentId) -> Result<(), StoreError> {
        self.db.delete_rsv(token, id).await?;
        info!("admission.event=teardown id={id}");
        Ok(())
    }

    async fn mutate_reservation(
        &self,
        token: &CancellationToken,
        id: &SegmentId,
        mutate: impl FnOnce(&mut Reservation) -> Result<(), ReservationError> + Send,
    ) -> Result<(), StoreError> {
        let tx = self.db.begin_transaction(token).await?;
        let result = async {
            let mut rsv = tx.rsv_from_id(token, id).await?.ok_or(StoreError::NotFound(*id))?;
            mutate(&mut rsv)?;
            tx.persist_rsv(token, &rsv).await
        }
        .await;
        match result {
            Ok(()) => tx.commit(token).await,
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Periodic cleanup: removes indices expired before `now` and reports
    /// how many were dropped.
    pub async fn delete_expired_indices(&self, token: &CancellationToken, now: Tick) -> Result<usize, StoreError> {
        let removed = self.db.delete_expired_indices(token, now).await?;
        if removed > 0 {
            debug!("admission.event=expired_cleanup removed={removed}");
        }
        Ok(removed)
    }
}
