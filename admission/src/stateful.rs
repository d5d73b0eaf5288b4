//! Aggregate-driven admission. Each decision reads a constant number of
//! store rows per ingress interface instead of walking the reservation set,
//! which keeps admission O(1) in the number of reservations.

use crate::demand::{primed_rows, request_demand, transit_contribution, SourceRows};
use crate::{finish_admission, Admitter, AdmissionConfig, AdmissionError, AdmissionValues, ConfigError};
use async_trait::async_trait;
use colibri_base::demand::{cap_req_dem, scal_fctr, scaled_src_alloc};
use colibri_base::{AllocationBead, Capacities, Reservation, SetupRequest};
use colibri_store::ColibriStorage;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct StatefulAdmission {
    caps: Arc<dyn Capacities>,
    delta: f64,
}

impl StatefulAdmission {
    pub fn new(caps: Arc<dyn Capacities>, delta: f64) -> Self {
        Self { caps, delta }
    }

    pub fn from_config(config: &AdmissionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(Arc::new(config.capacities()), config.delta))
    }

    /// Free bandwidth on the request's interface pair, scaled by delta. An
    /// existing reservation with the request's id does not count against the
    /// request, since admission would replace it.
    async fn available_bw(
        &self,
        token: &CancellationToken,
        store: &dyn ColibriStorage,
        req: &SetupRequest,
        same_id: Option<&Reservation>,
    ) -> Result<u64, AdmissionError> {
        let err = |op| AdmissionError::storage(req.id, op);
        let used_in = store.usage_ingress(token, req.ingress).await.map_err(err("usage_ingress"))?;
        let used_eg = store.usage_egress(token, req.egress).await.map_err(err("usage_egress"))?;
        let (excl_in, excl_eg) = same_id
            .map(|r| {
                let blocked = r.max_blocked_bw();
                (if r.ingress == req.ingress { blocked } else { 0 }, if r.egress == req.egress { blocked } else { 0 })
            })
            .unwrap_or((0, 0));
        let free_in = self.caps.capacity_ingress(req.ingress).saturating_sub(used_in.saturating_sub(excl_in));
        let free_eg = self.caps.capacity_egress(req.egress).saturating_sub(used_eg.saturating_sub(excl_eg));
        Ok((free_in.min(free_eg) as f64 * self.delta) as u64)
    }

    /// The source's stored rows at (`ingress`, `req.egress`).
    async fn stored_rows(
        &self,
        token: &CancellationToken,
        store: &dyn ColibriStorage,
        req: &SetupRequest,
        ingress: u16,
        eg_dem: u64,
    ) -> Result<SourceRows, AdmissionError> {
        let err = |op| AdmissionError::storage(req.id, op);
        let state = store.source_state(token, req.id.src, ingress, req.egress).await.map_err(err("source_state"))?;
        let in_dem = store.in_demand(token, req.id.src, ingress).await.map_err(err("in_demand"))?;
        Ok(SourceRows { src_dem: state.src_dem, src_alloc: state.src_alloc, in_dem, eg_dem })
    }

    /// Stored transit demand with the request's source contribution replaced
    /// by its with-request value.
    fn adjusted_transit_demand(
        &self,
        req: &SetupRequest,
        same_id: Option<&Reservation>,
        ingress: u16,
        stored_td: u64,
        stored: SourceRows,
    ) -> u64 {
        let adj_stored = transit_contribution(self.caps.as_ref(), ingress, req.egress, stored);
        let primed = primed_rows(self.caps.as_ref(), req, same_id, ingress, stored);
        let adj_new = transit_contribution(self.caps.as_ref(), ingress, req.egress, primed);
        (stored_td + adj_new).saturating_sub(adj_stored)
    }

    /// Share of the egress tube granted to the request's ingress: its
    /// adjusted transit demand relative to all ingress interfaces competing
    /// for the same egress.
    async fn tube_ratio(
        &self,
        token: &CancellationToken,
        store: &dyn ColibriStorage,
        req: &SetupRequest,
        same_id: Option<&Reservation>,
        eg_dem: u64,
    ) -> Result<f64, AdmissionError> {
        let err = |op| AdmissionError::storage(req.id, op);
        let mut numerator = 0u64;
        let mut sum = 0u64;
        for ingress in self.caps.ingress_interfaces() {
            let stored_td = store.transit_demand(token, ingress, req.egress).await.map_err(err("transit_demand"))?;
            let stored = self.stored_rows(token, store, req, ingress, eg_dem).await?;
            let transit_dem = self.adjusted_transit_demand(req, same_id, ingress, stored_td, stored);
            let capped = self.caps.capacity_ingress(ingress).min(transit_dem);
            sum += capped;
            if ingress == req.ingress {
                numerator = capped;
            }
        }
        if sum == 0 {
            return Ok(1.0);
        }
        Ok(numerator as f64 / sum as f64)
    }

    /// Share of the egress link granted to the request's source among all
    /// sources allocated between the same interface pair.
    async fn link_ratio(
        &self,
        token: &CancellationToken,
        store: &dyn ColibriStorage,
        req: &SetupRequest,
        same_id: Option<&Reservation>,
        eg_dem_stored: u64,
    ) -> Result<f64, AdmissionError> {
        let err = |op| AdmissionError::storage(req.id, op);
        let state = store.source_state(token, req.id.src, req.ingress, req.egress).await.map_err(err("source_state"))?;
        let transit_alloc = store.transit_alloc(token, req.ingress, req.egress).await.map_err(err("transit_alloc"))?;

        let cap_eg = self.caps.capacity_egress(req.egress);
        let same_on_pair =
            same_id.filter(|r| r.ingress == req.ingress && r.egress == req.egress).map(|r| r.max_blocked_bw()).unwrap_or(0);
        let same_on_egress = same_id.filter(|r| r.egress == req.egress).map(|r| cap_req_dem(r, self.caps.as_ref())).unwrap_or(0);

        let eg_dem_new = eg_dem_stored.saturating_sub(same_on_egress) + request_demand(self.caps.as_ref(), req);
        let eg_scal_stored = scal_fctr(cap_eg, eg_dem_stored);
        let eg_scal_new = scal_fctr(cap_eg, eg_dem_new);

        let prev_bw = req.prev_bw_kbps();
        let src_alloc_new = state.src_alloc.saturating_sub(same_on_pair) + prev_bw;

        let stored_contrib = scaled_src_alloc(eg_scal_stored, state.src_alloc);
        let new_contrib = scaled_src_alloc(eg_scal_new, src_alloc_new);
        let denom = (transit_alloc + new_contrib).saturating_sub(stored_contrib);
        if denom == 0 {
            return Ok(1.0);
        }
        Ok(eg_scal_new * prev_bw as f64 / denom as f64)
    }

    pub(crate) async fn evaluate(
        &self,
        token: &CancellationToken,
        store: &dyn ColibriStorage,
        req: &SetupRequest,
    ) -> Result<AdmissionValues, AdmissionError> {
        let err = |op| AdmissionError::storage(req.id, op);
        let same_id = store.rsv_from_id(token, &req.id).await.map_err(err("rsv_from_id"))?;
        let available = self.available_bw(token, store, req, same_id.as_ref()).await?;
        let eg_dem = store.eg_demand(token, req.id.src, req.egress).await.map_err(err("eg_demand"))?;
        let tube_ratio = self.tube_ratio(token, store, req, same_id.as_ref(), eg_dem).await?;
        let link_ratio = self.link_ratio(token, store, req, same_id.as_ref(), eg_dem).await?;
        let ideal = (self.caps.capacity_egress(req.egress) as f64 * tube_ratio * link_ratio) as u64;
        Ok(AdmissionValues { available, tube_ratio, link_ratio, ideal })
    }
}

#[async_trait]
impl Admitter for StatefulAdmission {
    async fn admit(
        &self,
        token: &CancellationToken,
        store: &dyn ColibriStorage,
        req: &mut SetupRequest,
    ) -> Result<AllocationBead, AdmissionError> {
        let values = self.evaluate(token, store, req).await?;
        finish_admission(req, values.available, values.ideal)
    }
}
