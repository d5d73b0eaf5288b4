//! Reference admission computed directly from the reservation set. The
//! arithmetic expands the aggregate formulas reservation by reservation, so
//! for any store state it must agree exactly with [`StatefulAdmission`];
//! the equivalence is exercised by the integration tests.

use crate::demand::{request_demand, transit_contribution, SourceRows};
use crate::{finish_admission, Admitter, AdmissionConfig, AdmissionError, AdmissionValues, ConfigError};
use async_trait::async_trait;
use colibri_base::demand::{cap_req_dem, scal_fctr, scaled_src_alloc};
use colibri_base::{AllocationBead, AsId, Capacities, Reservation, SetupRequest};
use colibri_store::ColibriStorage;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct StatelessAdmission {
    caps: Arc<dyn Capacities>,
    delta: f64,
}

/// Demand maps rebuilt from the reservation set, with the request applied
/// and any stored reservation with the request's id left out.
#[derive(Debug, Default)]
struct DemandMaps {
    src_dem: BTreeMap<(AsId, u16, u16), u64>,
    src_alloc: BTreeMap<(AsId, u16, u16), u64>,
    in_dem: BTreeMap<(AsId, u16), u64>,
    eg_dem: BTreeMap<(AsId, u16), u64>,
}

impl DemandMaps {
    fn build(rsvs: &[Reservation], caps: &dyn Capacities, req: &SetupRequest) -> Self {
        let mut maps = Self::default();
        for rsv in rsvs {
            if rsv.id == req.id {
                continue;
            }
            let dem = cap_req_dem(rsv, caps);
            let src = rsv.id.src;
            *maps.src_dem.entry((src, rsv.ingress, rsv.egress)).or_default() += dem;
            *maps.src_alloc.entry((src, rsv.ingress, rsv.egress)).or_default() += rsv.max_blocked_bw();
            *maps.in_dem.entry((src, rsv.ingress)).or_default() += dem;
            *maps.eg_dem.entry((src, rsv.egress)).or_default() += dem;
        }
        let req_dem = request_demand(caps, req);
        *maps.src_dem.entry((req.id.src, req.ingress, req.egress)).or_default() += req_dem;
        *maps.in_dem.entry((req.id.src, req.ingress)).or_default() += req_dem;
        *maps.eg_dem.entry((req.id.src, req.egress)).or_default() += req_dem;
        maps
    }

    fn rows(&self, src: AsId, ingress: u16, egress: u16) -> SourceRows {
        SourceRows {
            src_dem: self.src_dem.get(&(src, ingress, egress)).copied().unwrap_or(0),
            src_alloc: self.src_alloc.get(&(src, ingress, egress)).copied().unwrap_or(0),
            in_dem: self.in_dem.get(&(src, ingress)).copied().unwrap_or(0),
            eg_dem: self.eg_dem.get(&(src, egress)).copied().unwrap_or(0),
        }
    }

    /// Sources with any demand between the pair. Building the maps always
    /// records the request's source at its own pair, so it is never missed.
    fn sources_at(&self, ingress: u16, egress: u16) -> Vec<AsId> {
        self.src_dem.keys().filter(|&&(_, i, e)| i == ingress && e == egress).map(|&(s, _, _)| s).collect()
    }

    fn transit_demand(&self, caps: &dyn Capacities, ingress: u16, egress: u16) -> u64 {
        self.sources_at(ingress, egress).into_iter().map(|src| transit_contribution(caps, ingress, egress, self.rows(src, ingress, egress))).sum()
    }
}

impl StatelessAdmission {
    pub fn new(caps: Arc<dyn Capacities>, delta: f64) -> Self {
        Self { caps, delta }
    }

    pub fn from_config(config: &AdmissionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(Arc::new(config.capacities()), config.delta))
    }

    fn available_bw(&self, req: &SetupRequest, same_ingress: &[Reservation], same_egress: &[Reservation]) -> u64 {
        let blocked = |rsvs: &[Reservation]| {
            rsvs.iter().filter(|r| r.id != req.id).map(|r| r.max_blocked_bw()).sum::<u64>()
        };
        let free_in = self.caps.capacity_ingress(req.ingress).saturating_sub(blocked(same_ingress));
        let free_eg = self.caps.capacity_egress(req.egress).saturating_sub(blocked(same_egress));
        (free_in.min(free_eg) as f64 * self.delta) as u64
    }

    fn tube_ratio(&self, req: &SetupRequest, maps: &DemandMaps) -> f64 {
        let caps = self.caps.as_ref();
        let mut numerator = 0u64;
        let mut sum = 0u64;
        for ingress in caps.ingress_interfaces() {
            let capped = caps.capacity_ingress(ingress).min(maps.transit_demand(caps, ingress, req.egress));
            sum += capped;
            if ingress == req.ingress {
                numerator = capped;
            }
        }
        if sum == 0 {
            return 1.0;
        }
        numerator as f64 / sum as f64
    }

    fn link_ratio(&self, req: &SetupRequest, maps: &DemandMaps) -> f64 {
        let caps = self.caps.as_ref();
        let cap_eg = caps.capacity_egress(req.egress);
        let eg_scal = |src: AsId| scal_fctr(cap_eg, maps.eg_dem.get(&(src, req.egress)).copied().unwrap_or(0));

        let prev_bw = req.prev_bw_kbps();
        let own_scal = eg_scal(req.id.src);
        let mut denom = 0u64;
        for src in maps.sources_at(req.ingress, req.egress) {
            let mut alloc = maps.src_alloc.get(&(src, req.ingress, req.egress)).copied().unwrap_or(0);
            if src == req.id.src {
                alloc += prev_bw;
            }
            denom += scaled_src_alloc(eg_scal(src), alloc);
        }
        if denom == 0 {
            return 1.0;
        }
        own_scal * prev_bw as f64 / denom as f64
    }

    pub(crate) async fn evaluate(
        &self,
        token: &CancellationToken,
        store: &dyn ColibriStorage,
        req: &SetupRequest,
    ) -> Result<AdmissionValues, AdmissionError> {
        let err = |op| AdmissionError::storage(req.id, op);
        let same_ingress = store.rsvs_from_if_pair(token, Some(req.ingress), None).await.map_err(err("rsvs_from_if_pair"))?;
        let same_egress = store.rsvs_from_if_pair(token, None, Some(req.egress)).await.map_err(err("rsvs_from_if_pair"))?;
        let all = store.all_rsvs(token).await.map_err(err("all_rsvs"))?;

        let available = self.available_bw(req, &same_ingress, &same_egress);
        let maps = DemandMaps::build(&all, self.caps.as_ref(), req);
        let tube_ratio = self.tube_ratio(req, &maps);
        let link_ratio = self.link_ratio(req, &maps);
        let ideal = (self.caps.capacity_egress(req.egress) as f64 * tube_ratio * link_ratio) as u64;
        Ok(AdmissionValues { available, tube_ratio, link_ratio, ideal })
    }
}

#[async_trait]
impl Admitter for StatelessAdmission {
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
