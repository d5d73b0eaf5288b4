//! Per-source demand adjustment shared by the two admission engines.
//!
//! Both engines reason about the demand of the request's source at one
//! ingress interface toward the request's egress: the stateful engine reads
//! the stored rows and replaces that source's contribution, the stateless
//! reference rebuilds the rows from the reservation set. The replacement
//! rules live here so the two cannot drift apart.

use colibri_base::demand::{cap_req_dem, scal_fctr, scaled_src_dem};
use colibri_base::{Capacities, Reservation, SetupRequest};

/// The demand rows of one source, scoped to an (ingress, egress) pair:
/// `src_dem`/`src_alloc` for the pair, `in_dem` for the ingress, `eg_dem`
/// for the egress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SourceRows {
    pub src_dem: u64,
    pub src_alloc: u64,
    pub in_dem: u64,
    pub eg_dem: u64,
}

/// The request's own capped demand: its maximum class bounded by the
/// capacities of the interfaces it asks for.
pub(crate) fn request_demand(caps: &dyn Capacities, req: &SetupRequest) -> u64 {
    req.max_bw.to_kbps().min(caps.capacity_ingress(req.ingress)).min(caps.capacity_egress(req.egress))
}

/// Applies the request to the stored rows of its source at (`ingress`,
/// `req.egress`): any contribution of a stored reservation with the request's
/// id is taken out and the request's capped demand is put in at the
/// interfaces the request names.
pub(crate) fn primed_rows(
    caps: &dyn Capacities,
    req: &SetupRequest,
    same_id: Option<&Reservation>,
    ingress: u16,
    stored: SourceRows,
) -> SourceRows {
    let mut rows = stored;
    if let Some(same) = same_id {
        let dem = cap_req_dem(same, caps);
        if same.ingress == ingress && same.egress == req.egress {
            rows.src_dem = rows.src_dem.saturating_sub(dem);
        }
        if same.ingress == ingress {
            rows.in_dem = rows.in_dem.saturating_sub(dem);
        }
        if same.egress == req.egress {
            rows.eg_dem = rows.eg_dem.saturating_sub(dem);
        }
        if same.ingress == ingress && same.egress == req.egress {
            rows.src_alloc = rows.src_alloc.saturating_sub(same.max_blocked_bw());
        }
    }
    let req_dem = request_demand(caps, req);
    if req.ingress == ingress {
        rows.src_dem += req_dem;
        rows.in_dem += req_dem;
    }
    rows.eg_dem += req_dem;
    rows
}

/// The source's rounded contribution to the transit demand between
/// (`ingress`, `egress`), given its rows.
pub(crate) fn transit_contribution(caps: &dyn Capacities, ingress: u16, egress: u16, rows: SourceRows) -> u64 {
    let in_scal = scal_fctr(caps.capacity_ingress(ingress), rows.in_dem);
    let eg_scal = scal_fctr(caps.capacity_egress(egress), rows.eg_dem);
    scaled_src_dem(in_scal, eg_scal, rows.src_dem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colibri_base::{AllocationBead, AsId, BwCls, InterfaceCapacities, PathEndProps, SegmentId, SetupRequest, SplitCls, Tick};

    fn request(ingress: u16, egress: u16, max: u8) -> SetupRequest {
        SetupRequest {
            id: SegmentId::new(AsId(1), [0xbe, 0xef, 0xca, 0xfe]),
            timestamp: 1,
            ingress,
            egress,
            min_bw: BwCls::new(1),
            max_bw: BwCls::new(max),
            split_cls: SplitCls(2),
            path_props: PathEndProps::default(),
            alloc_trail: vec![AllocationBead { alloc: BwCls::new(max), max: BwCls::new(max) }],
        }
    }

    fn same_id_rsv(ingress: u16, egress: u16, max: u8, alloc: u8) -> Reservation {
        let mut r = Reservation::new(SegmentId::new(AsId(1), [0xbe, 0xef, 0xca, 0xfe]), ingress, egress);
        let idx = r.add_index(Tick(100), BwCls::new(1), BwCls::new(max), BwCls::new(alloc)).unwrap();
        r.set_index_confirmed(idx).unwrap();
        r.set_index_active(idx).unwrap();
        r
    }

    #[test]
    fn request_applies_at_its_own_ingress_only() {
        let caps = InterfaceCapacities::uniform(&[1, 2, 3], 1024);
        let req = request(1, 2, 5);
        let stored = SourceRows { src_dem: 0, src_alloc: 0, in_dem: 0, eg_dem: 0 };

        let at_own = primed_rows(&caps, &req, None, 1, stored);
        assert_eq!(at_own, SourceRows { src_dem: 512, src_alloc: 0, in_dem: 512, eg_dem: 512 });

        let at_other = primed_rows(&caps, &req, None, 3, stored);
        assert_eq!(at_other, SourceRows { src_dem: 0, src_alloc: 0, in_dem: 0, eg_dem: 512 });
    }

    #[test]
    fn same_id_contribution_is_replaced() {
        let caps = InterfaceCapacities::uniform(&[1, 2, 3], 1024);
        let req = request(1, 2, 7);
        let same = same_id_rsv(1, 2, 5, 2);
        // Stored rows as the store would hold them for this single rsv.
        let stored = SourceRows { src_dem: 512, src_alloc: 64, in_dem: 512, eg_dem: 512 };

        let primed = primed_rows(&caps, &req, Some(&same), 1, stored);
        // 512 removed, min(1024, rate(7)=2048) = 1024 added.
        assert_eq!(primed, SourceRows { src_dem: 1024, src_alloc: 0, in_dem: 1024, eg_dem: 1024 });
    }

    #[test]
    fn contribution_scales_by_the_tighter_factor() {
        let caps = InterfaceCapacities::uniform(&[1, 2], 512);
        let rows = SourceRows { src_dem: 1024, src_alloc: 0, in_dem: 1024, eg_dem: 512 };
        // in_scal = 0.5, eg_scal = 1.
        assert_eq!(transit_contribution(&caps, 1, 2, rows), 512);
    }
}
