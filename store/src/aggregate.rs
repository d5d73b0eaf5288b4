//! Aggregate demand/allocation tables derived from the reservation set.
//!
//! The tables and the reservations are two views of the same truth: every
//! reservation mutation updates the tables in the same critical section. The
//! plain sums (`usage_*`, `src_state`, `in_dem`, `eg_dem`) are maintained
//! incrementally; the scaled tables (`transit_dem`, `transit_alloc`) are
//! recomputed for the mutated source only, since a reservation change only
//! perturbs the scaling factors of its own source.

use crate::backend::SourceState;
use colibri_base::demand::{cap_req_dem, scal_fctr, scaled_src_alloc, scaled_src_dem};
use colibri_base::{AsId, Capacities, Reservation};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateTables {
    pub usage_in: BTreeMap<u16, u64>,
    pub usage_eg: BTreeMap<u16, u64>,
    pub src_state: BTreeMap<(AsId, u16, u16), SourceState>,
    pub in_dem: BTreeMap<(AsId, u16), u64>,
    pub eg_dem: BTreeMap<(AsId, u16), u64>,
    pub transit_dem: BTreeMap<(u16, u16), u64>,
    pub transit_alloc: BTreeMap<(u16, u16), u64>,
}

fn add_to<K: Ord + Copy>(map: &mut BTreeMap<K, u64>, key: K, v: u64) {
    if v > 0 {
        *map.entry(key).or_default() += v;
    }
}

fn sub_from<K: Ord + Copy>(map: &mut BTreeMap<K, u64>, key: K, v: u64) {
    if v == 0 {
        return;
    }
    if let Some(cur) = map.get_mut(&key) {
        *cur = cur.saturating_sub(v);
        if *cur == 0 {
            map.remove(&key);
        }
    }
}

impl AggregateTables {
    /// Full rederivation from a reservation set. This is the reference the
    /// incremental maintenance must match.
    pub fn derive<'a>(rsvs: impl Iterator<Item = &'a Reservation>, caps: &dyn Capacities) -> Self {
        let mut t = Self::default();
        let mut sources: Vec<AsId> = Vec::new();
        for rsv in rsvs {
            t.add_sums(rsv, caps);
            if !sources.contains(&rsv.id.src) {
                sources.push(rsv.id.src);
            }
        }
        for src in sources {
            t.apply_transit_for_source(src, caps, true);
        }
        t
    }

    /// Replaces the reservation `old` with `new` (either side may be absent)
    /// and brings every table back in sync.
    pub fn update(&mut self, old: Option<&Reservation>, new: Option<&Reservation>, caps: &dyn Capacities) {
        let src = match old.or(new) {
            Some(r) => r.id.src,
            None => return,
        };
        self.apply_transit_for_source(src, caps, false);
        if let Some(o) = old {
            self.remove_sums(o, caps);
        }
        if let Some(n) = new {
            self.add_sums(n, caps);
        }
        self.apply_transit_for_source(src, caps, true);
    }

    fn add_sums(&mut self, rsv: &Reservation, caps: &dyn Capacities) {
        let dem = cap_req_dem(rsv, caps);
        let blocked = rsv.max_blocked_bw();
        add_to(&mut self.usage_in, rsv.ingress, blocked);
        add_to(&mut self.usage_eg, rsv.egress, blocked);
        add_to(&mut self.in_dem, (rsv.id.src, rsv.ingress), dem);
        add_to(&mut self.eg_dem, (rsv.id.src, rsv.egress), dem);
        if dem > 0 || blocked > 0 {
            let state = self.src_state.entry((rsv.id.src, rsv.ingress, rsv.egress)).or_default();
            state.src_dem += dem;
            state.src_alloc += blocked;
        }
    }

    fn remove_sums(&mut self, rsv: &Reservation, caps: &dyn Capacities) {
        let dem = cap_req_dem(rsv, caps);
        let blocked = rsv.max_blocked_bw();
        sub_from(&mut self.usage_in, rsv.ingress, blocked);
        sub_from(&mut self.usage_eg, rsv.egress, blocked);
        sub_from(&mut self.in_dem, (rsv.id.src, rsv.ingress), dem);
        sub_from(&mut self.eg_dem, (rsv.id.src, rsv.egress), dem);
        let key = (rsv.id.src, rsv.ingress, rsv.egress);
        if let Some(state) = self.src_state.get_mut(&key) {
            state.src_dem = state.src_dem.saturating_sub(dem);
            state.src_alloc = state.src_alloc.saturating_sub(blocked);
            if state.src_dem == 0 && state.src_alloc == 0 {
                self.src_state.remove(&key);
            }
        }
    }

    /// Adds (or, with `add == false`, retracts) the scaled transit
    /// contributions of one source, computed from the current sum rows. A
    /// retract therefore must run before the rows change and the matching add
    /// after, so both see consistent values.
    fn apply_transit_for_source(&mut self, src: AsId, caps: &dyn Capacities, add: bool) {
        let rows: Vec<((u16, u16), u64, u64)> = self
            .src_state
            .range((src, 0, 0)..=(src, u16::MAX, u16::MAX))
            .map(|(&(_, ingress, egress), state)| {
                let in_scal = scal_fctr(caps.capacity_ingress(ingress), self.in_dem.get(&(src, ingress)).copied().unwrap_or(0));
                let eg_scal = scal_fctr(caps.capacity_egress(egress), self.eg_dem.get(&(src, egress)).copied().unwrap_or(0));
                ((ingress, egress), scaled_src_dem(in_scal, eg_scal, state.src_dem), scaled_src_alloc(eg_scal, state.src_alloc))
            })
            .collect();
        for (pair, dem, alloc) in rows {
            if add {
                add_to(&mut self.transit_dem, pair, dem);
                add_to(&mut self.transit_alloc, pair, alloc);
            } else {
                sub_from(&mut self.transit_dem, pair, dem);
                sub_from(&mut self.transit_alloc, pair, alloc);
            }
        }
    }
}
