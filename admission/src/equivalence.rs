//! The aggregate-driven engine must produce exactly the quantities of the
//! reservation-iterating reference, for any store state.

use crate::{StatefulAdmission, StatelessAdmission};
use colibri_base::{AllocationBead, AsId, BwCls, Capacities, InterfaceCapacities, PathEndProps, Reservation, SegmentId, SetupRequest, SplitCls, Tick};
use colibri_store::{CommonStore, MemStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const IFACES: [u16; 3] = [1, 2, 3];

fn random_rsv(rng: &mut StdRng, id: SegmentId) -> Reservation {
    let mut rsv = Reservation::new(id, IFACES[rng.gen_range(0..IFACES.len())], IFACES[rng.gen_range(0..IFACES.len())]);
    for _ in 0..rng.gen_range(1..3) {
        let max = rng.gen_range(1..9u8);
        let alloc = rng.gen_range(0..=max);
        let idx = rsv.add_index(Tick(100), BwCls::new(0), BwCls::new(max), BwCls::new(alloc)).unwrap();
        match rng.gen_range(0..3) {
            0 => {}
            1 => rsv.set_index_confirmed(idx).unwrap(),
            _ => {
                rsv.set_index_confirmed(idx).unwrap();
                rsv.set_index_active(idx).unwrap();
            }
        }
    }
    rsv
}

fn random_request(rng: &mut StdRng, id: SegmentId) -> SetupRequest {
    let trail_len = rng.gen_range(0..3);
    let alloc_trail = (0..trail_len)
        .map(|_| {
            let max = rng.gen_range(1..9u8);
            AllocationBead { alloc: BwCls::new(rng.gen_range(0..=max)), max: BwCls::new(max) }
        })
        .collect();
    SetupRequest {
        id,
        timestamp: 1,
        ingress: IFACES[rng.gen_range(0..IFACES.len())],
        egress: IFACES[rng.gen_range(0..IFACES.len())],
        min_bw: BwCls::new(rng.gen_range(0..4)),
        max_bw: BwCls::new(rng.gen_range(4..9)),
        split_cls: SplitCls(2),
        path_props: PathEndProps::default(),
        alloc_trail,
    }
}

#[tokio::test]
async fn stateful_matches_stateless_reference() {
    let mut rng = StdRng::seed_from_u64(0xc011b71);
    let token = CancellationToken::new();

    for round in 0..200usize {
        // Vary the capacity spread so the scaling factors actually bite.
        let capacity = [64u64, 256, 1024][round % 3];
        let delta = [1.0, 0.5][round % 2];
        let caps: Arc<dyn Capacities> = Arc::new(InterfaceCapacities::uniform(&IFACES, capacity));
        let store = MemStore::new(caps.clone());

        let request_id = SegmentId::new(AsId(1), [0xbe, 0xef, 0xca, 0xfe]);
        for _ in 0..rng.gen_range(0..8) {
            let id = if rng.gen_bool(0.15) {
                request_id
            } else {
                SegmentId::new(AsId(rng.gen_range(1..4u64)), [0, 0, 0, rng.gen_range(0..6u8)])
            };
            store.persist_rsv(&token, &random_rsv(&mut rng, id)).await.unwrap();
        }
        let req = random_request(&mut rng, request_id);

        let stateful = StatefulAdmission::new(caps.clone(), delta);
        let stateless = StatelessAdmission::new(caps.clone(), delta);
        let got = stateful.evaluate(&token, &store, &req).await.unwrap();
        let want = stateless.evaluate(&token, &store, &req).await.unwrap();
        assert_eq!(got, want, "round {round}: req {req:?}");

        let mut req_a = req.clone();
        let mut req_b = req.clone();
        let bead_a = crate::Admitter::admit(&stateful, &token, &store, &mut req_a).await;
        let bead_b = crate::Admitter::admit(&stateless, &token, &store, &mut req_b).await;
        match (bead_a, bead_b) {
            (Ok(a), Ok(b)) => assert_eq!(a, b, "round {round}"),
            (Err(crate::AdmissionError::Denied { max_alloc: a, .. }), Err(crate::AdmissionError::Denied { max_alloc: b, .. })) => {
                assert_eq!(a, b, "round {round}")
            }
            (a, b) => panic!("round {round}: engines disagree: {a:?} vs {b:?}"),
        }
    }
}
