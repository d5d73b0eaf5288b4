use colibri_admission::{Admitter, AdmissionError, SetupService, StatefulAdmission, StatelessAdmission};
use colibri_base::IndexState;
use colibri_base::{
    AllocationBead, AsId, BwCls, Capacities, InterfaceCapacities, PathEndProps, Reservation, SegmentId, SetupRequest, SplitCls, Tick,
};
use colibri_store::{CommonStore, MemStore, TransitStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn caps_1024() -> Arc<dyn Capacities> {
    Arc::new(InterfaceCapacities::uniform(&[1, 2], 1024))
}

fn request_id() -> SegmentId {
    SegmentId::new(AsId(0xff00_0001_0001), [0xbe, 0xef, 0xca, 0xfe])
}

fn request(min: u8, max: u8) -> SetupRequest {
    SetupRequest {
        id: request_id(),
        timestamp: 1,
        ingress: 1,
        egress: 2,
        min_bw: BwCls::new(min),
        max_bw: BwCls::new(max),
        split_cls: SplitCls(2),
        path_props: PathEndProps::from_bits(PathEndProps::START_LOCAL | PathEndProps::END_LOCAL),
        alloc_trail: Vec::new(),
    }
}

fn active_rsv(id: SegmentId, ingress: u16, egress: u16, max: u8, alloc: u8) -> Reservation {
    let mut r = Reservation::new(id, ingress, egress);
    let idx = r.add_index(Tick(100), BwCls::new(0), BwCls::new(max), BwCls::new(alloc)).unwrap();
    r.set_index_confirmed(idx).unwrap();
    r.set_index_active(idx).unwrap();
    r
}

fn engines(caps: Arc<dyn Capacities>, delta: f64) -> [Box<dyn Admitter>; 2] {
    [Box::new(StatefulAdmission::new(caps.clone(), delta)), Box::new(StatelessAdmission::new(caps, delta))]
}

// Empty store: the request gets the full egress capacity, rounded down to a
// bandwidth class.
#[tokio::test]
async fn empty_store_grants_full_capacity() {
    let token = CancellationToken::new();
    for admitter in engines(caps_1024(), 1.0) {
        let store = MemStore::new(caps_1024());
        let mut req = request(5, 7);
        let bead = admitter.admit(&token, &store, &mut req).await.unwrap();
        // 1024 kbps is exactly class 6.
        assert_eq!(bead, AllocationBead { alloc: BwCls::new(6), max: BwCls::new(6) });
        assert_eq!(req.alloc_trail, vec![bead]);
    }
}

// A stored reservation with the request's own id is excluded everywhere, so
// the outcome matches the empty store.
#[tokio::test]
async fn own_reservation_does_not_compete() {
    let token = CancellationToken::new();
    for admitter in engines(caps_1024(), 1.0) {
        let store = MemStore::new(caps_1024());
        store.persist_rsv(&token, &active_rsv(request_id(), 1, 2, 5, 2)).await.unwrap();
        let mut req = request(5, 7);
        let bead = admitter.admit(&token, &store, &mut req).await.unwrap();
        assert_eq!(bead, AllocationBead { alloc: BwCls::new(6), max: BwCls::new(6) });
    }
}

// A competing source halves the link ratio: the request renews its own
// reservation while another source blocks the same pair.
#[tokio::test]
async fn competing_source_halves_link_share() {
    let token = CancellationToken::new();
    for admitter in engines(caps_1024(), 1.0) {
        let store = MemStore::new(caps_1024());
        store.persist_rsv(&token, &active_rsv(request_id(), 1, 2, 5, 2)).await.unwrap();
        store.persist_rsv(&token, &active_rsv(SegmentId::new(AsId(0xff00_0001_0002), [0, 0, 0, 1]), 1, 2, 2, 2)).await.unwrap();

        let mut req = request(2, 7);
        // Upstream granted at most class 2 (64 kbps).
        req.alloc_trail.push(AllocationBead { alloc: BwCls::new(2), max: BwCls::new(2) });
        let bead = admitter.admit(&token, &store, &mut req).await.unwrap();
        // available = 1024 - 64 = 960, ideal = 1024 * 1 * 1/2 = 512 -> class 5.
        assert_eq!(bead.max, BwCls::new(5));
        assert_eq!(bead.alloc, BwCls::new(5));
    }
}

#[tokio::test]
async fn denial_below_requested_minimum() {
    let token = CancellationToken::new();
    let caps: Arc<dyn Capacities> = Arc::new(InterfaceCapacities::uniform(&[1, 2], 64));
    for admitter in engines(caps.clone(), 1.0) {
        let store = MemStore::new(caps.clone());
        let mut req = request(5, 7);
        // Capacity 64 kbps is class 2, below the requested minimum of 5.
        let err = admitter.admit(&token, &store, &mut req).await.unwrap_err();
        match err {
            AdmissionError::Denied { id, max_alloc, min_requested } => {
                assert_eq!(id, request_id());
                assert_eq!(max_alloc, BwCls::new(2));
                assert_eq!(min_requested, BwCls::new(5));
            }
            other => panic!("expected denial, got {other:?}"),
        }
        assert!(req.alloc_trail.is_empty());
    }
}

#[tokio::test]
async fn delta_caps_the_granted_fraction() {
    let token = CancellationToken::new();
    for admitter in engines(caps_1024(), 0.5) {
        let store = MemStore::new(caps_1024());
        let mut req = request(0, 7);
        let bead = admitter.admit(&token, &store, &mut req).await.unwrap();
        // available = 512, ideal = 1024 -> class 5.
        assert_eq!(bead.max, BwCls::new(5));
    }
}

// Admission never mutates the store, and repeating the same request against
// an unchanged store yields the identical bead.
#[tokio::test]
async fn admission_is_read_only_and_repeatable() {
    let token = CancellationToken::new();
    for admitter in engines(caps_1024(), 1.0) {
        let store = MemStore::new(caps_1024());
        store.persist_rsv(&token, &active_rsv(SegmentId::new(AsId(7), [0, 0, 0, 1]), 1, 2, 5, 3)).await.unwrap();
        let before = store.all_rsvs(&token).await.unwrap();

        let mut first = request(0, 7);
        let mut second = request(0, 7);
        let bead_a = admitter.admit(&token, &store, &mut first).await.unwrap();
        let bead_b = admitter.admit(&token, &store, &mut second).await.unwrap();
        assert_eq!(bead_a, bead_b);
        assert_eq!(store.all_rsvs(&token).await.unwrap(), before);
        assert!(store.rederived_aggregates_match());
    }
}

#[tokio::test]
async fn cancelled_admission_returns_cancelled() {
    let token = CancellationToken::new();
    token.cancel();
    for admitter in engines(caps_1024(), 1.0) {
        let store = MemStore::new(caps_1024());
        let mut req = request(0, 7);
        let err = admitter.admit(&token, &store, &mut req).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Cancelled));
        assert!(req.alloc_trail.is_empty());
    }
}

// The setup service admits and commits the granted index in one
// transaction; a second admission of the same id renews it.
#[tokio::test]
async fn setup_service_commits_granted_indices() {
    let token = CancellationToken::new();
    let store = Arc::new(MemStore::new(caps_1024()));
    let admitter: Arc<dyn Admitter> = Arc::new(StatefulAdmission::new(caps_1024(), 1.0));
    let service = SetupService::new(store.clone(), admitter);

    let mut req = request(5, 7);
    let bead = service.admit_segment_reservation(&token, &mut req, Tick(100)).await.unwrap();
    assert_eq!(bead, AllocationBead { alloc: BwCls::new(6), max: BwCls::new(6) });

    let stored = store.rsv_from_id(&token, &request_id()).await.unwrap().unwrap();
    assert_eq!(stored.indices().len(), 1);
    let index = stored.indices()[0];
    assert_eq!(index.state, IndexState::Pending);
    assert_eq!(index.alloc_bw, BwCls::new(6));
    assert_eq!(index.max_bw, BwCls::new(6));
    assert_eq!(index.expiration, Tick(100));
    assert!(store.rederived_aggregates_match());

    // Renewal: same id, next index number.
    let mut renewal = request(5, 7);
    service.admit_segment_reservation(&token, &mut renewal, Tick(200)).await.unwrap();
    let stored = store.rsv_from_id(&token, &request_id()).await.unwrap().unwrap();
    assert_eq!(stored.indices().len(), 2);

    // Expiring the first index leaves the renewal in place.
    assert_eq!(service.delete_expired_indices(&token, Tick(150)).await.unwrap(), 1);
    let stored = store.rsv_from_id(&token, &request_id()).await.unwrap().unwrap();
    assert_eq!(stored.indices().len(), 1);
    assert_eq!(stored.indices()[0].expiration, Tick(200));
}

// Full index lifecycle through the service: pending on admission, then
// confirmed, then active, then torn down.
#[tokio::test]
async fn setup_service_index_lifecycle() {
    let token = CancellationToken::new();
    let store = Arc::new(MemStore::new(caps_1024()));
    let admitter: Arc<dyn Admitter> = Arc::new(StatelessAdmission::new(caps_1024(), 1.0));
    let service = SetupService::new(store.clone(), admitter);

    let mut req = request(5, 7);
    service.admit_segment_reservation(&token, &mut req, Tick(100)).await.unwrap();
    let idx = store.rsv_from_id(&token, &request_id()).await.unwrap().unwrap().indices()[0].idx;

    // Activation without confirmation is refused and rolls back.
    assert!(service.activate_segment_index(&token, &request_id(), idx).await.is_err());
    let stored = store.rsv_from_id(&token, &request_id()).await.unwrap().unwrap();
    assert_eq!(stored.indices()[0].state, IndexState::Pending);

    service.confirm_segment_index(&token, &request_id(), idx).await.unwrap();
    let stored = store.rsv_from_id(&token, &request_id()).await.unwrap().unwrap();
    assert_eq!(stored.indices()[0].state, IndexState::Confirmed);
    // A confirmed allocation now blocks bandwidth on both interfaces.
    assert!(store.rederived_aggregates_match());

    service.activate_segment_index(&token, &request_id(), idx).await.unwrap();
    let stored = store.rsv_from_id(&token, &request_id()).await.unwrap().unwrap();
    assert_eq!(stored.active_index().unwrap().idx, idx);

    service.teardown_segment_reservation(&token, &request_id()).await.unwrap();
    assert_eq!(store.rsv_from_id(&token, &request_id()).await.unwrap(), None);
    assert!(store.rederived_aggregates_match());

    // Lifecycle operations on an unknown id surface as not-found.
    let err = service.confirm_segment_index(&token, &request_id(), idx).await.unwrap_err();
    assert!(matches!(err, colibri_store::StoreError::NotFound(_)));
}

#[tokio::test]
async fn setup_service_denial_leaves_store_unchanged() {
    let token = CancellationToken::new();
    let caps: Arc<dyn Capacities> = Arc::new(InterfaceCapacities::uniform(&[1, 2], 64));
    let store = Arc::new(MemStore::new(caps.clone()));
    let admitter: Arc<dyn Admitter> = Arc::new(StatefulAdmission::new(caps, 1.0));
    let service = SetupService::new(store.clone(), admitter);

    let mut req = request(5, 7);
    let err = service.admit_segment_reservation(&token, &mut req, Tick(100)).await.unwrap_err();
    assert!(matches!(err, AdmissionError::Denied { .. }));
    assert_eq!(store.rsv_from_id(&token, &request_id()).await.unwrap(), None);
    assert_eq!(store.reservation_count(), 0);
}

#[tokio::test]
async fn engines_build_from_config() {
    let token = CancellationToken::new();
    let cfg = colibri_admission::AdmissionConfig {
        delta: 1.0,
        ingress_capacities: std::collections::BTreeMap::from([(1, 1024), (2, 1024)]),
        egress_capacities: std::collections::BTreeMap::from([(1, 1024), (2, 1024)]),
    };
    let admitter = StatefulAdmission::from_config(&cfg).unwrap();
    let store = MemStore::new(Arc::new(cfg.capacities()));
    let mut req = request(5, 7);
    assert!(admitter.admit(&token, &store, &mut req).await.is_ok());

    let mut bad = cfg.clone();
    bad.delta = 2.0;
    assert!(StatefulAdmission::from_config(&bad).is_err());
    assert!(StatelessAdmission::from_config(&bad).is_err());
}

// Two ingress interfaces feeding the same egress split the tube
// proportionally to their capped demands.
#[tokio::test]
async fn tube_ratio_splits_between_ingresses() {
    let token = CancellationToken::new();
    let caps: Arc<dyn Capacities> = Arc::new(InterfaceCapacities::uniform(&[1, 2, 3], 1024));
    for admitter in engines(caps.clone(), 1.0) {
        let store = MemStore::new(caps.clone());
        // Another source enters at interface 3 with the same capped demand
        // (class 7 caps at the 1024 kbps interface capacity) toward egress 2.
        store.persist_rsv(&token, &active_rsv(SegmentId::new(AsId(9), [0, 0, 0, 1]), 3, 2, 7, 2)).await.unwrap();

        let mut req = request(0, 7);
        let bead = admitter.admit(&token, &store, &mut req).await.unwrap();
        // Both tubes are capped to 1024: tube = 1024 / 2048 = 1/2.
        // link ratio: only own source allocates on (1, 2) -> 1.
        // ideal = 1024 * 0.5 = 512 -> class 5; available is larger.
        assert_eq!(bead.max, BwCls::new(5));
    }
}
