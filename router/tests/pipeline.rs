use bytes::Bytes;
use colibri_base::{AsId, IsdAs, RlcCls, Tick};
use colibri_router::mac::{packet_mac, sigma_authenticator, static_mac, MacKey};
use colibri_router::path::{HopField, InfoField, ReservationPath, ReservationPathMinimal};
use colibri_router::timestamp::{create_ts_rel_at, pack_timestamp};
use colibri_router::{
    ColibriPacket, ColibriProcessor, Forwarding, PacketError, PathVariant, RawHostAddr, RouterConfig, RouterMetrics, RouterTopology,
    ScionHeader, TrafficClass,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

const KEY: MacKey = [0x42; 16];
const PAYLOAD: &[u8] = b"colibri data payload";

fn addr(port: u16) -> SocketAddr {
    format!("10.1.0.1:{port}").parse().unwrap()
}

fn local_ia() -> IsdAs {
    IsdAs::new(1, AsId(0xff00_0001_0001))
}

fn topology() -> RouterTopology {
    RouterTopology {
        local_ia: local_ia(),
        own_interfaces: BTreeMap::from([(2, addr(3002))]),
        sibling_interfaces: BTreeMap::from([(7, addr(3007))]),
        colibri_service: Some(addr(4000)),
    }
}

fn processor() -> ColibriProcessor {
    ColibriProcessor::new(topology(), KEY, &RouterConfig::default(), Arc::new(RouterMetrics::new()))
}

fn scion_header(dst_ia: IsdAs) -> ScionHeader {
    ScionHeader {
        src_ia: IsdAs::new(2, AsId(0xff00_0002_0002)),
        dst_ia,
        src_host: RawHostAddr::ipv4([10, 0, 0, 100]),
        dst_host: RawHostAddr::ipv4([10, 0, 0, 200]),
        payload_len: PAYLOAD.len() as u16,
        orig_payload_len: PAYLOAD.len() as u16,
        common_hdr_len: 12,
        addr_hdr_len: 24,
        next_hdr: 17,
    }
}

struct PacketBuilder {
    control: bool,
    reverse: bool,
    curr_hf: u8,
    hops: Vec<(u16, u16)>,
    exp_tick: Tick,
    now_nanos: u64,
    dst_ia: IsdAs,
    corrupt_mac: bool,
}

impl PacketBuilder {
    fn new(now_nanos: u64) -> Self {
        Self {
            control: false,
            reverse: false,
            curr_hf: 1,
            hops: vec![(0, 5), (1, 2), (3, 0)],
            exp_tick: Tick::from_unix_nanos(now_nanos).plus(2),
            now_nanos,
            dst_ia: IsdAs::new(3, AsId(9)),
            corrupt_mac: false,
        }
    }

    fn build(self) -> (ColibriPacket, ScionHeader) {
        let scion = scion_header(self.dst_ia);
        let ts_rel = create_ts_rel_at(self.exp_tick, self.now_nanos).expect("now inside send window");
        let packet_timestamp = pack_timestamp(ts_rel, 1);
        let info = InfoField {
            c: self.control,
            r: self.reverse,
            s: false,
            curr_hf: self.curr_hf,
            hf_count: self.hops.len() as u8,
            res_id_suffix: [0xaa; 12],
            exp_tick: self.exp_tick.value(),
            bw_cls: 5,
            rlc: RlcCls(1),
            ver: 1,
        };
        let hops: Vec<HopField> = self
            .hops
            .iter()
            .map(|&(ingress_id, egress_id)| {
                let mut hop = HopField { ingress_id, egress_id, mac: [0; 4] };
                hop.mac = if self.control {
                    static_mac(&KEY, scion.src_ia, &info, &hop)
                } else {
                    let sigma = sigma_authenticator(&KEY, &scion, &info, &hop);
                    packet_mac(&sigma, &scion, packet_timestamp, &info).unwrap()
                };
                if self.corrupt_mac {
                    hop.mac[0] ^= 0xff;
                }
                hop
            })
            .collect();
        let full = ReservationPath { packet_timestamp, info, hops };
        let mut raw = vec![0u8; full.len()];
        full.encode_to(&mut raw).unwrap();
        let minimal = ReservationPathMinimal::decode_from(&raw).unwrap();
        (ColibriPacket { scion: scion.clone(), path: PathVariant::Reservation(minimal), payload: Bytes::from_static(PAYLOAD) }, scion)
    }
}

fn now() -> u64 {
    // A fixed instant: tick 400_000_000 (~2020s epoch scale is irrelevant).
    Tick(400_000_000).to_unix_nanos()
}

#[test]
fn br_transit_advances_and_enqueues_colibri_class() {
    let (pkt, _) = PacketBuilder::new(now()).build();
    let outcome = processor().process_at(1, &pkt, now()).unwrap();

    assert_eq!(outcome.class, TrafficClass::Colibri);
    assert_eq!(outcome.forwarding, Forwarding::BrTransit { egress_id: 2, next_hop: addr(3002) });
    // The serialized path advanced to hop 2 and kept all hop bytes.
    let advanced = ReservationPathMinimal::decode_from(&outcome.path_raw).unwrap();
    assert_eq!(advanced.info.curr_hf, 2);
    assert_eq!(advanced.curr_hop.ingress_id, 3);
}

#[test]
fn control_packets_reach_the_service() {
    let mut builder = PacketBuilder::new(now());
    builder.control = true;
    let (pkt, _) = builder.build();
    let outcome = processor().process_at(1, &pkt, now()).unwrap();
    assert_eq!(outcome.forwarding, Forwarding::Service { addr: addr(4000) });
}

#[test]
fn last_hop_delivers_locally() {
    let mut builder = PacketBuilder::new(now());
    builder.curr_hf = 2;
    builder.dst_ia = local_ia();
    let (pkt, scion) = builder.build();
    let outcome = processor().process_at(3, &pkt, now()).unwrap();
    assert_eq!(outcome.forwarding, Forwarding::Local { host: scion.dst_host });
}

#[test]
fn unknown_egress_is_as_transit_or_unroutable() {
    // Hop egress 7 belongs to a sibling router.
    let mut builder = PacketBuilder::new(now());
    builder.hops = vec![(0, 5), (1, 7), (3, 0)];
    let (pkt, _) = builder.build();
    let outcome = processor().process_at(1, &pkt, now()).unwrap();
    assert_eq!(outcome.forwarding, Forwarding::AsTransit { egress_id: 7, router: addr(3007) });

    // Egress 9 is served by nobody.
    let mut builder = PacketBuilder::new(now());
    builder.hops = vec![(0, 5), (1, 9), (3, 0)];
    let (pkt, _) = builder.build();
    assert_eq!(processor().process_at(1, &pkt, now()), Err(PacketError::RouteNotFound(9)));
}

#[test]
fn wrong_ingress_interface_is_rejected() {
    let (pkt, _) = PacketBuilder::new(now()).build();
    assert_eq!(processor().process_at(4, &pkt, now()), Err(PacketError::InvalidIngress { want: 1, got: 4 }));
}

#[test]
fn reverse_packets_validate_against_the_egress_id() {
    let mut builder = PacketBuilder::new(now());
    builder.reverse = true;
    let (pkt, _) = builder.build();
    // R=1: the packet must come in through the hop's egress interface (2)
    // and leaves through its ingress interface (1), owned by nobody here.
    assert_eq!(processor().process_at(1, &pkt, now()), Err(PacketError::InvalidIngress { want: 2, got: 1 }));
    assert_eq!(processor().process_at(2, &pkt, now()), Err(PacketError::RouteNotFound(1)));
}

#[test]
fn payload_length_mismatch_is_rejected() {
    let (mut pkt, _) = PacketBuilder::new(now()).build();
    pkt.scion.payload_len += 1;
    pkt.scion.orig_payload_len += 1;
    let err = processor().process_at(1, &pkt, now()).unwrap_err();
    assert!(matches!(err, PacketError::PayloadLenMismatch { .. }));
}

#[test]
fn expired_reservation_is_rejected() {
    let mut builder = PacketBuilder::new(now());
    builder.exp_tick = Tick::from_unix_nanos(now()).plus(1);
    let (pkt, _) = builder.build();
    let later = builder_later(&pkt);
    let err = processor().process_at(1, &pkt, later).unwrap_err();
    assert!(matches!(err, PacketError::ExpiredReservation(_)));
}

fn builder_later(pkt: &ColibriPacket) -> u64 {
    match &pkt.path {
        PathVariant::Reservation(p) => Tick(p.info.exp_tick).to_unix_nanos() + 1,
        _ => unreachable!(),
    }
}

#[test]
fn stale_and_future_timestamps_are_rejected() {
    let (pkt, _) = PacketBuilder::new(now()).build();
    let cfg = RouterConfig::default();
    let stale_at = now() + (cfg.packet_lifetime_ms + cfg.clock_skew_ms + 1) * 1_000_000;
    assert_eq!(processor().process_at(1, &pkt, stale_at), Err(PacketError::StaleTimestamp));

    let future_at = now() - (cfg.clock_skew_ms + 1) * 1_000_000;
    assert_eq!(processor().process_at(1, &pkt, future_at), Err(PacketError::FutureTimestamp));
}

#[test]
fn corrupted_mac_is_rejected_and_counted() {
    let mut builder = PacketBuilder::new(now());
    builder.corrupt_mac = true;
    let (pkt, _) = builder.build();

    let metrics = Arc::new(RouterMetrics::new());
    let proc = ColibriProcessor::new(topology(), KEY, &RouterConfig::default(), metrics.clone());
    assert_eq!(proc.process_at(1, &pkt, now()), Err(PacketError::MacVerificationFailed));
    let snap = metrics.snapshot();
    assert_eq!(snap.packets_dropped, 1);
    assert_eq!(snap.mac_failures, 1);
}

#[test]
fn wrong_key_fails_verification() {
    let (pkt, _) = PacketBuilder::new(now()).build();
    let other_key: MacKey = [0x43; 16];
    let proc = ColibriProcessor::new(topology(), other_key, &RouterConfig::default(), Arc::new(RouterMetrics::new()));
    assert_eq!(proc.process_at(1, &pkt, now()), Err(PacketError::MacVerificationFailed));
}

#[test]
fn non_reservation_paths_are_not_ours() {
    let (mut pkt, _) = PacketBuilder::new(now()).build();
    pkt.path = PathVariant::Scion;
    assert_eq!(processor().process_at(1, &pkt, now()), Err(PacketError::NotColibriPath));
}

#[test]
fn flags_s_without_c_is_invalid() {
    let (mut pkt, _) = PacketBuilder::new(now()).build();
    if let PathVariant::Reservation(p) = &mut pkt.path {
        p.info.s = true;
    }
    assert_eq!(processor().process_at(1, &pkt, now()), Err(PacketError::InvalidFlags));
}

#[test]
fn local_origin_goes_br_transit() {
    let mut builder = PacketBuilder::new(now());
    builder.curr_hf = 0;
    builder.hops = vec![(0, 2), (1, 2), (3, 0)];
    let (pkt, _) = builder.build();
    let outcome = processor().process_at(0, &pkt, now()).unwrap();
    assert!(matches!(outcome.forwarding, Forwarding::BrTransit { egress_id: 2, .. }));
}
