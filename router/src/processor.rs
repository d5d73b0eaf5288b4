use crate::mac::{verify_mac, MacError, MacKey};
use crate::packet::{ColibriPacket, PathVariant, RawHostAddr, BFD_PORT, PROTO_SCMP, PROTO_UDP};
use crate::path::{PathError, ReservationPathMinimal};
use crate::scheduler::TrafficClass;
use crate::timestamp::sender_time_millis;
use crate::RouterConfig;
use crate::RouterMetrics;
use bytes::Bytes;
use colibri_base::{time, IsdAs, Tick};
use log::{debug, trace};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("not a reservation path")]
    NotColibriPath,
    #[error(transparent)]
    Malformed(#[from] PathError),
    #[error("inconsistent flags: S requires C")]
    InvalidFlags,
    #[error("packet arrived on interface {got}, hop field expects {want}")]
    InvalidIngress { want: u16, got: u16 },
    #[error("payload length mismatch: header says {header}, packet carries {actual}")]
    PayloadLenMismatch { header: u16, actual: usize },
    #[error("original payload length {orig} does not match header length {header}")]
    OrigPayloadLenMismatch { orig: u16, header: u16 },
    #[error("reservation expired at tick {0}")]
    ExpiredReservation(Tick),
    #[error("packet older than its lifetime")]
    StaleTimestamp,
    #[error("packet timestamp from the future")]
    FutureTimestamp,
    #[error("MAC verification failed")]
    MacVerificationFailed,
    #[error("authenticated packet length {0} exceeds 2^16")]
    PacketTooLong(usize),
    #[error("no route toward egress interface {0}")]
    RouteNotFound(u16),
}

impl From<MacError> for PacketError {
    fn from(err: MacError) -> Self {
        match err {
            MacError::VerificationFailed => PacketError::MacVerificationFailed,
            MacError::TotalLenOverflow(len) => PacketError::PacketTooLong(len),
        }
    }
}

/// The forwarding surface of this router inside its AS.
#[derive(Debug, Clone)]
pub struct RouterTopology {
    pub local_ia: IsdAs,
    /// Interfaces owned by this router: egress interface id to the underlay
    /// address of the neighboring border router.
    pub own_interfaces: BTreeMap<u16, SocketAddr>,
    /// Interfaces of this AS served by sibling routers: interface id to the
    /// sibling's internal address.
    pub sibling_interfaces: BTreeMap<u16, SocketAddr>,
    /// Local COLIBRI service endpoint, if one is registered.
    pub colibri_service: Option<SocketAddr>,
}

/// Where a validated packet goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forwarding {
    /// Out one of this router's own interfaces.
    BrTransit { egress_id: u16, next_hop: SocketAddr },
    /// Toward the sibling router serving the egress interface.
    AsTransit { egress_id: u16, router: SocketAddr },
    /// Delivery to the destination host in this AS.
    Local { host: RawHostAddr },
    /// Dispatch to the local COLIBRI service.
    Service { addr: SocketAddr },
}

/// Result of processing one packet: the scheduling class, the forwarding
/// decision and the re-serialized reservation path bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub class: TrafficClass,
    pub forwarding: Forwarding,
    pub path_raw: Bytes,
}

/// Assigns the scheduling class of a forwarded packet from its path type and
/// transport headers.
pub fn classify(pkt: &ColibriPacket) -> TrafficClass {
    match &pkt.path {
        PathVariant::Reservation(_) => TrafficClass::Colibri,
        PathVariant::Epic => TrafficClass::Epic,
        PathVariant::Scion | PathVariant::OneHop => match pkt.scion.next_hdr {
            PROTO_SCMP => TrafficClass::Scmp,
            PROTO_UDP if is_bfd(&pkt.payload) => TrafficClass::Bfd,
            PROTO_UDP => TrafficClass::Scion,
            _ => TrafficClass::Others,
        },
    }
}

fn is_bfd(payload: &[u8]) -> bool {
    payload.len() >= 4 && u16::from_be_bytes(payload[2..4].try_into().unwrap()) == BFD_PORT
}

/// Per-packet validation, authentication and forwarding for reservation
/// traffic. Pure CPU; all methods are safe to call from parallel workers.
pub struct ColibriProcessor {
    topology: RouterTopology,
    key: MacKey,
    packet_lifetime_ms: u64,
    clock_skew_ms: u64,
    metrics: Arc<RouterMetrics>,
}

impl ColibriProcessor {
    pub fn new(topology: RouterTopology, key: MacKey, config: &RouterConfig, metrics: Arc<RouterMetrics>) -> Self {
        Self { topology, key, packet_lifetime_ms: config.packet_lifetime_ms, clock_skew_ms: config.clock_skew_ms, metrics }
    }

    /// Runs the full pipeline on one received packet.
    pub fn process(&self, ingress_id: u16, pkt: &ColibriPacket) -> Result<ProcessOutcome, PacketError> {
        self.process_at(ingress_id, pkt, time::unix_now_nanos())
    }

    pub fn process_at(&self, ingress_id: u16, pkt: &ColibriPacket, now_nanos: u64) -> Result<ProcessOutcome, PacketError> {
        self.metrics.record_processed();
        let result = self.run_pipeline(ingress_id, pkt, now_nanos);
        match &result {
            Ok(outcome) => {
                self.metrics.record_forwarded();
                trace!("router.event=forwarded class={} ingress={}", outcome.class.as_str(), ingress_id);
            }
            Err(err) => {
                self.metrics.record_drop();
                if matches!(err, PacketError::MacVerificationFailed) {
                    self.metrics.record_mac_failure();
                }
                debug!("router.event=drop ingress={ingress_id} reason={err}");
            }
        }
        result
    }

    fn run_pipeline(&self, ingress_id: u16, pkt: &ColibriPacket, now_nanos: u64) -> Result<ProcessOutcome, PacketError> {
        let mut path = self.get_path(pkt)?;
        self.basic_validation(ingress_id, pkt, &path, now_nanos)?;
        self.cryptographic_validation(pkt, &path)?;
        self.forward(ingress_id, pkt, &mut path)
    }

    fn get_path(&self, pkt: &ColibriPacket) -> Result<ReservationPathMinimal, PacketError> {
        match &pkt.path {
            PathVariant::Reservation(minimal) => Ok(minimal.clone()),
            _ => Err(PacketError::NotColibriPath),
        }
    }

    fn basic_validation(
        &self,
        ingress_id: u16,
        pkt: &ColibriPacket,
        path: &ReservationPathMinimal,
        now_nanos: u64,
    ) -> Result<(), PacketError> {
        let info = &path.info;
        if info.s && !info.c {
            return Err(PacketError::InvalidFlags);
        }
        let want = if info.r { path.curr_hop.egress_id } else { path.curr_hop.ingress_id };
        if want != ingress_id {
            return Err(PacketError::InvalidIngress { want, got: ingress_id });
        }
        if pkt.scion.payload_len as usize != pkt.payload.len() {
            return Err(PacketError::PayloadLenMismatch { header: pkt.scion.payload_len, actual: pkt.payload.len() });
        }
        // On the reverse path the original length is unknown to the
        // receiver, so only the forward direction pins it to the header.
        if !info.r && pkt.scion.orig_payload_len != pkt.scion.payload_len {
            return Err(PacketError::OrigPayloadLenMismatch { orig: pkt.scion.orig_payload_len, header: pkt.scion.payload_len });
        }
        if info.hf_count < 2 {
            return Err(PathError::TooFewHops(info.hf_count).into());
        }
        if info.curr_hf >= info.hf_count {
            return Err(PathError::CurrHfOutOfRange { curr_hf: info.curr_hf, hf_count: info.hf_count }.into());
        }
        let exp = Tick(info.exp_tick);
        if exp.is_expired_at(now_nanos) {
            return Err(PacketError::ExpiredReservation(exp));
        }
        if !info.c {
            let now_ms = now_nanos / 1_000_000;
            let sender_ms = sender_time_millis(exp, path.packet_timestamp);
            if now_ms > sender_ms + self.packet_lifetime_ms + self.clock_skew_ms {
                return Err(PacketError::StaleTimestamp);
            }
            if now_ms < sender_ms.saturating_sub(self.clock_skew_ms) {
                return Err(PacketError::FutureTimestamp);
            }
        }
        Ok(())
    }

    fn cryptographic_validation(&self, pkt: &ColibriPacket, path: &ReservationPathMinimal) -> Result<(), PacketError> {
        verify_mac(&self.key, &pkt.scion, path.packet_timestamp, &path.info, &path.curr_hop)?;
        Ok(())
    }

    fn forward(&self, ingress_id: u16, pkt: &ColibriPacket, path: &mut ReservationPathMinimal) -> Result<ProcessOutcome, PacketError> {
        let egress_id = if path.info.r { path.curr_hop.ingress_id } else { path.curr_hop.egress_id };

        // From the local host: always border-router transit.
        if ingress_id == 0 {
            return self.transit(egress_id, path);
        }
        // External control traffic terminates at the COLIBRI service.
        if path.info.c {
            let addr = self.topology.colibri_service.ok_or(PacketError::RouteNotFound(0))?;
            return Ok(ProcessOutcome { class: TrafficClass::Colibri, forwarding: Forwarding::Service { addr }, path_raw: raw(path)? });
        }
        // Data traffic for a host in this AS.
        if pkt.scion.dst_ia == self.topology.local_ia && egress_id == 0 && path.at_last_hop() {
            return Ok(ProcessOutcome {
                class: TrafficClass::Colibri,
                forwarding: Forwarding::Local { host: pkt.scion.dst_host.clone() },
                path_raw: raw(path)?,
            });
        }
        self.transit(egress_id, path)
    }

    /// Out through one of our interfaces, or internally toward the sibling
    /// router serving the egress interface.
    fn transit(&self, egress_id: u16, path: &mut ReservationPathMinimal) -> Result<ProcessOutcome, PacketError> {
        if let Some(&next_hop) = self.topology.own_interfaces.get(&egress_id) {
            path.increment()?;
            return Ok(ProcessOutcome {
                class: TrafficClass::Colibri,
                forwarding: Forwarding::BrTransit { egress_id, next_hop },
                path_raw: raw(path)?,
            });
        }
        if let Some(&router) = self.topology.sibling_interfaces.get(&egress_id) {
            return Ok(ProcessOutcome {
                class: TrafficClass::Colibri,
                forwarding: Forwarding::AsTransit { egress_id, router },
                path_raw: raw(path)?,
            });
        }
        Err(PacketError::RouteNotFound(egress_id))
    }
}

fn raw(path: &mut ReservationPathMinimal) -> Result<Bytes, PacketError> {
    Ok(Bytes::copy_from_slice(path.serialize()?))
}
