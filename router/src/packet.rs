use crate::path::ReservationPathMinimal;
use bytes::Bytes;
use colibri_base::IsdAs;

/// L4 protocol number of SCMP.
pub const PROTO_SCMP: u8 = 202;
pub const PROTO_UDP: u8 = 17;
/// Well-known UDP destination port of BFD sessions.
pub const BFD_PORT: u16 = 3784;

/// A host address as carried in the SCION address header: the 2-bit type
/// plus the raw bytes (whose length is a multiple of 4 up to 16).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHostAddr {
    pub addr_type: u8,
    pub raw: Vec<u8>,
}

impl RawHostAddr {
    pub fn ipv4(octets: [u8; 4]) -> Self {
        Self { addr_type: 0, raw: octets.to_vec() }
    }

    pub fn ipv6(octets: [u8; 16]) -> Self {
        Self { addr_type: 0, raw: octets.to_vec() }
    }

    /// The 2-bit length code: number of 4-byte words minus one.
    pub fn len_code(&self) -> u8 {
        (self.raw.len() / 4).saturating_sub(1) as u8 & 0x03
    }
}

/// The decoded path of a packet, dispatched on by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVariant {
    Reservation(ReservationPathMinimal),
    Scion,
    OneHop,
    Epic,
}

/// The common and address header fields of a SCION packet that the COLIBRI
/// data plane needs. Parsing the outer layers is the encapsulating router's
/// job; this is the narrow view handed to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScionHeader {
    pub src_ia: IsdAs,
    pub dst_ia: IsdAs,
    pub src_host: RawHostAddr,
    pub dst_host: RawHostAddr,
    /// Payload length as declared in the common header.
    pub payload_len: u16,
    /// Payload length at the original sender, authenticated by the
    /// per-packet MAC. Equal to `payload_len` on the forward direction.
    pub orig_payload_len: u16,
    pub common_hdr_len: u16,
    pub addr_hdr_len: u16,
    /// L4 protocol following the SCION headers.
    pub next_hdr: u8,
}

/// One received packet: outer header view, decoded path and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColibriPacket {
    pub scion: ScionHeader,
    pub path: PathVariant,
    pub payload: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_addr_length_codes() {
        assert_eq!(RawHostAddr::ipv4([10, 0, 0, 1]).len_code(), 0);
        assert_eq!(RawHostAddr::ipv6([0; 16]).len_code(), 3);
    }
}
