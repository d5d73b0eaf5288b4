use super::{HopField, InfoField, PathError, HOP_FIELD_LEN, INFO_FIELD_LEN, MIN_PATH_LEN, TIMESTAMP_LEN};
use bytes::BytesMut;

const HOPS_OFFSET: usize = TIMESTAMP_LEN + INFO_FIELD_LEN;

/// The border-router view of a reservation path: info field plus the hop
/// field at `curr_hf`, with the raw bytes retained. Forwarding only rewrites
/// the timestamp/info window, so serialization never touches the hop fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationPathMinimal {
    pub packet_timestamp: u64,
    pub info: InfoField,
    /// The hop field this router validated. Not refreshed by
    /// [`Self::increment`]; it keeps describing the authenticated hop.
    pub curr_hop: HopField,
    raw: BytesMut,
}

impl ReservationPathMinimal {
    pub fn decode_from(b: &[u8]) -> Result<Self, PathError> {
        if b.len() < MIN_PATH_LEN {
            return Err(PathError::BufferTooShort { is: b.len(), needs: MIN_PATH_LEN });
        }
        let info = InfoField::decode_from(&b[TIMESTAMP_LEN..HOPS_OFFSET])?;
        if info.hf_count < 2 {
            return Err(PathError::TooFewHops(info.hf_count));
        }
        let total = HOPS_OFFSET + info.hf_count as usize * HOP_FIELD_LEN;
        if total > b.len() {
            return Err(PathError::HopsExceedBuffer { hf_count: info.hf_count, len: b.len() });
        }
        if info.curr_hf >= info.hf_count {
            return Err(PathError::CurrHfOutOfRange { curr_hf: info.curr_hf, hf_count: info.hf_count });
        }
        let start = HOPS_OFFSET + info.curr_hf as usize * HOP_FIELD_LEN;
        let curr_hop = HopField::decode_from(&b[start..start + HOP_FIELD_LEN])?;
        Ok(Self {
            packet_timestamp: u64::from_be_bytes(b[..TIMESTAMP_LEN].try_into().unwrap()),
            info,
            curr_hop,
            raw: BytesMut::from(&b[..total]),
        })
    }

    pub fn len(&self) -> usize {
        HOPS_OFFSET + self.info.hf_count as usize * HOP_FIELD_LEN
    }

    /// Advances the path one hop toward the egress. Fails at the last hop.
    pub fn increment(&mut self) -> Result<(), PathError> {
        if self.info.curr_hf + 1 >= self.info.hf_count {
            return Err(PathError::AlreadyAtLastHop);
        }
        self.info.curr_hf += 1;
        Ok(())
    }

    pub fn reverse(&mut self) {
        self.info.r = !self.info.r;
    }

    /// Whether the validated hop is the last one in travel direction.
    pub fn at_last_hop(&self) -> bool {
        if self.info.r {
            self.info.curr_hf == 0
        } else {
            self.info.curr_hf + 1 == self.info.hf_count
        }
    }

    /// Serializes timestamp and info field into the retained raw bytes and
    /// returns the whole path. The hop fields are reused verbatim.
    pub fn serialize(&mut self) -> Result<&[u8], PathError> {
        self.raw[..TIMESTAMP_LEN].copy_from_slice(&self.packet_timestamp.to_be_bytes());
        let info_window: &mut [u8] = &mut self.raw[TIMESTAMP_LEN..HOPS_OFFSET];
        self.info.encode_to(info_window)?;
        Ok(&self.raw)
    }
}
