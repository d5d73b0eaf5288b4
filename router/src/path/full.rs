use super::{HopField, InfoField, PathError, HOP_FIELD_LEN, INFO_FIELD_LEN, MIN_PATH_LEN, TIMESTAMP_LEN};

const HOPS_OFFSET: usize = TIMESTAMP_LEN + INFO_FIELD_LEN;

/// A fully decoded reservation path: packet timestamp, info field and every
/// hop field. Used by the control plane, endpoints and path reversal; the
/// border router fast path uses [`super::ReservationPathMinimal`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationPath {
    pub packet_timestamp: u64,
    pub info: InfoField,
    pub hops: Vec<HopField>,
}

impl ReservationPath {
    pub fn decode_from(b: &[u8]) -> Result<Self, PathError> {
        if b.len() < MIN_PATH_LEN {
            return Err(PathError::BufferTooShort { is: b.len(), needs: MIN_PATH_LEN });
        }
        let info = InfoField::decode_from(&b[TIMESTAMP_LEN..HOPS_OFFSET])?;
        if info.hf_count < 2 {
            return Err(PathError::TooFewHops(info.hf_count));
        }
        let hop_count = info.hf_count as usize;
        if HOPS_OFFSET + hop_count * HOP_FIELD_LEN > b.len() {
            return Err(PathError::HopsExceedBuffer { hf_count: info.hf_count, len: b.len() });
        }
        if info.curr_hf >= info.hf_count {
            return Err(PathError::CurrHfOutOfRange { curr_hf: info.curr_hf, hf_count: info.hf_count });
        }
        let mut hops = Vec::with_capacity(hop_count);
        for i in 0..hop_count {
            let start = HOPS_OFFSET + i * HOP_FIELD_LEN;
            hops.push(HopField::decode_from(&b[start..start + HOP_FIELD_LEN])?);
        }
        Ok(Self { packet_timestamp: u64::from_be_bytes(b[..TIMESTAMP_LEN].try_into().unwrap()), info, hops })
    }

    pub fn encode_to(&self, b: &mut [u8]) -> Result<usize, PathError> {
        if self.hops.len() < 2 {
            return Err(PathError::TooFewHops(self.hops.len() as u8));
        }
        let needs = self.len();
        if b.len() < needs {
            return Err(PathError::BufferTooShort { is: b.len(), needs });
        }
        b[..TIMESTAMP_LEN].copy_from_slice(&self.packet_timestamp.to_be_bytes());
        self.info.encode_to(&mut b[TIMESTAMP_LEN..HOPS_OFFSET])?;
        for (i, hop) in self.hops.iter().enumerate() {
            let start = HOPS_OFFSET + i * HOP_FIELD_LEN;
            hop.encode_to(&mut b[start..start + HOP_FIELD_LEN])?;
        }
        Ok(needs)
    }

    pub fn len(&self) -> usize {
        HOPS_OFFSET + self.hops.len() * HOP_FIELD_LEN
    }

    pub fn current_hop(&self) -> &HopField {
        &self.hops[self.info.curr_hf as usize]
    }

    /// Path reversal only flips the R flag; the hop field order stays as
    /// constructed.
    pub fn reverse(&mut self) {
        self.info.r = !self.info.r;
    }
}
