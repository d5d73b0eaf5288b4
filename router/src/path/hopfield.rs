use super::{PathError, HOP_FIELD_LEN};

/// An 8-byte reservation hop field: the interface pair of one on-path AS
/// plus the (truncated) MAC protecting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HopField {
    pub ingress_id: u16,
    pub egress_id: u16,
    pub mac: [u8; 4],
}

impl HopField {
    pub fn decode_from(b: &[u8]) -> Result<Self, PathError> {
        if b.len() < HOP_FIELD_LEN {
            return Err(PathError::BufferTooShort { is: b.len(), needs: HOP_FIELD_LEN });
        }
        let mut mac = [0u8; 4];
        mac.copy_from_slice(&b[4..8]);
        Ok(Self {
            ingress_id: u16::from_be_bytes(b[0..2].try_into().unwrap()),
            egress_id: u16::from_be_bytes(b[2..4].try_into().unwrap()),
            mac,
        })
    }

    pub fn encode_to(&self, b: &mut [u8]) -> Result<(), PathError> {
        if b.len() < HOP_FIELD_LEN {
            return Err(PathError::BufferTooShort { is: b.len(), needs: HOP_FIELD_LEN });
        }
        b[0..2].copy_from_slice(&self.ingress_id.to_be_bytes());
        b[2..4].copy_from_slice(&self.egress_id.to_be_bytes());
        b[4..8].copy_from_slice(&self.mac);
        Ok(())
    }
}
