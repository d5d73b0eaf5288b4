use crate::{BwCls, PathEndProps, SegmentId, SplitCls, SEGMENT_ID_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed part of the setup request wire format: 12 B id, min/max/split/props
/// bytes, 8 B timestamp.
pub const SETUP_REQ_FIXED_LEN: usize = SEGMENT_ID_LEN + 4 + 8;
pub const BEAD_LEN: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestCodecError {
    #[error("setup request needs at least {SETUP_REQ_FIXED_LEN} bytes, got {0}")]
    TooShort(usize),
    #[error("trailing {0} bytes do not form whole allocation beads")]
    RaggedTrail(usize),
    #[error("buffer too small: needs {needs}, got {got}")]
    BufferTooSmall { needs: usize, got: usize },
    #[error(transparent)]
    Id(#[from] crate::ident::IdParseError),
}

/// One `{alloc, max}` pair appended to the trail by each on-path AS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationBead {
    pub alloc: BwCls,
    pub max: BwCls,
}

/// A segment reservation setup request as it travels along the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupRequest {
    pub id: SegmentId,
    /// Unix seconds at which the request was issued by the source.
    pub timestamp: u64,
    pub ingress: u16,
    pub egress: u16,
    pub min_bw: BwCls,
    pub max_bw: BwCls,
    pub split_cls: SplitCls,
    pub path_props: PathEndProps,
    pub alloc_trail: Vec<AllocationBead>,
}

impl SetupRequest {
    /// The bandwidth granted upstream: the smallest `max` over the trail, in
    /// kbps. An empty trail (request at its first AS) is only bounded by the
    /// requested maximum.
    pub fn prev_bw_kbps(&self) -> u64 {
        self.alloc_trail.iter().map(|b| b.max).min().unwrap_or(self.max_bw).to_kbps()
    }

    pub fn wire_len(&self) -> usize {
        SETUP_REQ_FIXED_LEN + self.alloc_trail.len() * BEAD_LEN
    }

    pub fn encode_to(&self, b: &mut [u8]) -> Result<usize, RequestCodecError> {
        let needs = self.wire_len();
        if b.len() < needs {
            return Err(RequestCodecError::BufferTooSmall { needs, got: b.len() });
        }
        self.id.write_to(&mut b[..SEGMENT_ID_LEN]);
        b[12] = self.min_bw.value();
        b[13] = self.max_bw.value();
        b[14] = self.split_cls.0;
        b[15] = self.path_props.bits();
        b[16..24].copy_from_slice(&self.timestamp.to_be_bytes());
        for (i, bead) in self.alloc_trail.iter().enumerate() {
            let off = SETUP_REQ_FIXED_LEN + i * BEAD_LEN;
            b[off] = bead.alloc.value();
            b[off + 1] = bead.max.value();
        }
        Ok(needs)
    }

    /// Decodes a request sent over the wire. Interface ids are not part of
    /// the message; the receiving service fills them in from the underlying
    /// path.
    pub fn decode_from(b: &[u8]) -> Result<Self, RequestCodecError> {
        if b.len() < SETUP_REQ_FIXED_LEN {
            return Err(RequestCodecError::TooShort(b.len()));
        }
        let trail_bytes = b.len() - SETUP_REQ_FIXED_LEN;
        if trail_bytes % BEAD_LEN != 0 {
            return Err(RequestCodecError::RaggedTrail(trail_bytes % BEAD_LEN));
        }
        let id = SegmentId::from_raw(&b[..SEGMENT_ID_LEN])?;
        let mut alloc_trail = Vec::with_capacity(trail_bytes / BEAD_LEN);
        for chunk in b[SETUP_REQ_FIXED_LEN..].chunks_exact(BEAD_LEN) {
            alloc_trail.push(AllocationBead { alloc: BwCls::new(chunk[0]), max: BwCls::new(chunk[1]) });
        }
        Ok(Self {
            id,
            timestamp: u64::from_be_bytes(b[16..24].try_into().unwrap()),
            ingress: 0,
            egress: 0,
            min_bw: BwCls::new(b[12]),
            max_bw: BwCls::new(b[13]),
            split_cls: SplitCls(b[14]),
            path_props: PathEndProps::from_bits(b[15]),
            alloc_trail,
        })
    }
}
