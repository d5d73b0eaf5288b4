use super::{PathError, INFO_FIELD_LEN};
use colibri_base::RlcCls;

/// The 24-byte reservation info field.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |C|R|S|     (0)     |    CurrHF     |    HFCount    |           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+           -+
/// |                     ResIdSuffix (12 bytes)                    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            ExpTick                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     BwCls     |      Rlc      |      (0)      |  Ver  |  (0)  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoField {
    /// Control plane flag: set on setup/renewal traffic.
    pub c: bool,
    /// Reverse flag: the packet travels against the hop field order.
    pub r: bool,
    /// Segment flag.
    pub s: bool,
    pub curr_hf: u8,
    pub hf_count: u8,
    pub res_id_suffix: [u8; 12],
    pub exp_tick: u32,
    pub bw_cls: u8,
    pub rlc: RlcCls,
    /// Reservation version, 4 bits.
    pub ver: u8,
}

impl InfoField {
    pub fn decode_from(b: &[u8]) -> Result<Self, PathError> {
        if b.len() < INFO_FIELD_LEN {
            return Err(PathError::BufferTooShort { is: b.len(), needs: INFO_FIELD_LEN });
        }
        let flags = u16::from_be_bytes(b[0..2].try_into().unwrap());
        let mut res_id_suffix = [0u8; 12];
        res_id_suffix.copy_from_slice(&b[4..16]);
        Ok(Self {
            c: flags & (1 << 15) != 0,
            r: flags & (1 << 14) != 0,
            s: flags & (1 << 13) != 0,
            curr_hf: b[2],
            hf_count: b[3],
            res_id_suffix,
            exp_tick: u32::from_be_bytes(b[16..20].try_into().unwrap()),
            bw_cls: b[20],
            rlc: RlcCls(b[21]),
            ver: b[23] >> 4,
        })
    }

    pub fn encode_to(&self, b: &mut [u8]) -> Result<(), PathError> {
        if b.len() < INFO_FIELD_LEN {
            return Err(PathError::BufferTooShort { is: b.len(), needs: INFO_FIELD_LEN });
        }
        let mut flags = 0u16;
        if self.c {
            flags |= 1 << 15;
        }
        if self.r {
            flags |= 1 << 14;
        }
        if self.s {
            flags |= 1 << 13;
        }
        b[0..2].copy_from_slice(&flags.to_be_bytes());
        b[2] = self.curr_hf;
        b[3] = self.hf_count;
        b[4..16].copy_from_slice(&self.res_id_suffix);
        b[16..20].copy_from_slice(&self.exp_tick.to_be_bytes());
        b[20] = self.bw_cls;
        b[21] = self.rlc.0;
        b[22] = 0;
        b[23] = (self.ver & 0x0f) << 4;
        Ok(())
    }
}
