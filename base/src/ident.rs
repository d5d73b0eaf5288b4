use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Raw length of a segment reservation id: 8 bytes source AS, 4 bytes suffix.
pub const SEGMENT_ID_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("AS number must have three 16-bit hex groups")]
    BadAsFormat,
    #[error("invalid hex group: {0}")]
    BadHexGroup(String),
    #[error("segment id needs {SEGMENT_ID_LEN} bytes, got {0}")]
    BadLength(usize),
}

/// An autonomous system number. Only the low 48 bits are meaningful on the
/// wire; the full 64-bit value is kept for forward compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AsId(pub u64);

impl AsId {
    pub fn value(self) -> u64 {
        self.0
    }

    /// The low 48 bits, as used by the static MAC input.
    pub fn low48(self) -> u64 {
        self.0 & 0x0000_ffff_ffff_ffff
    }
}

impl Display for AsId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let v = self.low48();
        write!(f, "{:x}:{:x}:{:x}", (v >> 32) & 0xffff, (v >> 16) & 0xffff, v & 0xffff)
    }
}

impl FromStr for AsId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut v: u64 = 0;
        let mut n = 0;
        for g in s.split(':') {
            let part = u64::from_str_radix(g, 16).map_err(|_| IdParseError::BadHexGroup(g.to_string()))?;
            if part > 0xffff {
                return Err(IdParseError::BadHexGroup(g.to_string()));
            }
            v = (v << 16) | part;
            n += 1;
        }
        if n != 3 {
            return Err(IdParseError::BadAsFormat);
        }
        Ok(AsId(v))
    }
}

/// An ISD-AS pair identifying an addressable domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct IsdAs {
    pub isd: u16,
    pub asid: AsId,
}

impl IsdAs {
    pub fn new(isd: u16, asid: AsId) -> Self {
        Self { isd, asid }
    }
}

impl Display for IsdAs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.isd, self.asid)
    }
}

/// Globally unique segment reservation id: the source AS plus a 4-byte suffix
/// assigned by that AS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId {
    pub src: AsId,
    pub suffix: [u8; 4],
}

impl SegmentId {
    pub fn new(src: AsId, suffix: [u8; 4]) -> Self {
        Self { src, suffix }
    }

    pub fn from_raw(b: &[u8]) -> Result<Self, IdParseError> {
        if b.len() != SEGMENT_ID_LEN {
            return Err(IdParseError::BadLength(b.len()));
        }
        let src = AsId(u64::from_be_bytes(b[..8].try_into().unwrap()));
        let mut suffix = [0u8; 4];
        suffix.copy_from_slice(&b[8..12]);
        Ok(Self { src, suffix })
    }

    pub fn write_to(&self, b: &mut [u8]) {
        b[..8].copy_from_slice(&self.src.0.to_be_bytes());
        b[8..12].copy_from_slice(&self.suffix);
    }

    pub fn to_raw(&self) -> [u8; SEGMENT_ID_LEN] {
        let mut b = [0u8; SEGMENT_ID_LEN];
        self.write_to(&mut b);
        b
    }
}

impl Display for SegmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.src, faster_hex::hex_string(&self.suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_id_roundtrip() {
        let id: AsId = "ff00:1:1".parse().unwrap();
        assert_eq!(id, AsId(0xff00_0001_0001));
        assert_eq!(id.to_string(), "ff00:1:1");
        assert!("ff00:1".parse::<AsId>().is_err());
        assert!("ff00:1:1:1".parse::<AsId>().is_err());
        assert!("ff00:zz:1".parse::<AsId>().is_err());
    }

    #[test]
    fn segment_id_raw_roundtrip() {
        let id = SegmentId::new(AsId(0xff00_0001_0001), [0xbe, 0xef, 0xca, 0xfe]);
        let raw = id.to_raw();
        assert_eq!(SegmentId::from_raw(&raw).unwrap(), id);
        assert_eq!(id.to_string(), "ff00:1:1-beefcafe");
        assert!(SegmentId::from_raw(&raw[..11]).is_err());
    }
}
