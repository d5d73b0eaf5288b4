use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A bandwidth class. Six bits encode a rate of `16 * 2^cls` kbps. Classes
/// above 59 saturate `u64` kbps and are only kept for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BwCls(u8);

impl BwCls {
    pub const MAX: BwCls = BwCls(63);

    /// Clamps the value into the 6-bit class space.
    pub fn new(cls: u8) -> Self {
        Self(cls.min(Self::MAX.0))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn to_kbps(self) -> u64 {
        16u64.checked_shl(self.0 as u32).unwrap_or(u64::MAX)
    }

    /// The largest class whose rate does not exceed `kbps`, or class 0 when
    /// the rate is below every class.
    pub fn from_kbps(kbps: u64) -> Self {
        if kbps < 16 {
            return Self(0);
        }
        Self::new((kbps / 16).ilog2() as u8)
    }

    pub fn min(a: BwCls, b: BwCls) -> BwCls {
        if a.0 < b.0 {
            a
        } else {
            b
        }
    }
}

impl Display for BwCls {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_roundtrip() {
        for cls in 0..=59u8 {
            assert_eq!(BwCls::from_kbps(BwCls::new(cls).to_kbps()), BwCls::new(cls), "class {cls}");
        }
        // Saturated classes all report u64::MAX kbps and collapse to the
        // largest representable class on the way back.
        for cls in 60..=63u8 {
            assert_eq!(BwCls::new(cls).to_kbps(), u64::MAX);
        }
        assert_eq!(BwCls::from_kbps(u64::MAX), BwCls::new(59));
    }

    #[test]
    fn from_kbps_rounds_down() {
        assert_eq!(BwCls::from_kbps(0), BwCls::new(0));
        assert_eq!(BwCls::from_kbps(15), BwCls::new(0));
        assert_eq!(BwCls::from_kbps(16), BwCls::new(0));
        assert_eq!(BwCls::from_kbps(31), BwCls::new(0));
        assert_eq!(BwCls::from_kbps(32), BwCls::new(1));
        assert_eq!(BwCls::from_kbps(1024), BwCls::new(6));
        assert_eq!(BwCls::from_kbps(1025), BwCls::new(6));
        assert_eq!(BwCls::from_kbps(2047), BwCls::new(6));
        assert_eq!(BwCls::from_kbps(2048), BwCls::new(7));
    }

    #[test]
    fn clamp_and_min() {
        assert_eq!(BwCls::new(200), BwCls::MAX);
        assert_eq!(BwCls::min(BwCls::new(3), BwCls::new(9)), BwCls::new(3));
    }
}
