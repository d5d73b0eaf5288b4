pub mod full;
pub mod hopfield;
pub mod infofield;
pub mod minimal;

pub use full::ReservationPath;
pub use hopfield::HopField;
pub use infofield::InfoField;
pub use minimal::ReservationPathMinimal;

use thiserror::Error;

pub const TIMESTAMP_LEN: usize = 8;
pub const INFO_FIELD_LEN: usize = 24;
pub const HOP_FIELD_LEN: usize = 8;
/// A reservation path has at least two hop fields.
pub const MIN_PATH_LEN: usize = TIMESTAMP_LEN + INFO_FIELD_LEN + 2 * HOP_FIELD_LEN;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("raw reservation path too short: is {is}, needs {needs}")]
    BufferTooShort { is: usize, needs: usize },
    #[error("hop field count {hf_count} exceeds the raw path of {len} bytes")]
    HopsExceedBuffer { hf_count: u8, len: usize },
    #[error("current hop field {curr_hf} out of range, path has {hf_count}")]
    CurrHfOutOfRange { curr_hf: u8, hf_count: u8 },
    #[error("a reservation path needs at least 2 hop fields, has {0}")]
    TooFewHops(u8),
    #[error("path already at the last hop field")]
    AlreadyAtLastHop,
}
