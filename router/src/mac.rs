//! The three CBC-MAC variants protecting reservation traffic.
//!
//! All of them are AES-128 CBC with a zero IV over a zero-padded input,
//! truncated to the first 4 bytes of the last cipher block. The exception is
//! the per-source sigma authenticator, which keeps the full last block: it is
//! not a tag but the key for the per-packet MAC.

use crate::packet::ScionHeader;
use crate::path::{HopField, InfoField, HOP_FIELD_LEN, INFO_FIELD_LEN, TIMESTAMP_LEN};
use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};
use colibri_base::IsdAs;
use thiserror::Error;

pub const MAC_LEN: usize = 4;
pub const SIGMA_LEN: usize = 16;
/// Length of the field block authenticated by the static MAC.
const STATIC_INPUT_LEN: usize = 30;

pub type MacKey = [u8; 16];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MacError {
    #[error("authenticated packet length {0} exceeds 2^16")]
    TotalLenOverflow(usize),
    #[error("MAC verification failed")]
    VerificationFailed,
}

fn cbc_mac(key: &MacKey, input: &[u8]) -> [u8; 16] {
    debug_assert!(!input.is_empty() && input.len() % 16 == 0);
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut prev = [0u8; 16];
    for chunk in input.chunks_exact(16) {
        let mut block = GenericArray::clone_from_slice(chunk);
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(&mut block);
        prev.copy_from_slice(&block);
    }
    prev
}

/// The 30-byte field block shared by the static MAC and the sigma
/// authenticator: reservation identity, expiry, classes, flags and the
/// interface pair of the authenticated hop.
fn static_input(src_ia: IsdAs, info: &InfoField, hop: &HopField) -> [u8; STATIC_INPUT_LEN] {
    let mut input = [0u8; STATIC_INPUT_LEN];
    input[0..12].copy_from_slice(&info.res_id_suffix);
    input[12..16].copy_from_slice(&info.exp_tick.to_be_bytes());
    input[16] = info.bw_cls;
    input[17] = info.rlc.0;
    input[18] = 0;
    input[19] = (info.ver & 0x0f) << 4 | if info.c { 1 << 3 } else { 0 };
    input[20..22].copy_from_slice(&hop.ingress_id.to_be_bytes());
    input[22..24].copy_from_slice(&hop.egress_id.to_be_bytes());
    input[24..30].copy_from_slice(&src_ia.asid.low48().to_be_bytes()[2..8]);
    input
}

/// Static hop-field MAC over the control-plane fields.
pub fn static_mac(key: &MacKey, src_ia: IsdAs, info: &InfoField, hop: &HopField) -> [u8; MAC_LEN] {
    let mut input = [0u8; 32];
    input[..STATIC_INPUT_LEN].copy_from_slice(&static_input(src_ia, info, hop));
    let block = cbc_mac(key, &input);
    block[..MAC_LEN].try_into().unwrap()
}

/// Per-source sigma authenticator: the static field block extended by the
/// end-host addresses. The full last block is returned; it keys the
/// per-packet MAC.
pub fn sigma_authenticator(key: &MacKey, scion: &ScionHeader, info: &InfoField, hop: &HopField) -> [u8; SIGMA_LEN] {
    let flags = (scion.dst_host.addr_type & 0x03) << 6
        | scion.dst_host.len_code() << 4
        | (scion.src_host.addr_type & 0x03) << 2
        | scion.src_host.len_code();
    let raw_len = STATIC_INPUT_LEN + 1 + scion.src_host.raw.len() + scion.dst_host.raw.len();
    let mut input = vec![0u8; raw_len.next_multiple_of(16)];
    input[..STATIC_INPUT_LEN].copy_from_slice(&static_input(scion.src_ia, info, hop));
    input[STATIC_INPUT_LEN] = flags;
    let src_end = STATIC_INPUT_LEN + 1 + scion.src_host.raw.len();
    input[STATIC_INPUT_LEN + 1..src_end].copy_from_slice(&scion.src_host.raw);
    input[src_end..raw_len].copy_from_slice(&scion.dst_host.raw);
    cbc_mac(key, &input)
}

/// Total authenticated packet length: headers, reservation path and the
/// original payload.
fn total_len(scion: &ScionHeader, info: &InfoField) -> Result<u16, MacError> {
    let path_len = TIMESTAMP_LEN + INFO_FIELD_LEN + info.hf_count as usize * HOP_FIELD_LEN;
    let total = scion.common_hdr_len as usize + scion.addr_hdr_len as usize + path_len + scion.orig_payload_len as usize;
    u16::try_from(total).map_err(|_| MacError::TotalLenOverflow(total))
}

/// Per-packet MAC over the packet timestamp and total length, keyed by the
/// sigma authenticator.
pub fn packet_mac(auth: &[u8; SIGMA_LEN], scion: &ScionHeader, packet_timestamp: u64, info: &InfoField) -> Result<[u8; MAC_LEN], MacError> {
    let mut input = [0u8; 16];
    input[0..8].copy_from_slice(&packet_timestamp.to_be_bytes());
    input[8..10].copy_from_slice(&total_len(scion, info)?.to_be_bytes());
    let block = cbc_mac(auth, &input);
    Ok(block[..MAC_LEN].try_into().unwrap())
}

/// Verifies the MAC of the current hop field: the static MAC for control
/// packets, the sigma-keyed per-packet MAC for data packets.
pub fn verify_mac(
    key: &MacKey,
    scion: &ScionHeader,
    packet_timestamp: u64,
    info: &InfoField,
    hop: &HopField,
) -> Result<(), MacError> {
    let expected = if info.c {
        static_mac(key, scion.src_ia, info, hop)
    } else {
        let sigma = sigma_authenticator(key, scion, info, hop);
        packet_mac(&sigma, scion, packet_timestamp, info)?
    };
    if expected != hop.mac {
        return Err(MacError::VerificationFailed);
    }
    Ok(())
}
