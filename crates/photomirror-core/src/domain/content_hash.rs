//! Content checksum for asset verification
//!
//! The remote service publishes a checksum for every asset; the store
//! recomputes it over the downloaded bytes so corrupted or tampered files
//! are rejected even when their size and mtime look right.
//!
//! The scheme is a 160-bit rolling XOR digest: each input byte is XOR-ed
//! into the state at the current *bit* position and the position advances
//! by 11 bits (mod 160). After all input, the total length (little-endian
//! `u64`) is XOR-ed into the first 8 bytes, and the 20-byte result is
//! base64-encoded. Length folding makes the digest reject truncations and
//! zero-padded extensions that plain XOR would miss.

use base64::Engine;

/// Width of the digest state in bits.
const WIDTH_BITS: usize = 160;

/// Number of bits the position advances per input byte.
const SHIFT_STEP: usize = 11;

/// Streaming digest state.
#[derive(Debug)]
struct XorDigest {
    data: [u8; 20],
    shift: usize,
    length: u64,
}

impl XorDigest {
    fn new() -> Self {
        Self {
            data: [0u8; 20],
            shift: 0,
            length: 0,
        }
    }

    fn update(&mut self, input: &[u8]) {
        for &byte in input {
            let byte_pos = self.shift / 8;
            let bit_offset = self.shift % 8;

            self.data[byte_pos % 20] ^= byte << bit_offset;
            if bit_offset > 0 {
                self.data[(byte_pos + 1) % 20] ^= byte >> (8 - bit_offset);
            }

            self.shift = (self.shift + SHIFT_STEP) % WIDTH_BITS;
        }
        self.length += input.len() as u64;
    }

    fn finalize(mut self) -> [u8; 20] {
        let length_bytes = self.length.to_le_bytes();
        for (i, &lb) in length_bytes.iter().enumerate() {
            self.data[i] ^= lb;
        }
        self.data
    }
}

/// Compute the base64-encoded content digest of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    let mut state = XorDigest::new();
    state.update(bytes);
    base64::engine::general_purpose::STANDARD.encode(state.finalize())
}

// ============================================================================
// Tests
// ============================================================================
