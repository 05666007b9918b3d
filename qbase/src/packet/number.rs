//! Packet number truncation/expansion, see
//! [appendix-A](https://www.rfc-editor.org/rfc/rfc9000.html#appendix-A).

use bytes::{Buf, BufMut};

/// A packet number truncated to the minimal number of bytes needed to
/// unambiguously recover it given the largest acknowledged packet number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketNumber {
    truncated: u32,
    len: usize,
}

impl PacketNumber {
    /// Encode `full` relative to `largest_acked`, choosing the minimal length.
    pub fn encode(full: u64, largest_acked: u64) -> Self {
        let num_unacked = if full > largest_acked {
            full - largest_acked
        } else {
            1
        };
        let min_bits = 64 - (num_unacked * 2).leading_zeros().min(63);
        let len = min_bits.div_ceil(8).clamp(1, 4) as usize;
        let truncated = (full & ((1u64 << (len * 8)) - 1)) as u32;
        Self { truncated, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        match self.len {
            1 => buf.put_u8(self.truncated as u8),
            2 => buf.put_u16(self.truncated as u16),
            3 => buf.put_uint(self.truncated as u64, 3),
            4 => buf.put_u32(self.truncated),
            _ => unreachable!("packet number length is always 1..=4"),
        }
    }

    pub fn read(buf: &mut impl Buf, len: usize) -> Option<Self> {
        if buf.remaining() < len {
            return None;
        }
        let truncated = match len {
            1 => buf.get_u8() as u32,
            2 => buf.get_u16() as u32,
            3 => buf.get_uint(3) as u32,
            4 => buf.get_u32(),
            _ => return None,
        };
        Some(Self { truncated, len })
    }

    /// Recover the full packet number given the largest packet number seen so far
    /// in the same PN space (the decoder's `expected_pn`).
    pub fn decode(self, largest_pn: u64) -> u64 {
        let pn_win = 1u64 << (self.len * 8);
        let pn_hwin = pn_win / 2;
        let pn_mask = pn_win - 1;
        let expected = largest_pn + 1;
        let candidate = (expected & !pn_mask) | self.truncated as u64;

        if candidate + pn_hwin <= expected && candidate < (1 << 62) - pn_win {
            candidate + pn_win
        } else if candidate > expected + pn_hwin && candidate >= pn_win {
            candidate - pn_win
        } else {
            candidate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_near_largest() {
        for largest in [0u64, 1, 127, 1000, 1 << 20] {
            for delta in 0..5u64 {
                let full = largest + delta;
                let encoded = PacketNumber::encode(full, largest);
                let mut buf = bytes::BytesMut::new();
                encoded.write(&mut buf);
                assert_eq!(buf.len(), encoded.len());
                let parsed = PacketNumber::read(&mut buf.freeze(), encoded.len()).unwrap();
                assert_eq!(parsed.decode(largest), full);
            }
        }
    }

    #[test]
    fn large_gap_uses_more_bytes() {
        let pn = PacketNumber::encode(100_000, 0);
        assert!(pn.len() >= 3);
    }
}
