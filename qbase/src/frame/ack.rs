//! ACK and ACK_ECN frames.

use bytes::BufMut;

use super::{EncodeFrame, FrameType, GetFrameType, error::Error, io::WriteFrame};
use crate::varint::{VarInt, WriteVarInt, be_varint};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct EcnCounts {
    pub ect0: VarInt,
    pub ect1: VarInt,
    pub ce: VarInt,
}

/// A decoded ACK frame. `ranges` holds `(gap, ack_range_length)` pairs following
/// the first ack range, exactly as they appear on the wire
/// (see [section-19.3](https://www.rfc-editor.org/rfc/rfc9000.html#section-19.3)).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AckFrame {
    pub largest_acked: VarInt,
    pub ack_delay: VarInt,
    pub first_ack_range: VarInt,
    pub ranges: Vec<(VarInt, VarInt)>,
    pub ecn: Option<EcnCounts>,
}

impl AckFrame {
    /// The `Largest Acknowledged` field, as a plain `u64`.
    pub fn largest(&self) -> u64 {
        self.largest_acked.into_inner()
    }

    /// Expand the compact wire representation into concrete `[start, end]`
    /// inclusive packet-number ranges, largest-first.
    pub fn into_ranges(&self) -> Vec<(u64, u64)> {
        let mut ranges = Vec::with_capacity(self.ranges.len() + 1);
        let largest = self.largest_acked.into_inner();
        let first_len = self.first_ack_range.into_inner();
        let mut smallest = largest.saturating_sub(first_len);
        ranges.push((smallest, largest));
        for (gap, len) in &self.ranges {
            let gap = gap.into_inner();
            let len = len.into_inner();
            let next_largest = smallest.saturating_sub(gap + 2);
            let next_smallest = next_largest.saturating_sub(len);
            ranges.push((next_smallest, next_largest));
            smallest = next_smallest;
        }
        ranges
    }
}

impl GetFrameType for AckFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::Ack(self.ecn.is_some() as u8)
    }
}

impl EncodeFrame for AckFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8 + 8 + 8 + self.ranges.len() * (8 + 8) + 8 * 3
    }

    fn encoding_size(&self) -> usize {
        let mut size = 1
            + self.largest_acked.encoding_size()
            + self.ack_delay.encoding_size()
            + self.first_ack_range.encoding_size()
            + VarInt::try_from(self.ranges.len() as u64).unwrap().encoding_size();
        for (gap, len) in &self.ranges {
            size += gap.encoding_size() + len.encoding_size();
        }
        if let Some(ecn) = &self.ecn {
            size += ecn.ect0.encoding_size() + ecn.ect1.encoding_size() + ecn.ce.encoding_size();
        }
        size
    }
}

impl<T: BufMut> WriteFrame<AckFrame> for T {
    fn put_frame(&mut self, frame: &AckFrame) {
        self.put_u8(if frame.ecn.is_some() { 0x03 } else { 0x02 });
        self.put_varint(&frame.largest_acked);
        self.put_varint(&frame.ack_delay);
        self.put_varint(&VarInt::try_from(frame.ranges.len() as u64).expect("too many ack ranges"));
        self.put_varint(&frame.first_ack_range);
        for (gap, len) in &frame.ranges {
            self.put_varint(gap);
            self.put_varint(len);
        }
        if let Some(ecn) = &frame.ecn {
            self.put_varint(&ecn.ect0);
            self.put_varint(&ecn.ect1);
            self.put_varint(&ecn.ce);
        }
    }
}

pub fn be_ack_frame(has_ecn: bool, input: &[u8]) -> nom::IResult<&[u8], AckFrame, Error> {
    let incomplete = |what: &str| nom::Err::Error(Error::IncompleteType(format!("ACK {what}")));
    let (remain, largest_acked) = be_varint(input).map_err(|_| incomplete("largest_acked"))?;
    let (remain, ack_delay) = be_varint(remain).map_err(|_| incomplete("ack_delay"))?;
    let (remain, range_count) = be_varint(remain).map_err(|_| incomplete("range_count"))?;
    let (mut remain, first_ack_range) = be_varint(remain).map_err(|_| incomplete("first_ack_range"))?;

    let mut ranges = Vec::with_capacity(range_count.into_inner() as usize);
    for _ in 0..range_count.into_inner() {
        let (r, gap) = be_varint(remain).map_err(|_| incomplete("gap"))?;
        let (r, len) = be_varint(r).map_err(|_| incomplete("ack_range_length"))?;
        ranges.push((gap, len));
        remain = r;
    }

    let (remain, ecn) = if has_ecn {
        let (r, ect0) = be_varint(remain).map_err(|_| incomplete("ect0"))?;
        let (r, ect1) = be_varint(r).map_err(|_| incomplete("ect1"))?;
        let (r, ce) = be_varint(r).map_err(|_| incomplete("ce"))?;
        (r, Some(EcnCounts { ect0, ect1, ce }))
    } else {
        (remain, None)
    };

    Ok((
        remain,
        AckFrame {
            largest_acked,
            ack_delay,
            first_ack_range,
            ranges,
            ecn,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_contiguous_range() {
        let frame = AckFrame {
            largest_acked: VarInt::from_u32(10),
            ack_delay: VarInt::from_u32(0),
            first_ack_range: VarInt::from_u32(10),
            ranges: vec![],
            ecn: None,
        };
        assert_eq!(frame.into_ranges(), vec![(0, 10)]);
    }

    #[test]
    fn expands_gapped_ranges() {
        // acked: [8,10] and [0,4], gap of 2 missing packets (5,6,7)
        let frame = AckFrame {
            largest_acked: VarInt::from_u32(10),
            ack_delay: VarInt::from_u32(0),
            first_ack_range: VarInt::from_u32(2),
            ranges: vec![(VarInt::from_u32(2), VarInt::from_u32(4))],
            ecn: None,
        };
        assert_eq!(frame.into_ranges(), vec![(8, 10), (0, 4)]);
    }

    #[test]
    fn roundtrip_through_wire() {
        let frame = AckFrame {
            largest_acked: VarInt::from_u32(1000),
            ack_delay: VarInt::from_u32(50),
            first_ack_range: VarInt::from_u32(5),
            ranges: vec![(VarInt::from_u32(1), VarInt::from_u32(3))],
            ecn: Some(EcnCounts {
                ect0: VarInt::from_u32(1),
                ect1: VarInt::from_u32(0),
                ce: VarInt::from_u32(0),
            }),
        };
        let mut buf = bytes::BytesMut::new();
        buf.put_frame(&frame);
        let body = &buf[1..];
        let (remain, parsed) = be_ack_frame(true, body).unwrap();
        assert!(remain.is_empty());
        assert_eq!(parsed, frame);
    }
}
