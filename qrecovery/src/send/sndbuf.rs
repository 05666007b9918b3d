//! The outgoing byte buffer for one stream direction.
//!
//! Bytes are appended by the application via [`SendBuf::write`] and handed
//! out to the packet assembler via [`SendBuf::pick_up`]. Once a range is
//! acknowledged it is trimmed from the front; until then it stays available
//! so a lost packet's region can be re-emitted byte-for-byte.

use std::collections::VecDeque;

use bytes::Bytes;

/// One contiguous run of bytes buffered for sending, anchored at an absolute
/// stream offset.
#[derive(Debug)]
struct Segment {
    offset: u64,
    data: Bytes,
}

impl Segment {
    fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Buffers unacknowledged outgoing stream bytes and tracks which ranges have
/// been acknowledged, so a contiguous acked prefix can be dropped and a lost
/// range can be re-read verbatim.
#[derive(Debug, Default)]
pub struct SendBuf {
    segments: VecDeque<Segment>,
    /// Offset of the first byte not yet fully acknowledged.
    acked_to: u64,
    /// Disjoint, ascending acked ranges beyond `acked_to` (gaps left by
    /// out-of-order acks), each `(start, end)`.
    acked_gaps: Vec<(u64, u64)>,
    /// Total bytes ever written.
    written: u64,
    /// How far the packet assembler has already drawn from (not necessarily acked).
    sent: u64,
}

impl SendBuf {
    /// Append application bytes to the tail of the stream.
    pub fn write(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let offset = self.written;
        self.written += data.len() as u64;
        self.segments.push_back(Segment { offset, data });
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn acked_to(&self) -> u64 {
        self.acked_to
    }

    /// Whether there is fresh (never-sent) data waiting.
    pub fn has_pending(&self) -> bool {
        self.sent < self.written
    }

    /// Draw up to `max_len` bytes of never-before-sent data, advancing the
    /// send cursor. Returns `(offset, bytes)`.
    pub fn pick_up(&mut self, max_len: usize) -> Option<(u64, Bytes)> {
        if !self.has_pending() {
            return None;
        }
        let offset = self.sent;
        let bytes = self.slice(offset, max_len.min((self.written - offset) as usize))?;
        self.sent += bytes.len() as u64;
        Some((offset, bytes))
    }

    /// Re-read an already-sent range verbatim, for retransmission after loss.
    /// The range must not yet be (fully) acknowledged, and must still be buffered.
    pub fn retransmit(&self, offset: u64, len: usize) -> Option<Bytes> {
        self.slice(offset, len)
    }

    /// Read `len` bytes starting at `offset` out of the buffered segments,
    /// copying across segment boundaries only when unavoidable.
    fn slice(&self, offset: u64, len: usize) -> Option<Bytes> {
        if len == 0 {
            return Some(Bytes::new());
        }
        let want_end = offset + len as u64;
        // Fast path: entirely within one segment.
        for seg in &self.segments {
            if seg.offset <= offset && want_end <= seg.end() {
                let start = (offset - seg.offset) as usize;
                return Some(seg.data.slice(start..start + len));
            }
        }
        // Slow path: spans multiple segments (shouldn't normally happen since
        // frames are drawn and retransmitted using the same boundaries, but
        // stay correct regardless).
        let mut out = Vec::with_capacity(len);
        let mut cursor = offset;
        for seg in &self.segments {
            if seg.end() <= cursor || seg.offset >= want_end {
                continue;
            }
            let start = cursor.saturating_sub(seg.offset) as usize;
            let end = (want_end.min(seg.end()) - seg.offset) as usize;
            if start >= end {
                continue;
            }
            out.extend_from_slice(&seg.data[start..end]);
            cursor = seg.offset + end as u64;
        }
        (cursor == want_end).then(|| Bytes::from(out))
    }

    /// Record that `[start, end)` has been acknowledged by the peer, and
    /// drop any now-fully-acked prefix from the buffer.
    pub fn ack(&mut self, start: u64, end: u64) {
        if end <= self.acked_to {
            return;
        }
        let start = start.max(self.acked_to);
        if start <= self.acked_to {
            self.acked_to = self.acked_to.max(end);
        } else {
            match self.acked_gaps.binary_search_by_key(&start, |r| r.0) {
                Ok(i) => self.acked_gaps[i].1 = self.acked_gaps[i].1.max(end),
                Err(i) => self.acked_gaps.insert(i, (start, end)),
            }
        }
        // Merge adjacent/overlapping gaps and fold any now-contiguous prefix into `acked_to`.
        self.acked_gaps.sort_unstable_by_key(|r| r.0);
        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(self.acked_gaps.len());
        for (s, e) in self.acked_gaps.drain(..) {
            match merged.last_mut() {
                Some((_, last_end)) if s <= *last_end => *last_end = (*last_end).max(e),
                _ => merged.push((s, e)),
            }
        }
        while matches!(merged.first(), Some((s, _)) if *s <= self.acked_to) {
            let (_, e) = merged.remove(0);
            self.acked_to = self.acked_to.max(e);
        }
        self.acked_gaps = merged;

        // Drop fully-acked segments, trimming a partially-acked leading one.
        while let Some(seg) = self.segments.front_mut() {
            if seg.end() <= self.acked_to {
                self.segments.pop_front();
            } else if seg.offset < self.acked_to {
                let trim = (self.acked_to - seg.offset) as usize;
                seg.data = seg.data.slice(trim..);
                seg.offset = self.acked_to;
                break;
            } else {
                break;
            }
        }
    }

    /// Whether every written byte has been acknowledged.
    pub fn is_all_acked(&self) -> bool {
        self.acked_to >= self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_up_then_ack_trims_buffer() {
        let mut buf = SendBuf::default();
        buf.write(Bytes::from_static(b"hello world"));
        let (off, data) = buf.pick_up(5).unwrap();
        assert_eq!(off, 0);
        assert_eq!(&data[..], b"hello");
        buf.ack(0, 5);
        assert_eq!(buf.acked_to(), 5);
    }

    #[test]
    fn retransmit_reads_same_bytes_after_loss() {
        let mut buf = SendBuf::default();
        buf.write(Bytes::from_static(b"abcdefgh"));
        let (off, data) = buf.pick_up(8).unwrap();
        assert_eq!(off, 0);
        let again = buf.retransmit(0, data.len()).unwrap();
        assert_eq!(again, data);
    }

    #[test]
    fn out_of_order_acks_eventually_merge() {
        let mut buf = SendBuf::default();
        buf.write(Bytes::from_static(b"0123456789"));
        buf.pick_up(10).unwrap();
        buf.ack(5, 10);
        assert_eq!(buf.acked_to(), 0);
        buf.ack(0, 5);
        assert_eq!(buf.acked_to(), 10);
        assert!(buf.is_all_acked());
    }
}
