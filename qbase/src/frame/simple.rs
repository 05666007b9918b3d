//! The frame types with no body at all: PADDING, PING, HANDSHAKE_DONE.

use bytes::BufMut;

use super::{EncodeFrame, FrameType, GetFrameType, io::WriteFrame};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PaddingFrame;

impl GetFrameType for PaddingFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::Padding
    }
}

impl EncodeFrame for PaddingFrame {
    fn max_encoding_size(&self) -> usize {
        1
    }

    fn encoding_size(&self) -> usize {
        1
    }
}

impl<T: BufMut> WriteFrame<PaddingFrame> for T {
    fn put_frame(&mut self, _frame: &PaddingFrame) {
        self.put_u8(0x00);
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PingFrame;

impl GetFrameType for PingFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::Ping
    }
}

impl EncodeFrame for PingFrame {
    fn max_encoding_size(&self) -> usize {
        1
    }

    fn encoding_size(&self) -> usize {
        1
    }
}

impl<T: BufMut> WriteFrame<PingFrame> for T {
    fn put_frame(&mut self, _frame: &PingFrame) {
        self.put_u8(0x01);
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HandshakeDoneFrame;

impl GetFrameType for HandshakeDoneFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::HandshakeDone
    }
}

impl EncodeFrame for HandshakeDoneFrame {
    fn max_encoding_size(&self) -> usize {
        1
    }

    fn encoding_size(&self) -> usize {
        1
    }
}

impl<T: BufMut> WriteFrame<HandshakeDoneFrame> for T {
    fn put_frame(&mut self, _frame: &HandshakeDoneFrame) {
        self.put_u8(0x1e);
    }
}
