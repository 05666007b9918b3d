//! PATH_CHALLENGE and PATH_RESPONSE frames, used for path validation during migration.

use bytes::BufMut;

use super::{EncodeFrame, FrameType, GetFrameType, error::Error, io::WriteFrame};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PathChallengeFrame {
    pub data: [u8; 8],
}

impl GetFrameType for PathChallengeFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::PathChallenge
    }
}

impl EncodeFrame for PathChallengeFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + 8
    }
}

impl<T: BufMut> WriteFrame<PathChallengeFrame> for T {
    fn put_frame(&mut self, frame: &PathChallengeFrame) {
        self.put_u8(0x1a);
        self.put_slice(&frame.data);
    }
}

pub fn be_path_challenge_frame(input: &[u8]) -> nom::IResult<&[u8], PathChallengeFrame, Error> {
    if input.len() < 8 {
        return Err(nom::Err::Error(Error::IncompleteType("PATH_CHALLENGE".into())));
    }
    let (data, remain) = input.split_at(8);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(data);
    Ok((remain, PathChallengeFrame { data: buf }))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PathResponseFrame {
    pub data: [u8; 8],
}

impl GetFrameType for PathResponseFrame {
    fn frame_type(&self) -> FrameType {
        FrameType::PathResponse
    }
}

impl EncodeFrame for PathResponseFrame {
    fn max_encoding_size(&self) -> usize {
        1 + 8
    }

    fn encoding_size(&self) -> usize {
        1 + 8
    }
}

impl<T: BufMut> WriteFrame<PathResponseFrame> for T {
    fn put_frame(&mut self, frame: &PathResponseFrame) {
        self.put_u8(0x1b);
        self.put_slice(&frame.data);
    }
}

pub fn be_path_response_frame(input: &[u8]) -> nom::IResult<&[u8], PathResponseFrame, Error> {
    if input.len() < 8 {
        return Err(nom::Err::Error(Error::IncompleteType("PATH_RESPONSE".into())));
    }
    let (data, remain) = input.split_at(8);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(data);
    Ok((remain, PathResponseFrame { data: buf }))
}
