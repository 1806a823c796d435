use crate::buffer::FrameBuffer;
use crate::frame::{Frame, OpCode};
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseStage {
    FinBit,
    Opcode,
    MaskBit,
    PayloadLen,
    ExtendedPayloadLen16,
    ExtendedPayloadLen64,
    MaskingKey,
    PayloadData,
    Done,
}

#[derive(Debug, Clone, Default)]
struct PartialFrame {
    fin: bool,
    mask: bool,
    opcode_byte: u8,
    masking_key: [u8; 4],
    payload_start: usize,
    payload_len: usize,
}

/// Incremental, streaming frame decoder.
///
/// Bytes can arrive in any chunking — one byte at a time, or thousands at
/// once — and [`FrameParser::update`] only ever advances as far as the
/// stage cascade allows with what has been buffered so far. A frame that
/// completes is returned once; the next call to `update` starts decoding
/// the next one, compacting the already-consumed prefix out of the backing
/// [`FrameBuffer`] first.
pub struct FrameParser {
    stage: ParseStage,
    frame: PartialFrame,
    buf: FrameBuffer,
    payload_len: u64,
    ptr: usize,
}

impl FrameParser {
    pub fn new(initial_capacity: usize) -> Self {
        FrameParser {
            stage: ParseStage::FinBit,
            frame: PartialFrame::default(),
            buf: FrameBuffer::new(initial_capacity),
            payload_len: 0,
            ptr: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.buf.size() - self.ptr
    }

    fn peek(&self) -> u8 {
        self.buf.head()[self.ptr]
    }

    fn consume(&mut self) -> u8 {
        let byte = self.peek();
        self.ptr += 1;
        byte
    }

    fn check_fin_bit(&mut self) {
        if self.stage != ParseStage::FinBit || self.remaining() == 0 {
            return;
        }
        self.frame.fin = self.peek() & 0x80 != 0;
        self.stage = ParseStage::Opcode;
    }

    fn check_opcode(&mut self) {
        if self.stage != ParseStage::Opcode || self.remaining() == 0 {
            return;
        }
        self.frame.opcode_byte = self.consume() & 0x0F;
        self.stage = ParseStage::MaskBit;
    }

    fn check_mask_bit(&mut self) {
        if self.stage != ParseStage::MaskBit || self.remaining() == 0 {
            return;
        }
        self.frame.mask = self.peek() & 0x80 != 0;
        self.stage = ParseStage::PayloadLen;
    }

    fn check_payload_len(&mut self) {
        if self.stage != ParseStage::PayloadLen || self.remaining() == 0 {
            return;
        }
        let len = (self.consume() & 0x7F) as u64;
        if len == 126 {
            self.stage = ParseStage::ExtendedPayloadLen16;
            return;
        }
        if len == 127 {
            self.stage = ParseStage::ExtendedPayloadLen64;
            return;
        }
        self.payload_len = len;
        self.stage = if self.frame.mask {
            ParseStage::MaskingKey
        } else {
            ParseStage::PayloadData
        };
    }

    fn check_extended_payload_len_16(&mut self) {
        if self.stage != ParseStage::ExtendedPayloadLen16 || self.remaining() < 2 {
            return;
        }
        let hi = self.consume() as u64;
        let lo = self.consume() as u64;
        self.payload_len = (hi << 8) | lo;
        self.stage = if self.frame.mask {
            ParseStage::MaskingKey
        } else {
            ParseStage::PayloadData
        };
    }

    fn check_extended_payload_len_64(&mut self) {
        if self.stage != ParseStage::ExtendedPayloadLen64 || self.remaining() < 8 {
            return;
        }
        let mut len = 0u64;
        for _ in 0..8 {
            len = (len << 8) | self.consume() as u64;
        }
        self.payload_len = len;
        self.stage = if self.frame.mask {
            ParseStage::MaskingKey
        } else {
            ParseStage::PayloadData
        };
    }

    fn check_masking_key(&mut self) {
        if self.stage != ParseStage::MaskingKey || self.remaining() < 4 {
            return;
        }
        for i in 0..4 {
            self.frame.masking_key[i] = self.consume();
        }
        self.stage = ParseStage::PayloadData;
    }

    fn check_payload_data(&mut self) {
        if self.stage != ParseStage::PayloadData
            || (self.remaining() as u64) < self.payload_len
        {
            return;
        }
        self.frame.payload_start = self.ptr;
        self.frame.payload_len = self.payload_len as usize;
        self.ptr += self.payload_len as usize;
        self.stage = ParseStage::Done;
    }

    fn done(&self) -> bool {
        self.stage == ParseStage::Done
    }

    fn drive_stages(&mut self) {
        self.check_fin_bit();
        self.check_opcode();
        self.check_mask_bit();
        self.check_payload_len();
        self.check_extended_payload_len_16();
        self.check_extended_payload_len_64();
        self.check_masking_key();
        self.check_payload_data();
    }

    fn current_frame(&self) -> Option<Frame<'_>> {
        if !self.done() {
            return None;
        }
        let payload =
            &self.buf.head()[self.frame.payload_start..self.frame.payload_start + self.frame.payload_len];
        Some(Frame {
            fin: self.frame.fin,
            mask: self.frame.mask,
            opcode: OpCode::from_byte(self.frame.opcode_byte),
            masking_key: self.frame.masking_key,
            payload,
        })
    }

    /// Compacts out already-consumed bytes, keeping any leftover bytes of
    /// the next frame that already arrived in the same read.
    fn reset(&mut self) {
        let remaining = self.remaining();
        if remaining > 0 {
            let tail: Vec<u8> = self.buf.head()[self.ptr..].to_vec();
            self.buf.reset();
            self.buf.extend(&tail);
        } else {
            self.buf.reset();
        }
        self.ptr = 0;
        self.frame = PartialFrame::default();
        self.payload_len = 0;
        self.stage = ParseStage::FinBit;
    }

    /// Drops all buffered state, discarding any partially-parsed frame.
    pub fn clear(&mut self) {
        self.buf.reset();
        self.ptr = 0;
        self.frame = PartialFrame::default();
        self.payload_len = 0;
        self.stage = ParseStage::FinBit;
    }

    /// Feeds newly-received bytes into the parser and attempts to progress.
    /// Returns the next complete frame, if the cascade reached `Done`.
    pub fn update(&mut self, bytes: &[u8]) -> Option<Frame<'_>> {
        if self.done() {
            self.reset();
        }
        if !bytes.is_empty() {
            self.buf.extend(bytes);
        } else if self.stage != ParseStage::FinBit {
            return None;
        }
        if self.remaining() == 0 {
            return None;
        }
        self.drive_stages();
        trace!("parser stage after update: {:?}", self.stage);
        self.current_frame()
    }

    /// Drives the stage cascade given only a "did new data arrive" signal,
    /// for callers that already wrote new bytes directly into this
    /// parser's own buffer (via [`Self::frame_buffer`] and a transport's
    /// `read_into`) instead of handing bytes to [`Self::update`].
    ///
    /// Pass `false` to keep draining frames already sitting in the buffer
    /// from an earlier read, without re-checking the socket.
    pub fn update_signal(&mut self, new_data: bool) -> Option<Frame<'_>> {
        if self.done() {
            self.reset();
        }
        if !new_data && self.stage != ParseStage::FinBit {
            return None;
        }
        if self.remaining() == 0 {
            return None;
        }
        self.drive_stages();
        trace!("parser stage after update_signal: {:?}", self.stage);
        self.current_frame()
    }

    /// The backing buffer, exposed so a transport can read directly into
    /// its tail without an intermediate copy.
    pub fn frame_buffer(&mut self) -> &mut FrameBuffer {
        &mut self.buf
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(4096)
    }
}
