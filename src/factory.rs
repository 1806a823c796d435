use crate::buffer::FrameBuffer;
use crate::error::Error;
use crate::frame::OpCode;
use crate::rng::MaskKeyPool;

/// Encodes outbound frames into a reusable scratch buffer.
///
/// One `FrameFactory` per connection is enough — `construct()` and its
/// convenience wrappers (`text`, `binary`, `ping`, `pong`, `close`) all
/// reset and reuse the same internal [`FrameBuffer`], returning a view into
/// it. The returned bytes stay valid until the next `construct()` call.
pub struct FrameFactory {
    buf: FrameBuffer,
    keys: MaskKeyPool,
}

impl FrameFactory {
    pub fn new(initial_capacity: usize) -> Self {
        FrameFactory {
            buf: FrameBuffer::new(initial_capacity),
            keys: MaskKeyPool::new(),
        }
    }

    /// Forces a refill of the masking-key pool, e.g. so a benchmark can
    /// amortize the PRNG cost outside of a timed region.
    pub fn fill_random_cache(&mut self) {
        self.keys.fill_cache();
    }

    pub fn construct(&mut self, fin: bool, opcode: OpCode, mask: bool, payload: &[u8]) -> &[u8] {
        self.buf.reset();
        self.buf.ensure_fit(payload.len() + 14);

        self.buf
            .push_back((if fin { 0x80 } else { 0x00 }) | (opcode.as_u8() & 0x0F));

        let mask_bit: u8 = if mask { 0x80 } else { 0x00 };
        let payload_len = payload.len() as u64;

        if payload_len < 126 {
            self.buf.push_back(mask_bit | payload_len as u8);
        } else if payload_len <= 0xFFFF {
            self.buf.push_back(mask_bit | 126);
            self.buf.push_back(((payload_len >> 8) & 0xFF) as u8);
            self.buf.push_back((payload_len & 0xFF) as u8);
        } else {
            self.buf.push_back(mask_bit | 127);
            let extended = self.buf.get_space(8);
            extended.copy_from_slice(&payload_len.to_be_bytes());
        }

        if mask {
            let key = self.keys.next_key();
            self.buf.get_space(4).copy_from_slice(&key);
            let dest = self.buf.get_space(payload.len());
            for (i, byte) in payload.iter().enumerate() {
                dest[i] = byte ^ key[i % 4];
            }
        } else {
            self.buf.get_space(payload.len()).copy_from_slice(payload);
        }

        self.buf.head()
    }

    pub fn text(&mut self, fin: bool, mask: bool, payload: &[u8]) -> &[u8] {
        self.construct(fin, OpCode::Text, mask, payload)
    }

    pub fn binary(&mut self, fin: bool, mask: bool, payload: &[u8]) -> &[u8] {
        self.construct(fin, OpCode::Binary, mask, payload)
    }

    pub fn ping(&mut self, mask: bool, payload: &[u8]) -> Result<&[u8], Error> {
        if payload.len() > 125 {
            return Err(Error::ControlFramePayloadSize);
        }
        Ok(self.construct(true, OpCode::Ping, mask, payload))
    }

    pub fn pong(&mut self, mask: bool, payload: &[u8]) -> Result<&[u8], Error> {
        if payload.len() > 125 {
            return Err(Error::ControlFramePayloadSize);
        }
        Ok(self.construct(true, OpCode::Pong, mask, payload))
    }

    pub fn close(&mut self, mask: bool, payload: &[u8]) -> Result<&[u8], Error> {
        if payload.len() > 125 {
            return Err(Error::ControlFramePayloadSize);
        }
        Ok(self.construct(true, OpCode::Close, mask, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_uses_single_byte_length() {
        let mut factory = FrameFactory::new(64);
        let frame = factory.text(true, false, b"hi");
        assert_eq!(frame[0], 0x81); // fin + text
        assert_eq!(frame[1], 0x02); // unmasked, len 2
        assert_eq!(&frame[2..], b"hi");
    }

    #[test]
    fn boundary_length_126_uses_16_bit_extension() {
        let mut factory = FrameFactory::new(1024);
        let payload = vec![0xAB; 126];
        let frame = factory.binary(true, false, &payload);
        assert_eq!(frame[1], 126);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 126);
    }

    #[test]
    fn boundary_length_65536_uses_64_bit_extension() {
        let mut factory = FrameFactory::new(1 << 17);
        let payload = vec![0xCD; 65536];
        let frame = factory.binary(true, false, &payload);
        assert_eq!(frame[1], 127);
        let len = u64::from_be_bytes(frame[2..10].try_into().unwrap());
        assert_eq!(len, 65536);
    }

    #[test]
    fn masked_frame_carries_a_four_byte_key_and_xors_payload() {
        let mut factory = FrameFactory::new(64);
        let frame = factory.text(true, true, b"abc").to_vec();
        assert_eq!(frame[1] & 0x80, 0x80);
        let key = &frame[2..6];
        let masked = &frame[6..9];
        for (i, (&m, &p)) in masked.iter().zip(b"abc".iter()).enumerate() {
            assert_eq!(m, p ^ key[i % 4]);
        }
    }

    #[test]
    fn masking_xor_is_its_own_inverse() {
        let mut factory = FrameFactory::new(64);
        let payload = b"round trip me";
        let frame = factory.text(true, true, payload).to_vec();
        let key: [u8; 4] = frame[2..6].try_into().unwrap();
        let masked = &frame[6..];
        let unmasked: Vec<u8> = masked
            .iter()
            .enumerate()
            .map(|(i, &b)| b ^ key[i % 4])
            .collect();
        assert_eq!(unmasked, payload);
    }

    #[test]
    fn control_frame_over_125_bytes_is_rejected() {
        let mut factory = FrameFactory::new(256);
        let payload = vec![0u8; 126];
        assert!(factory.ping(true, &payload).is_err());
        assert!(factory.pong(true, &payload).is_err());
        assert!(factory.close(true, &payload).is_err());
    }
}
