/// Append-only byte sink the arithmetic coder drains into.
///
/// Whole bytes are the common case; the bit interface only matters for the
/// few padding bits the coder writes when it finishes a slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitstreamSink {
    bytes: Vec<u8>,
    current: u8,
    bits: u8,
}

impl BitstreamSink {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            current: 0,
            bits: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            current: 0,
            bits: 0,
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | (bit as u8);
        self.bits += 1;
        if self.bits == 8 {
            self.bytes.push(self.current);
            self.current = 0;
            self.bits = 0;
        }
    }

    pub fn write_bits(&mut self, value: u32, count: u8) {
        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    pub fn write_byte(&mut self, byte: u8) {
        if self.bits == 0 {
            self.bytes.push(byte);
        } else {
            self.write_bits(byte as u32, 8);
        }
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bits == 0
    }

    /// Pads the partial byte with zero bits.
    pub fn byte_align(&mut self) {
        while self.bits != 0 {
            self.write_bit(false);
        }
    }

    pub fn len_bits(&self) -> usize {
        self.bytes.len() * 8 + self.bits as usize
    }

    /// Complete bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.byte_align();
        self.bytes
    }
}

impl Default for BitstreamSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_are_msb_first() {
        let mut sink = BitstreamSink::new();
        sink.write_bits(0b101, 3);
        sink.write_bits(0b11111, 5);
        assert_eq!(sink.as_bytes(), &[0b1011_1111]);
        assert!(sink.is_byte_aligned());
    }

    #[test]
    fn test_unaligned_byte_write() {
        let mut sink = BitstreamSink::new();
        sink.write_bit(true);
        sink.write_byte(0x00);
        assert_eq!(sink.len_bits(), 9);
        assert_eq!(sink.finish(), vec![0x80, 0x00]);
    }

    #[test]
    fn test_byte_align_pads_zeros() {
        let mut sink = BitstreamSink::new();
        sink.write_byte(0xAB);
        sink.write_bits(0b11, 2);
        sink.byte_align();
        assert_eq!(sink.as_bytes(), &[0xAB, 0xC0]);
        sink.byte_align();
        assert_eq!(sink.len_bits(), 16);
    }
}
