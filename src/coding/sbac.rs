//! Binary arithmetic coder with 14-bit range and byte-wise carry handling.

use super::binarize::BinEncoder;
use super::bitstream::BitstreamSink;
use super::context::{ContextSet, CtxRef};

pub const MAX_RANGE: u32 = 1 << 14;
pub const HALF_RANGE: u32 = 1 << 13;
pub const LPS_FLOOR: u32 = 437;

const CODE_BITS_AT_RESET: i32 = 11;
const OUT_SHIFT: u32 = 17;
const CODE_MASK: u32 = (1 << OUT_SHIFT) - 1;

/// Coder registers. Copyable so a search can snapshot and restore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoderState {
    pub range: u32,
    pub code: u32,
    pub code_bits: i32,
    pub pending_byte: u8,
    pub has_pending_byte: bool,
    pub stacked_ff: u32,
    pub stacked_zero: u32,
    pub bin_counter: u64,
}

impl Default for CoderState {
    fn default() -> Self {
        Self {
            range: MAX_RANGE,
            code: 0,
            code_bits: CODE_BITS_AT_RESET,
            pending_byte: 0,
            has_pending_byte: false,
            stacked_ff: 0,
            stacked_zero: 0,
            bin_counter: 0,
        }
    }
}

pub struct ArithmeticEncoder {
    state: CoderState,
    contexts: ContextSet,
    sink: BitstreamSink,
}

impl ArithmeticEncoder {
    pub fn new(contexts: ContextSet) -> Self {
        Self {
            state: CoderState::default(),
            contexts,
            sink: BitstreamSink::with_capacity(1024),
        }
    }

    /// Slice start: fresh registers and freshly initialized contexts.
    /// Bytes already in the sink are kept.
    pub fn reset(&mut self, contexts: ContextSet) {
        self.state = CoderState::default();
        self.contexts = contexts;
    }

    pub fn state(&self) -> &CoderState {
        &self.state
    }

    pub fn restore(&mut self, state: CoderState) {
        self.state = state;
    }

    pub fn contexts(&self) -> &ContextSet {
        &self.contexts
    }

    pub fn sink(&self) -> &BitstreamSink {
        &self.sink
    }

    pub fn bin_count(&self) -> u64 {
        self.state.bin_counter
    }

    pub fn encode_bin(&mut self, bin: u32, ctx: CtxRef) {
        self.state.bin_counter += 1;

        let model = self.contexts.get_mut(ctx);
        let lps = ((model.state() as u32 * self.state.range) >> 9).max(LPS_FLOOR);
        self.state.range -= lps;

        // The MPS always owns the larger of the two sub-intervals.
        let take_upper = if bin != model.mps() {
            self.state.range >= lps
        } else {
            self.state.range < lps
        };
        if take_upper {
            self.state.code += self.state.range;
            self.state.range = lps;
        }

        model.adapt(bin);
        self.renormalize();
    }

    pub fn encode_bin_ep(&mut self, bin: u32) {
        self.state.bin_counter += 1;

        self.state.range >>= 1;
        if bin != 0 {
            self.state.code += self.state.range;
        }
        self.state.range <<= 1;
        self.state.code <<= 1;
        self.state.code_bits -= 1;
        if self.state.code_bits == 0 {
            self.carry_propagate();
            self.state.code_bits = 8;
        }
    }

    pub fn encode_bin_trm(&mut self, bin: u32) {
        self.state.bin_counter += 1;

        self.state.range -= 1;
        if bin != 0 {
            self.state.code += self.state.range;
            self.state.range = 1;
        }
        self.renormalize();
    }

    fn renormalize(&mut self) {
        while self.state.range < HALF_RANGE {
            self.state.range <<= 1;
            self.state.code <<= 1;
            self.state.code_bits -= 1;
            if self.state.code_bits == 0 {
                self.carry_propagate();
                self.state.code_bits = 8;
            }
        }
    }

    fn carry_propagate(&mut self) {
        let out_bits = self.state.code >> OUT_SHIFT;
        self.state.code &= CODE_MASK;

        if out_bits < 0xFF {
            while self.state.stacked_ff != 0 {
                self.put_byte(0xFF);
                self.state.stacked_ff -= 1;
            }
            self.put_byte(out_bits as u8);
        } else if out_bits > 0xFF {
            self.state.pending_byte = self.state.pending_byte.wrapping_add(1);
            while self.state.stacked_ff != 0 {
                self.put_byte(0x00);
                self.state.stacked_ff -= 1;
            }
            self.put_byte((out_bits & 0xFF) as u8);
        } else {
            self.state.stacked_ff += 1;
        }
    }

    fn put_byte(&mut self, byte: u8) {
        if self.state.has_pending_byte {
            if self.state.pending_byte == 0 {
                self.state.stacked_zero += 1;
            } else {
                while self.state.stacked_zero > 0 {
                    self.sink.write_byte(0x00);
                    self.state.stacked_zero -= 1;
                }
                self.sink.write_byte(self.state.pending_byte);
            }
        }
        self.state.pending_byte = byte;
        self.state.has_pending_byte = true;
    }

    /// Flushes the interval so the written bytes identify a value inside it.
    /// The coder must be reset before it is used again.
    pub fn finish(&mut self) {
        let mut tmp = (self.state.code + self.state.range - 1) & !(MAX_RANGE - 1);
        if tmp < self.state.code {
            tmp += HALF_RANGE;
        }

        self.state.code = tmp << self.state.code_bits;
        self.carry_propagate();
        self.state.code <<= 8;
        self.carry_propagate();

        while self.state.stacked_ff != 0 {
            self.put_byte(0xFF);
            self.state.stacked_ff -= 1;
        }
        while self.state.stacked_zero > 0 {
            self.sink.write_byte(0x00);
            self.state.stacked_zero -= 1;
        }
        if self.state.pending_byte != 0 {
            self.sink.write_byte(self.state.pending_byte);
        } else if self.state.code_bits < 4 {
            self.sink.write_bits(0, (4 - self.state.code_bits) as u8);
            self.sink.byte_align();
        }
        self.state.pending_byte = 0;
        self.state.has_pending_byte = false;
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.sink.finish()
    }
}

impl BinEncoder for ArithmeticEncoder {
    fn encode_bin(&mut self, bin: u32, ctx: CtxRef) {
        ArithmeticEncoder::encode_bin(self, bin, ctx);
    }

    fn encode_bin_ep(&mut self, bin: u32) {
        ArithmeticEncoder::encode_bin_ep(self, bin);
    }

    fn encode_bin_trm(&mut self, bin: u32) {
        ArithmeticEncoder::encode_bin_trm(self, bin);
    }

    fn cm_init(&self) -> bool {
        self.contexts.cm_init()
    }
}
