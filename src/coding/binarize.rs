use super::context::{CtxKind, CtxRef};

/// Sink for binary decisions. Everything above the arithmetic coder writes
/// through this trait, so syntax can be measured without coding it.
pub trait BinEncoder {
    fn encode_bin(&mut self, bin: u32, ctx: CtxRef);

    fn encode_bin_ep(&mut self, bin: u32);

    fn encode_bin_trm(&mut self, bin: u32);

    /// Whether the contexts were QP-initialized for this slice.
    fn cm_init(&self) -> bool;

    /// `num_bins` bypass bins, most significant first.
    fn encode_bins_ep(&mut self, value: u32, num_bins: u32) {
        for i in (0..num_bins).rev() {
            self.encode_bin_ep((value >> i) & 1);
        }
    }

    /// `sym` ones then a zero. Bin `i` uses context `base + min(i, num_ctx - 1)`.
    fn write_unary_sym(&mut self, sym: u32, kind: CtxKind, base: usize, num_ctx: usize) {
        debug_assert!(num_ctx > 0);
        self.encode_bin((sym > 0) as u32, kind.at(base));
        if sym == 0 {
            return;
        }
        let mut remaining = sym;
        let mut ctx_idx = 0;
        while remaining > 0 {
            remaining -= 1;
            ctx_idx = (ctx_idx + 1).min(num_ctx - 1);
            self.encode_bin((remaining > 0) as u32, kind.at(base + ctx_idx));
        }
    }

    /// Unary code of `sym < max` that drops the terminating zero for `max - 1`.
    fn write_truncated_unary_sym(
        &mut self,
        sym: u32,
        max: u32,
        kind: CtxKind,
        base: usize,
        num_ctx: usize,
    ) {
        debug_assert!(sym < max.max(1));
        if max <= 1 {
            return;
        }
        for idx in 0..max - 1 {
            let bin = (idx != sym) as u32;
            let ctx_idx = (idx as usize).min(num_ctx - 1);
            self.encode_bin(bin, kind.at(base + ctx_idx));
            if bin == 0 {
                break;
            }
        }
    }

    /// Exp-Golomb magnitude. The two leading bins share one context, the
    /// rest are bypass.
    fn write_abs_mvd(&mut self, value: u32, ctx: CtxRef) {
        let (code, len) = exp_golomb_code(value);
        for i in 0..len {
            let bin = (code >> (len - 1 - i)) & 1;
            if i <= 1 {
                self.encode_bin(bin, ctx);
            } else {
                self.encode_bin_ep(bin);
            }
        }
    }

    fn write_mvd(&mut self, value: i32, ctx: CtxRef) {
        self.write_abs_mvd(value.unsigned_abs(), ctx);
        if value != 0 {
            self.encode_bin_ep((value < 0) as u32);
        }
    }
}

/// Order-0 Exp-Golomb code word and its length in bins.
pub fn exp_golomb_code(value: u32) -> (u32, u32) {
    let mut nn = (value + 1) >> 1;
    let mut len_i = 0;
    while len_i < 16 && nn != 0 {
        nn >>= 1;
        len_i += 1;
    }
    let info = value + 1 - (1 << len_i);
    let code = (1 << len_i) | (info & ((1 << len_i) - 1));
    (code, (len_i << 1) + 1)
}

/// Counts bins by class without coding them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinCounter {
    pub context: u64,
    pub bypass: u64,
    pub terminating: u64,
    cm_init: bool,
}

impl BinCounter {
    pub fn new(cm_init: bool) -> Self {
        Self {
            cm_init,
            ..Self::default()
        }
    }

    pub fn total(&self) -> u64 {
        self.context + self.bypass + self.terminating
    }
}

impl BinEncoder for BinCounter {
    fn encode_bin(&mut self, _bin: u32, _ctx: CtxRef) {
        self.context += 1;
    }

    fn encode_bin_ep(&mut self, _bin: u32) {
        self.bypass += 1;
    }

    fn encode_bin_trm(&mut self, _bin: u32) {
        self.terminating += 1;
    }

    fn cm_init(&self) -> bool {
        self.cm_init
    }
}
