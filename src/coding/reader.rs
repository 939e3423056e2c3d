//! Mirror decoder for the arithmetic coder. Only built for tests: it proves
//! that every bin the encoder writes can be read back.

use super::block::{Channel, CoefficientBlock};
use super::context::{ContextSet, CtxKind, CtxRef};
use super::residual::{
    base_level, gt_ctx, last_ctx_offset_shift, neighbour_template, run_length_ctx_offset,
    sig_ctx, ResidualSyntax, NUM_GTA, NUM_GTB,
};
use super::sbac::{HALF_RANGE, LPS_FLOOR, MAX_RANGE};
use crate::quant::scan::{ScanMetadata, COEF_GROUP_SIZE, GO_RICE_RANGE, GROUP_IDX};

const LOOKAHEAD: u32 = 16;

pub(crate) struct SbacReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
    range: u32,
    value: u64,
    contexts: ContextSet,
}

impl<'a> SbacReader<'a> {
    pub fn new(data: &'a [u8], contexts: ContextSet) -> Self {
        let mut reader = Self {
            data,
            bit_pos: 0,
            range: MAX_RANGE,
            value: 0,
            contexts,
        };
        for _ in 0..(14 + LOOKAHEAD) {
            reader.value = (reader.value << 1) | reader.next_bit();
        }
        reader
    }

    fn next_bit(&mut self) -> u64 {
        let byte = self.data.get(self.bit_pos >> 3).copied().unwrap_or(0);
        let bit = (byte >> (7 - (self.bit_pos & 7))) & 1;
        self.bit_pos += 1;
        bit as u64
    }

    fn renormalize(&mut self) {
        while self.range < HALF_RANGE {
            self.range <<= 1;
            self.value = (self.value << 1) | self.next_bit();
        }
    }

    pub fn decode_bin(&mut self, ctx: CtxRef) -> u32 {
        let model = self.contexts.get_mut(ctx);
        let mps = model.mps();
        let lps = ((model.state() as u32 * self.range) >> 9).max(LPS_FLOOR);
        let lower = self.range - lps;
        let mps_lower = lower >= lps;

        let bin = if self.value < (lower as u64) << LOOKAHEAD {
            self.range = lower;
            if mps_lower {
                mps
            } else {
                1 - mps
            }
        } else {
            self.value -= (lower as u64) << LOOKAHEAD;
            self.range = lps;
            if mps_lower {
                1 - mps
            } else {
                mps
            }
        };
        model.adapt(bin);
        self.renormalize();
        bin
    }

    pub fn decode_bin_ep(&mut self) -> u32 {
        let half = self.range >> 1;
        let bin = if self.value < (half as u64) << LOOKAHEAD {
            0
        } else {
            self.value -= (half as u64) << LOOKAHEAD;
            1
        };
        self.range = half << 1;
        self.value = (self.value << 1) | self.next_bit();
        bin
    }

    pub fn decode_bin_trm(&mut self) -> u32 {
        let lower = self.range - 1;
        let bin = if self.value < (lower as u64) << LOOKAHEAD {
            self.range = lower;
            0
        } else {
            self.value -= (lower as u64) << LOOKAHEAD;
            self.range = 1;
            1
        };
        self.renormalize();
        bin
    }

    pub fn decode_bins_ep(&mut self, num_bins: u32) -> u32 {
        (0..num_bins).fold(0, |acc, _| (acc << 1) | self.decode_bin_ep())
    }

    pub fn read_unary_sym(&mut self, kind: CtxKind, base: usize, num_ctx: usize) -> u32 {
        if self.decode_bin(kind.at(base)) == 0 {
            return 0;
        }
        let mut sym = 0;
        let mut ctx_idx = 0;
        loop {
            sym += 1;
            ctx_idx = (ctx_idx + 1).min(num_ctx - 1);
            if self.decode_bin(kind.at(base + ctx_idx)) == 0 {
                return sym;
            }
        }
    }

    pub fn read_truncated_unary_sym(
        &mut self,
        max: u32,
        kind: CtxKind,
        base: usize,
        num_ctx: usize,
    ) -> u32 {
        let mut sym = 0;
        while sym + 1 < max {
            let ctx_idx = (sym as usize).min(num_ctx - 1);
            if self.decode_bin(kind.at(base + ctx_idx)) == 0 {
                break;
            }
            sym += 1;
        }
        sym
    }

    pub fn read_abs_mvd(&mut self, ctx: CtxRef) -> u32 {
        let mut zeros = 0;
        let mut i = 0;
        loop {
            let bin = if i <= 1 {
                self.decode_bin(ctx)
            } else {
                self.decode_bin_ep()
            };
            i += 1;
            if bin == 1 {
                break;
            }
            zeros += 1;
        }
        let mut info = 0;
        for _ in 0..zeros {
            let bin = if i <= 1 {
                self.decode_bin(ctx)
            } else {
                self.decode_bin_ep()
            };
            i += 1;
            info = (info << 1) | bin;
        }
        (1 << zeros) + info - 1
    }

    pub fn read_mvd(&mut self, ctx: CtxRef) -> i32 {
        let abs = self.read_abs_mvd(ctx) as i32;
        if abs != 0 && self.decode_bin_ep() == 1 {
            -abs
        } else {
            abs
        }
    }

    fn read_remainder(&mut self, k: u32) -> u32 {
        let range = GO_RICE_RANGE[k as usize];
        let mut ones = 0;
        while self.decode_bin_ep() == 1 {
            ones += 1;
        }
        if ones < range {
            (ones << k) + self.decode_bins_ep(k)
        } else {
            let length = ones - range + k;
            let code = self.decode_bins_ep(length);
            code + (1 << length) - (1 << k) + (range << k)
        }
    }

    fn read_last_component(&mut self, log2_size: u8, kind: CtxKind, channel: Channel) -> usize {
        let (offset, shift) = last_ctx_offset_shift(log2_size, channel);
        let max_group = GROUP_IDX[(1 << log2_size) - 1] as usize;
        let mut group = 0;
        while group < max_group && self.decode_bin(kind.at(offset + (group >> shift))) == 1 {
            group += 1;
        }
        group
    }

    fn read_last_suffix(&mut self, group: usize) -> usize {
        ScanMetadata::min_in_group(group)
            + self.decode_bins_ep(ScanMetadata::suffix_len(group)) as usize
    }

    pub fn read_residual(
        &mut self,
        syntax: ResidualSyntax,
        log2_w: u8,
        log2_h: u8,
        channel: Channel,
        coded: bool,
    ) -> CoefficientBlock {
        let n = 1usize << (log2_w + log2_h);
        let mut levels = vec![0i16; n];
        if coded {
            match syntax {
                ResidualSyntax::RunLength => self.read_run_length(&mut levels, log2_w, log2_h, channel),
                ResidualSyntax::Adcc => self.read_adcc(&mut levels, log2_w, log2_h, channel),
            }
        }
        CoefficientBlock::from_parts(log2_w, log2_h, levels)
    }

    fn read_run_length(&mut self, levels: &mut [i16], log2_w: u8, log2_h: u8, channel: Channel) {
        let scan = ScanMetadata::global().scan(log2_w, log2_h);
        let cm_init = self.contexts.cm_init();
        let mut pos = 0;
        let mut prev_level = 6;
        loop {
            let t0 = run_length_ctx_offset(prev_level, channel, cm_init);
            let run = self.read_unary_sym(CtxKind::Run, t0, 2) as usize;
            let level = self.read_unary_sym(CtxKind::Level, t0, 2) + 1;
            let negative = self.decode_bin_ep() == 1;
            pos += run;
            levels[scan[pos] as usize] = if negative {
                -(level as i16)
            } else {
                level as i16
            };
            if pos == scan.len() - 1 {
                break;
            }
            pos += 1;
            prev_level = level;
            if self.decode_bin(CtxKind::Last.at(channel.type_index())) == 1 {
                break;
            }
        }
    }

    fn read_adcc(&mut self, levels: &mut [i16], log2_w: u8, log2_h: u8, channel: Channel) {
        let scan = ScanMetadata::global().scan(log2_w, log2_h);
        let x_mask = (1usize << log2_w) - 1;

        let group_x = self.read_last_component(log2_w, CtxKind::LastSigX, channel);
        let group_y = self.read_last_component(log2_h, CtxKind::LastSigY, channel);
        let last_x = self.read_last_suffix(group_x);
        let last_y = self.read_last_suffix(group_y);
        let last_blk = (last_y << log2_w) + last_x;
        let last = scan
            .iter()
            .position(|&blk| blk as usize == last_blk)
            .expect("last position inside block");

        let mut c1_idx = 0;
        let mut c2_idx = 0;
        for pos in (0..=last).rev() {
            if pos == last || pos % COEF_GROUP_SIZE == COEF_GROUP_SIZE - 1 {
                c1_idx = 0;
                c2_idx = 0;
            }
            let blk = scan[pos] as usize;
            let (x, y) = (blk & x_mask, blk >> log2_w);
            let tpl = neighbour_template(levels, x, y, log2_w, log2_h);

            let significant = pos == last
                || self.decode_bin(CtxKind::SigCoeff.at(sig_ctx(&tpl, x, y, channel))) == 1;
            if !significant {
                continue;
            }

            let ctx = gt_ctx(&tpl, x, y, channel);
            let base = base_level(c1_idx, c2_idx);
            let mut abs = 1;
            if c1_idx < NUM_GTA {
                if self.decode_bin(CtxKind::GtA.at(ctx)) == 1 {
                    abs = 2;
                    if c2_idx < NUM_GTB {
                        if self.decode_bin(CtxKind::GtB.at(ctx)) == 1 {
                            abs = 3;
                        }
                        c2_idx += 1;
                    }
                }
                c1_idx += 1;
            }
            if abs >= base {
                abs = base + self.read_remainder(ScanMetadata::rice_param(tpl.sum_abs));
            }
            let negative = self.decode_bin_ep() == 1;
            levels[blk] = if negative { -(abs as i16) } else { abs as i16 };
        }
    }
}
