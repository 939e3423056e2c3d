//! Coefficient syntax: the run-length baseline and the ADCC
//! (sig / gtA / gtB / remainder) syntax, plus the context derivations the
//! rate model shares with them.

use serde::{Deserialize, Serialize};

use super::binarize::{BinCounter, BinEncoder};
use super::block::{Channel, CoefficientBlock};
use super::context::CtxKind;
use crate::quant::scan::{ScanMetadata, COEF_GROUP_SIZE, GO_RICE_RANGE, GROUP_IDX};

pub const NUM_GTA: u32 = 8;
pub const NUM_GTB: u32 = 1;

const RUN_CTX_BASE: [usize; 2] = [0, 2];
const RUN_CTX_BASE_CM: [usize; 2] = [0, 12];
const MAX_PREV_LEVEL: u32 = 6;

const TEMPLATE: [(usize, usize); 5] = [(1, 0), (2, 0), (0, 1), (0, 2), (1, 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResidualSyntax {
    #[default]
    RunLength,
    Adcc,
}

/// First run/level context for a coefficient given the previous level.
pub fn run_length_ctx_offset(prev_level: u32, channel: Channel, cm_init: bool) -> usize {
    let ch = channel.type_index();
    if cm_init {
        ((prev_level.clamp(1, MAX_PREV_LEVEL) - 1) << 1) as usize + RUN_CTX_BASE_CM[ch]
    } else {
        RUN_CTX_BASE[ch]
    }
}

/// Magnitude statistics of the already-coded neighbours of `(x, y)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Template {
    pub sum_abs: u32,
    pub num_sig: u32,
}

pub fn neighbour_template(levels: &[i16], x: usize, y: usize, log2_w: u8, log2_h: u8) -> Template {
    let (w, h) = (1usize << log2_w, 1usize << log2_h);
    let mut tpl = Template::default();
    for (dx, dy) in TEMPLATE {
        let (nx, ny) = (x + dx, y + dy);
        if nx < w && ny < h {
            let abs = levels[(ny << log2_w) + nx].unsigned_abs() as u32;
            tpl.sum_abs += abs;
            tpl.num_sig += (abs != 0) as u32;
        }
    }
    tpl
}

pub fn sig_ctx(tpl: &Template, x: usize, y: usize, channel: Channel) -> usize {
    let d = x + y;
    let magnitude = ((tpl.sum_abs + 1) >> 1).min(3) as usize;
    if channel.is_luma() {
        let region = if d < 2 {
            0
        } else if d < 5 {
            1
        } else {
            2
        };
        region * 4 + magnitude
    } else {
        12 + if d < 2 { 0 } else { 4 } + magnitude
    }
}

/// Shared index for the gtA and gtB tables.
pub fn gt_ctx(tpl: &Template, x: usize, y: usize, channel: Channel) -> usize {
    let excess = (tpl.sum_abs - tpl.num_sig).min(4) as usize;
    if channel.is_luma() {
        if x + y == 0 {
            excess
        } else {
            5 + excess
        }
    } else {
        10 + excess
    }
}

/// Smallest level carried by the remainder, given the flags coded so far.
pub fn base_level(c1_idx: u32, c2_idx: u32) -> u32 {
    if c1_idx < NUM_GTA {
        2 + (c2_idx < NUM_GTB) as u32
    } else {
        1
    }
}

/// Context offset and index shift of the last-position prefix.
pub fn last_ctx_offset_shift(log2_size: u8, channel: Channel) -> (usize, u32) {
    let l = log2_size.max(2) as usize;
    if channel.is_luma() {
        (3 * (l - 2) + ((l - 1) >> 2), ((l + 1) >> 2) as u32)
    } else {
        (20, (l - 2) as u32)
    }
}

/// Bins spent on a Golomb-Rice remainder with parameter `k`.
pub fn remainder_bins(symbol: u32, k: u32) -> u32 {
    let range = GO_RICE_RANGE[k as usize];
    if symbol < (range << k) {
        (symbol >> k) + 1 + k
    } else {
        let length = escape_length(symbol - (range << k), k).0;
        range + length + 1 - k + length
    }
}

fn escape_length(mut code: u32, k: u32) -> (u32, u32) {
    let mut length = k;
    while code >= (1 << length) {
        code -= 1 << length;
        length += 1;
    }
    (length, code)
}

pub fn write_remainder<E: BinEncoder>(enc: &mut E, symbol: u32, k: u32) {
    let range = GO_RICE_RANGE[k as usize];
    if symbol < (range << k) {
        let length = symbol >> k;
        enc.encode_bins_ep((1 << (length + 1)) - 2, length + 1);
        enc.encode_bins_ep(symbol & ((1 << k) - 1), k);
    } else {
        let (length, code) = escape_length(symbol - (range << k), k);
        let prefix = range + length + 1 - k;
        enc.encode_bins_ep((1 << prefix) - 2, prefix);
        enc.encode_bins_ep(code, length);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoefficientCodec {
    syntax: ResidualSyntax,
}

impl CoefficientCodec {
    pub fn new(syntax: ResidualSyntax) -> Self {
        Self { syntax }
    }

    pub fn syntax(&self) -> ResidualSyntax {
        self.syntax
    }

    /// Writes the residual of a block whose cbf is already signalled.
    /// An all-zero block emits nothing.
    pub fn encode<E: BinEncoder>(&self, enc: &mut E, block: &CoefficientBlock, channel: Channel) {
        if block.is_empty() {
            return;
        }
        match self.syntax {
            ResidualSyntax::RunLength => encode_run_length(enc, block, channel),
            ResidualSyntax::Adcc => encode_adcc(enc, block, channel),
        }
    }

    /// Bin usage of a block without coding it.
    pub fn measure(&self, block: &CoefficientBlock, channel: Channel, cm_init: bool) -> BinCounter {
        let mut counter = BinCounter::new(cm_init);
        self.encode(&mut counter, block, channel);
        counter
    }
}

fn encode_run_length<E: BinEncoder>(enc: &mut E, block: &CoefficientBlock, channel: Channel) {
    let scan = block.scan();
    let levels = block.levels();
    let last_pos = scan.len() - 1;
    let cm_init = enc.cm_init();
    let last_ctx = CtxKind::Last.at(channel.type_index());

    let mut num_sig = block.num_significant();
    let mut run = 0;
    let mut prev_level = MAX_PREV_LEVEL;

    for (scan_pos, &blk) in scan.iter().enumerate() {
        let level = levels[blk as usize];
        if level == 0 {
            run += 1;
            continue;
        }

        let abs = level.unsigned_abs() as u32;
        let t0 = run_length_ctx_offset(prev_level, channel, cm_init);
        enc.write_unary_sym(run, CtxKind::Run, t0, 2);
        enc.write_unary_sym(abs - 1, CtxKind::Level, t0, 2);
        enc.encode_bin_ep((level < 0) as u32);

        if scan_pos == last_pos {
            break;
        }
        run = 0;
        prev_level = abs;

        assert!(num_sig > 0, "significant count underflow");
        num_sig -= 1;
        enc.encode_bin((num_sig == 0) as u32, last_ctx);
        if num_sig == 0 {
            break;
        }
    }
}

fn write_last_prefix<E: BinEncoder>(
    enc: &mut E,
    pos: usize,
    log2_size: u8,
    kind: CtxKind,
    channel: Channel,
) {
    let (offset, shift) = last_ctx_offset_shift(log2_size, channel);
    let group = GROUP_IDX[pos] as usize;
    let max_group = GROUP_IDX[(1 << log2_size) - 1] as usize;
    for i in 0..group {
        enc.encode_bin(1, kind.at(offset + (i >> shift)));
    }
    if group < max_group {
        enc.encode_bin(0, kind.at(offset + (group >> shift)));
    }
}

fn write_last_suffix<E: BinEncoder>(enc: &mut E, pos: usize) {
    let group = ScanMetadata::group_index(pos);
    let len = ScanMetadata::suffix_len(group);
    if len > 0 {
        enc.encode_bins_ep((pos - ScanMetadata::min_in_group(group)) as u32, len);
    }
}

fn encode_adcc<E: BinEncoder>(enc: &mut E, block: &CoefficientBlock, channel: Channel) {
    let Some(last) = block.last_scan_pos() else {
        return;
    };
    let scan = block.scan();
    let levels = block.levels();
    let (log2_w, log2_h) = (block.log2_width(), block.log2_height());
    let x_mask = block.width() - 1;

    let last_blk = scan[last] as usize;
    let (last_x, last_y) = (last_blk & x_mask, last_blk >> log2_w);
    write_last_prefix(enc, last_x, log2_w, CtxKind::LastSigX, channel);
    write_last_prefix(enc, last_y, log2_h, CtxKind::LastSigY, channel);
    write_last_suffix(enc, last_x);
    write_last_suffix(enc, last_y);

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
        let level = levels[blk];
        let abs = level.unsigned_abs() as u32;

        if pos != last {
            let ctx = sig_ctx(&tpl, x, y, channel);
            enc.encode_bin((abs != 0) as u32, CtxKind::SigCoeff.at(ctx));
        }
        if abs == 0 {
            continue;
        }

        let ctx = gt_ctx(&tpl, x, y, channel);
        let base = base_level(c1_idx, c2_idx);
        if c1_idx < NUM_GTA {
            enc.encode_bin((abs > 1) as u32, CtxKind::GtA.at(ctx));
            if abs > 1 && c2_idx < NUM_GTB {
                enc.encode_bin((abs > 2) as u32, CtxKind::GtB.at(ctx));
                c2_idx += 1;
            }
            c1_idx += 1;
        }
        if abs >= base {
            write_remainder(enc, abs - base, ScanMetadata::rice_param(tpl.sum_abs));
        }
        enc.encode_bin_ep((level < 0) as u32);
    }
}
