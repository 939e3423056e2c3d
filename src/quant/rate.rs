//! Bit-cost estimates read from a snapshot of the context probabilities.
//! Rates are in 1/32768 bit units; costs are rates scaled by lambda and
//! brought back down by `SCALE_BITS`, the same units as the distortion.

use lazy_static::lazy_static;

use super::params::SCALE_BITS;
use super::scan::{ScanMetadata, GO_RICE_RANGE, GROUP_IDX};
use crate::coding::block::{Channel, MAX_LOG2_SIZE, MIN_LOG2_SIZE};
use crate::coding::context::{ContextModel, ContextSet, CtxKind, CtxRef};
use crate::coding::elements::cbf_ctx;
use crate::coding::residual::{base_level, last_ctx_offset_shift, remainder_bins, NUM_GTA, NUM_GTB};

pub const IEP_RATE: i32 = 1 << 15;

// The coder's LPS floor of 437/16384 expressed in 1/512 probability units.
const LPS_FLOOR_STATE: u16 = 14;

const NUM_SIZES: usize = (MAX_LOG2_SIZE - MIN_LOG2_SIZE + 1) as usize;
const NUM_GROUPS: usize = 12;

lazy_static! {
    static ref ENTROPY_BITS: Vec<i32> = (0..=512)
        .map(|p: u32| {
            let prob = p.max(1) as f64 / 512.0;
            (-prob.log2() * IEP_RATE as f64 + 0.5) as i32
        })
        .collect();
}

/// Estimated rate of coding `bin` with `model`.
pub fn bin_rate(model: ContextModel, bin: u32) -> i32 {
    let lps = model
        .state()
        .clamp(LPS_FLOOR_STATE, ContextModel::MAX_STATE) as usize;
    if bin == model.mps() {
        ENTROPY_BITS[512 - lps]
    } else {
        ENTROPY_BITS[lps]
    }
}

/// Per-context rates for both bin values, plus cumulative last-position
/// prefix rates, frozen from a `ContextSet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    bits: Vec<[i32; 2]>,
    last_prefix: Vec<[i32; NUM_GROUPS]>,
}

fn last_prefix_slot(kind: CtxKind, channel: Channel, log2_size: u8) -> usize {
    let axis = if kind == CtxKind::LastSigX { 0 } else { 1 };
    (axis * 2 + channel.type_index()) * NUM_SIZES + (log2_size - MIN_LOG2_SIZE) as usize
}

impl RateTable {
    pub fn from_contexts(contexts: &ContextSet) -> Self {
        let bits: Vec<[i32; 2]> = contexts
            .models()
            .iter()
            .map(|&m| [bin_rate(m, 0), bin_rate(m, 1)])
            .collect();

        let mut last_prefix = vec![[0i32; NUM_GROUPS]; 2 * 2 * NUM_SIZES];
        for kind in [CtxKind::LastSigX, CtxKind::LastSigY] {
            for channel in [Channel::Luma, Channel::Cb] {
                for log2_size in MIN_LOG2_SIZE..=MAX_LOG2_SIZE {
                    let (offset, shift) = last_ctx_offset_shift(log2_size, channel);
                    let max_group = GROUP_IDX[(1 << log2_size) - 1] as usize;
                    let rate_of = |i: usize, bin: usize| {
                        bits[kind.at(offset + (i >> shift)).flat_index()][bin]
                    };
                    let row = &mut last_prefix[last_prefix_slot(kind, channel, log2_size)];
                    let mut ones = 0;
                    for (group, entry) in row.iter_mut().enumerate().take(max_group + 1) {
                        *entry = ones + if group < max_group { rate_of(group, 0) } else { 0 };
                        if group < max_group {
                            ones += rate_of(group, 1);
                        }
                    }
                }
            }
        }

        Self { bits, last_prefix }
    }

    pub fn rate(&self, ctx: CtxRef, bin: u32) -> i32 {
        self.bits[ctx.flat_index()][bin as usize]
    }

    pub fn last_prefix_rate(&self, kind: CtxKind, channel: Channel, log2_size: u8, group: usize) -> i32 {
        self.last_prefix[last_prefix_slot(kind, channel, log2_size)][group]
    }
}

/// Lambda-scaled costs of the syntax decisions the quantizer search makes.
#[derive(Debug, Clone, Copy)]
pub struct RateEstimator<'a> {
    table: &'a RateTable,
    lambda: i64,
}

impl<'a> RateEstimator<'a> {
    pub fn new(table: &'a RateTable, lambda: i64) -> Self {
        Self { table, lambda }
    }

    pub fn lambda(&self) -> i64 {
        self.lambda
    }

    pub fn cost(&self, rate: i32) -> i64 {
        self.scaled(rate as i64)
    }

    // wide product: unary run-length levels can carry very large rates
    fn scaled(&self, rate: i64) -> i64 {
        ((rate as i128 * self.lambda as i128) >> SCALE_BITS) as i64
    }

    pub fn sig_cost(&self, ctx: usize, bin: u32) -> i64 {
        self.cost(self.table.rate(CtxKind::SigCoeff.at(ctx), bin))
    }

    pub fn cbf_cost(&self, channel: Channel, is_intra: bool, coded: bool) -> i64 {
        self.cost(self.table.rate(cbf_ctx(channel, is_intra), coded as u32))
    }

    pub fn last_position_rate(
        &self,
        x: usize,
        y: usize,
        log2_w: u8,
        log2_h: u8,
        channel: Channel,
    ) -> i32 {
        let group_x = GROUP_IDX[x] as usize;
        let group_y = GROUP_IDX[y] as usize;
        let mut rate = self
            .table
            .last_prefix_rate(CtxKind::LastSigX, channel, log2_w, group_x)
            + self
                .table
                .last_prefix_rate(CtxKind::LastSigY, channel, log2_h, group_y);
        rate += IEP_RATE * ScanMetadata::suffix_len(group_x) as i32;
        rate += IEP_RATE * ScanMetadata::suffix_len(group_y) as i32;
        rate
    }

    pub fn last_position_cost(
        &self,
        x: usize,
        y: usize,
        log2_w: u8,
        log2_h: u8,
        channel: Channel,
    ) -> i64 {
        self.cost(self.last_position_rate(x, y, log2_w, log2_h, channel))
    }

    /// Rate of a non-zero level's gtA/gtB flags, remainder and sign.
    pub fn level_rate(
        &self,
        level: u32,
        ctx_gt_a: usize,
        ctx_gt_b: usize,
        rice: u32,
        c1_idx: u32,
        c2_idx: u32,
    ) -> i32 {
        if level == 0 {
            return 0;
        }
        let gt_a = |bin| self.table.rate(CtxKind::GtA.at(ctx_gt_a), bin);
        let gt_b = |bin| self.table.rate(CtxKind::GtB.at(ctx_gt_b), bin);

        let mut rate = IEP_RATE;
        let base = base_level(c1_idx, c2_idx);
        if level >= base {
            debug_assert!((rice as usize) < GO_RICE_RANGE.len());
            rate += IEP_RATE * remainder_bins(level - base, rice) as i32;
            if c1_idx < NUM_GTA {
                rate += gt_a(1);
                if c2_idx < NUM_GTB {
                    rate += gt_b(1);
                }
            }
        } else if level == 1 {
            rate += gt_a(0);
        } else {
            rate += gt_a(1) + gt_b(0);
        }
        rate
    }

    /// Run-length syntax cost of a coefficient after `run` zeros, `t0`
    /// being its first run/level context.
    pub fn run_level_cost(&self, level: u32, run: u32, t0: usize) -> i64 {
        let run_ctx = if run == 0 { t0 } else { t0 + 1 };
        let bin = |ctx: CtxRef, value: u32| self.table.rate(ctx, value) as i64;
        let rate = if level == 0 {
            bin(CtxKind::Run.at(run_ctx), 1)
        } else {
            let mut rate = IEP_RATE as i64 + bin(CtxKind::Run.at(run_ctx), 0);
            if level == 1 {
                rate += bin(CtxKind::Level.at(t0), 0);
            } else {
                rate += bin(CtxKind::Level.at(t0), 1);
                rate += bin(CtxKind::Level.at(t0 + 1), 1) * (level as i64 - 2);
                rate += bin(CtxKind::Level.at(t0 + 1), 0);
            }
            rate
        };
        self.scaled(rate)
    }

    pub fn last_flag_cost(&self, channel: Channel, last: bool) -> i64 {
        self.cost(
            self.table
                .rate(CtxKind::Last.at(channel.type_index()), last as u32),
        )
    }
}
