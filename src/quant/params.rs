//! QP-derived quantizer constants, error scaling and lambda.

use lazy_static::lazy_static;

use crate::coding::block::{Channel, MAX_LOG2_SIZE};
use crate::coding::context::SliceType;
use crate::error::{RescodeError, RescodeResult};

pub const QUANT_SCALE: [i64; 6] = [26214, 23302, 20560, 18396, 16384, 14564];
pub const QUANT_SHIFT: i32 = 14;
pub const MAX_TX_DYNAMIC_RANGE: i32 = 15;
pub const SCALE_BITS: u32 = 15;
pub const ERR_SCALE_PRECISION_BITS: u32 = 20;

pub const MAX_QP: u8 = 51;
pub const MIN_BIT_DEPTH: u8 = 8;
pub const MAX_BIT_DEPTH: u8 = 12;

const NS_SHIFT: i32 = 7;
const NS_SCALE: i64 = 181;

const FAST_RDOQ_INTRA_RND_OFST: i64 = 201;
const FAST_RDOQ_INTER_RND_OFST: i64 = 153;
const QUANT_INTRA_RND_OFST: i64 = 171;
const QUANT_INTER_RND_OFST: i64 = 85;

const COEF_MAX: i32 = (1 << MAX_TX_DYNAMIC_RANGE) - 1;

type ErrScaleTable = [[i64; MAX_LOG2_SIZE as usize]; 6];

lazy_static! {
    static ref ERR_SCALE: Vec<ErrScaleTable> = (MIN_BIT_DEPTH..=MAX_BIT_DEPTH)
        .map(build_err_scale)
        .collect();
}

fn build_err_scale(bit_depth: u8) -> ErrScaleTable {
    let mut tbl = [[0i64; MAX_LOG2_SIZE as usize]; 6];
    for (qp_rem, row) in tbl.iter_mut().enumerate() {
        for (i, entry) in row.iter_mut().enumerate() {
            let tr_shift = MAX_TX_DYNAMIC_RANGE as f64 - bit_depth as f64 - (i as f64 + 1.0);
            let mut err_scale = (1u64 << SCALE_BITS) as f64 * 2.0f64.powf(-tr_shift);
            err_scale = err_scale
                / QUANT_SCALE[qp_rem] as f64
                / (1u64 << (bit_depth - MIN_BIT_DEPTH)) as f64;
            *entry = (err_scale * (1u64 << ERR_SCALE_PRECISION_BITS) as f64) as i64;
        }
    }
    tbl
}

/// Lagrange multiplier for a QP, in distortion-per-bit units.
pub fn lambda_for_qp(qp: u8) -> f64 {
    0.57 * 2.0f64.powf((qp as f64 - 12.0) / 3.0)
}

/// Lambda in the 2^15 fixed point the rate tables use.
pub fn fixed_lambda(lambda: f64) -> i64 {
    (lambda * (1u64 << SCALE_BITS) as f64 + 0.5) as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantParams {
    qp: u8,
    bit_depth: u8,
}

impl QuantParams {
    pub fn new(qp: u8, bit_depth: u8) -> RescodeResult<Self> {
        if qp > MAX_QP {
            return Err(RescodeError::InvalidParameter(format!(
                "qp {} exceeds {}",
                qp, MAX_QP
            )));
        }
        if !(MIN_BIT_DEPTH..=MAX_BIT_DEPTH).contains(&bit_depth) {
            return Err(RescodeError::InvalidParameter(format!(
                "unsupported bit depth {}",
                bit_depth
            )));
        }
        Ok(Self { qp, bit_depth })
    }

    pub fn qp(&self) -> u8 {
        self.qp
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    pub fn block(&self, log2_w: u8, log2_h: u8) -> BlockQuant {
        let qp_rem = (self.qp % 6) as usize;
        let log2_size = ((log2_w + log2_h) >> 1) as i32;
        let (ns_shift, ns_scale) = if (log2_w + log2_h) & 1 != 0 {
            (NS_SHIFT, NS_SCALE)
        } else {
            (0, 1)
        };
        let ns_offset = if ns_shift > 0 { 1 << (ns_shift - 1) } else { 0 };
        let scale = QUANT_SCALE[qp_rem];
        let tr_shift = MAX_TX_DYNAMIC_RANGE - self.bit_depth as i32 - log2_size;

        BlockQuant {
            scale,
            q_value: (scale * ns_scale + ns_offset) >> ns_shift,
            q_bits: QUANT_SHIFT + tr_shift + (self.qp / 6) as i32,
            ns_shift,
            ns_scale,
            err_scale: ERR_SCALE[(self.bit_depth - MIN_BIT_DEPTH) as usize][qp_rem]
                [log2_size as usize - 1],
        }
    }
}

/// Chroma QP from the luma QP and the slice offset.
pub fn chroma_qp(qp: u8, offset: i8) -> u8 {
    (qp as i32 + offset as i32).clamp(0, MAX_QP as i32) as u8
}

/// `err²` brought into the `2^SCALE_BITS` cost domain, so that a 64x64 sum
/// of full-range errors stays inside `i64`.
fn distortion(err: i64) -> i64 {
    ((err as i128 * err as i128) >> SCALE_BITS) as i64
}

/// Quantizer constants for one block shape at one QP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockQuant {
    pub scale: i64,
    pub q_value: i64,
    pub q_bits: i32,
    pub ns_shift: i32,
    pub ns_scale: i64,
    pub err_scale: i64,
}

impl BlockQuant {
    /// `|coef| * q_value`, clamped so rounding cannot overflow 32 bits.
    pub fn level_double(&self, coef: i32) -> i64 {
        let magnitude = coef.clamp(-COEF_MAX, COEF_MAX).unsigned_abs() as i64;
        (magnitude * self.q_value).min(i32::MAX as i64 - (1i64 << (self.q_bits - 1)))
    }

    /// Nearest integer level of a level_double.
    pub fn max_level(&self, level_double: i64) -> u32 {
        let mut level = (level_double >> self.q_bits) as u32;
        if level_double - ((level as i64) << self.q_bits) >= (1i64 << (self.q_bits - 1)) {
            level += 1;
        }
        level
    }

    /// Squared, scaled error of leaving the coefficient uncoded.
    pub fn uncoded_cost(&self, level_double: i64) -> i64 {
        distortion((level_double * self.err_scale) >> ERR_SCALE_PRECISION_BITS)
    }

    /// Squared, scaled error of reconstructing at `level`.
    pub fn coded_cost(&self, level_double: i64, level: u32) -> i64 {
        let delta = level_double - ((level as i64) << self.q_bits);
        distortion((delta * self.err_scale) >> ERR_SCALE_PRECISION_BITS)
    }

    fn forward_shift(&self) -> i32 {
        self.q_bits + self.ns_shift
    }

    /// True when no coefficient survives the aggressive pre-check rounding,
    /// so the whole block can be dropped without a search.
    pub fn is_trivially_zero(&self, coefs: &[i32], slice_type: SliceType) -> bool {
        let shift = self.forward_shift();
        let rnd = if slice_type.is_intra() {
            FAST_RDOQ_INTRA_RND_OFST
        } else {
            FAST_RDOQ_INTER_RND_OFST
        };
        let threshold = (1i64 << shift) - (rnd << (shift - 9));
        coefs.iter().all(|&c| {
            let magnitude = c.clamp(-COEF_MAX, COEF_MAX).unsigned_abs() as i64;
            magnitude * self.scale * self.ns_scale < threshold
        })
    }

    /// Plain dead-zone quantization, used when the search is disabled.
    pub fn quantize(&self, coef: i32, slice_type: SliceType) -> i16 {
        let shift = self.forward_shift();
        let rnd = if slice_type.is_intra() {
            QUANT_INTRA_RND_OFST
        } else {
            QUANT_INTER_RND_OFST
        };
        let magnitude = coef.clamp(-COEF_MAX, COEF_MAX).unsigned_abs() as i64;
        let level = ((magnitude * self.scale * self.ns_scale + (rnd << (shift - 9))) >> shift)
            .min(i16::MAX as i64) as i16;
        if coef < 0 {
            -level
        } else {
            level
        }
    }
}

/// Distortion weight applied to chroma lambda so chroma error is traded
/// at the luma QP's rate.
pub fn channel_lambda(luma_lambda: f64, luma_qp: u8, channel: Channel, chroma_qp: u8) -> f64 {
    if channel.is_luma() {
        luma_lambda
    } else {
        let weight = 2.0f64.powf((luma_qp as f64 - chroma_qp as f64) / 3.0);
        luma_lambda / weight
    }
}
