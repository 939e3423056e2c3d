//! Rate-distortion optimized quantization.
//!
//! Each coefficient is quantized to its nearest level, then a backward sweep
//! picks, per position, the cheaper of the nearest level and the one below
//! it (or zero for unit levels) under `distortion + lambda * rate`. A final
//! pass chooses where the last significant coefficient should sit.

use tracing::trace;

use super::params::{fixed_lambda, QuantParams};
use super::rate::{RateEstimator, RateTable};
use super::scan::{ScanMetadata, COEF_GROUP_SIZE};
use crate::coding::block::{Channel, CoefficientBlock};
use crate::coding::residual::{
    gt_ctx, neighbour_template, run_length_ctx_offset, sig_ctx, NUM_GTA, NUM_GTB,
};

/// Shape, quantizer and lambda of one block handed to the optimizer.
#[derive(Debug, Clone, Copy)]
pub struct BlockRequest {
    pub log2_w: u8,
    pub log2_h: u8,
    pub quant: QuantParams,
    pub is_intra: bool,
    pub channel: Channel,
    pub lambda: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinedBlock {
    /// Raster order, signs restored.
    pub levels: Vec<i16>,
    pub num_significant: u32,
    pub last_scan_pos: Option<usize>,
}

impl RefinedBlock {
    fn zeros(len: usize) -> Self {
        Self {
            levels: vec![0; len],
            num_significant: 0,
            last_scan_pos: None,
        }
    }

    fn truncated(mut levels: Vec<i16>, scan: &[u16], last_scan_pos: Option<usize>) -> Self {
        let keep = last_scan_pos.map_or(0, |p| p + 1);
        for &blk in &scan[keep..] {
            levels[blk as usize] = 0;
        }
        let num_significant = levels.iter().filter(|&&l| l != 0).count() as u32;
        Self {
            levels,
            num_significant,
            last_scan_pos,
        }
    }

    pub fn into_block(self, log2_w: u8, log2_h: u8) -> CoefficientBlock {
        CoefficientBlock::from_parts(log2_w, log2_h, self.levels)
    }
}

fn with_sign(level: u32, coef: i32) -> i16 {
    let level = level.min(i16::MAX as u32) as i16;
    if coef < 0 {
        -level
    } else {
        level
    }
}

/// Nearest-level quantization of a block, raster indexed.
struct ForwardLevels {
    level_double: Vec<i64>,
    max_level: Vec<u32>,
    uncoded: Vec<i64>,
    block_uncoded: i64,
}

pub struct RdoqOptimizer<'a> {
    rate: &'a RateTable,
    cm_init: bool,
}

impl<'a> RdoqOptimizer<'a> {
    /// `cm_init` must match the contexts the rate table was taken from.
    pub fn new(rate: &'a RateTable, cm_init: bool) -> Self {
        Self { rate, cm_init }
    }

    /// Search matched to the ADCC syntax.
    ///
    /// When the last-position pass cuts the block short, the levels before
    /// the cut were priced against neighbours that no longer exist, so the
    /// level decision is redone up to the new last position. This repeats
    /// until the last position holds, which makes the result a fixed point:
    /// optimizing the truncated block again returns the same levels.
    pub fn optimize(&self, coefs: &[i32], req: &BlockRequest) -> RefinedBlock {
        let (log2_w, log2_h) = (req.log2_w, req.log2_h);
        let n = 1usize << (log2_w + log2_h);
        assert_eq!(coefs.len(), n, "coefficient count does not match block size");

        let bq = req.quant.block(log2_w, log2_h);
        let scan = ScanMetadata::global().scan(log2_w, log2_h);

        let mut fwd = ForwardLevels {
            level_double: vec![0; n],
            max_level: vec![0; n],
            uncoded: vec![0; n],
            block_uncoded: 0,
        };
        let mut last_nz = None;
        let mut forward_nz = 0u32;

        for (pos, &blk) in scan.iter().enumerate() {
            let blk = blk as usize;
            let ld = bq.level_double(coefs[blk]);
            fwd.level_double[blk] = ld;
            fwd.max_level[blk] = bq.max_level(ld);
            fwd.uncoded[blk] = bq.uncoded_cost(ld);
            fwd.block_uncoded += fwd.uncoded[blk];
            if fwd.max_level[blk] > 0 {
                last_nz = Some(pos);
                forward_nz += 1;
            }
        }

        let Some(mut last) = last_nz else {
            trace!("rdoq: forward quantization is all zero");
            return RefinedBlock::zeros(n);
        };

        let mut passes = 1;
        let refined = loop {
            let (dst, best_last) = self.adcc_pass(coefs, req, &fwd, last);
            match best_last {
                Some(pos) if pos < last => {
                    last = pos;
                    passes += 1;
                }
                _ => break RefinedBlock::truncated(dst, scan, best_last),
            }
        };
        trace!(
            forward = forward_nz,
            refined = refined.num_significant,
            last = ?refined.last_scan_pos,
            passes,
            "rdoq"
        );
        refined
    }

    /// One level decision over scan positions `0..=last` followed by the
    /// last-position choice. Positions after `last` are treated as zero.
    fn adcc_pass(
        &self,
        coefs: &[i32],
        req: &BlockRequest,
        fwd: &ForwardLevels,
        last: usize,
    ) -> (Vec<i16>, Option<usize>) {
        let (log2_w, log2_h) = (req.log2_w, req.log2_h);
        let n = coefs.len();
        let bq = req.quant.block(log2_w, log2_h);
        let est = RateEstimator::new(self.rate, fixed_lambda(req.lambda));
        let scan = ScanMetadata::global().scan(log2_w, log2_h);
        let x_mask = (1usize << log2_w) - 1;

        let mut dst = vec![0i16; n];
        let mut coded_cost = vec![0i64; last + 1];
        let mut sig_cost = vec![0i64; last + 1];
        let mut remaining_nz = scan[..=last]
            .iter()
            .filter(|&&blk| fwd.max_level[blk as usize] > 0)
            .count();
        let mut c1_idx = 0;
        let mut c2_idx = 0;

        for pos in (0..=last).rev() {
            if pos == last || pos % COEF_GROUP_SIZE == COEF_GROUP_SIZE - 1 {
                c1_idx = 0;
                c2_idx = 0;
            }

            let blk = scan[pos] as usize;
            let (x, y) = (blk & x_mask, blk >> log2_w);
            let tpl = neighbour_template(&dst, x, y, log2_w, log2_h);
            let ctx_sig = sig_ctx(&tpl, x, y, req.channel);
            let (sig0, sig1) = if pos == last {
                (0, 0)
            } else {
                (est.sig_cost(ctx_sig, 0), est.sig_cost(ctx_sig, 1))
            };

            let uncoded = fwd.uncoded[blk];
            let max = fwd.max_level[blk];
            if max == 0 {
                sig_cost[pos] = sig0;
                coded_cost[pos] = uncoded + sig0;
                continue;
            }

            let ctx_gt = gt_ctx(&tpl, x, y, req.channel);
            let rice = ScanMetadata::rice_param(tpl.sum_abs);
            let mut best = (0u32, i64::MAX);
            if max == 1 {
                best = (0, uncoded + sig0);
            }
            for level in (max.saturating_sub(1).max(1)..=max).rev() {
                let rate = est.level_rate(level, ctx_gt, ctx_gt, rice, c1_idx, c2_idx);
                let cost = bq.coded_cost(fwd.level_double[blk], level) + est.cost(rate) + sig1;
                if cost < best.1 {
                    best = (level, cost);
                }
            }

            let (level, cost) = best;
            coded_cost[pos] = cost;
            if level == 0 {
                sig_cost[pos] = sig0;
                remaining_nz -= 1;
                if remaining_nz == 0 {
                    trace!("rdoq: every level dropped");
                    return (vec![0; n], None);
                }
                continue;
            }

            sig_cost[pos] = sig1;
            dst[blk] = with_sign(level, coefs[blk]);
            if c1_idx < NUM_GTA {
                if level > 1 && c2_idx < NUM_GTB {
                    c2_idx += 1;
                }
                c1_idx += 1;
            }
        }

        let mut best_cost = fwd.block_uncoded + est.cbf_cost(req.channel, req.is_intra, false);
        let mut base_cost = fwd.block_uncoded + est.cbf_cost(req.channel, req.is_intra, true);
        for pos in 0..=last {
            base_cost += coded_cost[pos] - fwd.uncoded[scan[pos] as usize];
        }

        let mut best_last = None;
        for pos in (0..=last).rev() {
            let blk = scan[pos] as usize;
            let level = dst[blk].unsigned_abs();
            if level == 0 {
                base_cost -= sig_cost[pos];
                continue;
            }
            let (x, y) = (blk & x_mask, blk >> log2_w);
            let total = base_cost + est.last_position_cost(x, y, log2_w, log2_h, req.channel)
                - sig_cost[pos];
            if total < best_cost {
                best_cost = total;
                best_last = Some(pos);
            }
            if level > 1 {
                break;
            }
            base_cost -= coded_cost[pos];
            base_cost += fwd.uncoded[blk];
        }
        (dst, best_last)
    }

    /// Search matched to the run-length syntax: a forward sweep that prices
    /// runs, levels and last flags exactly as the codec writes them.
    pub fn optimize_run_length(&self, coefs: &[i32], req: &BlockRequest) -> RefinedBlock {
        let (log2_w, log2_h) = (req.log2_w, req.log2_h);
        let n = 1usize << (log2_w + log2_h);
        assert_eq!(coefs.len(), n, "coefficient count does not match block size");

        let bq = req.quant.block(log2_w, log2_h);
        let est = RateEstimator::new(self.rate, fixed_lambda(req.lambda));
        let scan = ScanMetadata::global().scan(log2_w, log2_h);

        let mut level_double = vec![0i64; n];
        let mut max_level = vec![0u32; n];
        let mut block_uncoded = 0i64;
        let mut forward_nz = 0u32;
        for &blk in scan {
            let blk = blk as usize;
            let ld = bq.level_double(coefs[blk]);
            level_double[blk] = ld;
            max_level[blk] = bq.max_level(ld);
            block_uncoded += bq.uncoded_cost(ld);
            forward_nz += (max_level[blk] > 0) as u32;
        }
        if forward_nz == 0 {
            trace!("rdoq: forward quantization is all zero");
            return RefinedBlock::zeros(n);
        }

        let mut best_cost = block_uncoded + est.cbf_cost(req.channel, req.is_intra, false);
        let mut base_cost = block_uncoded + est.cbf_cost(req.channel, req.is_intra, true);
        let last_zero = est.last_flag_cost(req.channel, false);
        let last_one = est.last_flag_cost(req.channel, true);

        let mut dst = vec![0i16; n];
        let mut best_last = None;
        let mut run = 0;
        let mut prev_level = 6;

        for (pos, &blk) in scan.iter().enumerate() {
            let blk = blk as usize;
            let t0 = run_length_ctx_offset(prev_level, req.channel, self.cm_init);
            let ld = level_double[blk];
            let uncoded = bq.uncoded_cost(ld);

            let mut level = 0;
            let mut coded = uncoded + est.run_level_cost(0, run, t0);
            let max = max_level[blk];
            if max > 0 {
                for candidate in (max.saturating_sub(1).max(1)..=max).rev() {
                    let cost = bq.coded_cost(ld, candidate) + est.run_level_cost(candidate, run, t0);
                    if cost < coded {
                        level = candidate;
                        coded = cost;
                    }
                }
            }

            base_cost += coded - uncoded;
            if level == 0 {
                run += 1;
                continue;
            }

            dst[blk] = with_sign(level, coefs[blk]);
            let is_last_cost = base_cost + last_one;
            base_cost += last_zero;
            if is_last_cost < best_cost {
                best_cost = is_last_cost;
                best_last = Some(pos);
            }
            run = 0;
            prev_level = level;
        }

        let refined = RefinedBlock::truncated(dst, scan, best_last);
        trace!(
            forward = forward_nz,
            refined = refined.num_significant,
            last = ?refined.last_scan_pos,
            "rdoq run-length"
        );
        refined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::context::{ContextSet, SliceType};
    use crate::coding::reader::SbacReader;
    use crate::coding::residual::{CoefficientCodec, ResidualSyntax};
    use crate::coding::sbac::ArithmeticEncoder;
    use crate::coding::tables::ContextInitTable;

    fn request(log2_w: u8, log2_h: u8, qp: u8, lambda: f64) -> BlockRequest {
        BlockRequest {
            log2_w,
            log2_h,
            quant: QuantParams::new(qp, 10).unwrap(),
            is_intra: true,
            channel: Channel::Luma,
            lambda,
        }
    }

    fn raster_from_scan(log2_w: u8, log2_h: u8, scanned: &[i32]) -> Vec<i32> {
        let scan = ScanMetadata::global().scan(log2_w, log2_h);
        let mut out = vec![0; scan.len()];
        for (pos, &v) in scanned.iter().enumerate() {
            out[scan[pos] as usize] = v;
        }
        out
    }

    fn textured_coefs(log2_w: u8, log2_h: u8, seed: u32) -> Vec<i32> {
        let (w, h) = (1usize << log2_w, 1usize << log2_h);
        let mut state = seed;
        let mut out = vec![0; w * h];
        for y in 0..h {
            for x in 0..w {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                let noise = ((state >> 16) % 200) as i32 - 100;
                let envelope = 1200 / (1 + x + y) as i32;
                out[(y << log2_w) + x] = envelope + noise;
            }
        }
        out
    }

    fn forward_nz(coefs: &[i32], req: &BlockRequest) -> u32 {
        let bq = req.quant.block(req.log2_w, req.log2_h);
        coefs
            .iter()
            .filter(|&&c| bq.max_level(bq.level_double(c)) > 0)
            .count() as u32
    }

    #[test]
    fn test_concrete_4x4_block() {
        let table = RateTable::from_contexts(&ContextSet::flat());
        let opt = RdoqOptimizer::new(&table, false);
        // forward levels 5 and 2 at scan positions 0 and 4
        let coefs = raster_from_scan(2, 2, &[320, 0, 0, 0, 128]);
        let req = request(2, 2, 22, 0.5);

        let refined = opt.optimize(&coefs, &req);
        assert_eq!(refined.last_scan_pos, Some(4));
        assert_eq!(refined.num_significant, 2);
        assert_eq!(refined.levels[0], 5);
        // scan position 4 is (1, 1)
        assert_eq!(refined.levels[5], 2);

        let block = refined.into_block(2, 2);
        let codec = CoefficientCodec::new(ResidualSyntax::Adcc);
        let mut enc = ArithmeticEncoder::new(ContextSet::flat());
        codec.encode(&mut enc, &block, Channel::Luma);
        enc.encode_bin_trm(1);
        enc.finish();
        let bytes = enc.into_bytes();

        let mut dec = SbacReader::new(&bytes, ContextSet::flat());
        let decoded = dec.read_residual(ResidualSyntax::Adcc, 2, 2, Channel::Luma, true);
        assert_eq!(decoded.to_scan_order(), vec![5, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(dec.decode_bin_trm(), 1);
    }

    #[test]
    fn test_all_zero_short_circuit() {
        let table = RateTable::from_contexts(&ContextSet::flat());
        let opt = RdoqOptimizer::new(&table, false);
        let coefs = vec![3; 64];
        let req = request(3, 3, 30, 10.0);
        let refined = opt.optimize(&coefs, &req);
        assert_eq!(refined.num_significant, 0);
        assert_eq!(refined.last_scan_pos, None);
        let refined = opt.optimize_run_length(&coefs, &req);
        assert_eq!(refined.num_significant, 0);
    }

    #[test]
    fn test_zero_lambda_keeps_forward_levels() {
        let table = RateTable::from_contexts(&ContextSet::flat());
        let opt = RdoqOptimizer::new(&table, false);
        // 8x8 at qp 22 has a step of exactly 32, so every level is exact
        let coefs: Vec<i32> = textured_coefs(3, 3, 11)
            .into_iter()
            .map(|c| c / 32 * 32)
            .collect();
        let req = request(3, 3, 22, 0.0);

        for refined in [opt.optimize(&coefs, &req), opt.optimize_run_length(&coefs, &req)] {
            for (i, &c) in coefs.iter().enumerate() {
                assert_eq!(refined.levels[i] as i32, c / 32, "position {}", i);
            }
        }
    }

    #[test]
    fn test_huge_lambda_empties_block() {
        let table = RateTable::from_contexts(&ContextSet::flat());
        let opt = RdoqOptimizer::new(&table, false);
        let coefs = textured_coefs(3, 3, 5);
        let req = request(3, 3, 22, 1.0e6);
        assert_eq!(opt.optimize(&coefs, &req).num_significant, 0);
        assert_eq!(opt.optimize_run_length(&coefs, &req).num_significant, 0);
    }

    #[test]
    fn test_never_adds_coefficients() {
        let table = RateTable::from_contexts(&ContextSet::initialized(
            &ContextInitTable::default(),
            SliceType::I,
            32,
        ));
        let opt = RdoqOptimizer::new(&table, true);
        for (seed, (log2_w, log2_h)) in [(2u8, 2u8), (3, 3), (4, 2), (5, 5), (2, 5)].iter().enumerate() {
            let coefs = textured_coefs(*log2_w, *log2_h, seed as u32 + 1);
            for lambda in [0.3, 3.0, 30.0] {
                let req = request(*log2_w, *log2_h, 32, lambda);
                let forward = forward_nz(&coefs, &req);
                let bq = req.quant.block(*log2_w, *log2_h);
                for refined in [opt.optimize(&coefs, &req), opt.optimize_run_length(&coefs, &req)] {
                    assert!(refined.num_significant <= forward);
                    for (i, &c) in coefs.iter().enumerate() {
                        let max = bq.max_level(bq.level_double(c));
                        let got = refined.levels[i];
                        assert!(got.unsigned_abs() as u32 <= max);
                        assert!(got == 0 || (got < 0) == (c < 0));
                    }
                }
            }
        }
    }

    #[test]
    fn test_lambda_sweep_bounds() {
        let table = RateTable::from_contexts(&ContextSet::flat());
        let opt = RdoqOptimizer::new(&table, false);
        for seed in 0..12u32 {
            for log2 in [2u8, 3, 4] {
                // qp 22 at 10 bits: square blocks have a step of 2^(8 - log2)
                let step = 1 << (8 - log2);
                let coefs: Vec<i32> = textured_coefs(log2, log2, seed)
                    .into_iter()
                    .map(|c| c / step * step)
                    .collect();
                let scan = ScanMetadata::global().scan(log2, log2);
                let forward = forward_nz(&coefs, &request(log2, log2, 22, 0.0));

                let req = request(log2, log2, 22, 0.0);
                assert_eq!(opt.optimize(&coefs, &req).num_significant, forward);
                assert_eq!(opt.optimize_run_length(&coefs, &req).num_significant, forward);

                let mut lambda = 0.05;
                while lambda < 200.0 {
                    let req = request(log2, log2, 22, lambda);
                    for refined in [opt.optimize(&coefs, &req), opt.optimize_run_length(&coefs, &req)] {
                        assert!(refined.num_significant <= forward, "seed {} lambda {}", seed, lambda);
                        match refined.last_scan_pos {
                            Some(last) => {
                                assert_ne!(refined.levels[scan[last] as usize], 0);
                                assert!(scan[last + 1..].iter().all(|&b| refined.levels[b as usize] == 0));
                            }
                            None => assert_eq!(refined.num_significant, 0),
                        }
                    }
                    lambda *= 1.15;
                }

                let req = request(log2, log2, 22, 1.0e6);
                assert_eq!(opt.optimize(&coefs, &req).num_significant, 0);
                assert_eq!(opt.optimize_run_length(&coefs, &req).num_significant, 0);
            }
        }
    }

    #[test]
    fn test_reoptimizing_truncated_block_is_stable() {
        let table = RateTable::from_contexts(&ContextSet::initialized(
            &ContextInitTable::default(),
            SliceType::I,
            27,
        ));
        let opt = RdoqOptimizer::new(&table, true);
        for seed in 0..20u32 {
            for (log2_w, log2_h) in [(2u8, 2u8), (3, 3), (4, 4), (2, 4), (5, 3)] {
                let coefs = textured_coefs(log2_w, log2_h, seed);
                let scan = ScanMetadata::global().scan(log2_w, log2_h);
                for lambda in [2.0, 20.0, 80.0] {
                    let req = request(log2_w, log2_h, 27, lambda);
                    let runs = [opt.optimize(&coefs, &req), opt.optimize_run_length(&coefs, &req)];
                    for (i, first) in runs.iter().enumerate() {
                        let keep = first.last_scan_pos.map_or(0, |p| p + 1);
                        let mut truncated = coefs.clone();
                        for &blk in &scan[keep..] {
                            truncated[blk as usize] = 0;
                        }
                        let second = if i == 0 {
                            opt.optimize(&truncated, &req)
                        } else {
                            opt.optimize_run_length(&truncated, &req)
                        };
                        assert_eq!(
                            first, &second,
                            "search {} seed {} {}x{} lambda {}",
                            i, seed, 1 << log2_w, 1 << log2_h, lambda
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_full_range_64x64_block() {
        let table = RateTable::from_contexts(&ContextSet::flat());
        let opt = RdoqOptimizer::new(&table, false);
        let alternating: Vec<i32> = (0..4096).map(|i| if i & 1 == 0 { 4000 } else { -4000 }).collect();
        let extreme: Vec<i32> = (0..4096).map(|i| if i & 1 == 0 { 32767 } else { -32768 }).collect();
        let cases = [
            (alternating, QuantParams::new(22, 10).unwrap()),
            (extreme, QuantParams::new(5, 8).unwrap()),
        ];
        for (coefs, quant) in cases {
            let req = BlockRequest {
                log2_w: 6,
                log2_h: 6,
                quant,
                is_intra: true,
                channel: Channel::Luma,
                lambda: 1.0,
            };
            let forward = forward_nz(&coefs, &req);
            assert_eq!(forward, 4096);
            for refined in [opt.optimize(&coefs, &req), opt.optimize_run_length(&coefs, &req)] {
                assert!(refined.num_significant > 0);
                assert!(refined.num_significant <= forward);
            }
        }
    }

    #[test]
    fn test_stable_when_nothing_is_dropped() {
        let table = RateTable::from_contexts(&ContextSet::flat());
        let opt = RdoqOptimizer::new(&table, false);
        let coefs = raster_from_scan(2, 2, &[320, 128, 0, 0, 128]);
        let req = request(2, 2, 22, 0.5);
        let first = opt.optimize(&coefs, &req);

        // feed the reconstruction back in at the exact level grid
        let step = 1 << 6;
        let again: Vec<i32> = first.levels.iter().map(|&l| l as i32 * step).collect();
        let second = opt.optimize(&again, &req);
        assert_eq!(first, second);
    }

    #[test]
    fn test_into_block() {
        let table = RateTable::from_contexts(&ContextSet::flat());
        let opt = RdoqOptimizer::new(&table, false);
        let coefs = raster_from_scan(2, 2, &[320, 128, 0, 0, 128]);
        let block = opt.optimize(&coefs, &request(2, 2, 22, 0.5)).into_block(2, 2);
        assert_eq!(block.num_significant(), 3);
        assert_eq!(block.to_scan_order()[..5], [5, 2, 0, 0, 2]);
        assert_eq!(block.last_scan_pos(), Some(4));
    }

    #[test]
    #[should_panic]
    fn test_rejects_wrong_length() {
        let table = RateTable::from_contexts(&ContextSet::flat());
        let opt = RdoqOptimizer::new(&table, false);
        opt.optimize(&[0; 15], &request(2, 2, 22, 1.0));
    }
}
