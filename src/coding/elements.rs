//! Writers for the non-residual syntax elements that share the coder with
//! the coefficients.

use super::binarize::BinEncoder;
use super::block::Channel;
use super::context::{CtxKind, CtxRef};

pub const MAX_NUM_MVP: u32 = 4;

/// Inter luma signals its cbf on the combined flag's context.
pub fn cbf_ctx(channel: Channel, is_intra: bool) -> CtxRef {
    match channel {
        Channel::Luma if !is_intra => CtxKind::CbfAll.at(0),
        Channel::Luma => CtxKind::CbfLuma.at(0),
        Channel::Cb => CtxKind::CbfCb.at(0),
        Channel::Cr => CtxKind::CbfCr.at(0),
    }
}

pub fn write_cbf<E: BinEncoder>(enc: &mut E, channel: Channel, is_intra: bool, coded: bool) {
    enc.encode_bin(coded as u32, cbf_ctx(channel, is_intra));
}

/// `ctx_inc` is the number of skipped neighbours, 0 or 1.
pub fn write_skip_flag<E: BinEncoder>(enc: &mut E, skip: bool, ctx_inc: usize) {
    enc.encode_bin(skip as u32, CtxKind::SkipFlag.at(ctx_inc.min(1)));
}

pub fn write_intra_dir<E: BinEncoder>(enc: &mut E, dir: u32) {
    enc.write_unary_sym(dir, CtxKind::IntraDir, 0, 2);
}

pub fn write_mvp_idx<E: BinEncoder>(enc: &mut E, idx: u32) {
    enc.write_truncated_unary_sym(idx, MAX_NUM_MVP, CtxKind::MvpIdx, 0, 3);
}

pub fn write_mvd<E: BinEncoder>(enc: &mut E, mvd: [i32; 2]) {
    for component in mvd {
        enc.write_mvd(component, CtxKind::Mvd.at(0));
    }
}

pub fn write_delta_qp<E: BinEncoder>(enc: &mut E, delta_qp: i32) {
    enc.write_unary_sym(delta_qp.unsigned_abs(), CtxKind::DeltaQp, 0, 1);
    if delta_qp != 0 {
        enc.encode_bin_ep((delta_qp < 0) as u32);
    }
}

pub fn write_tile_end_flag<E: BinEncoder>(enc: &mut E, end: bool) {
    enc.encode_bin_trm(end as u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::context::ContextSet;
    use crate::coding::reader::SbacReader;
    use crate::coding::sbac::ArithmeticEncoder;

    #[test]
    fn test_cbf_context_selection() {
        assert_eq!(cbf_ctx(Channel::Luma, false).kind, CtxKind::CbfAll);
        assert_eq!(cbf_ctx(Channel::Luma, true).kind, CtxKind::CbfLuma);
        assert_eq!(cbf_ctx(Channel::Cr, false).kind, CtxKind::CbfCr);
    }

    #[test]
    fn test_prediction_elements_roundtrip() {
        let mut enc = ArithmeticEncoder::new(ContextSet::flat());
        write_skip_flag(&mut enc, true, 1);
        write_mvp_idx(&mut enc, 2);
        write_mvd(&mut enc, [-3, 17]);
        write_intra_dir(&mut enc, 5);
        write_delta_qp(&mut enc, -4);
        write_cbf(&mut enc, Channel::Cb, true, false);
        write_tile_end_flag(&mut enc, true);
        enc.finish();
        let bytes = enc.into_bytes();

        let mut dec = SbacReader::new(&bytes, ContextSet::flat());
        assert_eq!(dec.decode_bin(CtxKind::SkipFlag.at(1)), 1);
        assert_eq!(dec.read_truncated_unary_sym(MAX_NUM_MVP, CtxKind::MvpIdx, 0, 3), 2);
        assert_eq!(dec.read_mvd(CtxKind::Mvd.at(0)), -3);
        assert_eq!(dec.read_mvd(CtxKind::Mvd.at(0)), 17);
        assert_eq!(dec.read_unary_sym(CtxKind::IntraDir, 0, 2), 5);
        assert_eq!(dec.read_unary_sym(CtxKind::DeltaQp, 0, 1), 4);
        assert_eq!(dec.decode_bin_ep(), 1);
        assert_eq!(dec.decode_bin(cbf_ctx(Channel::Cb, true)), 0);
        assert_eq!(dec.decode_bin_trm(), 1);
    }
}
