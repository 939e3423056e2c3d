use serde::{Deserialize, Serialize};

use crate::error::{RescodeError, RescodeResult};
use crate::quant::scan::ScanMetadata;

pub const MIN_LOG2_SIZE: u8 = 1;
pub const MAX_LOG2_SIZE: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Luma,
    Cb,
    Cr,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Luma, Channel::Cb, Channel::Cr];

    pub fn is_luma(self) -> bool {
        self == Channel::Luma
    }

    /// 0 for luma, 1 for either chroma plane.
    pub fn type_index(self) -> usize {
        if self.is_luma() {
            0
        } else {
            1
        }
    }
}

/// Quantized levels of one transform block, stored in raster order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoefficientBlock {
    log2_w: u8,
    log2_h: u8,
    levels: Vec<i16>,
    num_significant: u32,
}

pub fn check_dimensions(log2_w: u8, log2_h: u8) -> RescodeResult<()> {
    let valid = MIN_LOG2_SIZE..=MAX_LOG2_SIZE;
    if !valid.contains(&log2_w) || !valid.contains(&log2_h) {
        return Err(RescodeError::InvalidBlock(format!(
            "block size {}x{} outside 2..=64",
            1u32 << log2_w.min(31),
            1u32 << log2_h.min(31)
        )));
    }
    Ok(())
}

impl CoefficientBlock {
    pub fn new(log2_w: u8, log2_h: u8, levels: Vec<i16>) -> RescodeResult<Self> {
        check_dimensions(log2_w, log2_h)?;
        let expected = 1usize << (log2_w + log2_h);
        if levels.len() != expected {
            return Err(RescodeError::InvalidBlock(format!(
                "expected {} levels, got {}",
                expected,
                levels.len()
            )));
        }
        Ok(Self::from_parts(log2_w, log2_h, levels))
    }

    pub fn zeros(log2_w: u8, log2_h: u8) -> RescodeResult<Self> {
        check_dimensions(log2_w, log2_h)?;
        Ok(Self::from_parts(
            log2_w,
            log2_h,
            vec![0; 1 << (log2_w + log2_h)],
        ))
    }

    /// Builds a block from levels listed in zig-zag scan order.
    pub fn from_scan_order(log2_w: u8, log2_h: u8, scanned: &[i16]) -> RescodeResult<Self> {
        check_dimensions(log2_w, log2_h)?;
        let scan = ScanMetadata::global().scan(log2_w, log2_h);
        if scanned.len() != scan.len() {
            return Err(RescodeError::InvalidBlock(format!(
                "expected {} levels, got {}",
                scan.len(),
                scanned.len()
            )));
        }
        let mut levels = vec![0i16; scan.len()];
        for (&blk, &level) in scan.iter().zip(scanned) {
            levels[blk as usize] = level;
        }
        Ok(Self::from_parts(log2_w, log2_h, levels))
    }

    pub(crate) fn from_parts(log2_w: u8, log2_h: u8, levels: Vec<i16>) -> Self {
        debug_assert_eq!(levels.len(), 1 << (log2_w + log2_h));
        let num_significant = levels.iter().filter(|&&l| l != 0).count() as u32;
        Self {
            log2_w,
            log2_h,
            levels,
            num_significant,
        }
    }

    pub fn log2_width(&self) -> u8 {
        self.log2_w
    }

    pub fn log2_height(&self) -> u8 {
        self.log2_h
    }

    pub fn width(&self) -> usize {
        1 << self.log2_w
    }

    pub fn height(&self) -> usize {
        1 << self.log2_h
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_significant == 0
    }

    pub fn levels(&self) -> &[i16] {
        &self.levels
    }

    pub fn num_significant(&self) -> u32 {
        self.num_significant
    }

    pub fn get(&self, x: usize, y: usize) -> i16 {
        self.levels[(y << self.log2_w) + x]
    }

    pub fn scan(&self) -> &'static [u16] {
        ScanMetadata::global().scan(self.log2_w, self.log2_h)
    }

    /// Levels re-ordered along the zig-zag scan.
    pub fn to_scan_order(&self) -> Vec<i16> {
        self.scan()
            .iter()
            .map(|&blk| self.levels[blk as usize])
            .collect()
    }

    /// Scan position of the last non-zero level.
    pub fn last_scan_pos(&self) -> Option<usize> {
        self.scan()
            .iter()
            .rposition(|&blk| self.levels[blk as usize] != 0)
    }
}
