//! Zig-zag scans and the position tables shared by the codec and the
//! rate model. Built once per process and read-only afterwards.

use lazy_static::lazy_static;

use crate::coding::block::{MAX_LOG2_SIZE, MIN_LOG2_SIZE};

const NUM_SIZES: usize = (MAX_LOG2_SIZE - MIN_LOG2_SIZE + 1) as usize;

pub const GROUP_IDX: [u8; 64] = [
    0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 9, 9, 9, 9, 9, 9, 9, 9,
    10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 11, 11, 11, 11, 11, 11, 11,
    11, 11, 11, 11, 11, 11, 11, 11, 11,
];

pub const MIN_IN_GROUP: [u8; 12] = [0, 1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 48];

pub const GO_RICE_RANGE: [u32; 10] = [6, 5, 6, 3, 3, 3, 3, 3, 3, 3];

pub const GO_RICE_PARS_COEFF: [u8; 32] = [
    0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 3, 3, 3, 3,
];

pub const COEF_GROUP_SIZE: usize = 16;

pub struct ScanMetadata {
    zigzag: Vec<Vec<Vec<u16>>>,
}

lazy_static! {
    static ref SCAN_METADATA: ScanMetadata = ScanMetadata::build();
}

impl ScanMetadata {
    pub fn global() -> &'static ScanMetadata {
        &SCAN_METADATA
    }

    fn build() -> Self {
        let sizes = MIN_LOG2_SIZE..=MAX_LOG2_SIZE;
        let zigzag = sizes
            .clone()
            .map(|log2_w| {
                sizes
                    .clone()
                    .map(|log2_h| zigzag_scan(1 << log2_w, 1 << log2_h))
                    .collect()
            })
            .collect();
        Self { zigzag }
    }

    /// Scan position -> raster index for a `2^log2_w x 2^log2_h` block.
    pub fn scan(&self, log2_w: u8, log2_h: u8) -> &[u16] {
        let w = (log2_w - MIN_LOG2_SIZE) as usize;
        let h = (log2_h - MIN_LOG2_SIZE) as usize;
        debug_assert!(w < NUM_SIZES && h < NUM_SIZES);
        &self.zigzag[w][h]
    }

    pub fn group_index(pos: usize) -> usize {
        GROUP_IDX[pos] as usize
    }

    pub fn min_in_group(group: usize) -> usize {
        MIN_IN_GROUP[group] as usize
    }

    /// Bypass suffix length of a last-position group.
    pub fn suffix_len(group: usize) -> u32 {
        if group > 3 {
            ((group - 2) >> 1) as u32
        } else {
            0
        }
    }

    pub fn rice_param(sum_abs: u32) -> u32 {
        GO_RICE_PARS_COEFF[sum_abs.min(31) as usize] as u32
    }
}

fn zigzag_scan(width: i32, height: i32) -> Vec<u16> {
    let mut scan = Vec::with_capacity((width * height) as usize);
    scan.push(0u16);

    for line in 1..(width + height - 1) {
        if line % 2 == 1 {
            let mut x = line.min(width - 1);
            let mut y = (line - (width - 1)).max(0);
            while x >= 0 && y < height {
                scan.push((y * width + x) as u16);
                x -= 1;
                y += 1;
            }
        } else {
            let mut y = line.min(height - 1);
            let mut x = (line - (height - 1)).max(0);
            while y >= 0 && x < width {
                scan.push((y * width + x) as u16);
                x += 1;
                y -= 1;
            }
        }
    }
    scan
}
