use super::context::{CtxKind, NUM_CONTEXTS};
use crate::error::{RescodeError, RescodeResult};

// Packed slope/offset init values, one row per slice class (intra, inter).
// Decoded by ContextModel::from_init_value.

pub static SKIP_FLAG_INIT: [[u16; 2]; 2] = [[0, 0], [384, 256]];

pub static INTRA_DIR_INIT: [[u16; 2]; 2] = [[144, 0], [144, 128]];

pub static MVP_IDX_INIT: [[u16; 3]; 2] = [[0, 0, 0], [272, 130, 0]];

pub static MVD_INIT: [[u16; 1]; 2] = [[0], [144]];

pub static DELTA_QP_INIT: [[u16; 1]; 2] = [[256], [256]];

pub static CBF_ALL_INIT: [[u16; 1]; 2] = [[0], [272]];

pub static CBF_LUMA_INIT: [[u16; 1]; 2] = [[400], [131]];

pub static CBF_CB_INIT: [[u16; 1]; 2] = [[130], [256]];

pub static CBF_CR_INIT: [[u16; 1]; 2] = [[130], [256]];

pub static RUN_INIT: [[u16; 24]; 2] = [
    [
        144, 128, 0, 130, 128, 130, 256, 130, 256, 384, 384, 384, 144, 0, 130, 128, 256, 130, 256,
        384, 384, 384, 384, 384,
    ],
    [
        0, 130, 128, 256, 130, 256, 256, 384, 384, 384, 384, 384, 0, 128, 130, 256, 256, 384, 384,
        384, 384, 384, 384, 384,
    ],
];

pub static LEVEL_INIT: [[u16; 24]; 2] = [
    [
        400, 272, 144, 144, 0, 0, 130, 128, 256, 130, 256, 256, 272, 144, 144, 0, 0, 128, 130, 256,
        256, 256, 384, 384,
    ],
    [
        272, 144, 144, 0, 0, 128, 130, 256, 256, 256, 384, 384, 144, 144, 0, 0, 128, 130, 256, 256,
        384, 384, 384, 384,
    ],
];

pub static LAST_INIT: [[u16; 2]; 2] = [[256, 130], [384, 256]];

pub static LAST_SIG_X_INIT: [[u16; 24]; 2] = [
    [
        144, 0, 128, 144, 0, 130, 144, 0, 130, 144, 0, 0, 130, 272, 144, 0, 128, 256, 256, 256, 0,
        0, 130, 0,
    ],
    [
        272, 144, 0, 272, 144, 0, 144, 0, 128, 144, 144, 0, 128, 272, 144, 0, 128, 256, 256, 256,
        144, 0, 0, 0,
    ],
];

pub static LAST_SIG_Y_INIT: [[u16; 24]; 2] = [
    [
        144, 0, 128, 144, 0, 130, 144, 0, 130, 144, 0, 0, 130, 272, 144, 0, 128, 256, 256, 256, 0,
        0, 130, 0,
    ],
    [
        272, 144, 0, 272, 144, 0, 144, 0, 128, 144, 144, 0, 128, 272, 144, 0, 128, 256, 256, 256,
        144, 0, 0, 0,
    ],
];

pub static SIG_COEFF_INIT: [[u16; 20]; 2] = [
    [
        130, 0, 144, 400, 256, 128, 0, 144, 384, 256, 130, 0, 130, 144, 272, 400, 256, 0, 144, 272,
    ],
    [
        256, 130, 0, 144, 384, 256, 128, 0, 384, 384, 256, 130, 256, 0, 144, 272, 384, 128, 0, 144,
    ],
];

pub static GT_A_INIT: [[u16; 15]; 2] = [
    [
        130, 0, 144, 272, 400, 256, 130, 0, 144, 272, 256, 0, 144, 272, 400,
    ],
    [
        256, 130, 0, 144, 272, 384, 256, 130, 0, 144, 256, 130, 0, 144, 272,
    ],
];

pub static GT_B_INIT: [[u16; 15]; 2] = [
    [
        256, 130, 0, 144, 272, 384, 256, 130, 0, 144, 384, 256, 0, 144, 144,
    ],
    [
        384, 256, 130, 0, 144, 384, 384, 256, 130, 0, 384, 256, 130, 0, 144,
    ],
];

fn kind_row(kind: CtxKind, class: usize) -> &'static [u16] {
    match kind {
        CtxKind::SkipFlag => &SKIP_FLAG_INIT[class],
        CtxKind::IntraDir => &INTRA_DIR_INIT[class],
        CtxKind::MvpIdx => &MVP_IDX_INIT[class],
        CtxKind::Mvd => &MVD_INIT[class],
        CtxKind::DeltaQp => &DELTA_QP_INIT[class],
        CtxKind::CbfAll => &CBF_ALL_INIT[class],
        CtxKind::CbfLuma => &CBF_LUMA_INIT[class],
        CtxKind::CbfCb => &CBF_CB_INIT[class],
        CtxKind::CbfCr => &CBF_CR_INIT[class],
        CtxKind::Run => &RUN_INIT[class],
        CtxKind::Level => &LEVEL_INIT[class],
        CtxKind::Last => &LAST_INIT[class],
        CtxKind::LastSigX => &LAST_SIG_X_INIT[class],
        CtxKind::LastSigY => &LAST_SIG_Y_INIT[class],
        CtxKind::SigCoeff => &SIG_COEFF_INIT[class],
        CtxKind::GtA => &GT_A_INIT[class],
        CtxKind::GtB => &GT_B_INIT[class],
    }
}

/// Init values for every context, flat and parallel to `ContextSet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInitTable {
    classes: [Vec<u16>; 2],
}

impl ContextInitTable {
    pub fn new(intra: Vec<u16>, inter: Vec<u16>) -> RescodeResult<Self> {
        for (name, row) in [("intra", &intra), ("inter", &inter)] {
            if row.len() != NUM_CONTEXTS {
                return Err(RescodeError::InvalidParameter(format!(
                    "{} init table has {} entries, expected {}",
                    name,
                    row.len(),
                    NUM_CONTEXTS
                )));
            }
        }
        Ok(Self {
            classes: [intra, inter],
        })
    }

    pub fn value(&self, class: usize, flat_index: usize) -> u16 {
        self.classes[class][flat_index]
    }
}

impl Default for ContextInitTable {
    fn default() -> Self {
        let build = |class: usize| {
            CtxKind::ALL
                .iter()
                .flat_map(|&kind| kind_row(kind, class).iter().copied())
                .collect::<Vec<u16>>()
        };
        Self {
            classes: [build(0), build(1)],
        }
    }
}
