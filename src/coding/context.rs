//! Adaptive binary probability models and the per-slice table of them.

use serde::{Deserialize, Serialize};

use super::tables::ContextInitTable;

/// Probability state of one binary syntax element, packed as
/// `(state << 1) | mps`. `state` is the LPS probability in 1/512 units and
/// never exceeds 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextModel(u16);

impl ContextModel {
    pub const MAX_STATE: u16 = 256;

    /// Flat 1/2 probability used when QP-keyed initialization is off.
    pub const EQUIPROBABLE: ContextModel = ContextModel(512);

    pub const fn with(state: u16, mps: u32) -> Self {
        debug_assert!(state <= Self::MAX_STATE);
        Self((state << 1) | (mps & 1) as u16)
    }

    /// Derives the initial model from a packed slope/offset init value.
    pub fn from_init_value(init_value: u16, qp: i32) -> Self {
        let v = init_value as i32;
        let mut slope = (v & 14) << 4;
        if v & 1 != 0 {
            slope = -slope;
        }
        let mut offset = ((v >> 4) & 62) << 7;
        if (v >> 4) & 1 != 0 {
            offset = -offset;
        }
        offset += 4096;

        let state = ((slope * qp.clamp(0, 51) + offset) >> 4).clamp(1, 511);
        if state > Self::MAX_STATE as i32 {
            Self::with((512 - state) as u16, 0)
        } else {
            Self::with(state as u16, 1)
        }
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn state(self) -> u16 {
        self.0 >> 1
    }

    pub const fn mps(self) -> u32 {
        (self.0 & 1) as u32
    }

    pub fn adapt(&mut self, bin: u32) {
        let mut state = self.state();
        let mut mps = self.mps();

        if bin == mps {
            state -= (state + 16) >> 5;
        } else {
            state += (512 - state + 16) >> 5;
            if state > Self::MAX_STATE {
                mps ^= 1;
                state = 512 - state;
            }
        }
        *self = Self::with(state, mps);
    }
}

impl Default for ContextModel {
    fn default() -> Self {
        Self::EQUIPROBABLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SliceType {
    I,
    P,
    B,
}

impl SliceType {
    pub fn is_intra(self) -> bool {
        self == SliceType::I
    }

    /// Row of the init table: intra slices use 0, inter slices 1.
    pub fn init_class(self) -> usize {
        match self {
            SliceType::I => 0,
            SliceType::P | SliceType::B => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum CtxKind {
    SkipFlag,
    IntraDir,
    MvpIdx,
    Mvd,
    DeltaQp,
    CbfAll,
    CbfLuma,
    CbfCb,
    CbfCr,
    Run,
    Level,
    Last,
    LastSigX,
    LastSigY,
    SigCoeff,
    GtA,
    GtB,
}

impl CtxKind {
    pub const COUNT: usize = 17;

    pub const ALL: [CtxKind; Self::COUNT] = [
        CtxKind::SkipFlag,
        CtxKind::IntraDir,
        CtxKind::MvpIdx,
        CtxKind::Mvd,
        CtxKind::DeltaQp,
        CtxKind::CbfAll,
        CtxKind::CbfLuma,
        CtxKind::CbfCb,
        CtxKind::CbfCr,
        CtxKind::Run,
        CtxKind::Level,
        CtxKind::Last,
        CtxKind::LastSigX,
        CtxKind::LastSigY,
        CtxKind::SigCoeff,
        CtxKind::GtA,
        CtxKind::GtB,
    ];

    pub const fn len(self) -> usize {
        match self {
            CtxKind::SkipFlag => 2,
            CtxKind::IntraDir => 2,
            CtxKind::MvpIdx => 3,
            CtxKind::Mvd => 1,
            CtxKind::DeltaQp => 1,
            CtxKind::CbfAll => 1,
            CtxKind::CbfLuma => 1,
            CtxKind::CbfCb => 1,
            CtxKind::CbfCr => 1,
            CtxKind::Run => 24,
            CtxKind::Level => 24,
            CtxKind::Last => 2,
            CtxKind::LastSigX => 24,
            CtxKind::LastSigY => 24,
            CtxKind::SigCoeff => 20,
            CtxKind::GtA => 15,
            CtxKind::GtB => 15,
        }
    }

    pub const fn offset(self) -> usize {
        CTX_OFFSETS[self as usize]
    }

    pub fn at(self, index: usize) -> CtxRef {
        debug_assert!(index < self.len(), "{:?} context {} out of range", self, index);
        CtxRef { kind: self, index }
    }
}

const fn build_offsets() -> [usize; CtxKind::COUNT + 1] {
    let mut out = [0usize; CtxKind::COUNT + 1];
    let mut i = 0;
    while i < CtxKind::COUNT {
        out[i + 1] = out[i] + CtxKind::ALL[i].len();
        i += 1;
    }
    out
}

const CTX_OFFSETS: [usize; CtxKind::COUNT + 1] = build_offsets();

pub const NUM_CONTEXTS: usize = CTX_OFFSETS[CtxKind::COUNT];

/// A single context slot: kind plus index within that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CtxRef {
    pub kind: CtxKind,
    pub index: usize,
}

impl CtxRef {
    pub fn flat_index(self) -> usize {
        self.kind.offset() + self.index
    }
}

/// Every context model of a slice, laid out flat in `CtxKind` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSet {
    models: Vec<ContextModel>,
    cm_init: bool,
}

impl ContextSet {
    pub fn flat() -> Self {
        Self {
            models: vec![ContextModel::EQUIPROBABLE; NUM_CONTEXTS],
            cm_init: false,
        }
    }

    pub fn initialized(table: &ContextInitTable, slice_type: SliceType, qp: i32) -> Self {
        let class = slice_type.init_class();
        let models = (0..NUM_CONTEXTS)
            .map(|i| ContextModel::from_init_value(table.value(class, i), qp))
            .collect();
        Self {
            models,
            cm_init: true,
        }
    }

    pub fn for_slice(
        cm_init: bool,
        table: &ContextInitTable,
        slice_type: SliceType,
        qp: i32,
    ) -> Self {
        if cm_init {
            Self::initialized(table, slice_type, qp)
        } else {
            Self::flat()
        }
    }

    pub fn cm_init(&self) -> bool {
        self.cm_init
    }

    pub fn get(&self, ctx: CtxRef) -> ContextModel {
        self.models[ctx.flat_index()]
    }

    pub fn get_mut(&mut self, ctx: CtxRef) -> &mut ContextModel {
        &mut self.models[ctx.flat_index()]
    }

    pub fn models(&self) -> &[ContextModel] {
        &self.models
    }

    pub fn kind(&self, kind: CtxKind) -> &[ContextModel] {
        let start = kind.offset();
        &self.models[start..start + kind.len()]
    }
}

impl Default for ContextSet {
    fn default() -> Self {
        Self::flat()
    }
}
