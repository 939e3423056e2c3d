pub mod binarize;
pub mod bitstream;
pub mod block;
pub mod context;
pub mod elements;
#[cfg(test)]
pub(crate) mod reader;
pub mod residual;
pub mod sbac;
pub mod tables;

pub use binarize::{exp_golomb_code, BinCounter, BinEncoder};
pub use bitstream::BitstreamSink;
pub use block::{Channel, CoefficientBlock};
pub use context::{ContextModel, ContextSet, CtxKind, CtxRef, SliceType, NUM_CONTEXTS};
pub use residual::{CoefficientCodec, ResidualSyntax};
pub use sbac::{ArithmeticEncoder, CoderState};
pub use tables::ContextInitTable;
