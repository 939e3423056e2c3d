pub mod coding;
pub mod container;
pub mod engine;
pub mod error;
pub mod quant;
pub mod synth;

pub use coding::{
    ArithmeticEncoder, BinCounter, BinEncoder, Channel, CoefficientBlock, CoefficientCodec,
    ContextInitTable, ContextModel, ContextSet, CtxKind, CtxRef, ResidualSyntax, SliceType,
};
pub use container::{read_stream, write_stream, TileStream, STREAM_MAGIC};
pub use engine::{
    EncodedTile, ResidualEngine, SliceConfig, SliceJob, TileEncoder, TileStats, TransformBlock,
};
pub use error::{RescodeError, RescodeResult};
pub use quant::{BlockRequest, QuantParams, RateEstimator, RateTable, RdoqOptimizer, RefinedBlock};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
