pub mod params;
pub mod rate;
pub mod rdoq;
pub mod scan;

pub use params::{
    channel_lambda, chroma_qp, fixed_lambda, lambda_for_qp, BlockQuant, QuantParams, MAX_QP,
};
pub use rate::{RateEstimator, RateTable, IEP_RATE};
pub use rdoq::{BlockRequest, RdoqOptimizer, RefinedBlock};
pub use scan::ScanMetadata;
