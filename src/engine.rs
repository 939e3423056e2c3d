use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coding::block::{check_dimensions, Channel, CoefficientBlock};
use crate::coding::context::{ContextSet, SliceType};
use crate::coding::elements::{write_cbf, write_tile_end_flag};
use crate::coding::residual::{CoefficientCodec, ResidualSyntax};
use crate::coding::sbac::ArithmeticEncoder;
use crate::coding::tables::ContextInitTable;
use crate::error::{RescodeError, RescodeResult};
use crate::quant::params::{
    channel_lambda, chroma_qp, lambda_for_qp, QuantParams, MAX_BIT_DEPTH, MAX_QP, MIN_BIT_DEPTH,
};
use crate::quant::rate::RateTable;
use crate::quant::rdoq::{BlockRequest, RdoqOptimizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    pub qp: u8,
    pub slice_type: SliceType,
    pub bit_depth: u8,
    pub syntax: ResidualSyntax,
    pub cm_init: bool,
    pub use_rdoq: bool,
    pub fast_zero_skip: bool,
    pub chroma_qp_offset: i8,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self::baseline(32)
    }
}

impl SliceConfig {
    /// Run-length syntax on flat contexts.
    pub fn baseline(qp: u8) -> Self {
        Self {
            qp,
            slice_type: SliceType::I,
            bit_depth: 10,
            syntax: ResidualSyntax::RunLength,
            cm_init: false,
            use_rdoq: true,
            fast_zero_skip: true,
            chroma_qp_offset: 0,
        }
    }

    /// ADCC syntax on QP-initialized contexts.
    pub fn main(qp: u8) -> Self {
        Self {
            syntax: ResidualSyntax::Adcc,
            cm_init: true,
            ..Self::baseline(qp)
        }
    }

    pub fn validate(&self) -> RescodeResult<()> {
        if self.qp > MAX_QP {
            return Err(RescodeError::InvalidParameter(format!(
                "qp {} out of range 0..={}",
                self.qp, MAX_QP
            )));
        }
        if !(MIN_BIT_DEPTH..=MAX_BIT_DEPTH).contains(&self.bit_depth) {
            return Err(RescodeError::InvalidParameter(format!(
                "bit depth {} out of range {}..={}",
                self.bit_depth, MIN_BIT_DEPTH, MAX_BIT_DEPTH
            )));
        }
        if self.chroma_qp_offset.unsigned_abs() > MAX_QP {
            return Err(RescodeError::InvalidParameter(format!(
                "chroma qp offset {} out of range",
                self.chroma_qp_offset
            )));
        }
        Ok(())
    }

    pub fn channel_qp(&self, channel: Channel) -> u8 {
        if channel.is_luma() {
            self.qp
        } else {
            chroma_qp(self.qp, self.chroma_qp_offset)
        }
    }

    pub fn luma_lambda(&self) -> f64 {
        lambda_for_qp(self.qp)
    }

    pub fn channel_lambda(&self, channel: Channel) -> f64 {
        channel_lambda(
            self.luma_lambda(),
            self.qp,
            channel,
            self.channel_qp(channel),
        )
    }

    pub fn initial_contexts(&self, table: &ContextInitTable) -> ContextSet {
        ContextSet::for_slice(self.cm_init, table, self.slice_type, self.qp as i32)
    }
}

/// Transform output for one block, raster order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformBlock {
    pub channel: Channel,
    pub log2_w: u8,
    pub log2_h: u8,
    #[serde(default = "default_intra")]
    pub is_intra: bool,
    pub coefficients: Vec<i32>,
}

fn default_intra() -> bool {
    true
}

impl TransformBlock {
    pub fn new(
        channel: Channel,
        log2_w: u8,
        log2_h: u8,
        is_intra: bool,
        coefficients: Vec<i32>,
    ) -> RescodeResult<Self> {
        let block = Self {
            channel,
            log2_w,
            log2_h,
            is_intra,
            coefficients,
        };
        block.validate()?;
        Ok(block)
    }

    pub fn validate(&self) -> RescodeResult<()> {
        check_dimensions(self.log2_w, self.log2_h)?;
        let expected = 1usize << (self.log2_w + self.log2_h);
        if self.coefficients.len() != expected {
            return Err(RescodeError::InvalidBlock(format!(
                "{}x{} block carries {} coefficients, expected {}",
                1 << self.log2_w,
                1 << self.log2_h,
                self.coefficients.len(),
                expected
            )));
        }
        Ok(())
    }
}

/// A slice's worth of work: its configuration and the blocks of each tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceJob {
    pub config: SliceConfig,
    pub tiles: Vec<Vec<TransformBlock>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TileStats {
    pub blocks: u32,
    pub coded_blocks: u32,
    pub zero_skipped: u32,
    pub significant: u64,
    pub bins: u64,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTile {
    pub bytes: Vec<u8>,
    pub stats: TileStats,
}

/// Codes the transform blocks of one tile into its own arithmetic-coded
/// segment.
pub struct TileEncoder {
    config: SliceConfig,
    rate: Arc<RateTable>,
    codec: CoefficientCodec,
    encoder: ArithmeticEncoder,
    stats: TileStats,
}

impl TileEncoder {
    pub fn new(config: SliceConfig, rate: Arc<RateTable>, contexts: ContextSet) -> Self {
        Self {
            config,
            rate,
            codec: CoefficientCodec::new(config.syntax),
            encoder: ArithmeticEncoder::new(contexts),
            stats: TileStats::default(),
        }
    }

    pub fn stats(&self) -> &TileStats {
        &self.stats
    }

    fn block_slice_type(&self, block: &TransformBlock) -> SliceType {
        if block.is_intra {
            SliceType::I
        } else {
            self.config.slice_type
        }
    }

    /// Levels the block will be coded with.
    pub fn quantize(&mut self, block: &TransformBlock) -> RescodeResult<CoefficientBlock> {
        block.validate()?;
        if !block.is_intra && self.config.slice_type.is_intra() {
            return Err(RescodeError::InvalidBlock(
                "inter block in an intra slice".to_string(),
            ));
        }

        let quant = QuantParams::new(self.config.channel_qp(block.channel), self.config.bit_depth)?;
        let bq = quant.block(block.log2_w, block.log2_h);
        let slice_type = self.block_slice_type(block);

        if self.config.fast_zero_skip && bq.is_trivially_zero(&block.coefficients, slice_type) {
            self.stats.zero_skipped += 1;
            return CoefficientBlock::zeros(block.log2_w, block.log2_h);
        }

        if !self.config.use_rdoq {
            let levels = block
                .coefficients
                .iter()
                .map(|&c| bq.quantize(c, slice_type))
                .collect();
            return CoefficientBlock::new(block.log2_w, block.log2_h, levels);
        }

        let req = BlockRequest {
            log2_w: block.log2_w,
            log2_h: block.log2_h,
            quant,
            is_intra: block.is_intra,
            channel: block.channel,
            lambda: self.config.channel_lambda(block.channel),
        };
        let optimizer = RdoqOptimizer::new(&self.rate, self.config.cm_init);
        let refined = match self.config.syntax {
            ResidualSyntax::RunLength => optimizer.optimize_run_length(&block.coefficients, &req),
            ResidualSyntax::Adcc => optimizer.optimize(&block.coefficients, &req),
        };
        Ok(refined.into_block(block.log2_w, block.log2_h))
    }

    /// Writes the block's cbf and, when coded, its residual.
    pub fn encode_block(&mut self, block: &TransformBlock) -> RescodeResult<CoefficientBlock> {
        let levels = self.quantize(block)?;
        let coded = !levels.is_empty();
        write_cbf(&mut self.encoder, block.channel, block.is_intra, coded);
        if coded {
            self.codec.encode(&mut self.encoder, &levels, block.channel);
            self.stats.coded_blocks += 1;
            self.stats.significant += levels.num_significant() as u64;
        }
        self.stats.blocks += 1;
        Ok(levels)
    }

    pub fn finish(mut self) -> EncodedTile {
        write_tile_end_flag(&mut self.encoder, true);
        self.encoder.finish();
        self.stats.bins = self.encoder.bin_count();
        let bytes = self.encoder.into_bytes();
        self.stats.bytes = bytes.len();
        EncodedTile {
            bytes,
            stats: self.stats,
        }
    }
}

/// Encodes independent tiles of one slice in parallel.
pub struct ResidualEngine {
    config: SliceConfig,
    contexts: ContextSet,
    rate: Arc<RateTable>,
}

impl ResidualEngine {
    pub fn new(config: SliceConfig) -> RescodeResult<Self> {
        Self::with_init_table(config, &ContextInitTable::default())
    }

    pub fn with_init_table(config: SliceConfig, table: &ContextInitTable) -> RescodeResult<Self> {
        config.validate()?;
        let contexts = config.initial_contexts(table);
        let rate = Arc::new(RateTable::from_contexts(&contexts));
        Ok(Self {
            config,
            contexts,
            rate,
        })
    }

    pub fn config(&self) -> &SliceConfig {
        &self.config
    }

    /// Contexts every tile starts from.
    pub fn initial_contexts(&self) -> &ContextSet {
        &self.contexts
    }

    pub fn rate_table(&self) -> &Arc<RateTable> {
        &self.rate
    }

    pub fn tile_encoder(&self) -> TileEncoder {
        TileEncoder::new(self.config, Arc::clone(&self.rate), self.contexts.clone())
    }

    pub fn encode_tile(&self, index: usize, blocks: &[TransformBlock]) -> RescodeResult<EncodedTile> {
        let mut tile = self.tile_encoder();
        for block in blocks {
            tile.encode_block(block)?;
        }
        let encoded = tile.finish();
        debug!(
            tile = index,
            blocks = encoded.stats.blocks,
            coded = encoded.stats.coded_blocks,
            bins = encoded.stats.bins,
            bytes = encoded.stats.bytes,
            "tile encoded"
        );
        Ok(encoded)
    }

    pub fn encode_tiles(&self, tiles: &[Vec<TransformBlock>]) -> RescodeResult<Vec<EncodedTile>> {
        debug!(tiles = tiles.len(), qp = self.config.qp, "encoding slice");
        tiles
            .par_iter()
            .enumerate()
            .map(|(index, blocks)| self.encode_tile(index, blocks))
            .collect()
    }
}
