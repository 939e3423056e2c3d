use std::fs::File;
use std::io::BufReader;

use rescode::quant::params::QuantParams;
use rescode::synth::synthetic_tiles;
use rescode::{CoefficientCodec, ResidualEngine, RescodeResult, SliceConfig, SliceJob};

fn main() -> RescodeResult<()> {
    let args: Vec<String> = std::env::args().collect();

    let job = match args.get(1) {
        Some(path) => {
            let job: SliceJob = serde_json::from_reader(BufReader::new(File::open(path)?))?;
            println!("<--- Residual Trace --->\n");
            println!("Job: {}", path);
            job
        }
        None => {
            println!("<--- Residual Trace (synthetic) --->\n");
            SliceJob {
                config: SliceConfig::main(32),
                tiles: synthetic_tiles(1, 8, 1),
            }
        }
    };

    let config = job.config;
    println!("\n<--- Slice --->");
    println!("QP: {}", config.qp);
    println!("Slice Type: {:?}", config.slice_type);
    println!("Syntax: {:?}", config.syntax);
    println!("Context Init: {}", config.cm_init);
    println!("Lambda: {:.3}", config.luma_lambda());

    let engine = ResidualEngine::new(config)?;
    let codec = CoefficientCodec::new(config.syntax);

    for (t, blocks) in job.tiles.iter().enumerate() {
        println!("\n<--- Tile {} --->", t);
        let mut tile = engine.tile_encoder();
        for (b, block) in blocks.iter().enumerate() {
            let quant = QuantParams::new(config.channel_qp(block.channel), config.bit_depth)?;
            let bq = quant.block(block.log2_w, block.log2_h);
            let forward = block
                .coefficients
                .iter()
                .filter(|&&c| bq.max_level(bq.level_double(c)) > 0)
                .count();

            let levels = tile.encode_block(block)?;
            let bins = if levels.is_empty() {
                0
            } else {
                codec.measure(&levels, block.channel, config.cm_init).total()
            };
            println!(
                "#{:<3} {:?} {}x{}  nnz {:>4} -> {:<4} last {:>5}  bins {}",
                b,
                block.channel,
                1 << block.log2_w,
                1 << block.log2_h,
                forward,
                levels.num_significant(),
                levels
                    .last_scan_pos()
                    .map_or("-".to_string(), |p| p.to_string()),
                bins
            );
        }
        let encoded = tile.finish();
        let stats = encoded.stats;
        println!(
            "Blocks: {} (coded {}, zero-skipped {})",
            stats.blocks, stats.coded_blocks, stats.zero_skipped
        );
        println!("Bins: {}", stats.bins);
        println!("Bytes: {}", stats.bytes);
        if stats.bins > 0 {
            println!("Bits/bin: {:.3}", stats.bytes as f64 * 8.0 / stats.bins as f64);
        }
    }

    println!("\n✓ Trace complete");
    Ok(())
}
