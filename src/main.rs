use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use rescode::synth::synthetic_tiles;
use rescode::{
    read_stream, write_stream, ResidualEngine, RescodeResult, SliceConfig, SliceJob, TileStream,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rescode")]
#[command(about = "Residual coding back end: RDOQ + SBAC tile encoder", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON slice job into a tile stream
    Encode {
        input: PathBuf,
        output: PathBuf,
    },

    /// Show the configuration and tile sizes of a tile stream
    Info { input: PathBuf },

    /// Write a deterministic synthetic slice job
    Synth {
        output: PathBuf,

        #[arg(long, default_value_t = 4)]
        tiles: usize,

        #[arg(long, default_value_t = 32)]
        blocks: usize,

        #[arg(long, default_value_t = 32)]
        qp: u8,

        #[arg(long, default_value_t = 1)]
        seed: u32,

        /// Use the baseline preset instead of main
        #[arg(long)]
        baseline: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Encode { input, output } => encode(&input, &output),
        Commands::Info { input } => show_info(&input),
        Commands::Synth {
            output,
            tiles,
            blocks,
            qp,
            seed,
            baseline,
        } => synth(&output, tiles, blocks, qp, seed, baseline),
    };

    if let Err(err) = result {
        eprintln!("{} {}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn encode(input: &Path, output: &Path) -> RescodeResult<()> {
    println!(
        "{} {} → {}",
        "Encoding".cyan().bold(),
        input.display().to_string().yellow(),
        output.display().to_string().green()
    );

    let job: SliceJob = serde_json::from_reader(BufReader::new(File::open(input)?))?;
    let engine = ResidualEngine::new(job.config)?;
    info!(tiles = job.tiles.len(), "slice job loaded");
    let encoded = engine.encode_tiles(&job.tiles)?;

    let blocks: u32 = encoded.iter().map(|t| t.stats.blocks).sum();
    let coded: u32 = encoded.iter().map(|t| t.stats.coded_blocks).sum();
    let skipped: u32 = encoded.iter().map(|t| t.stats.zero_skipped).sum();
    let bins: u64 = encoded.iter().map(|t| t.stats.bins).sum();

    let stream = TileStream::from_encoded(job.config, encoded);
    write_stream(BufWriter::new(File::create(output)?), &stream)?;
    let payload = stream.payload_bytes();

    println!("{}", "✓ Encoded successfully!".green().bold());
    println!(
        "  {} {} ({} coded, {} skipped)",
        "Blocks:".dimmed(),
        blocks.to_string().white(),
        coded,
        skipped
    );
    println!("  {} {}", "Bins:  ".dimmed(), bins.to_string().white());
    println!(
        "  {} {} bytes",
        "Output:".dimmed(),
        payload.to_string().white()
    );
    if bins > 0 {
        println!(
            "  {} {}",
            "Bits/bin:".dimmed(),
            format!("{:.3}", payload as f64 * 8.0 / bins as f64).cyan()
        );
    }
    Ok(())
}

fn show_info(input: &Path) -> RescodeResult<()> {
    let stream = read_stream(BufReader::new(File::open(input)?))?;
    let config = &stream.config;

    println!("{}", "Tile stream".cyan().bold());
    println!("  {} {}", "QP:        ".dimmed(), config.qp);
    println!("  {} {:?}", "Slice type:".dimmed(), config.slice_type);
    println!("  {} {}", "Bit depth: ".dimmed(), config.bit_depth);
    println!("  {} {:?}", "Syntax:    ".dimmed(), config.syntax);
    println!("  {} {}", "cm_init:   ".dimmed(), config.cm_init);
    println!("  {} {}", "RDOQ:      ".dimmed(), config.use_rdoq);
    println!("  {} {}", "Chroma ofs:".dimmed(), config.chroma_qp_offset);
    println!(
        "  {} {} ({} bytes)",
        "Tiles:     ".dimmed(),
        stream.tiles.len(),
        stream.payload_bytes()
    );
    for (i, tile) in stream.tiles.iter().enumerate() {
        println!("    {} {} bytes", format!("#{}", i).yellow(), tile.len());
    }
    Ok(())
}

fn synth(
    output: &Path,
    tiles: usize,
    blocks: usize,
    qp: u8,
    seed: u32,
    baseline: bool,
) -> RescodeResult<()> {
    let config = if baseline {
        SliceConfig::baseline(qp)
    } else {
        SliceConfig::main(qp)
    };
    config.validate()?;
    let job = SliceJob {
        config,
        tiles: synthetic_tiles(tiles, blocks, seed),
    };
    serde_json::to_writer_pretty(BufWriter::new(File::create(output)?), &job)?;
    println!(
        "{} {} tiles × {} blocks → {}",
        "Synthesized".cyan().bold(),
        tiles,
        blocks,
        output.display().to_string().green()
    );
    Ok(())
}
