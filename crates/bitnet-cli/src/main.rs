//! `bitnet` — command-line interface for the BitNet FPGA accelerator.
//!
//! ```text
//! USAGE:
//!   bitnet infer <images...>       Classify PGM/raw images
//!   bitnet scan <dir>              Classify every image in a directory
//!   bitnet bench [-n N]            Hardware-vs-CPU benchmark
//!   bitnet validate [filter]       Run the hardware validation suite
//! ```
//!
//! All commands accept `--software` to run against the bit-exact oracle
//! instead of the memory-mapped hardware, and `--build` to select the
//! hardware revision.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use bitnet_chip::HwBuild;
use bitnet_driver::{open_bus, run_suite, AcceleratorBus, BusSelection, DeviceConfig};
use bitnet_models::{load_prepacked, preprocess, LayerSpec, LoadedMlp, MlpWeights, MNIST_LAYERS};

/// Accelerator clock, for converting cycle counts to time.
const CLOCK_HZ: f64 = 50_000_000.0;

#[derive(Parser)]
#[command(name = "bitnet", about = "BitNet FPGA accelerator CLI", version)]
struct Cli {
    /// Force the software oracle (no hardware or root required).
    #[arg(long, global = true)]
    software: bool,

    /// Hardware revision to drive.
    #[arg(long, global = true, value_enum, default_value_t = Build::De10B)]
    build: Build,

    /// DDR3 weight region physical base (hex accepted).
    #[arg(long, global = true, value_parser = parse_maybe_hex)]
    ddr_base: Option<u64>,

    /// DDR3 weight region span in bytes (hex accepted).
    #[arg(long, global = true, value_parser = parse_maybe_hex)]
    ddr_span: Option<u64>,

    /// Pre-packed MNIST weight blob (required by infer and scan).
    #[arg(long, global = true)]
    weights: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum Build {
    /// First DE10-Nano build (results at 0x800).
    De10A,
    /// Second DE10-Nano build (results at 0x2000).
    De10B,
    /// BitMamba build (128 lanes, raw accumulators).
    Bitmamba,
}

impl Build {
    fn hw(self) -> HwBuild {
        match self {
            Self::De10A => HwBuild::de10_rev_a(),
            Self::De10B => HwBuild::de10_rev_b(),
            Self::Bitmamba => HwBuild::bitmamba(),
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Classify one or more image files (PGM P5 or raw 784-byte).
    Infer {
        /// Image files.
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Classify every regular file in a directory; malformed images are
    /// reported and skipped.
    Scan {
        /// Directory of images.
        dir: PathBuf,
    },
    /// Run a synthetic model on both the accelerator and the CPU
    /// reference and report prediction parity and per-layer cycles.
    Bench {
        /// Number of synthetic images.
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// Run the hardware validation suite against the reference model.
    Validate {
        /// Only run cases whose name starts with this prefix.
        #[arg(default_value = "")]
        filter: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = DeviceConfig::new(cli.build.hw());
    if let Some(base) = cli.ddr_base {
        config.ddr_base = base;
    }
    if let Some(span) = cli.ddr_span {
        #[allow(clippy::cast_possible_truncation)]
        {
            config.ddr_span = span as usize;
        }
    }
    let selection = if cli.software {
        BusSelection::Software
    } else {
        BusSelection::Auto
    };
    let mut bus = open_bus(selection, &config)?;

    match cli.command {
        Cmd::Infer { images } => cmd_infer(bus.as_mut(), cli.weights.as_deref(), &images),
        Cmd::Scan { dir } => cmd_scan(bus.as_mut(), cli.weights.as_deref(), &dir),
        Cmd::Bench { count } => cmd_bench(bus.as_mut(), count),
        Cmd::Validate { filter } => cmd_validate(bus.as_mut(), &filter),
    }
}

fn parse_maybe_hex(s: &str) -> std::result::Result<u64, String> {
    let parsed = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .map_or_else(|| s.parse(), |hex| u64::from_str_radix(hex, 16));
    parsed.map_err(|e| format!("{s}: {e}"))
}

fn load_model(bus: &mut dyn AcceleratorBus, weights: Option<&Path>) -> Result<LoadedMlp> {
    let path = weights.context("--weights <blob> is required for this command")?;
    let loaded = load_prepacked(path, MNIST_LAYERS, bus)
        .with_context(|| format!("loading weights from {}", path.display()))?;
    Ok(loaded)
}

fn classify(bus: &mut dyn AcceleratorBus, model: &LoadedMlp, path: &Path) -> Result<()> {
    let image = preprocess(path)?;
    let result = model.infer(bus, &image.pixels)?;
    let total: u32 = result.layer_cycles.iter().sum();

    print!("{}: digit {}", path.display(), result.digit);
    if image.resized {
        print!("  (resized from {}x{})", image.source_width, image.source_height);
    }
    println!("  [{total} cycles: {}/{}/{}]", result.layer_cycles[0], result.layer_cycles[1], result.layer_cycles[2]);
    Ok(())
}

/// Classify a batch of files. Unreadable or malformed images are reported
/// and skipped; hardware faults abort. Returns (classified, skipped).
fn classify_batch(
    bus: &mut dyn AcceleratorBus,
    model: &LoadedMlp,
    paths: &[PathBuf],
) -> Result<(usize, usize)> {
    let mut classified = 0usize;
    let mut skipped = 0usize;
    for path in paths {
        match classify(bus, model, path) {
            Ok(()) => classified += 1,
            Err(e) if is_skippable(&e) => {
                eprintln!("{}: skipped ({e})", path.display());
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok((classified, skipped))
}

fn is_skippable(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<bitnet_models::ModelError>(),
        Some(bitnet_models::ModelError::MalformedInput { .. } | bitnet_models::ModelError::Io { .. })
    )
}

fn cmd_infer(bus: &mut dyn AcceleratorBus, weights: Option<&Path>, images: &[PathBuf]) -> Result<()> {
    let model = load_model(bus, weights)?;
    let (classified, skipped) = classify_batch(bus, &model, images)?;
    if skipped > 0 {
        println!("{classified} classified, {skipped} skipped");
    }
    if classified == 0 {
        bail!("no images classified");
    }
    Ok(())
}

fn cmd_scan(bus: &mut dyn AcceleratorBus, weights: Option<&Path>, dir: &Path) -> Result<()> {
    let model = load_model(bus, weights)?;

    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let (classified, skipped) = classify_batch(bus, &model, &entries)?;
    println!("{classified} classified, {skipped} skipped");
    if classified == 0 {
        bail!("no images classified in {}", dir.display());
    }
    Ok(())
}

/// Deterministic synthetic MNIST-shaped model and inputs for benchmarking.
fn synthetic_model() -> Result<MlpWeights> {
    let data = MNIST_LAYERS.map(|LayerSpec { m, k, .. }| {
        (0..m * k)
            .map(|i| [1i8, 0, -1, 0, 1, -1, 0][(i * 31 + i / 7) % 7])
            .collect::<Vec<i8>>()
    });
    Ok(MlpWeights::new(MNIST_LAYERS, data)?)
}

#[allow(clippy::cast_possible_truncation)]
fn synthetic_image(seed: usize) -> Vec<i8> {
    (0..784).map(|i| ((i * 17 + seed * 101) % 128) as i8).collect()
}

fn cmd_bench(bus: &mut dyn AcceleratorBus, count: usize) -> Result<()> {
    let mlp = synthetic_model()?;
    let model = mlp.load_to_device(bus)?;

    let [l1, l2, l3] = MNIST_LAYERS;
    println!(
        "Model: L1({}->{}, shift={}), L2({}->{}, shift={}), L3({}->{}, shift={})",
        l1.k, l1.m, l1.shift, l2.k, l2.m, l2.shift, l3.k, l3.m, l3.shift
    );

    let mut matches = 0usize;
    let mut total_cycles: u64 = 0;
    let mut layer_totals = [0u64; 3];
    let mut cpu_time = std::time::Duration::ZERO;

    for seed in 0..count {
        let image = synthetic_image(seed);

        let hw = model.infer(bus, &image)?;

        let cpu_start = Instant::now();
        let cpu_digit = mlp.cpu_infer(&image);
        cpu_time += cpu_start.elapsed();

        if hw.digit == cpu_digit {
            matches += 1;
        } else {
            eprintln!("image {seed}: accelerator {} vs cpu {cpu_digit}", hw.digit);
        }
        for (t, c) in layer_totals.iter_mut().zip(hw.layer_cycles) {
            *t += u64::from(c);
        }
        total_cycles += hw.layer_cycles.iter().map(|&c| u64::from(c)).sum::<u64>();
    }

    #[allow(clippy::cast_precision_loss)]
    let hw_time_s = total_cycles as f64 / CLOCK_HZ;
    let cpu_time_s = cpu_time.as_secs_f64();

    println!("Images:        {count}");
    println!("Parity:        {matches}/{count} predictions match CPU");
    println!(
        "Cycles/image:  {} (L1 {}, L2 {}, L3 {})",
        total_cycles / count.max(1) as u64,
        layer_totals[0] / count.max(1) as u64,
        layer_totals[1] / count.max(1) as u64,
        layer_totals[2] / count.max(1) as u64,
    );
    println!("Accelerator:   {:.3} ms total (at 50 MHz)", hw_time_s * 1e3);
    println!("CPU reference: {:.3} ms total", cpu_time_s * 1e3);
    if hw_time_s > 0.0 {
        println!("Speedup:       {:.1}x", cpu_time_s / hw_time_s);
    }

    if matches != count {
        bail!("{} of {count} predictions diverged from the CPU reference", count - matches);
    }
    Ok(())
}

fn cmd_validate(bus: &mut dyn AcceleratorBus, filter: &str) -> Result<()> {
    let report = run_suite(bus, filter)?;

    for failure in &report.failures {
        eprintln!("FAIL [{}] {}", failure.case, failure.detail);
    }
    println!("{} passed, {} failed", report.passed, report.failed);

    if !report.all_passed() {
        bail!("validation failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitnet_driver::SoftwareDevice;

    #[test]
    fn batch_skips_bad_files_and_counts_both() {
        let mut dev = SoftwareDevice::new(Build::De10B.hw(), 1 << 20);
        let mlp = synthetic_model().unwrap();
        let model = mlp.load_to_device(&mut dev).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("digit.raw");
        std::fs::write(&good, vec![200u8; 784]).unwrap();
        let bad = dir.path().join("notes.txt");
        std::fs::write(&bad, b"not an image").unwrap();
        let missing = dir.path().join("gone.pgm");

        let (classified, skipped) =
            classify_batch(&mut dev, &model, &[good, bad, missing]).unwrap();
        assert_eq!(classified, 1);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn hex_and_decimal_flag_values_parse() {
        assert_eq!(parse_maybe_hex("0x30000000"), Ok(0x3000_0000));
        assert_eq!(parse_maybe_hex("1048576"), Ok(1_048_576));
        assert!(parse_maybe_hex("zz").is_err());
    }
}
