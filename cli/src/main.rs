use clap::{Parser, ValueEnum};
use heq_core::{DynGrayImage, NormalizeMode};
use heq_runtime::{BackendPreference, EqualizeConfig, EqualizeReport, Equalizer};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "histeq")]
#[command(version, about = "Histogram equalization for 8- and 16-bit grayscale images", long_about = None)]
struct Cli {
    /// Grayscale input image
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file (defaults to <stem>_equalized.png next to the input)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Compute backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Cumulative table normalization
    #[arg(long, value_enum, default_value = "min-shifted")]
    mode: Mode,

    /// Print LUT endpoints and per-stage timings
    #[arg(long)]
    stats: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Auto,
    Cpu,
    Gpu,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    MinShifted,
    Proportional,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), String> {
    let mut config = EqualizeConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(backend) = cli.backend {
        config.backend = match backend {
            Backend::Auto => BackendPreference::Auto,
            Backend::Cpu => BackendPreference::Cpu,
            Backend::Gpu => BackendPreference::Gpu,
        };
    }
    config.normalize = match cli.mode {
        Mode::MinShifted => NormalizeMode::MinShifted,
        Mode::Proportional => NormalizeMode::Proportional,
    };
    config.capture_tables = cli.stats;

    let decoded = image::open(&cli.input)
        .map_err(|e| format!("Failed to decode {}: {}", cli.input.display(), e))?;
    let gray = DynGrayImage::try_from(&decoded).map_err(|e| e.to_string())?;

    let equalizer = Equalizer::new(config).map_err(|e| e.to_string())?;
    let report = equalizer.run(&gray).map_err(|e| e.to_string())?;

    let output_path = determine_output_path(&cli.input, cli.output.as_deref())?;
    image::DynamicImage::from(report.image.clone())
        .save(&output_path)
        .map_err(|e| format!("Failed to write {}: {}", output_path.display(), e))?;
    tracing::debug!(path = %output_path.display(), backend = %report.backend, "wrote equalized image");

    if cli.stats {
        print_stats(&report, &output_path);
    }
    Ok(())
}

fn determine_output_path(input: &Path, output: Option<&Path>) -> Result<PathBuf, String> {
    if let Some(path) = output {
        return Ok(path.to_path_buf());
    }
    let stem = input
        .file_stem()
        .ok_or("Invalid input filename")?
        .to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    Ok(parent.join(format!("{}_equalized.png", stem)))
}

fn print_stats(report: &EqualizeReport, output: &Path) {
    let image = &report.image;
    println!("Output: {}", output.display());
    println!(
        "  Image: {}x{}, {}",
        image.width(),
        image.height(),
        image.depth()
    );
    println!("  Backend: {} ({})", report.backend, report.backend_type);

    if let Some(tables) = &report.tables {
        let first = tables.histogram.occupied().next().map(|(level, _)| level);
        let last = tables.histogram.occupied().last().map(|(level, _)| level);
        if let (Some(first), Some(last)) = (first, last) {
            println!(
                "  LUT: {} -> {}, {} -> {} ({} occupied levels)",
                first,
                tables.lut.apply(first as u32),
                last,
                tables.lut.apply(last as u32),
                tables.histogram.occupied().count()
            );
        }
    }

    let t = &report.timings;
    let ms = |d: std::time::Duration| d.as_secs_f64() * 1e3;
    println!(
        "  Timings (ms): histogram {:.3}, cumulative {:.3}, normalize {:.3}, back-projection {:.3}, total {:.3}",
        ms(t.histogram),
        ms(t.cumulative),
        ms(t.normalize),
        ms(t.back_project),
        ms(t.total)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        let path = determine_output_path(Path::new("scans/frame01.tif"), None).unwrap();
        assert_eq!(path, PathBuf::from("scans/frame01_equalized.png"));
    }

    #[test]
    fn test_explicit_output_path() {
        let path = determine_output_path(Path::new("a.png"), Some(Path::new("out/b.tif"))).unwrap();
        assert_eq!(path, PathBuf::from("out/b.tif"));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["histeq", "in.png", "--backend", "cpu", "--mode", "proportional", "-vv"]).unwrap();
        assert!(matches!(cli.backend, Some(Backend::Cpu)));
        assert!(matches!(cli.mode, Mode::Proportional));
        assert_eq!(cli.verbose, 2);
    }
}
