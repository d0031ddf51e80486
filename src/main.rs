use clap::{Parser, Subcommand};
use fitsize::config::{self, FitConfig};
use fitsize::imaging::{Quality, SizeBudget};
use fitsize::process::{self, ProcessSettings, RunStats};
use fitsize::{logging, output, scan};
use std::path::{Path, PathBuf};

fn version_string() -> &'static str {
    let on_tag = env!("FITSIZE_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("FITSIZE_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "fitsize")]
#[command(about = "Shrink oversized photos in place until they fit a byte budget")]
#[command(long_about = "\
Shrink oversized photos in place until they fit a byte budget

Every JPEG, PNG, or BMP larger than the budget (2.75 MiB by default) is
re-encoded at smaller dimensions until it fits. The original is moved to
Backup/ next to the file first; files already within budget are untouched.

  photos/
  ├── Backup/
  │   └── IMG_0042.jpg     # original
  └── IMG_0042.jpg         # re-encoded, within budget

Strategy:
  JPEG, or no transparency   JPEG at the source quality (default 90),
                             shrinking by 10% per edge until it fits
  Transparent PNG/BMP        PNG at the source depth, starting from an
                             estimate of the pixels that fit

Run 'fitsize gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Images to process (default: every supported image in --dir)
    files: Vec<PathBuf>,

    /// Directory scanned when no files are given
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Size budget in bytes (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_bytes: Option<u64>,

    /// JPEG quality used when the source has none (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    quality: Option<u32>,

    /// Run the shrink loop but do not touch any file
    #[arg(long)]
    dry_run: bool,

    /// Print results as JSON instead of text lines
    #[arg(long)]
    json: bool,

    /// Config file (default: config.toml in --dir, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log every encode attempt
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::GenConfig) = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    logging::init(cli.verbose);

    let config = load_config(cli.config.as_deref(), &cli.dir)?;
    let settings = settings_from_cli(&cli, &config);
    let inputs = scan::select_inputs(&cli.files, &cli.dir, &config.extensions)?;
    init_thread_pool(&config.processing);

    let results = if cli.json {
        process::process(&inputs, &settings, None)
    } else {
        let (tx, rx) = std::sync::mpsc::channel();
        let printer = std::thread::spawn(move || {
            for event in rx {
                output::print_process_event(&event);
            }
        });
        let results = process::process(&inputs, &settings, Some(tx));
        printer
            .join()
            .map_err(|_| "progress printer thread panicked")?;
        results
    };

    let stats = RunStats::from_results(&results);
    if cli.json {
        println!("{}", output::json_report(&results)?);
    } else {
        output::print_summary(&stats);
    }

    if stats.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(explicit: Option<&Path>, dir: &Path) -> Result<FitConfig, config::ConfigError> {
    match explicit {
        Some(path) => config::load_config_file(path),
        None => config::load_config(dir),
    }
}

/// Command-line flags override config file values.
fn settings_from_cli(cli: &Cli, config: &FitConfig) -> ProcessSettings {
    let mut settings = ProcessSettings::from_config(config);
    if let Some(bytes) = cli.max_bytes {
        settings.budget = SizeBudget::new(bytes);
    }
    if let Some(quality) = cli.quality {
        settings.default_quality = Quality::new(quality);
    }
    settings.dry_run = cli.dry_run;
    settings
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
