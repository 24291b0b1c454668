use batch_upscale::analysis::{self, CommandAnalyzer};
use batch_upscale::batch::Batch;
use batch_upscale::config::{self, UpscaleConfig};
use batch_upscale::export::ArchiveExporter;
use batch_upscale::imaging::RustBackend;
use batch_upscale::orchestrator::{self, CancelFlag, RunError, RunOptions, RunSummary};
use batch_upscale::report::RunReport;
use batch_upscale::settings::{Density, SettingsPatch, UpscaleFactor};
use batch_upscale::{output, scan};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const REPORT_FILE: &str = "report.json";

/// Settings flags shared by commands that build a batch.
#[derive(clap::Args, Clone)]
struct IntakeArgs {
    /// Include images in subdirectories of the input directory
    #[arg(long)]
    recursive: bool,

    /// Upscale factor for every image: 1, 2, 4 or 8
    #[arg(long, value_parser = parse_factor)]
    factor: Option<UpscaleFactor>,

    /// Target print density in DPI, e.g. 72, 150, 300
    #[arg(long, value_parser = parse_density)]
    density: Option<Density>,

    /// Smooth kernel, for photographs
    #[arg(long, conflicts_with = "sharp")]
    smooth: bool,

    /// Sharp, edge-preserving kernel, for logos and line art
    #[arg(long)]
    sharp: bool,
}

impl IntakeArgs {
    /// Batch-wide patch from the command line. Empty when no flag is given.
    fn patch(&self) -> SettingsPatch {
        let preserve_style = match (self.sharp, self.smooth) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        SettingsPatch {
            upscale_factor: self.factor,
            target_density: self.density,
            preserve_style,
            enabled: None,
        }
    }
}

fn parse_factor(s: &str) -> Result<UpscaleFactor, String> {
    let n: u32 = s.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    UpscaleFactor::try_from(n).map_err(|e| e.to_string())
}

fn parse_density(s: &str) -> Result<Density, String> {
    let n: u32 = s.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    Density::new(n).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "batch-upscale")]
#[command(about = "Batch upscaler for logos, illustrations and photos")]
#[command(long_about = "\
Batch upscaler for logos, illustrations and photos

Every PNG, JPEG and WebP file in the input directory is enlarged, stamped
with a print density, written as PNG to the output directory, and bundled
into one zip archive.

Input structure:

  input/
  ├── config.toml              # Batch config (optional)
  ├── logo.png
  ├── logo.upscale.toml        # Per-image overrides (optional)
  └── hero.webp

Output:

  upscaled/
  ├── logo_UPSCALED.png
  ├── hero_UPSCALED.png
  ├── batch-upscale_2026-10-16.zip
  └── report.json

Settings resolution (last wins):
  stock defaults → config.toml [defaults] → command-line flags → sidecar

Set RUST_LOG=debug for diagnostics.
Run 'batch-upscale gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Input directory
    #[arg(long, default_value = "input", global = true)]
    input: PathBuf,

    /// Output directory
    #[arg(long, default_value = "upscaled", global = true)]
    output: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upscale every image in the input directory and bundle the results
    Upscale {
        #[command(flatten)]
        intake: IntakeArgs,

        /// Re-run failed images up to N more times
        #[arg(long, default_value_t = 0)]
        retries: usize,

        /// Skip building the zip bundle
        #[arg(long)]
        no_bundle: bool,

        /// Stop after the first failed image; the rest stay queued
        #[arg(long, conflicts_with = "retries")]
        fail_fast: bool,
    },
    /// Read the input directory and show what would be upscaled
    Check {
        #[command(flatten)]
        intake: IntakeArgs,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Upscale {
            intake,
            retries,
            no_bundle,
            fail_fast,
        } => {
            let config = config::load_config(&cli.input)?;
            init_thread_pool(&config.processing);

            println!("==> Reading {}", cli.input.display());
            let mut batch = build_batch(&cli.input, &intake, &config)?;
            if batch.is_empty() {
                println!("==> Nothing to upscale");
                return Ok(());
            }

            println!("==> Upscaling \u{2192} {}", cli.output.display());
            std::fs::create_dir_all(&cli.output)?;
            let options = RunOptions {
                output_dir: Some(cli.output.clone()),
                max_output_pixels: config.batch.max_output_pixels(),
                file_suffix: config.export.file_suffix.clone(),
                stop_on_failure: fail_fast,
            };
            let cancel = CancelFlag::new();
            run_with_printer(&mut batch, &options, &cancel)?;
            for attempt in 1..=retries {
                let failed = batch.summary().error;
                if failed == 0 {
                    break;
                }
                println!("==> Retry {attempt} of {retries}: {failed} failed");
                run_with_printer(&mut batch, &options, &cancel)?;
            }

            let date = chrono::Local::now().date_naive();
            let bundle = if no_bundle {
                None
            } else {
                let exporter = ArchiveExporter::zip(
                    &config.export.file_suffix,
                    &config.export.bundle_prefix,
                );
                exporter.export(batch.items(), date)?
            };
            match &bundle {
                Some(bundle) => {
                    let path = cli.output.join(&bundle.name);
                    std::fs::write(&path, &bundle.bytes)?;
                    output::print_bundle(bundle, &path);
                }
                None if !no_bundle => println!("==> No completed images to bundle"),
                None => {}
            }

            let report = RunReport::from_batch(&batch, date, bundle.as_ref().map(|b| b.name.as_str()));
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(cli.output.join(REPORT_FILE), json)?;

            let summary = batch.summary();
            output::print_summary(&summary);
            if summary.error > 0 {
                return Err(format!("{} of {} images failed", summary.error, summary.total()).into());
            }
        }
        Command::Check { intake } => {
            let config = config::load_config(&cli.input)?;
            init_thread_pool(&config.processing);
            println!("==> Checking {}", cli.input.display());
            let batch = build_batch(&cli.input, &intake, &config)?;
            output::print_item_list(&batch, config.analysis.preview_chars);
            println!("==> Input is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Scan, submit, apply settings layers, then fill in dimensions and analysis.
fn build_batch(
    input: &Path,
    args: &IntakeArgs,
    config: &UpscaleConfig,
) -> Result<Batch, Box<dyn std::error::Error>> {
    let mut intake = scan::scan(input, args.recursive)?;
    let mut batch = Batch::new(config.defaults, config.batch.max_items);
    let report = batch.submit(std::mem::take(&mut intake.submissions))?;
    for line in output::format_submit_report(&report) {
        println!("{}", line);
    }

    let patch = args.patch();
    if !patch.is_empty() {
        batch.apply_batch_settings(&patch);
    }
    intake.apply_sidecars(&mut batch, &report.accepted);

    let probes = orchestrator::probe_dimensions(&RustBackend::new(), batch.probe_requests());
    orchestrator::apply_probes(&mut batch, probes);

    if let Some(analyzer) = CommandAnalyzer::from_command(&config.analysis.command) {
        analysis::analyze_batch(&analyzer, &mut batch);
    }
    Ok(batch)
}

/// Run the batch with progress printed from a separate thread.
fn run_with_printer(
    batch: &mut Batch,
    options: &RunOptions,
    cancel: &CancelFlag,
) -> Result<RunSummary, RunError> {
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_batch_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = orchestrator::run_batch(batch, options, Some(tx), cancel);
    if printer.join().is_err() {
        tracing::warn!("progress printer stopped early");
    }
    result
}

/// Diagnostics go to stderr. `RUST_LOG` overrides the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
