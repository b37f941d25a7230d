//! manuscript-prep - manuscript page preparation
//!
//! CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Instant;
use tracing::warn;

use manuscript_prep::{
    exit_codes, normalize_batch, segment_batch, BatchProgress, BatchReport, BatchRunner,
    BatchStage, Cli, Commands, CommonArgs, Config, LineSegmenter, NormalizeArgs, OutputMode,
    PageId, PageNormalizer, PageOutcome, PathResolver, RepositoryLayout, SegmentArgs,
    SourceVariant, TesseractRecognizer,
};

fn main() {
    let cli = Cli::parse();

    let mode = match &cli.command {
        Commands::Normalize(args) => output_mode(&args.common),
        Commands::Segment(args) => output_mode(&args.common),
        Commands::Info => OutputMode::Normal,
    };
    init_logging(mode);

    let result = match cli.command {
        Commands::Normalize(args) => run_normalize(&args),
        Commands::Segment(args) => run_segment(&args),
        Commands::Info => run_info().map(|()| exit_codes::SUCCESS),
    };

    std::process::exit(match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_codes::GENERAL_ERROR
        }
    });
}

fn output_mode(common: &CommonArgs) -> OutputMode {
    OutputMode::from_flags(common.verbose, common.quiet)
}

fn init_logging(mode: OutputMode) {
    tracing_subscriber::fmt()
        .with_max_level(mode.level_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ============ Shared Helpers ============

/// Explicit --config must load; default locations fall back to defaults
fn load_config(common: &CommonArgs) -> Result<Config> {
    match &common.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(Config::load().unwrap_or_else(|e| {
            warn!("Ignoring config file: {}", e);
            Config::default()
        })),
    }
}

/// Page ids from the command line, or every page in `variant` with --all
fn collect_targets(
    common: &CommonArgs,
    layout: &RepositoryLayout,
    variant: SourceVariant,
) -> Result<Vec<PageId>> {
    if common.all {
        return layout
            .discover(variant)
            .with_context(|| format!("listing {}", layout.variant_dir(variant).display()));
    }

    let mut pages = Vec::with_capacity(common.ids.len());
    for raw in &common.ids {
        match PageId::new(raw.as_str()) {
            Some(id) => pages.push(id),
            None => warn!(id = %raw, "Skipping invalid page id"),
        }
    }
    Ok(pages)
}

fn finish<T: PageOutcome>(
    stage: BatchStage,
    report: &BatchReport<T>,
    mode: OutputMode,
    started: Instant,
) -> i32 {
    if mode.should_show(OutputMode::Normal) {
        manuscript_prep::progress::print_summary(
            stage,
            report.total(),
            report.succeeded.len(),
            report.failed.len(),
            report.artifacts(),
            started.elapsed().as_secs_f64(),
        );
        for failure in &report.failed {
            eprintln!("  {}", failure);
        }
    }
    report.exit_code()
}

// ============ Normalize Command ============

fn run_normalize(args: &NormalizeArgs) -> Result<i32> {
    let started = Instant::now();
    let mode = output_mode(&args.common);
    let layout = RepositoryLayout::new(&args.common.root);

    let pages = collect_targets(&args.common, &layout, SourceVariant::Raw)?;
    if pages.is_empty() {
        eprintln!("No targets selected. Provide page ids or --all.");
        return Ok(exit_codes::NO_TARGETS);
    }

    let settings = load_config(&args.common)?.merge_with_cli(&args.overrides());
    let outdir = args
        .outdir
        .clone()
        .unwrap_or_else(|| layout.variant_dir(SourceVariant::NormalizedFull));

    if !settings.normalize.any_enabled() {
        warn!("No normalization stage enabled; pages will be re-encoded unchanged");
    }

    let runner = BatchRunner::new(settings.threads);
    let normalizer = PageNormalizer::new(settings.normalize);
    let progress = BatchProgress::new(BatchStage::Normalizing, pages.len(), mode);

    let report = normalize_batch(&runner, &normalizer, &layout, &pages, &outdir, &progress)?;
    progress.finish();

    if mode.should_show(OutputMode::Normal) {
        println!(
            "Processed {}/{} images to {}",
            report.succeeded.len(),
            report.total(),
            outdir.display()
        );
    }
    Ok(finish(BatchStage::Normalizing, &report, mode, started))
}

// ============ Segment Command ============

fn run_segment(args: &SegmentArgs) -> Result<i32> {
    let started = Instant::now();
    let mode = output_mode(&args.common);
    let layout = RepositoryLayout::new(&args.common.root);

    let pages = collect_targets(&args.common, &layout, args.source)?;
    if pages.is_empty() {
        eprintln!("No targets provided. Pass page ids or --all.");
        return Ok(exit_codes::NO_TARGETS);
    }

    let settings = load_config(&args.common)?.merge_with_cli(&args.overrides());
    let mut segmenter = LineSegmenter::new(settings.segment);
    if settings.recognize {
        match TesseractRecognizer::locate() {
            Ok(recognizer) => {
                segmenter = segmenter
                    .with_recognizer(Box::new(recognizer.with_timeout(settings.recognizer_timeout)));
            }
            Err(e) => warn!("Advisory OCR disabled: {}", e),
        }
    }

    let runner = BatchRunner::new(settings.threads);
    let progress = BatchProgress::new(BatchStage::Segmenting, pages.len(), mode);

    let report = segment_batch(
        &runner,
        &segmenter,
        &layout,
        &pages,
        args.source,
        args.clean,
        &progress,
    )?;
    progress.finish();

    if mode.should_show(OutputMode::Normal) {
        for outcome in &report.succeeded {
            println!(
                "{}: Saved {} line crops to {} (source={})",
                outcome.page,
                outcome.lines,
                outcome.lines_dir.display(),
                outcome.source
            );
        }
    }
    Ok(finish(BatchStage::Segmenting, &report, mode, started))
}

// ============ Info Command ============

fn run_info() -> Result<()> {
    println!("manuscript-prep v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    println!();
    println!("OCR Tools:");
    check_tool_with_version("tesseract", "Tesseract", &["--version"]);

    println!();
    println!("Config File Locations:");
    for path in Config::search_paths() {
        let marker = if path.is_file() { " (found)" } else { "" };
        println!("  {}{}", path.display(), marker);
    }

    Ok(())
}

fn check_tool_with_version(cmd: &str, name: &str, version_args: &[&str]) {
    match which::which(cmd) {
        Ok(path) => {
            let first_line = std::process::Command::new(&path)
                .args(version_args)
                .output()
                .ok()
                .and_then(|out| {
                    // tesseract prints its version on stderr in older releases
                    let text = if out.stdout.is_empty() { out.stderr } else { out.stdout };
                    String::from_utf8_lossy(&text).lines().next().map(str::to_string)
                })
                .unwrap_or_default();
            if !first_line.is_empty() && first_line.len() < 80 {
                println!("  {}: {} ({})", name, first_line.trim(), path.display());
            } else {
                println!("  {}: {} (found)", name, path.display());
            }
        }
        Err(_) => println!("  {}: Not found", name),
    }
}
