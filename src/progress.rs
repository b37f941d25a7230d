//! Progress reporting for page batches.
//!
//! Workers report through [`ProgressCallback`]; the CLI plugs in a
//! [`BatchProgress`] bar while library callers can use [`NoProgress`].

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use tracing::level_filters::LevelFilter;

use crate::layout::PageId;

/// Which pipeline a batch runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    /// Writing normalized page rasters
    Normalizing,
    /// Writing line crops
    Segmenting,
}

impl BatchStage {
    pub fn name(&self) -> &'static str {
        match self {
            BatchStage::Normalizing => "Normalizing",
            BatchStage::Segmenting => "Segmenting",
        }
    }

    /// Noun for the unit each page produces
    pub fn artifact(&self) -> &'static str {
        match self {
            BatchStage::Normalizing => "pages",
            BatchStage::Segmenting => "lines",
        }
    }
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Errors only, no bar
    Quiet,
    /// Progress bar and summary
    #[default]
    Normal,
    /// Per-page log lines
    Verbose,
    /// Stage-level detail
    VeryVerbose,
}

impl OutputMode {
    /// Create OutputMode from `-v` count and `--quiet`
    pub fn from_flags(verbosity: u8, quiet: bool) -> Self {
        if quiet {
            return OutputMode::Quiet;
        }
        match verbosity {
            0 => OutputMode::Normal,
            1 => OutputMode::Verbose,
            _ => OutputMode::VeryVerbose,
        }
    }

    /// Check if output should be shown at this mode
    pub fn should_show(&self, required: OutputMode) -> bool {
        use OutputMode::*;
        match (self, required) {
            (Quiet, _) => false,
            (Normal, Quiet | Normal) => true,
            (Verbose, Quiet | Normal | Verbose) => true,
            (VeryVerbose, _) => true,
            _ => false,
        }
    }

    /// Log level the subscriber should filter at
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            OutputMode::Quiet => LevelFilter::ERROR,
            OutputMode::Normal => LevelFilter::WARN,
            OutputMode::Verbose => LevelFilter::INFO,
            OutputMode::VeryVerbose => LevelFilter::DEBUG,
        }
    }
}

/// Receives per-page events from batch workers (called concurrently)
pub trait ProgressCallback: Send + Sync {
    fn on_page_start(&self, _page: &PageId) {}

    /// `produced` counts artifacts (pages or lines) written for the page
    fn on_page_complete(&self, _page: &PageId, _produced: usize) {}

    fn on_page_failed(&self, _page: &PageId, _error: &str) {}
}

/// Ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {}

/// Progress bar width in characters
const PROGRESS_BAR_WIDTH: usize = 40;

/// Terminal progress bar over a page batch
#[derive(Debug, Clone)]
pub struct BatchProgress {
    bar: ProgressBar,
    stage: BatchStage,
    mode: OutputMode,
}

impl BatchProgress {
    pub fn new(stage: BatchStage, total_pages: usize, mode: OutputMode) -> Self {
        let bar = ProgressBar::new(total_pages as u64);
        if mode == OutputMode::Quiet {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let template = format!(
            "{{prefix:>12.bold}} [{{bar:{}}}] {{pos}}/{{len}} {{msg}}",
            PROGRESS_BAR_WIDTH
        );
        if let Ok(style) = ProgressStyle::with_template(&template) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_prefix(stage.name());
        Self { bar, stage, mode }
    }

    pub fn stage(&self) -> BatchStage {
        self.stage
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BatchProgress {
    fn on_page_start(&self, page: &PageId) {
        if self.mode.should_show(OutputMode::VeryVerbose) {
            self.bar.set_message(page.to_string());
        }
    }

    fn on_page_complete(&self, page: &PageId, produced: usize) {
        if self.mode.should_show(OutputMode::Verbose) {
            self.bar
                .println(format!("  {}: {} {}", page, produced, self.stage.artifact()));
        }
        self.bar.inc(1);
    }

    fn on_page_failed(&self, page: &PageId, error: &str) {
        if self.mode.should_show(OutputMode::Normal) {
            self.bar.println(format!("  {}: FAILED ({})", page, error));
        }
        self.bar.inc(1);
    }
}

/// Print final batch summary
pub fn print_summary(
    stage: BatchStage,
    total_pages: usize,
    ok_count: usize,
    error_count: usize,
    artifacts: usize,
    elapsed_secs: f64,
) {
    println!();
    println!("{}", "=".repeat(60));
    println!("{} Summary", stage);
    println!("{}", "=".repeat(60));
    println!("  Total pages:  {}", total_pages);
    println!("  Succeeded:    {}", ok_count);
    println!("  Errors:       {}", error_count);
    println!("  {:<13} {}", format!("{}:", capitalize(stage.artifact())), artifacts);
    println!("  Elapsed:      {:.2}s", elapsed_secs);
    println!("{}", "=".repeat(60));
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
