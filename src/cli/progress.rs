//! Multi-row progress display and summary reporting for CLI downloads.

use std::collections::HashMap;
use std::sync::Mutex;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::{DownloadProgress, FileStats, SessionStats, format_bytes, format_duration};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a row for a transfer of known size.
fn make_progress_bar(size: u64, name: &str) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:30.cyan/blue}] {percent:>3}% {eta}")
            .expect("progress template is valid")
            .progress_chars("== "),
    );
    bar.set_message(name.to_string());
    bar
}

/// Creates a row for a transfer without a content length.
fn make_spinner(name: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{msg} {spinner:.cyan} {bytes} @ {bytes_per_sec}")
            .expect("spinner template is valid"),
    );
    bar.set_message(name.to_string());
    bar
}

/// [`DownloadProgress`] that gives every active transfer its own row.
///
/// Rows are keyed by display name; the session hands out unique names.
pub struct BarProgress {
    multi: MultiProgress,
    rows: Mutex<HashMap<String, ProgressBar>>,
}

impl BarProgress {
    /// Creates a display drawing into `multi`.
    #[must_use]
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            rows: Mutex::new(HashMap::new()),
        }
    }

    fn row(&self, name: &str) -> Option<ProgressBar> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn release(&self, name: &str) -> Option<ProgressBar> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(name)
    }

    /// Number of rows currently claimed.
    #[must_use]
    pub fn active_rows(&self) -> usize {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl DownloadProgress for BarProgress {
    fn on_file_start(&self, name: &str, total: Option<u64>) {
        let bar = match total {
            Some(size) => make_progress_bar(size, name),
            None => make_spinner(name),
        };
        let bar = self.multi.add(bar);
        let _ = self.multi.println(format!(
            "{} {}",
            style("Downloading").blue(),
            style(name).yellow()
        ));
        if let Some(old) = self
            .rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.to_string(), bar)
        {
            old.finish_and_clear();
        }
    }

    fn on_progress(&self, name: &str, bytes_delta: u64) {
        if let Some(bar) = self.row(name) {
            bar.inc(bytes_delta);
        }
    }

    fn on_file_complete(&self, name: &str, stats: &FileStats) {
        if let Some(bar) = self.release(name) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        let _ = self.multi.println(format!(
            "{} {} ({} in {}) -> {}",
            style("Finished").green(),
            style(name).yellow(),
            format_bytes(stats.size),
            format_duration(stats.elapsed),
            stats.path.display()
        ));
    }

    fn on_error(&self, name: &str, error: &str) {
        if let Some(bar) = self.release(name) {
            bar.abandon();
            self.multi.remove(&bar);
        }
        let _ = self.multi.println(format!(
            "{} {}: {error}",
            style("Failed").red(),
            style(name).yellow()
        ));
    }
}

/// Prints the welcome banner.
pub fn print_banner() {
    println!("{}", style(" Mustang ").bold().on_green());
    println!(
        "{}",
        style("Download NetEase Cloud Music songs, albums and playlists.").blue()
    );
    println!(
        "{}",
        style("Tracks are fetched from public endpoints for personal use; respect the rights holders.")
            .red()
    );
}

/// Prints a summary of the session.
pub fn print_summary(stats: &SessionStats) {
    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");

    println!("  Tracks downloaded: {}", stats.files_downloaded);
    if stats.files_downloaded > 0 {
        println!("  Total size:        {}", format_bytes(stats.total_bytes));
        println!("  Total time:        {}", format_duration(stats.elapsed));
        println!(
            "  Average speed:     {}/s",
            format_bytes(stats.average_speed())
        );
    }

    if !stats.failures.is_empty() {
        println!("  Tracks failed:     {}", stats.failures.len());
        for failure in &stats.failures {
            println!("    {} {}: {}", style("x").red(), failure.name, failure.reason);
        }
    }

    println!("{SEPARATOR}");
}
