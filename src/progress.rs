//! Progress reporting for batch runs

use crate::batch::BatchSummary;
use crate::recorder::RunResult;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar over the runs of one batch walk
#[derive(Debug)]
pub struct BatchProgress {
    runs_pb: Option<ProgressBar>,
    failed: u64,
    start_time: std::time::Instant,
}

impl BatchProgress {
    /// Create the reporter; `show_progress == false` keeps it silent
    pub fn new(total_runs: u64, show_progress: bool) -> Self {
        let runs_pb = (show_progress && total_runs > 0)
            .then(|| create_progress_bar(total_runs, "Comparing runs"));

        Self {
            runs_pb,
            failed: 0,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn advance(&mut self, result: RunResult) {
        if matches!(result, RunResult::Fail | RunResult::Error) {
            self.failed += 1;
        }
        if let Some(pb) = &self.runs_pb {
            pb.inc(1);
            if self.failed > 0 {
                pb.set_message(format!("{} not passing", self.failed));
            }
        }
    }

    pub fn finish(&mut self, summary: &BatchSummary) {
        let message = format!(
            "{} run(s) in {:.1}s: {} pass, {} fail, {} no data, {} error",
            summary.processed,
            self.start_time.elapsed().as_secs_f64(),
            summary.pass,
            summary.fail,
            summary.no_data,
            summary.error
        );
        if let Some(pb) = self.runs_pb.take() {
            pb.finish_with_message(message);
        } else {
            log::debug!("{}", message);
        }
    }
}

impl Drop for BatchProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.runs_pb.take() {
            pb.finish_and_clear();
        }
    }
}

/// Create a spinner progress bar
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a progress bar with known total
fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({per_sec}) {eta} {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}
