//! Terminal progress for batch runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use paperpage_core::{BatchProgress, BatchSummary, GenerationJob, JobState};

/// Progress bar over finished jobs, with a line per failure.
pub(crate) struct CliBatchProgress {
    bar: ProgressBar,
}

impl CliBatchProgress {
    pub(crate) fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    /// Start a fresh bar for a retry round of `pending` jobs.
    pub(crate) fn restart(&self, pending: usize) {
        self.bar.reset();
        self.bar.set_length(pending as u64);
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }
}

impl BatchProgress for CliBatchProgress {
    fn job_started(&self, job: &GenerationJob) {
        self.bar.set_message(format!("running {}", job.id));
    }

    fn job_finished(&self, job: &GenerationJob) {
        if job.state == JobState::Failed {
            self.bar.println(format!(
                "  ✗ {}: {}",
                job.id,
                job.message.as_deref().unwrap_or("failed")
            ));
        }
        self.bar.inc(1);
    }

    fn batch_finished(&self, summary: &BatchSummary) {
        self.bar.finish_and_clear();
        if summary.failed > 0 {
            tracing::debug!(failed = summary.failed, "batch round finished with failures");
        }
    }
}
