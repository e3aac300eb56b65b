//! Progress bar reporting for CLI runs.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::{DownloadProgress, InstallerEvents, Status};

/// Terminal front end for an install run.
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    /// Creates a reporter with a percentage bar for `package`.
    #[must_use]
    pub fn new(package: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix} [{bar:40.cyan/blue}] {pos:>3}% - {msg}",
            )
            .expect("progress template is valid")
            .progress_chars("━━╌"),
        );
        bar.set_prefix(package.to_string());
        Self { bar }
    }
}

impl DownloadProgress for BarReporter {
    fn on_progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }
}

impl InstallerEvents for BarReporter {
    fn on_status(&self, status: Status, detail: Option<&str>) {
        match (status, detail) {
            (Status::Error, Some(detail)) => {
                self.bar.abandon_with_message(format!("✗ {status}: {detail}"));
            }
            (Status::Error, None) => self.bar.abandon_with_message(format!("✗ {status}")),
            (Status::Downloading, _) => {
                self.bar.enable_steady_tick(std::time::Duration::from_millis(250));
                self.bar.set_message(status.to_string());
            }
            _ => self.bar.set_message(status.to_string()),
        }
    }

    fn on_complete(&self, path: &Path) {
        self.bar.finish_with_message(format!("✓ {}", path.display()));
    }
}
