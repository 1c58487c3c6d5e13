//! Human-readable batch summary.

use std::time::Duration;

use crate::batch::{BatchResult, DocumentFailure};
use crate::config::VerbosityLevel;

/// Simple output formatter for human-readable results
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stderr),
        }
    }

    /// Formatter that never emits ANSI escapes
    pub fn plain(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: false,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_results(&self, result: &BatchResult, duration: Duration) -> String {
        let mut output = String::new();

        match self.verbosity {
            VerbosityLevel::Quiet => {
                if !result.is_success() {
                    output.push_str(&format!(
                        "Invalid: {} Failed: {}\n",
                        result.invalid_count(),
                        result.failures.len()
                    ));
                }
            }
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                output.push_str(&self.format_summary(result, duration));

                if self.verbosity >= VerbosityLevel::Verbose {
                    for failure in &result.failures {
                        output.push_str(&self.format_failure(failure));
                        output.push('\n');
                    }
                }
            }
        }

        output
    }

    pub fn format_failure(&self, failure: &DocumentFailure) -> String {
        format!(
            "{}  {} - {}",
            self.colorize("⚠ FAILED", "33"),
            failure.document_id,
            failure.message
        )
    }

    fn format_summary(&self, result: &BatchResult, duration: Duration) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Total documents: {}\n", result.documents));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Valid:", "32"),
            result.valid_count
        ));

        if result.invalid_count() > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Invalid:", "31"),
                result.invalid_count()
            ));
        }
        if !result.failures.is_empty() {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Failed:", "33"),
                result.failures.len()
            ));
        }

        output.push_str(&format!("  Duration: {}\n", format_duration(duration)));
        output
    }

    /// Print the summary to stderr; nothing is printed in quiet mode when every document validated
    pub fn print(&self, result: &BatchResult, duration: Duration) {
        let formatted = self.format_results(result, duration);
        if !formatted.is_empty() {
            eprint!("{}", formatted);
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
