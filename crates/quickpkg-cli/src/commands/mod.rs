pub mod build;
pub mod completions;
pub mod doctor;
pub mod man_pages;

use indicatif::{ProgressBar, ProgressStyle};
use quickpkg_core::{CoreError, ErrorCategory};
use std::fmt;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;
pub const EXIT_ACQUISITION_ERROR: u8 = 3;

/// A failed command: message for stderr plus the process exit code.
#[derive(Debug)]
pub struct CommandError {
    pub code: u8,
    pub message: String,
}

impl CommandError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self {
            code: EXIT_USAGE_ERROR,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: EXIT_FAILURE,
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<CoreError> for CommandError {
    fn from(err: CoreError) -> Self {
        let code = match err.category() {
            ErrorCategory::Usage => EXIT_USAGE_ERROR,
            ErrorCategory::Acquisition => EXIT_ACQUISITION_ERROR,
            ErrorCategory::Build => EXIT_FAILURE,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        Self::failure(message)
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Colored status word for doctor output.
pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "pass" => Style::new().green().apply_to("✓").to_string(),
        "fail" => Style::new().red().bold().apply_to("✗").to_string(),
        "warn" => Style::new().yellow().apply_to("⚠").to_string(),
        _ => Style::new().dim().apply_to("ℹ").to_string(),
    }
}

/// `true` when `QUICKPKG_SKIP_PREREQS=1` is set.
pub fn skip_prereqs() -> bool {
    std::env::var("QUICKPKG_SKIP_PREREQS").as_deref() == Ok("1")
}
