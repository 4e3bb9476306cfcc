//! Printing command results and status lines
//!
//! Results go to stdout, status lines to stderr except for successes. In
//! JSON mode only results and errors are printed, both as JSON.

use console::Style;
use serde::Serialize;

use super::OutputConfig;

/// Failures listed individually before the rest is summarized
const MAX_LISTED_FAILURES: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Print a command result as JSON or through its `Display` impl
    pub fn output<T: Serialize + std::fmt::Display>(&self, value: &T) {
        if self.config.quiet {
            return;
        }
        if self.config.json {
            self.json(value);
        } else {
            println!("{value}");
        }
    }

    pub fn success(&self, message: &str) {
        if self.shows_status() {
            println!("{}", self.status_line("✓", Style::new().green(), message));
        }
    }

    /// Errors are printed even with `--quiet`
    pub fn error(&self, message: &str) {
        if self.config.json {
            eprintln!("{}", serde_json::json!({ "error": message }));
        } else {
            eprintln!("{}", self.status_line("✗", Style::new().red(), message));
        }
    }

    pub fn warning(&self, message: &str) {
        if self.shows_status() {
            eprintln!("{}", self.status_line("⚠", Style::new().yellow(), message));
        }
    }

    /// Warn about per-object failures, summarizing a long tail
    pub fn failures(&self, failures: &[bp_core::TransferFailure], failed: u64) {
        for failure in failures.iter().take(MAX_LISTED_FAILURES) {
            self.warning(&format!("{}: {}", failure.key, failure.error));
        }
        let listed = failures.len().min(MAX_LISTED_FAILURES) as u64;
        if failed > listed {
            self.warning(&format!("... and {} more failed objects", failed - listed));
        }
    }

    /// Print `value` as pretty JSON regardless of mode
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("cannot serialize output: {e}"),
        }
    }

    pub fn println(&self, message: &str) {
        if !self.config.quiet {
            println!("{message}");
        }
    }

    fn shows_status(&self) -> bool {
        !self.config.quiet && !self.config.json
    }

    fn status_line(&self, symbol: &str, color: Style, message: &str) -> String {
        if self.colors_enabled() {
            format!("{} {message}", color.apply_to(symbol))
        } else {
            format!("{symbol} {message}")
        }
    }
}
