//! Output formatting utilities
//!
//! This module provides formatters for CLI output in both human-readable
//! and JSON formats. It also handles progress bars and colored output.

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::ProgressBar;

use bp_core::config::Defaults;

/// Output configuration derived from CLI flags
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Use JSON output format
    pub json: bool,
    /// Disable colored output
    pub no_color: bool,
    /// Disable progress bar
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}

impl OutputConfig {
    /// Combine command-line flags with the `[defaults]` config section
    ///
    /// Flags can only switch features off or select JSON, never undo a
    /// config choice in the other direction.
    pub fn resolve(mut self, defaults: &Defaults) -> Self {
        self.json |= defaults.output == "json";
        self.no_color |= defaults.color == "never";
        self.no_progress |= !defaults.progress;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_applies_config_defaults() {
        let defaults = Defaults {
            output: "json".into(),
            color: "never".into(),
            progress: false,
        };
        let config = OutputConfig::default().resolve(&defaults);
        assert!(config.json);
        assert!(config.no_color);
        assert!(config.no_progress);
    }

    #[test]
    fn test_resolve_keeps_flags() {
        let flags = OutputConfig {
            quiet: true,
            no_color: true,
            ..Default::default()
        };
        let config = flags.resolve(&Defaults::default());
        assert!(config.quiet);
        assert!(config.no_color);
        assert!(!config.json);
    }
}
