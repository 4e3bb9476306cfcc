//! Progress bar for object transfers
//!
//! Counts objects, not bytes: the engine reports `(processed, total)` once
//! per object attempt.

use super::OutputConfig;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} objects ({eta}) {msg}";

/// Progress bar wrapper
///
/// Handles progress display based on output configuration.
/// In quiet or JSON mode, progress is suppressed.
#[derive(Debug)]
pub struct ProgressBar {
    bar: Option<indicatif::ProgressBar>,
}

impl ProgressBar {
    /// Create a hidden-until-first-update progress bar
    pub fn new(config: &OutputConfig, message: &str) -> Self {
        let bar = if config.quiet || config.json || config.no_progress {
            None
        } else {
            let style = indicatif::ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                .progress_chars("#>-");
            let bar = indicatif::ProgressBar::new(0).with_style(style);
            bar.set_message(message.to_string());
            Some(bar)
        };

        Self { bar }
    }

    /// Record `(processed, total)` as reported by the engine
    pub fn update(&self, processed: u64, total: u64) {
        if let Some(bar) = &self.bar {
            bar.set_length(total);
            bar.set_position(processed);
        }
    }

    /// Finish and clear the progress bar
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    /// Check if progress bar is visible
    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_quiet_mode() {
        let config = OutputConfig {
            quiet: true,
            ..Default::default()
        };
        assert!(!ProgressBar::new(&config, "export").is_visible());
    }

    #[test]
    fn test_progress_bar_json_mode() {
        let config = OutputConfig {
            json: true,
            ..Default::default()
        };
        assert!(!ProgressBar::new(&config, "export").is_visible());
    }

    #[test]
    fn test_progress_bar_no_progress() {
        let config = OutputConfig {
            no_progress: true,
            ..Default::default()
        };
        assert!(!ProgressBar::new(&config, "export").is_visible());
    }

    #[test]
    fn test_progress_bar_tracks_counts() {
        let bar = ProgressBar::new(&OutputConfig::default(), "export");
        assert!(bar.is_visible());
        bar.update(3, 10);
        let inner = bar.bar.as_ref().unwrap();
        assert_eq!(inner.position(), 3);
        assert_eq!(inner.length(), Some(10));
        bar.finish_and_clear();
    }
}
