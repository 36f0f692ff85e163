//! # Output Configuration
//!
//! Controls how run results are shown to the operator: color and emoji
//! markers depend on terminal capabilities and user preferences, and
//! [`print_report`] renders a finished run.
//!
//! ## Respecting User Preferences
//!
//! The module respects the following environment variables and flags:
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Usage
//!
//! ```rust,ignore
//! use conan_updater_bgfx::output::{OutputConfig, emoji};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{} Locating revisions...", emoji(&config, "🔍", "[SCAN]"));
//! ```

use std::env;
use std::fmt::Write as _;

use console::style;

use crate::pipeline::RunReport;

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// - `always`: force colors on (overrides `NO_COLOR`)
    /// - `never`: force colors off
    /// - anything else: detect from the environment
    ///
    /// In auto mode, colors are disabled if `NO_COLOR` is set, `CLICOLOR=0`,
    /// `TERM=dumb`, or stdout is not a TTY (unless `CLICOLOR_FORCE=1`).
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // Presence alone disables colors, even if empty
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    /// Create a configuration with colors always enabled.
    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    /// Create a configuration with colors always disabled.
    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns `emoji_str` when colors are enabled, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Render a finished run as operator-facing text.
pub fn render_report(config: &OutputConfig, report: &RunReport) -> String {
    let mut out = String::new();
    let descriptor = &report.descriptor;
    let header = format!(
        "{} {}",
        descriptor.primary.name,
        descriptor.version_string()
    );
    let header = if config.use_color {
        style(header).bold().to_string()
    } else {
        header
    };

    let _ = writeln!(
        out,
        "{} {} ({})",
        emoji(config, "📦", "[PKG]"),
        header,
        descriptor.source_revision()
    );
    for release in &descriptor.dependencies {
        let _ = writeln!(
            out,
            "   {} {} ({})",
            release.name, release.version, release.revision
        );
    }
    let _ = writeln!(out);

    for edit in report.summary.changed_files() {
        let _ = writeln!(out, "{} {}", emoji(config, "📝", "[EDIT]"), edit.relative);
        for change in &edit.changes {
            let _ = writeln!(out, "   {}", change);
        }
    }
    for note in &report.summary.skipped {
        let _ = writeln!(out, "{} {}", emoji(config, "⏭️", "[SKIP]"), note);
    }
    for warning in &report.summary.warnings {
        let _ = writeln!(out, "{} {}", emoji(config, "⚠️", "[WARN]"), warning);
    }

    let _ = writeln!(out);
    if report.written {
        let _ = writeln!(
            out,
            "{} Updated {} file(s) in {}",
            emoji(config, "✅", "[OK]"),
            report.summary.changed_files().count(),
            report.downstream.path.display()
        );
    } else {
        let _ = writeln!(
            out,
            "{} Dry run: {} file(s) would change in {}",
            emoji(config, "🔎", "[DRY RUN]"),
            report.summary.changed_files().count(),
            report.downstream.path.display()
        );
    }
    out
}

/// Print a finished run to stdout.
pub fn print_report(config: &OutputConfig, report: &RunReport) {
    print!("{}", render_report(config, report));
}
