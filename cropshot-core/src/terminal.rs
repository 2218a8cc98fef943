//! Terminal output styling for cropshot.
//!
//! Everything here goes through `log::info!`, so the console appender shows
//! it on stderr and the file appender mirrors it into the run log. Styling
//! uses the `console` crate and is switched off when `NO_COLOR` is set.

use console::style;
use log::info;

/// Visual hierarchy levels of the output.
#[derive(Debug, Clone, Copy)]
pub enum OutputLevel {
    /// ===== SECTION =====
    Section,
    /// » Operation
    Subsection,
    /// Key-value status lines
    Status,
    Detail,
}

impl OutputLevel {
    fn indent(self) -> &'static str {
        match self {
            OutputLevel::Section => "",
            OutputLevel::Subsection => "  ",
            OutputLevel::Status => "    ",
            OutputLevel::Detail => "      ",
        }
    }
}

const LABEL_WIDTH: usize = 18;

fn should_use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

/// Section header for one phase of the run.
pub fn print_section(title: &str) {
    info!("");
    if should_use_color() {
        info!("===== {} =====", style(title.to_uppercase()).cyan().bold());
    } else {
        info!("===== {} =====", title.to_uppercase());
    }
    info!("");
}

/// Line at the given level, optionally prefixed with a symbol.
pub fn print_item(level: OutputLevel, symbol: Option<&str>, text: &str, bold: bool) {
    let prefix = match symbol {
        Some(sym) => format!("{}{sym} ", level.indent()),
        None => level.indent().to_string(),
    };
    if bold && should_use_color() {
        info!("{prefix}{}", style(text).bold());
    } else {
        info!("{prefix}{text}");
    }
}

/// A processing step, preceded by a blank line.
pub fn print_processing(message: &str) {
    info!("");
    print_item(OutputLevel::Subsection, Some("»"), message, true);
}

pub fn print_detail(message: &str) {
    print_item(OutputLevel::Detail, None, message, false);
}

/// Status colors for the per-video labels of phase 1.
fn colored_value(label: &str, value: &str) -> String {
    if value.starts_with("crop[") {
        style(value).green().to_string()
    } else if value == "copy_after_error" {
        style(value).yellow().to_string()
    } else if value.starts_with("error") {
        style(value).red().to_string()
    } else if label == "Crop" || label == "Strategy" {
        style(value).bold().to_string()
    } else {
        value.to_string()
    }
}

/// Key-value status line with the label padded to a fixed column.
pub fn print_status(label: &str, value: &str) {
    let padding = LABEL_WIDTH.saturating_sub(label.chars().count()).max(1);
    let value = if should_use_color() {
        colored_value(label, value)
    } else {
        value.to_string()
    };
    info!(
        "{}{}:{}{}",
        OutputLevel::Status.indent(),
        label,
        " ".repeat(padding),
        value
    );
}

pub fn print_success(message: &str) {
    info!("");
    if should_use_color() {
        info!("  ✓ {}", style(message).green());
    } else {
        info!("  ✓ {message}");
    }
}

pub fn print_warning(message: &str) {
    if should_use_color() {
        info!("  ⚠ {}", style(message).yellow());
    } else {
        info!("  ⚠ {message}");
    }
}

/// Error block with an optional suggestion.
pub fn print_error(title: &str, message: &str, suggestion: Option<&str>) {
    if should_use_color() {
        info!("✗ {}", style(title).red().bold());
    } else {
        info!("✗ {title}");
    }
    info!("  Message:    {message}");
    if let Some(suggestion) = suggestion {
        info!("  Suggestion: {suggestion}");
    }
    info!("");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_are_untouched() {
        assert_eq!(colored_value("Videos", "3"), "3");
    }

    #[test]
    fn statuses_keep_their_text() {
        // Styling may be disabled when stdout is not a tty; the text survives either way.
        for status in ["crop[ffmpeg]", "copy_after_error", "error_dimensions"] {
            assert!(colored_value("clip.mp4", status).contains(status));
        }
    }
}
