//! Terminal styling for the run summary.
//!
//! Each summary line starts with a coloured marker saying how a repository
//! or directory fared. `console` drops the colour when stdout is not a tty.

use console::Style;

fn marked(mark: &str, style: Style, msg: &str) -> String {
    format!("{} {}", style.apply_to(mark), msg)
}

/// A repository that converted cleanly.
pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

/// A repository whose conversion failed, or a fatal error.
pub fn error(msg: &str) -> String {
    marked("✗", Style::new().red(), msg)
}

/// A directory the walk had to skip.
pub fn warn(msg: &str) -> String {
    marked("⚠", Style::new().yellow(), msg)
}

pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_prefix_message() {
        console::set_colors_enabled(false);
        assert_eq!(success("/srv/hg/A"), "✓ /srv/hg/A");
        assert_eq!(error("/srv/hg/B"), "✗ /srv/hg/B");
        assert_eq!(warn("/srv/hg/locked"), "⚠ /srv/hg/locked");
        assert_eq!(header("Conversion summary"), "Conversion summary");
    }
}
