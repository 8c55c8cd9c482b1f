use console::style;

/// Styled terminal messages
///
/// Everything goes to stderr so stdout carries only analysis text (or JSON).
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        eprintln!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        eprintln!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        eprintln!("{} {}", style("ℹ").blue(), message);
    }

    /// Progress line for a status event
    pub fn status(&self, progress: u8, message: &str) {
        eprintln!(
            "{} {}",
            style(format!("[{:>3}%]", progress)).dim(),
            style(message).dim()
        );
    }

    pub fn section(&self, message: &str) {
        eprintln!("\n{}", style(message).bold());
        eprintln!("{}", "─".repeat(40));
    }

    /// Aligned `key: value` line inside a section
    pub fn field(&self, key: &str, value: impl std::fmt::Display) {
        eprintln!("  {:<28} {}", style(key).cyan(), value);
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
