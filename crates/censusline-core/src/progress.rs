//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one page bar per product fetch (cleared on completion).
//! Non-TTY mode: log-based output only.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

fn page_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(concat!(
            "{prefix:<16.dim} {bar:30.green/dim} {pos:>3}/{len:3} pages ",
            "{elapsed:>4} {wide_msg:.dim}",
        ))
        .expect("invalid template")
        .progress_chars("--")
}

/// Central progress context.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Context that never draws (tests, `--quiet` pipelines).
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: false,
        }
    }

    /// Bar counting fetched pages for one product.
    ///
    /// Non-TTY: hidden (no-op).
    pub fn page_bar(&self, name: &str, pages: usize) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(pages as u64));
        pb.set_style(page_style());
        pb.set_prefix(bar_label(name));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Product names are short, but user-defined ones may not be.
fn bar_label(name: &str) -> String {
    match name.char_indices().nth(15) {
        Some((cut, _)) => format!("{}~", &name[..cut]),
        None => name.to_string(),
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_small() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(123), "123");
    }

    #[test]
    fn fmt_num_thousands() {
        assert_eq!(fmt_num(33_120), "33,120");
        assert_eq!(fmt_num(85_395), "85,395");
        assert_eq!(fmt_num(1_234_567), "1,234,567");
    }

    #[test]
    fn long_bar_labels_are_cut() {
        assert_eq!(bar_label("dp02"), "dp02");
        assert_eq!(bar_label("b25001_housing_units"), "b25001_housing_~");
    }

    #[test]
    fn hidden_context_returns_hidden_bars() {
        let ctx = ProgressContext::hidden();
        assert!(!ctx.is_tty());
        assert!(ctx.page_bar("dp02", 17).is_hidden());
    }
}
