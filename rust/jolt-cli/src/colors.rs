//! ANSI color helpers for shell output.
//!
//! A [`Palette`] wraps text in escape codes only when color is enabled, so
//! output stays clean when piped or when `color = false` is configured.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.enabled {
            format!("\x1b[{}m{}\x1b[0m", code, s)
        } else {
            s.to_string()
        }
    }

    pub fn green(&self, s: &str) -> String {
        self.paint("32", s)
    }

    pub fn red(&self, s: &str) -> String {
        self.paint("31", s)
    }

    pub fn yellow(&self, s: &str) -> String {
        self.paint("33", s)
    }

    pub fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    pub fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    pub fn gray(&self, s: &str) -> String {
        self.paint("90", s)
    }

    /// Right-aligned status label, green and bold.
    pub fn status_label(&self, label: &str) -> String {
        self.paint("1;32", &format!("{:>12}", label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_palette_leaves_text_alone() {
        let palette = Palette::plain();
        assert_eq!(palette.red("x"), "x");
        assert_eq!(palette.status_label("Running"), "     Running");
    }

    #[test]
    fn enabled_palette_wraps_text() {
        assert_eq!(Palette::new(true).green("ok"), "\x1b[32mok\x1b[0m");
    }
}
