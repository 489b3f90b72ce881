//! Screenshot filename classification.
//!
//! Pattern syntax (case-insensitive):
//!   `Screenshot*`    : glob, `*` = any chars, `?` = single char
//!   `*screen shot*`  : glob, contains
//!   `/^scr_\d+/`     : regex (wrapped in `/`)

use std::path::Path;

use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub enum Pattern {
    Glob(String),
    Regex(Regex),
}

impl Pattern {
    /// Parse one pattern. Invalid regexes are reported with the offending text.
    pub fn parse(text: &str) -> Result<Pattern, String> {
        let text = text.trim();
        if text.len() >= 2 && text.starts_with('/') && text.ends_with('/') {
            let inner = &text[1..text.len() - 1];
            RegexBuilder::new(inner)
                .case_insensitive(true)
                .build()
                .map(Pattern::Regex)
                .map_err(|e| format!("Invalid regex '{}': {}", inner, e))
        } else {
            Ok(Pattern::Glob(text.to_lowercase()))
        }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            Pattern::Glob(pattern) => glob_match(pattern, &file_name.to_lowercase()),
            Pattern::Regex(re) => re.is_match(file_name),
        }
    }
}

/// Compiled set of screenshot patterns plus the extension allow-list.
#[derive(Debug, Clone)]
pub struct ScreenshotMatcher {
    patterns: Vec<Pattern>,
    extensions: Vec<String>,
}

impl ScreenshotMatcher {
    /// Build from config strings. Bad patterns are skipped with a warning.
    pub fn new(patterns: &[String], extensions: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match Pattern::parse(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    log::warn!("Ignoring screenshot pattern: {}", e);
                    None
                }
            })
            .collect();
        let extensions = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Self {
            patterns,
            extensions,
        }
    }

    /// An empty extension list accepts every extension.
    pub fn is_screenshot(&self, path: &Path) -> bool {
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };

        if !self.extensions.is_empty() {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !self.extensions.iter().any(|allowed| *allowed == ext) {
                return false;
            }
        }

        self.patterns.iter().any(|p| p.matches(&file_name))
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    glob_match_impl(pattern.as_bytes(), text.as_bytes())
}

fn glob_match_impl(pat: &[u8], txt: &[u8]) -> bool {
    let mut px = 0;
    let mut tx = 0;
    let mut star_px = usize::MAX;
    let mut star_tx = 0;

    while tx < txt.len() {
        if px < pat.len() && (pat[px] == b'?' || pat[px] == txt[tx]) {
            px += 1;
            tx += 1;
        } else if px < pat.len() && pat[px] == b'*' {
            star_px = px;
            star_tx = tx;
            px += 1;
        } else if star_px != usize::MAX {
            px = star_px + 1;
            star_tx += 1;
            tx = star_tx;
        } else {
            return false;
        }
    }

    while px < pat.len() && pat[px] == b'*' {
        px += 1;
    }

    px == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> ScreenshotMatcher {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        ScreenshotMatcher::new(&patterns, &["png".to_string(), "jpg".to_string()])
    }

    #[test]
    fn glob_is_case_insensitive() {
        let m = matcher(&["Screenshot*"]);
        assert!(m.is_screenshot(Path::new("/tmp/screenshot 2024-01-01.png")));
        assert!(m.is_screenshot(Path::new("/tmp/SCREENSHOT.PNG")));
        assert!(!m.is_screenshot(Path::new("/tmp/holiday.png")));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let p = Pattern::parse("shot?.png").unwrap();
        assert!(p.matches("shot1.png"));
        assert!(!p.matches("shot12.png"));
    }

    #[test]
    fn regex_patterns_are_slash_wrapped() {
        let m = matcher(&[r"/^scr_\d+/"]);
        assert!(m.is_screenshot(Path::new("scr_0042.jpg")));
        assert!(!m.is_screenshot(Path::new("scr_abc.jpg")));
    }

    #[test]
    fn extension_filter_applies_before_patterns() {
        let m = matcher(&["*"]);
        assert!(m.is_screenshot(Path::new("anything.png")));
        assert!(!m.is_screenshot(Path::new("notes.txt")));
        assert!(!m.is_screenshot(Path::new("no_extension")));
    }

    #[test]
    fn invalid_regex_is_skipped() {
        let m = matcher(&["/([/", "shot*"]);
        assert!(m.is_screenshot(Path::new("shot.png")));
        assert!(Pattern::parse("/([/").is_err());
    }
}
