//! Keyword classification and line highlighting.
//!
//! Rules are frozen into a [`KeywordSet`] when a session starts and never
//! change during a run.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use regex::{Regex, RegexBuilder};

/// A named text-matching rule with a display color
#[derive(Clone, Debug)]
pub struct KeywordRule {
    pub name: String,
    pub color: Color,
    pub enabled: bool,
    matcher: Regex,
}

impl KeywordRule {
    /// Rule matching its own name as a case-insensitive substring
    pub fn substring(name: &str, color: Color, enabled: bool) -> Self {
        Self::pattern(name, name, false, color, enabled)
    }

    /// Rule with an explicit pattern. In regex mode an invalid pattern
    /// degrades to a literal substring match rather than failing the run.
    pub fn pattern(name: &str, pattern: &str, is_regex: bool, color: Color, enabled: bool) -> Self {
        let matcher = if is_regex {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|_| literal_matcher(pattern))
        } else {
            literal_matcher(pattern)
        };
        Self {
            name: name.to_string(),
            color,
            enabled,
            matcher,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.enabled && self.matcher.is_match(text)
    }
}

fn literal_matcher(needle: &str) -> Regex {
    RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .expect("escaped literal compiles")
}

/// Immutable set of keyword rules for one session
#[derive(Clone, Debug, Default)]
pub struct KeywordSet {
    rules: Vec<KeywordRule>,
}

impl KeywordSet {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// Names of every enabled rule matching `text`. All matching rules
    /// apply; a line may carry zero, one, or many tags.
    pub fn classify(&self, text: &str) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(text))
            .map(|rule| rule.name.clone())
            .collect()
    }

    /// Display color for a tag name
    pub fn color_for(&self, tag: &str) -> Option<Color> {
        self.rules
            .iter()
            .find(|rule| rule.name == tag)
            .map(|rule| rule.color)
    }
}

/// Style the matched ranges of `text` with their rule colors.
///
/// Rules apply in configuration order and earlier rules win overlapping
/// ranges, so the result is deterministic for a given rule set.
pub fn highlight_line(text: &str, set: &KeywordSet) -> Line<'static> {
    let mut ranges: Vec<(usize, usize, Color)> = Vec::new();
    for rule in set.rules().iter().filter(|r| r.enabled) {
        for m in rule.matcher.find_iter(text) {
            let overlaps = ranges
                .iter()
                .any(|&(start, end, _)| m.start() < end && start < m.end());
            if !overlaps {
                ranges.push((m.start(), m.end(), rule.color));
            }
        }
    }

    if ranges.is_empty() {
        return Line::from(text.to_string());
    }
    ranges.sort_by_key(|&(start, _, _)| start);

    let mut spans = Vec::with_capacity(ranges.len() * 2 + 1);
    let mut cursor = 0;
    for (start, end, color) in ranges {
        if start > cursor {
            spans.push(Span::raw(text[cursor..start].to_string()));
        }
        spans.push(Span::styled(
            text[start..end].to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        cursor = end;
    }
    if cursor < text.len() {
        spans.push(Span::raw(text[cursor..].to_string()));
    }
    Line::from(spans)
}

/// Map a configured color name to a terminal color, defaulting to white
pub fn parse_color(name: &str) -> Color {
    match name.to_ascii_lowercase().as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "gray" | "grey" => Color::Gray,
        "darkgray" | "darkgrey" => Color::DarkGray,
        "lightred" => Color::LightRed,
        "lightgreen" => Color::LightGreen,
        "lightyellow" => Color::LightYellow,
        "lightblue" => Color::LightBlue,
        "lightmagenta" => Color::LightMagenta,
        "lightcyan" => Color::LightCyan,
        _ => Color::White,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> KeywordSet {
        KeywordSet::new(vec![
            KeywordRule::substring("error", Color::Red, true),
            KeywordRule::substring("warning", Color::Yellow, true),
            KeywordRule::substring("fail", Color::Red, false),
        ])
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let set = sample_set();
        assert_eq!(set.classify("an ERROR occurred"), vec!["error"]);
    }

    #[test]
    fn test_classify_applies_all_matching_rules() {
        let set = sample_set();
        assert_eq!(
            set.classify("error with warning"),
            vec!["error", "warning"]
        );
    }

    #[test]
    fn test_disabled_rules_never_match() {
        let set = sample_set();
        assert!(set.classify("build failed").is_empty());
    }

    #[test]
    fn test_classify_returns_empty_for_clean_lines() {
        let set = sample_set();
        assert!(set.classify("all good").is_empty());
    }

    #[test]
    fn test_regex_rule_matches_pattern_not_name() {
        let rule = KeywordRule::pattern("warn", r"warn(ing)?", true, Color::Yellow, true);
        assert!(rule.matches("WARNING: deprecated"));
        assert!(rule.matches("warn: low disk"));
        assert!(!rule.matches("informational"));
    }

    #[test]
    fn test_invalid_regex_degrades_to_substring() {
        let rule = KeywordRule::pattern("broken", "fail[", true, Color::Red, true);
        assert!(rule.matches("this fail[ here"));
        assert!(!rule.matches("failure"));
    }

    #[test]
    fn test_highlight_is_deterministic() {
        let set = sample_set();
        let a = highlight_line("error before warning", &set);
        let b = highlight_line("error before warning", &set);
        assert_eq!(a, b);
    }

    #[test]
    fn test_highlight_first_rule_wins_overlaps() {
        let set = KeywordSet::new(vec![
            KeywordRule::substring("errors", Color::Red, true),
            KeywordRule::substring("error", Color::Yellow, true),
        ]);
        let line = highlight_line("errors here", &set);
        // "errors" claimed the range, "error" cannot restyle part of it
        let styled: Vec<_> = line
            .spans
            .iter()
            .filter(|s| s.style.fg == Some(Color::Red))
            .collect();
        assert_eq!(styled.len(), 1);
        assert_eq!(styled[0].content, "errors");
        assert!(line.spans.iter().all(|s| s.style.fg != Some(Color::Yellow)));
    }

    #[test]
    fn test_highlight_preserves_full_text() {
        let set = sample_set();
        let line = highlight_line("an error and a warning here", &set);
        let joined: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(joined, "an error and a warning here");
    }

    #[test]
    fn test_parse_color_known_and_fallback() {
        assert_eq!(parse_color("red"), Color::Red);
        assert_eq!(parse_color("Yellow"), Color::Yellow);
        assert_eq!(parse_color("chartreuse"), Color::White);
    }
}
