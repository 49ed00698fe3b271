//! Pattern matching over accumulated terminal output.

use std::fmt;
use std::time::Duration;

use memchr::memmem::Finder;
use regex::bytes::Regex;

/// Where in the buffer a pattern may match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    /// Anywhere in the buffer (substring match).
    #[default]
    Anywhere,

    /// At the end of the buffer, ignoring trailing spaces. Used for prompts,
    /// which the device prints last and then waits.
    End,
}

#[derive(Clone)]
enum Matcher {
    Literal(Finder<'static>),
    Regex(Regex),
}

/// A compiled pattern: literal bytes or a regex, plus its anchoring.
#[derive(Clone)]
pub struct Pattern {
    label: String,
    matcher: Matcher,
    anchor: Anchor,
}

impl Pattern {
    /// Literal substring pattern.
    pub fn literal(text: impl AsRef<[u8]>) -> Self {
        let text = text.as_ref();
        Self {
            label: String::from_utf8_lossy(text).into_owned(),
            matcher: Matcher::Literal(Finder::new(text).into_owned()),
            anchor: Anchor::Anywhere,
        }
    }

    /// Regular expression pattern.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            label: pattern.to_string(),
            matcher: Matcher::Regex(Regex::new(pattern)?),
            anchor: Anchor::Anywhere,
        })
    }

    /// Set the anchoring.
    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    /// Human-readable form used in diagnostics.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The anchoring of this pattern.
    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Length of a literal pattern, `None` for regexes.
    pub fn literal_len(&self) -> Option<usize> {
        match &self.matcher {
            Matcher::Literal(finder) => Some(finder.needle().len()),
            Matcher::Regex(_) => None,
        }
    }

    /// Byte range of the first match in `data`.
    ///
    /// End-anchored matches extend over any trailing spaces so nothing of
    /// the prompt line is left behind.
    pub fn find(&self, data: &[u8]) -> Option<(usize, usize)> {
        match self.anchor {
            Anchor::Anywhere => match &self.matcher {
                Matcher::Literal(finder) => finder
                    .find(data)
                    .map(|start| (start, start + finder.needle().len())),
                Matcher::Regex(re) => re.find(data).map(|m| (m.start(), m.end())),
            },
            Anchor::End => {
                let trimmed = trim_trailing_spaces(data);
                let start = match &self.matcher {
                    Matcher::Literal(finder) => {
                        let needle = finder.needle();
                        if needle.is_empty() || !trimmed.ends_with(needle) {
                            return None;
                        }
                        trimmed.len() - needle.len()
                    }
                    Matcher::Regex(re) => re
                        .find_iter(trimmed)
                        .find(|m| m.end() == trimmed.len())?
                        .start(),
                };
                Some((start, data.len()))
            }
        }
    }

    /// Check if the data matches the pattern.
    pub fn is_match(&self, data: &[u8]) -> bool {
        self.find(data).is_some()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.matcher {
            Matcher::Literal(_) => "literal",
            Matcher::Regex(_) => "regex",
        };
        f.debug_struct("Pattern")
            .field("label", &self.label)
            .field("kind", &kind)
            .field("anchor", &self.anchor)
            .finish()
    }
}

fn trim_trailing_spaces(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|&b| b != b' ')
        .map(|pos| pos + 1)
        .unwrap_or(0);
    &data[..end]
}

/// A match of one candidate pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    /// Index of the candidate that matched.
    pub index: usize,

    /// Start offset of the match in the scanned buffer.
    pub start: usize,

    /// End offset (exclusive) of the match in the scanned buffer.
    pub end: usize,
}

/// Result of polling a matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// One of the candidates matched.
    Matched(PatternMatch),

    /// Not enough output yet.
    Pending,

    /// The wait bound elapsed without a match.
    TimedOut,
}

/// Scans a buffer for the earliest of several candidate patterns.
///
/// Purely observational: it never consumes or alters the buffer.
#[derive(Debug)]
pub struct PatternMatcher<'a> {
    candidates: Vec<&'a Pattern>,
    timeout: Duration,
}

impl<'a> PatternMatcher<'a> {
    /// Create a matcher over the candidates with a wait bound.
    pub fn new(candidates: Vec<&'a Pattern>, timeout: Duration) -> Self {
        Self {
            candidates,
            timeout,
        }
    }

    /// The wait bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Find the candidate whose match starts earliest; ties go to the
    /// candidate listed first.
    pub fn find(&self, data: &[u8]) -> Option<PatternMatch> {
        self.candidates
            .iter()
            .enumerate()
            .filter_map(|(index, pattern)| {
                pattern
                    .find(data)
                    .map(|(start, end)| PatternMatch { index, start, end })
            })
            .min_by_key(|m| (m.start, m.index))
    }

    /// Check the buffer, given how long it has been since output last arrived.
    pub fn poll(&self, data: &[u8], idle: Duration) -> MatchOutcome {
        match self.find(data) {
            Some(m) => MatchOutcome::Matched(m),
            None if idle >= self.timeout => MatchOutcome::TimedOut,
            None => MatchOutcome::Pending,
        }
    }

    /// Labels of all candidates, in order.
    pub fn labels(&self) -> Vec<String> {
        self.candidates.iter().map(|p| p.label().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_substring() {
        let pattern = Pattern::literal("password:");
        assert_eq!(pattern.find(b"alice@r1's password: "), Some((11, 20)));
        assert!(!pattern.is_match(b"alice@r1's passw"));
    }

    #[test]
    fn test_end_anchor_prompt() {
        let prompt = Pattern::literal("r1#").with_anchor(Anchor::End);
        assert_eq!(prompt.find(b"line1\nr1#"), Some((6, 9)));
        assert_eq!(prompt.find(b"line1\nr1# "), Some((6, 10)));
        // Mid-buffer occurrence is not a prompt
        assert!(!prompt.is_match(b"r1#\nmore output"));
        assert!(!prompt.is_match(b""));
    }

    #[test]
    fn test_regex_end_anchor() {
        let prompt = Pattern::regex(r"<[\w-]+>").unwrap().with_anchor(Anchor::End);
        assert_eq!(prompt.find(b"text <sw-1>"), Some((5, 11)));
        assert!(!prompt.is_match(b"<sw-1> text"));
    }

    #[test]
    fn test_matcher_prefers_earliest() {
        let more = Pattern::literal("--More--");
        let prompt = Pattern::literal("r1#").with_anchor(Anchor::End);
        let matcher = PatternMatcher::new(vec![&prompt, &more], Duration::from_secs(30));

        let m = matcher.find(b"page one\n --More-- ").unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.start, 10);

        let m = matcher.find(b"last page\nr1#").unwrap();
        assert_eq!(m.index, 0);
    }

    #[test]
    fn test_matcher_tie_goes_to_first() {
        let a = Pattern::literal("abc");
        let b = Pattern::literal("ab");
        let matcher = PatternMatcher::new(vec![&a, &b], Duration::from_secs(1));
        assert_eq!(matcher.find(b"xabc").unwrap().index, 0);
    }

    #[test]
    fn test_poll_outcomes() {
        let prompt = Pattern::literal("r1>");
        let matcher = PatternMatcher::new(vec![&prompt], Duration::from_secs(30));

        assert_eq!(matcher.poll(b"banner", Duration::from_secs(1)), MatchOutcome::Pending);
        assert_eq!(matcher.poll(b"banner", Duration::from_secs(30)), MatchOutcome::TimedOut);
        assert!(matches!(
            matcher.poll(b"banner\nr1>", Duration::from_secs(31)),
            MatchOutcome::Matched(PatternMatch { index: 0, .. })
        ));
        assert_eq!(matcher.labels(), vec!["r1>".to_string()]);
    }
}
