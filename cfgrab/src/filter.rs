//! Post-capture filtering of volatile configuration lines.
//!
//! Some devices print lines that change on every retrieval, such as
//! timestamps. A [`FilterConfig`] from the inventory removes or rewrites
//! them before the capture is stored.

use log::warn;
use regex::bytes::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// Filter settings for one device, as written in the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Lines dropped from the start of the capture.
    #[serde(default)]
    pub trim_lines_head: usize,

    /// Lines dropped from the end of the capture.
    #[serde(default)]
    pub trim_lines_tail: usize,

    /// Lines matching any of these regexes are removed.
    #[serde(default)]
    pub filter_patterns: Vec<String>,

    /// `(regex, replacement)` pairs applied to every line, in order.
    #[serde(default)]
    pub replace_patterns: Vec<(String, String)>,
}

impl FilterConfig {
    /// Compile the patterns.
    pub fn compile(&self) -> Result<OutputFilter, ConfigError> {
        let drop = self
            .filter_patterns
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let replace = self
            .replace_patterns
            .iter()
            .map(|(pattern, replacement)| Ok((compile(pattern)?, replacement.clone().into_bytes())))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(OutputFilter {
            head: self.trim_lines_head,
            tail: self.trim_lines_tail,
            drop,
            replace,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidFilter {
        pattern: pattern.to_string(),
        source,
    })
}

/// A compiled [`FilterConfig`].
#[derive(Debug, Clone)]
pub struct OutputFilter {
    head: usize,
    tail: usize,
    drop: Vec<Regex>,
    replace: Vec<(Regex, Vec<u8>)>,
}

impl OutputFilter {
    /// Filter captured bytes line by line.
    ///
    /// Order: trim the head, apply replacements, drop matching lines, strip
    /// trailing whitespace, trim the tail. Lines are joined with `\n`.
    pub fn apply(&self, data: &[u8]) -> Vec<u8> {
        let mut lines: Vec<Vec<u8>> = split_lines(data)
            .skip(self.head)
            .map(|line| {
                self.replace.iter().fold(line.to_vec(), |line, (re, with)| {
                    re.replace_all(&line, with.as_slice()).into_owned()
                })
            })
            .filter(|line| !self.drop.iter().any(|re| re.is_match(line)))
            .map(|mut line| {
                let end = line
                    .iter()
                    .rposition(|b| !b.is_ascii_whitespace())
                    .map_or(0, |pos| pos + 1);
                line.truncate(end);
                line
            })
            .collect();

        if self.tail > lines.len() {
            warn!("no lines remain after trimming {} tail lines", self.tail);
        }
        lines.truncate(lines.len().saturating_sub(self.tail));

        let mut out = lines.join(&b'\n');
        if !out.is_empty() {
            out.push(b'\n');
        }
        out
    }
}

/// Lines without their `\n`, with no empty line after a final terminator.
fn split_lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let data = data.strip_suffix(b"\n").unwrap_or(data);
    data.split(|&b| b == b'\n').filter(move |_| !data.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &[u8] = b"Building configuration...\r\n\
        Current configuration : 1520 bytes\r\n\
        ! Last configuration change at 10:14:03 UTC Mon Oct 19 2026   \r\n\
        hostname r1\r\n\
        ntp clock-period 36028797\r\n\
        username backup secret 5 $1$abcd$efgh\r\n\
        end\r\n";

    fn filter(config: FilterConfig) -> OutputFilter {
        config.compile().unwrap()
    }

    #[test]
    fn test_empty_filter_normalizes_line_endings() {
        let out = filter(FilterConfig::default()).apply(b"a  \r\nb\r\n");
        assert_eq!(out, b"a\nb\n");
    }

    #[test]
    fn test_full_filter() {
        let config = FilterConfig {
            trim_lines_head: 2,
            trim_lines_tail: 1,
            filter_patterns: vec![r"^! Last configuration change".to_string(), "ntp clock-period".to_string()],
            replace_patterns: vec![(r"secret 5 \S+".to_string(), "secret 5 <removed>".to_string())],
        };
        let out = filter(config).apply(DUMP);
        assert_eq!(out, b"hostname r1\nusername backup secret 5 <removed>\n");
    }

    #[test]
    fn test_overlong_tail_trim_yields_nothing() {
        let config = FilterConfig {
            trim_lines_tail: 50,
            ..Default::default()
        };
        assert!(filter(config).apply(DUMP).is_empty());
        assert!(filter(FilterConfig::default()).apply(b"").is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = FilterConfig {
            filter_patterns: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.compile(),
            Err(ConfigError::InvalidFilter { ref pattern, .. }) if pattern == "(unclosed"
        ));
    }

    #[test]
    fn test_deserialize_legacy_shape() {
        let config: FilterConfig = serde_json::from_value(serde_json::json!({
            "trim_lines_head": 3,
            "replace_patterns": [["uptime is .*", "uptime is <removed>"]],
        }))
        .unwrap();
        assert_eq!(config.trim_lines_head, 3);
        assert_eq!(config.replace_patterns.len(), 1);
        assert!(config.filter_patterns.is_empty());
    }
}
