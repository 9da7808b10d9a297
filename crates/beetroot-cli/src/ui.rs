//! UI utilities for Beetroot CLI.

use std::path::PathBuf;
use std::time::Duration;

const RULE_WIDTH: usize = 60;

/// Print signal text framed so it is easy to select and copy.
///
/// The text itself stays on one line.
pub fn print_signal(heading: &str, text: &str) {
    println!();
    println!("  {heading}");
    println!("  {}", "─".repeat(RULE_WIDTH));
    println!("{text}");
    println!("  {}", "─".repeat(RULE_WIDTH));
    println!();
}

/// Parse a duration string like "250ms", "30s", "5m", or "1h".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(num_str) = s.strip_suffix("ms") {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_millis(num))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_secs(num * 60))
    } else if let Some(num_str) = s.strip_suffix('s') {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_secs(num))
    } else if let Some(num_str) = s.strip_suffix('h') {
        let num: u64 = num_str.parse().ok()?;
        Some(Duration::from_secs(num * 3600))
    } else {
        None
    }
}

/// Format a duration the way `parse_duration` reads it.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Split a command line into words, honoring double quotes.
///
/// `send "my file.txt" b.txt` gives `["send", "my file.txt", "b.txt"]`.
pub fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_word = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if has_word {
        words.push(current);
    }
    words
}

/// Paths named on a `send` line.
pub fn parse_paths(args: &str) -> Vec<PathBuf> {
    split_words(args).into_iter().map(PathBuf::from).collect()
}

/// Collects pasted signal text that may span several lines.
///
/// A paste is complete once the braces of the JSON object balance. Braces
/// inside strings are not counted.
#[derive(Debug, Default)]
pub struct SignalBuffer {
    text: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl SignalBuffer {
    /// Whether a paste is in progress.
    pub fn is_collecting(&self) -> bool {
        !self.text.is_empty()
    }

    /// Add a line; returns the whole paste once it is complete.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        for c in line.chars() {
            if self.in_string {
                match c {
                    _ if self.escaped => self.escaped = false,
                    '\\' => self.escaped = true,
                    '"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
        }

        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(line);

        if self.depth == 0 && !self.in_string {
            let done = std::mem::take(&mut self.text);
            self.escaped = false;
            Some(done)
        } else {
            None
        }
    }

    /// Abandon the paste in progress and return what was collected.
    pub fn take(&mut self) -> Option<String> {
        let text = std::mem::take(&mut self.text);
        *self = Self::default();
        (!text.is_empty()).then_some(text)
    }
}
