//! Delimiters of the snapshot container format
//!
//! Both the writer and the reader go through this module, so the two sides
//! cannot drift apart. A document looks like this:
//!
//! ````text
//! # Codebase Snapshot              <- optional header, free text
//!
//! ## `src/main.rs`                 <- path header
//!
//! ```rust                          <- opening fence + language tag
//! fn main() {}
//! ```                              <- closing fence, same sequence
//!
//! <!-- CODE_ASSEMBLER_MANIFEST     <- trailer, invisible when rendered
//! { "generated_at": "...", "files": [ ... ] }
//! -->
//! ````
//!
//! Fences are sized per file: one backtick longer than the longest backtick
//! run in the content, never shorter than three.

/// Opening marker of the current manifest trailer
pub const MANIFEST_MARKER: &str = "CODE_ASSEMBLER_MANIFEST";

/// Opening marker of the older minute-resolution trailer
pub const LEGACY_MANIFEST_MARKER: &str = "CODE_ASSEMBLER_METADATA";

/// HTML comment terminator
pub const COMMENT_CLOSE: &str = "-->";

const MIN_FENCE: usize = 3;
const TRUNCATION_PREFIX: &str = "... [TRUNCATED: ";
const TRUNCATION_SUFFIX: &str = " more lines omitted] ...";

/// Which trailer a comment line opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailerKind {
    /// `CODE_ASSEMBLER_MANIFEST`
    Current,
    /// `CODE_ASSEMBLER_METADATA`
    Legacy,
}

/// A recognized opening fence line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceOpen<'a> {
    /// The delimiter sequence that must close the block
    pub delimiter: &'a str,
    /// Language tag after the delimiter (may be empty)
    pub language: &'a str,
}

/// Fence delimiter that no line of `content` can match
pub fn fence_for(content: &str) -> String {
    "`".repeat((longest_backtick_run(content) + 1).max(MIN_FENCE))
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for ch in text.chars() {
        if ch == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest
}

/// Inline code span for `text`
///
/// The delimiter is one backtick longer than any run inside `text`, and a
/// space pads text that starts or ends with a backtick.
pub fn code_span(text: &str) -> String {
    let quote = "`".repeat(longest_backtick_run(text) + 1);
    if text.starts_with('`') || text.ends_with('`') {
        format!("{} {} {}", quote, text, quote)
    } else {
        format!("{}{}{}", quote, text, quote)
    }
}

/// Path header line for a body section
pub fn path_header(path: &str) -> String {
    format!("## {}", code_span(path))
}

/// Extract the path from a header line such as ``## `src/lib.rs` ``
///
/// Any number of `#` is accepted. The path ends at the first backtick run
/// as long as the opening one; text after it is ignored, so older and
/// hand-written headers with notes still match.
pub fn parse_path_header(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let rest = trimmed.trim_start_matches('#');
    if rest.len() == trimmed.len() || !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let quoted = rest.trim_start();
    let open = quoted.len() - quoted.trim_start_matches('`').len();
    if open == 0 {
        return None;
    }
    let inner = &quoted[open..];
    let end = closing_run(inner, open)?;
    let path = inner[..end].trim();
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Byte offset of the first backtick run of exactly `len` in `text`
fn closing_run(text: &str, len: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let start = i;
            while i < bytes.len() && bytes[i] == b'`' {
                i += 1;
            }
            if i - start == len {
                return Some(start);
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Recognize an opening fence: three or more backticks or tildes
pub fn parse_fence_open(line: &str) -> Option<FenceOpen<'_>> {
    let trimmed = line.trim();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = trimmed.len() - trimmed.trim_start_matches(marker).len();
    if run < MIN_FENCE {
        return None;
    }

    let (delimiter, language) = trimmed.split_at(run);
    let language = language.trim();
    if marker == '`' && language.contains('`') {
        return None;
    }
    Some(FenceOpen { delimiter, language })
}

/// Whether `line` closes a fence opened with `delimiter`
pub fn is_fence_close(line: &str, delimiter: &str) -> bool {
    line.trim() == delimiter
}

/// Recognize the first line of a manifest trailer
pub fn parse_trailer_open(line: &str) -> Option<TrailerKind> {
    let rest = line.trim().strip_prefix("<!--")?.trim_start();
    if rest.starts_with(MANIFEST_MARKER) {
        Some(TrailerKind::Current)
    } else if rest.starts_with(LEGACY_MANIFEST_MARKER) {
        Some(TrailerKind::Legacy)
    } else {
        None
    }
}

/// Visible in-body line noting how much of a file was dropped
pub fn truncation_marker(omitted_lines: usize) -> String {
    format!("{}{}{}", TRUNCATION_PREFIX, omitted_lines, TRUNCATION_SUFFIX)
}

/// Parse a line produced by [`truncation_marker`]
pub fn parse_truncation_marker(line: &str) -> Option<usize> {
    line.trim()
        .strip_prefix(TRUNCATION_PREFIX)?
        .strip_suffix(TRUNCATION_SUFFIX)?
        .parse()
        .ok()
}

/// Make serialized JSON safe to embed in an HTML comment
///
/// `>` only occurs inside JSON strings, where `\u003e` is an equivalent
/// escape, so the result parses back to the same value.
pub fn escape_comment_body(json: &str) -> String {
    json.replace(COMMENT_CLOSE, "--\\u003e")
}
