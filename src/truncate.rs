//! Tail truncation of captured command output.
//!
//! Line counting splits on `\n`; a `\r\n` sequence counts as one line break
//! and the original bytes are preserved in whatever is returned. Empty input
//! is a single zero-length line and is never truncated.

/// Number of lines in `s`, counting the empty string as one line. A single
/// trailing newline terminates the last line rather than starting a new one.
pub fn count_lines(s: &str) -> usize {
    split_lines(s).len()
}

/// Split into lines the way the line counters and processors see them: the
/// empty string is one empty line, and a trailing newline does not produce a
/// trailing empty line.
pub fn split_lines(s: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = s.split('\n').collect();
    if lines.len() > 1 && lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

/// Result of a line-based tail truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    /// Banner plus retained tail when truncated, the input unchanged when not.
    pub text: String,
    pub was_truncated: bool,
    pub total_lines: usize,
    pub returned_lines: usize,
}

/// Keep the last `max_lines` lines of `output`, prefixed with a banner that
/// names the execution id holding the full output.
pub fn truncate_lines(output: &str, max_lines: usize, execution_id: &str) -> Truncation {
    let max_lines = max_lines.max(1);
    let total = count_lines(output);
    if total <= max_lines {
        return Truncation {
            text: output.to_string(),
            was_truncated: false,
            total_lines: total,
            returned_lines: total,
        };
    }

    let omitted = total - max_lines;
    let mut offset = 0;
    for _ in 0..omitted {
        // Safe: `omitted < total` guarantees a newline remains ahead
        offset += output[offset..].find('\n').map(|i| i + 1).unwrap_or(0);
    }
    let tail = &output[offset..];

    let banner = format!(
        "[Output truncated: showing last {max_lines} of {total} lines; omitted {omitted}; \
         full output at cli://logs/commands/{execution_id}]"
    );
    Truncation {
        text: format!("{banner}\n\n{tail}"),
        was_truncated: true,
        total_lines: total,
        returned_lines: max_lines,
    }
}

/// Keep a tail of `s` no larger than `max_bytes`, cutting at a line boundary
/// where one exists in the retained window.
pub fn tail_within_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut cut = s.len() - max_bytes;
    while !s.is_char_boundary(cut) {
        cut += 1;
    }
    if cut > 0 && s.as_bytes()[cut - 1] == b'\n' {
        return &s[cut..];
    }
    match s[cut..].find('\n') {
        Some(nl) => &s[cut + nl + 1..],
        // A single line longer than the budget: keep the char-aligned tail
        None => &s[cut..],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ten_lines() -> String {
        (1..=10).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn short_output_passes_through() {
        let result = truncate_lines("hello\nworld", 20, "id");
        assert!(!result.was_truncated);
        assert_eq!(result.text, "hello\nworld");
        assert_eq!(result.total_lines, 2);
        assert_eq!(result.returned_lines, 2);
    }

    #[test]
    fn empty_output_is_one_line() {
        assert_eq!(count_lines(""), 1);
        let result = truncate_lines("", 1, "id");
        assert!(!result.was_truncated);
        assert_eq!(result.returned_lines, 1);
    }

    #[test]
    fn trailing_newline_terminates_the_last_line() {
        assert_eq!(count_lines("hello\n"), 1);
        assert_eq!(count_lines("a\nb\n"), 2);
        assert_eq!(count_lines("a\nb"), 2);
        assert_eq!(count_lines("\n"), 1);
    }

    #[test]
    fn keeps_the_last_lines_with_banner() {
        let result = truncate_lines(&ten_lines(), 3, "20260801-101500-ab12");
        assert!(result.was_truncated);
        assert_eq!(result.total_lines, 10);
        assert_eq!(result.returned_lines, 3);
        assert!(result.text.starts_with(
            "[Output truncated: showing last 3 of 10 lines; omitted 7; \
             full output at cli://logs/commands/20260801-101500-ab12]"
        ));
        assert!(result.text.ends_with("line8\nline9\nline10"));
    }

    #[test]
    fn crlf_counts_as_one_break_and_bytes_survive() {
        let input = "a\r\nb\r\nc";
        let result = truncate_lines(input, 2, "id");
        assert_eq!(result.total_lines, 3);
        // The retained tail keeps its \r\n bytes untouched
        assert!(result.text.ends_with("b\r\nc"));
    }

    #[test]
    fn truncation_is_idempotent_after_stripping_the_banner() {
        let first = truncate_lines(&ten_lines(), 3, "id");
        // banner, blank separator, then the tail
        let tail = first.text.splitn(3, '\n').nth(2).unwrap();
        let second = truncate_lines(tail, 3, "id");
        assert!(!second.was_truncated);
        assert_eq!(second.text, tail);
    }

    #[test]
    fn byte_tail_prefers_line_boundaries() {
        let s = "aaaa\nbbbb\ncccc";
        assert_eq!(tail_within_bytes(s, 7), "cccc");
        assert_eq!(tail_within_bytes(s, s.len()), s);
    }

    #[test]
    fn byte_tail_of_one_long_line_cuts_at_char_boundary() {
        let s = "é".repeat(100);
        let tail = tail_within_bytes(&s, 11);
        assert!(tail.len() <= 11);
        assert!(tail.chars().all(|c| c == 'é'));
    }

    #[test]
    fn byte_tail_lands_on_existing_line_start() {
        let s = "aaa\nbbb";
        // budget exactly covers "bbb" plus nothing of the newline
        assert_eq!(tail_within_bytes(s, 3), "bbb");
    }
}
