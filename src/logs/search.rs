//! Regex search over stored command output, with occurrence selection and a
//! context window.

use regex::RegexBuilder;

use crate::error::LogQueryError;
use crate::truncate::split_lines;

/// Context lines are clamped to this many on each side.
const MAX_CONTEXT_LINES: i64 = 20;

/// Find the `occurrence`-th line matching `pattern` and render it bracketed
/// inside up to `context_lines` lines of context on each side.
pub fn search_lines(
    text: &str,
    pattern: &str,
    context_lines: i64,
    occurrence: i64,
    case_insensitive: bool,
    include_line_numbers: bool,
) -> Result<String, LogQueryError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| LogQueryError::InvalidSearch(e.to_string()))?;

    let lines = split_lines(text);
    let matches: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| regex.is_match(line))
        .map(|(i, _)| i)
        .collect();

    let found = matches.len();
    if found == 0 {
        return Err(LogQueryError::NoMatches(pattern.to_string()));
    }
    if occurrence < 1 || occurrence as usize > found {
        return Err(LogQueryError::InvalidOccurrence {
            requested: occurrence,
            available: found,
        });
    }

    let selected = occurrence as usize;
    let match_idx = matches[selected - 1];
    let context = context_lines.clamp(0, MAX_CONTEXT_LINES) as usize;
    let window_start = match_idx.saturating_sub(context);
    let window_end = (match_idx + context).min(lines.len() - 1);

    let mut out = format!(
        "Search \"{pattern}\" found {found} occurrence(s); \
         showing occurrence {selected} of {found} at line {}",
        match_idx + 1
    );
    for (i, line) in lines
        .iter()
        .enumerate()
        .take(window_end + 1)
        .skip(window_start)
    {
        out.push('\n');
        if include_line_numbers {
            out.push_str(&format!("{}: ", i + 1));
        }
        if i == match_idx {
            out.push_str(&format!(">>> {line} <<<"));
        } else {
            out.push_str(line);
        }
    }
    if selected < found {
        out.push_str(&format!(
            "\nTo see next match, use occurrence={}",
            selected + 1
        ));
    }
    Ok(out)
}
