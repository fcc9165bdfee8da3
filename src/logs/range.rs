//! Line-range extraction over stored command output.
//!
//! Indices are 1-based and inclusive. Negative indices count from the end:
//! `-1` is the last line, `-N` the N-th last.

use crate::error::LogQueryError;
use crate::truncate::split_lines;

/// Return lines `[start, end]` of `text`, prefixed with a `Lines A-B of T:`
/// header and optionally per-line `N: ` numbers.
pub fn slice_lines(
    text: &str,
    start: i64,
    end: i64,
    include_line_numbers: bool,
) -> Result<String, LogQueryError> {
    let lines = split_lines(text);
    let total = lines.len() as i64;

    let actual_start = if start < 0 { total + start + 1 } else { start };
    let actual_end = if end < 0 { total + end + 1 } else { end };

    if actual_start < 1 {
        return Err(LogQueryError::InvalidRange(format!(
            "start line {start} resolves to {actual_start}, before line 1"
        )));
    }
    if actual_end > total {
        return Err(LogQueryError::InvalidRange(format!(
            "end line {end} resolves to {actual_end}, past the last line ({total})"
        )));
    }
    if actual_start > actual_end {
        return Err(LogQueryError::InvalidRange(format!(
            "start line {actual_start} is after end line {actual_end}"
        )));
    }

    let mut out = format!("Lines {actual_start}-{actual_end} of {total}:");
    for (offset, line) in lines[(actual_start - 1) as usize..actual_end as usize]
        .iter()
        .enumerate()
    {
        out.push('\n');
        if include_line_numbers {
            out.push_str(&format!("{}: ", actual_start + offset as i64));
        }
        out.push_str(line);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FIVE: &str = "one\ntwo\nthree\nfour\nfive";

    #[test]
    fn plain_range() {
        let out = slice_lines(FIVE, 2, 4, false).unwrap();
        assert_eq!(out, "Lines 2-4 of 5:\ntwo\nthree\nfour");
    }

    #[test]
    fn range_with_line_numbers() {
        let out = slice_lines(FIVE, 4, 5, true).unwrap();
        assert_eq!(out, "Lines 4-5 of 5:\n4: four\n5: five");
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(
            slice_lines(FIVE, -2, -1, false).unwrap(),
            slice_lines(FIVE, 4, 5, false).unwrap()
        );
        assert_eq!(
            slice_lines(FIVE, -5, -1, false).unwrap(),
            slice_lines(FIVE, 1, 5, false).unwrap()
        );
    }

    #[test]
    fn round_trips_the_underlying_lines() {
        let out = slice_lines(FIVE, 2, 4, false).unwrap();
        let body = out.split_once('\n').unwrap().1;
        assert_eq!(body, FIVE.split('\n').collect::<Vec<_>>()[1..4].join("\n"));
    }

    #[rstest]
    #[case(0, 3)]
    #[case(-9, 2)]
    #[case(1, 6)]
    #[case(4, 2)]
    #[case(-1, -3)]
    fn out_of_bounds_and_inverted_ranges(#[case] start: i64, #[case] end: i64) {
        let err = slice_lines(FIVE, start, end, false).unwrap_err();
        assert!(matches!(err, LogQueryError::InvalidRange(_)));
    }

    #[test]
    fn single_line_text() {
        assert_eq!(slice_lines("only", 1, 1, false).unwrap(), "Lines 1-1 of 1:\nonly");
        assert_eq!(slice_lines("only", -1, -1, false).unwrap(), "Lines 1-1 of 1:\nonly");
    }
}
