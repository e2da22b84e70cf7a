//! Conversion of raw log lines into [`LogRecord`]s.
//!
//! Lines produced by a stream opened with timestamps enabled look like
//! `2019-04-08T12:25:45.321635324Z message text`. The leading token is kept
//! verbatim as the record timestamp. Anything that does not look like that
//! degrades to the sentinel timestamp with the whole line as content;
//! normalization never fails.

use crate::types::{LogRecord, LogTimestamp, RecordSequence};

/// Normalizes raw lines from one source into a record sequence.
///
/// Empty lines are dropped. A trailing `\n` or `\r\n` is stripped before
/// inspection.
#[must_use]
pub fn normalize<I, S>(source_id: &str, lines: I, timestamps_requested: bool) -> RecordSequence
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| normalize_line(source_id, line.as_ref(), timestamps_requested))
        .collect()
}

/// Normalizes a single line, returning `None` if it is empty.
#[must_use]
pub fn normalize_line(
    source_id: &str,
    line: &str,
    timestamps_requested: bool,
) -> Option<LogRecord> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return None;
    }

    if timestamps_requested && line.starts_with(|c: char| c.is_ascii_digit()) {
        if let Some((timestamp, content)) = split_timestamp(line) {
            return Some(LogRecord::line(
                LogTimestamp::new(timestamp),
                source_id,
                content,
            ));
        }
    }

    Some(LogRecord::line(LogTimestamp::sentinel(), source_id, line))
}

fn split_timestamp(line: &str) -> Option<(&str, &str)> {
    match line.find(' ') {
        Some(idx) if idx > 0 => Some((&line[..idx], &line[idx + 1..])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn splits_timestamp_and_drops_empty_lines() {
        let lines = [
            "2019-04-08T12:25:45.321Z hello",
            "",
            "not-a-timestamp line",
        ];
        let records = normalize("api-1", lines, true);

        assert_eq!(records.len(), 2);
        let first = &records.as_slice()[0];
        assert_eq!(first.timestamp.as_str(), "2019-04-08T12:25:45.321Z");
        assert_eq!(first.content(), "hello");
        assert_eq!(first.source_id, "api-1");

        let second = &records.as_slice()[1];
        assert!(second.timestamp.is_sentinel());
        assert_eq!(second.content(), "not-a-timestamp line");
    }

    #[test]
    fn degraded_lines_keep_their_source() {
        let record = normalize_line("api-1", "plain text", true);
        assert_eq!(record.map(|r| r.source_id), Some("api-1".to_string()));
    }

    #[test]
    fn strips_line_terminators() {
        let record = normalize_line("a", "2019-04-08T12:25:45Z done\r\n", true);
        assert_eq!(record.as_ref().map(LogRecord::content), Some("done"));

        assert!(normalize_line("a", "\n", true).is_none());
        assert!(normalize_line("a", "\r\n", true).is_none());
    }

    #[test]
    fn detection_is_per_line() {
        let records = normalize(
            "a",
            ["plain first", "2019-04-08T12:25:45Z second"],
            true,
        );
        assert!(records.as_slice()[0].timestamp.is_sentinel());
        assert_eq!(
            records.as_slice()[1].timestamp.as_str(),
            "2019-04-08T12:25:45Z"
        );
    }

    #[test_case("2019-04-08T12:25:45Z hello", true, "2019-04-08T12:25:45Z", "hello" ; "timestamped")]
    #[test_case("2019-04-08T12:25:45Z hello", false, "0", "2019-04-08T12:25:45Z hello" ; "timestamps not requested")]
    #[test_case("12345", true, "0", "12345" ; "digit without space")]
    #[test_case("42 is the answer", true, "42", "is the answer" ; "any digit token")]
    #[test_case("2019-04-08T12:25:45Z ", true, "2019-04-08T12:25:45Z", "" ; "empty content")]
    #[test_case("  indented", true, "0", "  indented" ; "leading space")]
    fn normalize_line_cases(line: &str, requested: bool, ts: &str, content: &str) {
        let record = normalize_line("src", line, requested);
        assert_eq!(
            record.as_ref().map(|r| (r.timestamp.as_str(), r.content())),
            Some((ts, content))
        );
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(
            lines in proptest::collection::vec("[0-9a-zA-Z :.\\-]{0,40}", 0..32),
            requested in any::<bool>(),
        ) {
            let first = normalize("src", &lines, requested);
            let second = normalize("src", &lines, requested);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_never_emits_empty_input_lines(
            lines in proptest::collection::vec("[a-z0-9 ]{0,8}", 0..32),
        ) {
            let expected = lines.iter().filter(|l| !l.is_empty()).count();
            prop_assert_eq!(normalize("src", &lines, true).len(), expected);
        }
    }
}
