/// Split a raw completion into candidate triple strings.
///
/// Segments are trimmed and empty ones dropped. Fields are not inspected here;
/// that happens when the graph is built.
pub fn parse_triples(response: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        let trimmed = response.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    response
        .split(delimiter)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::TRIPLE_DELIMITER;
    use proptest::prelude::*;

    #[test]
    fn test_split_and_trim() {
        let raw = " (Nevada, is a, state)<|>\n(Nevada, is in, US) ";

        assert_eq!(
            parse_triples(raw, TRIPLE_DELIMITER),
            vec!["(Nevada, is a, state)", "(Nevada, is in, US)"]
        );
    }

    #[test]
    fn test_empty_segments_dropped() {
        assert_eq!(
            parse_triples("<|>(A, B, C)<|> <|><|>", TRIPLE_DELIMITER),
            vec!["(A, B, C)"]
        );
    }

    #[test]
    fn test_blank_response_yields_nothing() {
        assert!(parse_triples("", TRIPLE_DELIMITER).is_empty());
        assert!(parse_triples("  \n\t ", TRIPLE_DELIMITER).is_empty());
        assert!(parse_triples("<|>  <|>", TRIPLE_DELIMITER).is_empty());
    }

    #[test]
    fn test_empty_delimiter_keeps_whole_text() {
        assert_eq!(parse_triples(" (A, B, C) ", ""), vec!["(A, B, C)"]);
    }

    proptest! {
        #[test]
        fn prop_resplitting_a_segment_is_identity(raw in ".{0,200}") {
            for segment in parse_triples(&raw, TRIPLE_DELIMITER) {
                prop_assert_eq!(parse_triples(&segment, TRIPLE_DELIMITER), vec![segment.clone()]);
            }
        }

        #[test]
        fn prop_segments_are_trimmed_and_non_empty(
            parts in proptest::collection::vec("[ a-zA-Z,()]{0,12}", 0..8)
        ) {
            let raw = parts.join(TRIPLE_DELIMITER);
            for segment in parse_triples(&raw, TRIPLE_DELIMITER) {
                prop_assert!(!segment.is_empty());
                prop_assert_eq!(segment.trim(), segment.as_str());
                prop_assert!(!segment.contains(TRIPLE_DELIMITER));
            }
        }
    }
}
