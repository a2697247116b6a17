//! Splits an assistant reply into named sections.
//!
//! The reply is a sequence of lines. A trimmed line ending in `:` is a heading and
//! starts a section named by the line minus that colon. Following non-empty lines
//! are joined with `\n` into the section body. Lines before the first heading are
//! dropped. A repeated heading resets its body but keeps its original position.
use std::panic;

use heart_common::sections::{SectionMap, CANONICAL_SECTIONS, RECOMMENDATION};
use tracing::warn;

pub fn sectionize(text: &str) -> SectionMap {
    let mut sections = SectionMap::new();
    let mut current: Option<String> = None;

    for line in text.split('\n') {
        let line = line.trim();

        if let Some(heading) = line.strip_suffix(':') {
            sections.insert(heading.to_string(), String::new());
            current = Some(heading.to_string());
            continue;
        }

        let Some(name) = current.as_ref() else {
            continue;
        };
        if line.is_empty() {
            continue;
        }

        let body = sections.entry(name.clone()).or_default();
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str(line);
    }

    sections
}

/// Four canonical sections with the whole reply filed under "Recommendation".
pub fn fallback_sections(text: &str) -> SectionMap {
    CANONICAL_SECTIONS
        .iter()
        .map(|&name| {
            let body = if name == RECOMMENDATION {
                text.to_string()
            } else {
                String::new()
            };
            (name.to_string(), body)
        })
        .collect()
}

/// `sectionize`, degrading to `fallback_sections` if parsing panics.
pub fn sectionize_or_fallback(text: &str) -> SectionMap {
    sectionize_with(text, sectionize)
}

fn sectionize_with<F>(text: &str, parse: F) -> SectionMap
where
    F: FnOnce(&str) -> SectionMap + panic::UnwindSafe,
{
    panic::catch_unwind(|| parse(text)).unwrap_or_else(|_| {
        warn!(len = text.len(), "sectionizing failed, using fallback sections");
        fallback_sections(text)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use heart_common::sections::{CONSULT_OTHER_TEAMS, NEXT_STEPS, RATIONALE};

    fn keys(map: &SectionMap) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[test]
    fn splits_headings_in_order() {
        let map = sectionize("Recommendation:\nDo X\nRationale:\nBecause Y");
        assert_eq!(keys(&map), vec!["Recommendation", "Rationale"]);
        assert_eq!(map["Recommendation"], "Do X");
        assert_eq!(map["Rationale"], "Because Y");
    }

    #[test]
    fn body_lines_are_trimmed_and_joined() {
        let map = sectionize("Next Steps:\n  Book the echo.  \n\n   Review in clinic.\n");
        assert_eq!(map["Next Steps"], "Book the echo.\nReview in clinic.");
    }

    #[test]
    fn no_headings_yields_empty_map() {
        assert!(sectionize("Just a paragraph\nwith two lines").is_empty());
        assert!(sectionize("").is_empty());
    }

    #[test]
    fn preamble_before_first_heading_is_dropped() {
        let map = sectionize("Thanks for the question.\n\nRecommendation:\nNone needed");
        assert_eq!(keys(&map), vec!["Recommendation"]);
        assert_eq!(map["Recommendation"], "None needed");
    }

    #[test]
    fn heading_without_body_is_empty() {
        let map = sectionize("Recommendation:\nRationale:\nBecause");
        assert_eq!(map["Recommendation"], "");
        assert_eq!(map["Rationale"], "Because");
    }

    #[test]
    fn bare_colon_is_an_empty_heading() {
        let map = sectionize(":\norphan text");
        assert_eq!(keys(&map), vec![""]);
        assert_eq!(map[""], "orphan text");
    }

    #[test]
    fn repeated_heading_overwrites_in_place() {
        let map = sectionize("A:\none\nB:\ntwo\nA:\nthree");
        assert_eq!(keys(&map), vec!["A", "B"]);
        assert_eq!(map["A"], "three");
        assert_eq!(map["B"], "two");
    }

    #[test]
    fn only_one_trailing_colon_is_removed() {
        let map = sectionize("Note::\ntext");
        assert_eq!(keys(&map), vec!["Note:"]);
    }

    #[test]
    fn crlf_lines_are_handled() {
        let map = sectionize("Recommendation:\r\nDo X\r\n");
        assert_eq!(map["Recommendation"], "Do X");
    }

    #[test]
    fn fallback_has_four_canonical_keys() {
        let map = fallback_sections("whole reply");
        assert_eq!(
            keys(&map),
            vec![RECOMMENDATION, RATIONALE, NEXT_STEPS, CONSULT_OTHER_TEAMS]
        );
        assert_eq!(map[RECOMMENDATION], "whole reply");
        assert!(map[RATIONALE].is_empty());
        assert!(map[NEXT_STEPS].is_empty());
        assert!(map[CONSULT_OTHER_TEAMS].is_empty());
    }

    #[test]
    fn sectionize_or_fallback_matches_sectionize_on_normal_input() {
        let text = "Recommendation:\nDo X\nRationale:\nBecause Y";
        assert_eq!(sectionize_or_fallback(text), sectionize(text));
        assert!(sectionize_or_fallback("no headings").is_empty());
    }

    #[test]
    fn panicking_parser_degrades_to_fallback() {
        let text = "Recommendation:\nDo X";
        let map = sectionize_with(text, |_: &str| -> SectionMap { panic!("parser bug") });
        assert_eq!(map, fallback_sections(text));
        assert_eq!(map[RECOMMENDATION], text);
        assert_eq!(map.len(), 4);
    }
}
