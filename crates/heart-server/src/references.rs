use std::sync::LazyLock;

use regex::Regex;

/// File-search citations such as `【4:0†Echo Criteria.txt】`.
static CORNER_CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【[^】]*】").expect("valid regex"));

/// Bracketed dagger citations such as `[1†source]` or `[see [1]†source]`.
///
/// One level of balanced inner brackets is allowed on either side of the dagger, so
/// a match never spans from an unrelated `[note]` into a later citation.
static DAGGER_CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:[^\[\]]|\[[^\[\]]*\])*?†(?:[^\[\]]|\[[^\[\]]*\])*?\]").expect("valid regex")
});

/// Remove citation markers from assistant text and trim the result.
///
/// Removal repeats until nothing matches, so markers exposed by an earlier removal
/// are also dropped and the function is idempotent.
pub fn strip_references(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let without_corner = CORNER_CITATION_RE.replace_all(&current, "").into_owned();
        let stripped = DAGGER_CITATION_RE.replace_all(&without_corner, "").into_owned();
        if stripped.len() == current.len() {
            break;
        }
        current = stripped;
    }
    current.trim().to_string()
}

/// Make sure a reply reads as a finished sentence.
pub fn ensure_terminal_punctuation(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() || trimmed.ends_with(['.', '!', '?']) {
        return trimmed.to_string();
    }
    format!("{trimmed}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_corner_bracket_citations() {
        let text = "Inpatient echo is indicated【4:0†Echo Inappropriateness Criteria.txt】.";
        assert_eq!(strip_references(text), "Inpatient echo is indicated.");
    }

    #[test]
    fn strips_dagger_citations() {
        let text = "See guidance [2†AUC 2017] and [note] here.";
        assert_eq!(strip_references(text), "See guidance  and [note] here.");
    }

    #[test]
    fn corner_match_is_minimal() {
        let text = "a【1】b【2】c";
        assert_eq!(strip_references(text), "abc");
    }

    #[test]
    fn trims_and_handles_empty_input() {
        assert_eq!(strip_references(""), "");
        assert_eq!(strip_references("  【1†x】  "), "");
        assert_eq!(strip_references("\n Recommendation:\nNone \n"), "Recommendation:\nNone");
    }

    #[test]
    fn stripping_is_idempotent() {
        let inputs = [
            "plain text",
            "  padded  ",
            "x [a [b†c] d†e] y",
            "【【nested】】 tail",
            "[x【z】†y] rest",
            "Recommendation:\nInpatient【1:2†file】\nRationale:\nBecause [3†src].",
        ];
        for input in inputs {
            let once = strip_references(input);
            assert_eq!(strip_references(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn exposed_markers_are_removed() {
        assert_eq!(strip_references("x [a [b†c] d†e] y"), "x  y");
        assert_eq!(strip_references("[x【z】†y] rest"), "rest");
    }

    #[test]
    fn dagger_citation_with_inner_brackets() {
        assert_eq!(strip_references("Echo [see [1]†x] now"), "Echo  now");
        assert_eq!(strip_references("[see [1†a]†x] tail"), "tail");
    }

    #[test]
    fn dagger_match_does_not_swallow_earlier_brackets() {
        assert_eq!(
            strip_references("[note] keep this [2†src] end"),
            "[note] keep this  end"
        );
    }

    #[test]
    fn terminal_punctuation() {
        assert_eq!(ensure_terminal_punctuation("Echo is indicated"), "Echo is indicated.");
        assert_eq!(ensure_terminal_punctuation("Really?  "), "Really?");
        assert_eq!(ensure_terminal_punctuation("Done!"), "Done!");
        assert_eq!(ensure_terminal_punctuation(""), "");
    }
}
