//! Text clean-up applied before matching

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref FANCY_DOUBLE_QUOTES: Regex = Regex::new("[\u{201C}\u{201D}]").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    static ref DOT_RUN: Regex = Regex::new(r"\.{2,}").unwrap();
}

/// Characters dropped from question-answering text
const QA_STRIPPED: &[char] = &['(', ')', '^', '+', '*', '$', '|', '\\', '?', '[', ']', '{', '}'];

/// Clean annotation or paragraph text: fancy double quotes become `"`,
/// line breaks and tabs become spaces, control characters and literal
/// backslashes are removed and whitespace runs collapse to one space.
pub fn clean_text(text: &str) -> String {
    let text = FANCY_DOUBLE_QUOTES.replace_all(text, "\"");
    let text: String = text
        .chars()
        .map(|c| if matches!(c, '\n' | '\t' | '\r') { ' ' } else { c })
        .filter(|c| !c.is_control() && *c != '\\')
        .collect();
    WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
}

/// Form used for scoring: NFKC, lowercase, single spaces, trimmed
pub fn normalize_for_matching(text: &str) -> String {
    let folded: String = text.nfkc().collect::<String>().to_lowercase();
    WHITESPACE_RUN.replace_all(&folded, " ").trim().to_string()
}

/// Form of paragraphs and answers in question-answering examples:
/// curly double quotes and control characters removed, bracket and
/// operator characters dropped, dot leaders removed, lowercased, single
/// spaces. Answer offsets are computed on this form.
pub fn clean_for_qa(text: &str) -> String {
    let text: String = text
        .chars()
        .map(|c| if matches!(c, '\n' | '\t' | '\r') { ' ' } else { c })
        .filter(|c| !c.is_control() && !matches!(c, '\u{201C}' | '\u{201D}') && !QA_STRIPPED.contains(c))
        .collect::<String>()
        .to_lowercase();
    let text = DOT_RUN.replace_all(&text, "");
    WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
}
