//! Course-code aware search terms
//!
//! Course codes are typed both as `CSC101` and `CSC 101`; a search for either
//! spelling must match the other.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static LETTERS_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]+)([0-9]+)").expect("course code pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerms {
    /// Matched against title and course code
    pub trimmed: String,
    /// Extra spellings matched against course code only
    pub course_code_variants: Vec<String>,
}

impl SearchTerms {
    /// `None` when the input is blank.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let no_spaces = WHITESPACE_RE.replace_all(trimmed, "").into_owned();
        let with_space = LETTERS_DIGITS_RE.replace_all(trimmed, "$1 $2").into_owned();

        let mut course_code_variants = Vec::new();
        if no_spaces != trimmed {
            course_code_variants.push(no_spaces.clone());
        }
        if with_space != trimmed && with_space != no_spaces {
            course_code_variants.push(with_space);
        }

        Some(Self {
            trimmed: trimmed.to_string(),
            course_code_variants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_code_gains_spaced_variant() {
        let terms = SearchTerms::new(" CSC101 ").unwrap();
        assert_eq!(terms.trimmed, "CSC101");
        assert_eq!(terms.course_code_variants, vec!["CSC 101".to_string()]);
    }

    #[test]
    fn spaced_code_gains_compact_variant() {
        let terms = SearchTerms::new("CSC 101").unwrap();
        assert_eq!(terms.course_code_variants, vec!["CSC101".to_string()]);
    }

    #[test]
    fn plain_words_have_no_variants_beyond_whitespace() {
        let terms = SearchTerms::new("calculus").unwrap();
        assert!(terms.course_code_variants.is_empty());
        assert!(SearchTerms::new("   ").is_none());
    }
}
