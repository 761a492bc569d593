//! Term normalization shared by extraction, resolution and graph validation
//!
//! Two surface forms that normalize to the same key are the same concept.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// English function words ignored when comparing terms
pub static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "nor", "of", "in", "on", "at", "to", "for", "from",
        "by", "with", "without", "about", "into", "onto", "over", "under", "between", "through",
        "during", "before", "after", "above", "below", "as", "than", "then", "so", "if", "else",
        "when", "where", "while", "which", "who", "whom", "whose", "what", "why", "how", "that",
        "this", "these", "those", "it", "its", "they", "them", "their", "we", "our", "us", "you",
        "your", "he", "she", "his", "her", "i", "me", "my", "not", "no", "yes", "all", "any",
        "each", "every", "some", "such", "both", "either", "neither", "other", "another", "more",
        "most", "many", "much", "few", "less", "least", "very", "also", "only", "just", "even",
        "there", "here", "can", "could", "may", "might", "must", "shall", "should", "will",
        "would", "do", "does", "did", "done", "be", "been", "being", "am", "is", "are", "was",
        "were", "have", "has", "had", "having", "via", "per", "upon", "within", "across", "among",
        "etc", "e.g", "i.e", "one", "two", "three", "first", "second", "third",
    ]
    .into_iter()
    .collect()
});

/// Whether a lowercase word is a stopword
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

/// Fold a surface form into its comparison key
///
/// Unicode compatibility decomposition, diacritics stripped, lowercased,
/// punctuation collapsed to single spaces and stopwords removed. Returns an
/// empty string when nothing meaningful remains.
pub fn normalize_term(surface: &str) -> String {
    let folded: String = surface
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded
        .split_whitespace()
        .filter(|w| !is_stopword(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a word looks like an acronym (`CNN`, `GPT4`, `HTTP`)
pub fn is_acronym(word: &str) -> bool {
    let len = word.chars().count();
    (2..=8).contains(&len)
        && word.chars().all(|c| c.is_uppercase() || c.is_ascii_digit())
        && word.chars().filter(|c| c.is_uppercase()).count() >= 2
}

/// Presentation form of a surface: whitespace collapsed, ordinary words
/// lowercased, acronyms and mixed-case names (`TensorFlow`) kept as written
pub fn display_form(surface: &str) -> String {
    surface
        .split_whitespace()
        .map(|word| {
            let inner_upper = word.chars().skip(1).any(char::is_uppercase);
            if is_acronym(word) || inner_upper {
                word.to_string()
            } else {
                word.to_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_case_and_diacritics() {
        assert_eq!(normalize_term("Naïve  Bayes"), "naive bayes");
        assert_eq!(normalize_term("The Neural-Network"), "neural network");
        assert_eq!(normalize_term("the of"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for s in ["Gradient Descent", "Ｆｕｌｌｗｉｄｔｈ text", "état de l'art"] {
            let once = normalize_term(s);
            assert_eq!(normalize_term(&once), once);
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_normalize_idempotent(s in "[a-zA-Z0-9 À-ÿ\\-']{0,40}") {
            let once = normalize_term(&s);
            proptest::prop_assert_eq!(normalize_term(&once), once);
        }
    }

    #[test]
    fn test_acronyms() {
        assert!(is_acronym("CNN"));
        assert!(is_acronym("GPT4"));
        assert!(!is_acronym("A"));
        assert!(!is_acronym("Network"));
    }

    #[test]
    fn test_display_form() {
        assert_eq!(display_form("Neural   Network"), "neural network");
        assert_eq!(display_form("CNN Layers"), "CNN layers");
        assert_eq!(display_form("TensorFlow graphs"), "TensorFlow graphs");
    }
}
