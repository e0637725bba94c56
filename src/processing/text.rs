//! Skill-name normalisation and lexical comparison helpers

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

static SHARED: Lazy<SkillTextProcessor> = Lazy::new(SkillTextProcessor::new);

pub struct SkillTextProcessor {
    stop_words: HashSet<&'static str>,
    lead_in_regex: Regex,
    trailing_regex: Regex,
    punctuation_regex: Regex,
    whitespace_regex: Regex,
}

impl Default for SkillTextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillTextProcessor {
    pub fn new() -> Self {
        let lead_in_regex = Regex::new(
            r"^(?:experience (?:with|in)|knowledge of|proficiency (?:in|with)|skilled in|ability to|understanding of)\s+",
        )
        .expect("Invalid lead-in regex");

        let trailing_regex = Regex::new(r"\s+(?:skills?|experience|knowledge|proficiency)$")
            .expect("Invalid trailing regex");

        let punctuation_regex =
            Regex::new(r"[^\p{L}\p{N}\s.+#/-]").expect("Invalid punctuation regex");

        let whitespace_regex = Regex::new(r"\s+").expect("Invalid whitespace regex");

        Self {
            stop_words: Self::create_stop_words(),
            lead_in_regex,
            trailing_regex,
            punctuation_regex,
            whitespace_regex,
        }
    }

    /// Process-wide instance; the processor holds no mutable state
    pub fn shared() -> &'static SkillTextProcessor {
        &SHARED
    }

    /// Normalise a skill name for embedding: lowercase, strip lead-ins and
    /// trailing filler words, drop stray punctuation, collapse whitespace.
    ///
    /// An empty result means the name is not usable for clustering.
    pub fn normalize_name(&self, name: &str) -> String {
        let lowered = name.to_lowercase();
        let cleaned = self.punctuation_regex.replace_all(&lowered, " ");
        let collapsed = self.whitespace_regex.replace_all(cleaned.trim(), " ");
        let stripped = self.lead_in_regex.replace(&collapsed, "");
        let stripped = self.trailing_regex.replace(&stripped, "");
        stripped.trim().to_string()
    }

    /// Lowercased words, stop words removed
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|w| w.to_lowercase())
            .filter(|w| !self.stop_words.contains(w.as_str()))
            .collect()
    }

    /// Lowercased words, nothing removed
    pub fn words(&self, text: &str) -> Vec<String> {
        text.unicode_words().map(|w| w.to_lowercase()).collect()
    }

    pub fn word_count(&self, text: &str) -> usize {
        text.unicode_words().count()
    }

    /// Jaccard similarity of the two word sets
    pub fn jaccard(&self, a: &str, b: &str) -> f32 {
        let set_a: HashSet<String> = self.words(a).into_iter().collect();
        let set_b: HashSet<String> = self.words(b).into_iter().collect();

        let union = set_a.union(&set_b).count();
        if union == 0 {
            return 0.0;
        }
        set_a.intersection(&set_b).count() as f32 / union as f32
    }

    /// Exact, substring, or word-overlap match between two skill names
    pub fn lexically_matches(&self, a: &str, b: &str, threshold: f32) -> bool {
        let a = a.trim().to_lowercase();
        let b = b.trim().to_lowercase();
        if a.is_empty() || b.is_empty() {
            return false;
        }
        a == b || a.contains(&b) || b.contains(&a) || self.jaccard(&a, &b) >= threshold
    }

    /// Case-insensitive phrase containment
    pub fn contains_phrase(&self, haystack: &str, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        !needle.is_empty() && haystack.to_lowercase().contains(&needle)
    }

    fn create_stop_words() -> HashSet<&'static str> {
        [
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is",
            "it", "of", "on", "or", "the", "to", "with", "within", "using", "via",
        ]
        .into_iter()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_filler() {
        let processor = SkillTextProcessor::new();
        assert_eq!(
            processor.normalize_name("Experience with  Network Configuration!"),
            "network configuration"
        );
        assert_eq!(processor.normalize_name("Python programming skills"), "python programming");
        assert_eq!(processor.normalize_name("C# / .NET"), "c# / .net");
        assert_eq!(processor.normalize_name("  ?!  "), "");
    }

    #[test]
    fn test_tokenize_drops_stop_words() {
        let processor = SkillTextProcessor::new();
        let tokens = processor.tokenize("Design of the database schema");
        assert_eq!(tokens, vec!["design", "database", "schema"]);
    }

    #[test]
    fn test_lexical_matching() {
        let processor = SkillTextProcessor::new();
        assert!(processor.lexically_matches("SQL", "sql", 0.7));
        assert!(processor.lexically_matches("database design", "relational database design", 0.7));
        assert!(!processor.lexically_matches("welding", "accounting", 0.7));
        assert!(!processor.lexically_matches("", "accounting", 0.7));
    }

    #[test]
    fn test_jaccard() {
        let processor = SkillTextProcessor::new();
        assert!((processor.jaccard("data analysis", "analysis data") - 1.0).abs() < 1e-6);
        assert!((processor.jaccard("data analysis", "data modelling") - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(processor.jaccard("", ""), 0.0);
    }
}
