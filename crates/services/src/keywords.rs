//! Keyword spotting over finished transcripts.
//!
//! Plain substring matching, honouring each keyword's `case_sensitive`
//! flag. Matching runs once per transcript; a phrase occurring several
//! times in the same transcript still counts as one detection.

use homemic_db::models::Keyword;

pub fn phrase_matches(transcript: &str, keyword: &Keyword) -> bool {
    if keyword.phrase.is_empty() {
        return false;
    }
    if keyword.case_sensitive {
        transcript.contains(&keyword.phrase)
    } else {
        transcript
            .to_lowercase()
            .contains(&keyword.phrase.to_lowercase())
    }
}

/// Returns the enabled keywords found in the transcript, highest
/// priority first.
pub fn find_matches<'a>(transcript: &str, keywords: &'a [Keyword]) -> Vec<&'a Keyword> {
    let mut hits: Vec<&Keyword> = keywords
        .iter()
        .filter(|k| k.enabled && phrase_matches(transcript, k))
        .collect();
    hits.sort_by(|a, b| b.priority.cmp(&a.priority));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::DateTime;

    fn keyword(phrase: &str, case_sensitive: bool, enabled: bool, priority: i32) -> Keyword {
        Keyword {
            id: Some(bson::oid::ObjectId::new()),
            phrase: phrase.to_string(),
            category: None,
            priority,
            case_sensitive,
            enabled,
            detection_count: 0,
            last_detected: None,
            created_at: DateTime::now(),
        }
    }

    #[test]
    fn case_insensitive_by_default() {
        let kw = keyword("coffee", false, true, 0);
        assert!(phrase_matches("The COFFEE is ready", &kw));
    }

    #[test]
    fn case_sensitive_requires_exact_casing() {
        let kw = keyword("Coffee", true, true, 0);
        assert!(!phrase_matches("the coffee is ready", &kw));
        assert!(phrase_matches("the Coffee is ready", &kw));
    }

    #[test]
    fn disabled_keywords_never_match() {
        let kws = vec![keyword("coffee", false, false, 0)];
        assert!(find_matches("coffee coffee coffee", &kws).is_empty());
    }

    #[test]
    fn matches_sorted_by_priority() {
        let kws = vec![
            keyword("morning", false, true, 1),
            keyword("coffee", false, true, 9),
        ];
        let hits = find_matches("good morning, coffee is ready", &kws);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].phrase, "coffee");
    }

    #[test]
    fn empty_phrase_matches_nothing() {
        let kw = keyword("", false, true, 0);
        assert!(!phrase_matches("anything", &kw));
    }
}
