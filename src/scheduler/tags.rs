//! `@mention` extraction.
//!
//! A tag is either `@"quoted phrase"` or a bare `@token` made of
//! `[A-Za-z0-9_.:-]`.

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@(?:"([^"]+)"|([A-Za-z0-9_.:-]+))"#).expect("tag pattern is valid"));

/// Extract every tag from `content`, left to right.
pub fn extract_tags(content: &str) -> Vec<String> {
    TAG_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// First participant matched by the first tag that matches anyone.
///
/// A tag matches a participant when it is a case-insensitive substring of the
/// participant id.
pub fn match_tag<'a>(tags: &[String], models: &'a [String]) -> Option<&'a str> {
    tags.iter().find_map(|tag| {
        let tag = tag.to_lowercase();
        models
            .iter()
            .find(|m| m.to_lowercase().contains(&tag))
            .map(String::as_str)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_bare_tag() {
        assert_eq!(extract_tags("what do you think @bravo?"), vec!["bravo"]);
    }

    #[test]
    fn test_extract_quoted_tag() {
        assert_eq!(extract_tags(r#"over to @"Claude Opus" now"#), vec!["Claude Opus"]);
    }

    #[test]
    fn test_extract_preserves_order() {
        assert_eq!(
            extract_tags(r#"@charlie then @"alpha one" and @gpt-4o:latest"#),
            vec!["charlie", "alpha one", "gpt-4o:latest"]
        );
    }

    #[test]
    fn test_extract_stops_at_disallowed_chars() {
        assert_eq!(extract_tags("hey @bravo, and @x!"), vec!["bravo", "x"]);
    }

    #[test]
    fn test_extract_none() {
        assert!(extract_tags("no mentions here, mail me at @").is_empty());
    }

    #[test]
    fn test_match_is_case_insensitive_substring() {
        let m = models(&["openai/GPT-4o", "anthropic/claude"]);
        let tags = vec!["gpt".to_string()];
        assert_eq!(match_tag(&tags, &m), Some("openai/GPT-4o"));
    }

    #[test]
    fn test_first_tag_wins() {
        let m = models(&["alpha", "bravo", "charlie"]);
        let tags = vec!["zulu".to_string(), "charlie".to_string(), "alpha".to_string()];
        assert_eq!(match_tag(&tags, &m), Some("charlie"));
    }

    #[test]
    fn test_first_participant_wins_within_tag() {
        let m = models(&["llama-small", "llama-large"]);
        let tags = vec!["llama".to_string()];
        assert_eq!(match_tag(&tags, &m), Some("llama-small"));
    }

    #[test]
    fn test_no_match() {
        let m = models(&["alpha"]);
        assert_eq!(match_tag(&["omega".to_string()], &m), None);
    }
}
