use regex::Regex;
use std::sync::OnceLock;

const EXCERPT_LENGTH: usize = 200;

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^a-zA-Z0-9]+").expect("valid regex literal"))
}

/// Removes every HTML tag, keeping only the text content.
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::empty()
        .clean(input)
        .to_string()
}

/// URL slug derived from a title: runs of non-alphanumeric characters become
/// a single hyphen, lowercased, with leading/trailing hyphens trimmed.
pub fn slugify(title: &str) -> String {
    non_alphanumeric()
        .replace_all(title, "-")
        .to_lowercase()
        .trim_matches('-')
        .to_string()
}

/// Plain-text preview of post content: the first 200 characters of the
/// stripped text exactly as written, with a trailing ellipsis when cut.
pub fn derive_excerpt(content: &str) -> String {
    let text = strip_all_html(content);
    if text.chars().count() > EXCERPT_LENGTH {
        let truncated: String = text.chars().take(EXCERPT_LENGTH).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}

/// Splits a comma-separated tag string, dropping blanks and duplicates while
/// keeping first-seen order.
pub fn normalize_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',') {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_punctuation_runs() {
        assert_eq!(slugify("Hello, World!!"), "hello-world");
        assert_eq!(slugify("  Rust 2026: what's next?  "), "rust-2026-what-s-next");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn excerpt_strips_markup_and_truncates() {
        let short = derive_excerpt("<p>Hello <b>there</b></p>");
        assert_eq!(short, "Hello there");

        // The cut is exactly 200 characters plus the ellipsis, even when the
        // 200th character is whitespace.
        let long = "word ".repeat(100);
        let excerpt = derive_excerpt(&long);
        assert_eq!(excerpt.chars().count(), EXCERPT_LENGTH + 3);
        assert!(excerpt.ends_with("..."));
        let body: String = excerpt.chars().take(EXCERPT_LENGTH).collect();
        let prefix: String = long.chars().take(EXCERPT_LENGTH).collect();
        assert_eq!(body, prefix);
    }

    #[test]
    fn excerpt_preserves_original_spacing() {
        assert_eq!(
            derive_excerpt("line one\n\nline two"),
            "line one\n\nline two"
        );
        assert_eq!(derive_excerpt("a  b"), "a  b");
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        assert_eq!(
            normalize_tags(" Rust, web,  rust , ,community"),
            vec!["rust", "web", "community"]
        );
        assert!(normalize_tags("  ,  ,").is_empty());
    }
}
