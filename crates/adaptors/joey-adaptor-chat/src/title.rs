//! Conversation auto-titling

/// Title given to conversations created before the first exchange
pub const DEFAULT_TITLE: &str = "New Chat";

const PLACEHOLDER_TITLES: &[&str] = &["new chat", "untitled", "new conversation"];
const TITLE_WORDS: usize = 5;
const MAX_TITLE_CHARS: usize = 60;

/// Whether `title` is empty or a generic placeholder
pub fn is_placeholder(title: Option<&str>) -> bool {
    match title.map(str::trim) {
        None | Some("") => true,
        Some(t) => PLACEHOLDER_TITLES
            .iter()
            .any(|p| t.eq_ignore_ascii_case(p)),
    }
}

/// Title from the first words of a message, each word capitalised.
///
/// `...` marks a message that had more words than fit. Returns `None` for
/// blank messages.
pub fn derive_title(message: &str) -> Option<String> {
    let words: Vec<&str> = message.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let mut title = words
        .iter()
        .take(TITLE_WORDS)
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ");

    let mut truncated = words.len() > TITLE_WORDS;
    if title.chars().count() > MAX_TITLE_CHARS - 3 {
        title = title.chars().take(MAX_TITLE_CHARS - 3).collect::<String>();
        title.truncate(title.trim_end().len());
        truncated = true;
    }
    if truncated {
        title.push_str("...");
    }

    Some(title)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert!(is_placeholder(None));
        assert!(is_placeholder(Some("  ")));
        assert!(is_placeholder(Some("New Chat")));
        assert!(is_placeholder(Some("untitled")));
        assert!(is_placeholder(Some("New conversation")));
        assert!(!is_placeholder(Some("Rust lifetimes")));
    }

    #[test]
    fn test_short_message_kept_whole() {
        assert_eq!(derive_title("explain rust traits").as_deref(), Some("Explain Rust Traits"));
    }

    #[test]
    fn test_long_message_truncated_to_five_words() {
        assert_eq!(
            derive_title("how do i   write a tcp server in rust?").as_deref(),
            Some("How Do I Write A...")
        );
    }

    #[test]
    fn test_very_long_words_are_clipped() {
        let title = derive_title(&"x".repeat(200)).unwrap();
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 60);
    }

    #[test]
    fn test_blank_message() {
        assert_eq!(derive_title(" \n\t "), None);
    }

    #[test]
    fn test_keeps_existing_capitals() {
        assert_eq!(derive_title("use the API").as_deref(), Some("Use The API"));
    }
}
