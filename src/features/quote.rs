//! Evidence quote windows.

/// Characters kept on each side of a match.
pub const QUOTE_WINDOW: usize = 90;

/// Characters kept when the needle cannot be located.
pub const QUOTE_FALLBACK: usize = 200;

/// Quote `full` around the first case-insensitive occurrence of `needle`.
///
/// Returns up to [`QUOTE_WINDOW`] characters either side of the match,
/// trimmed. If `needle` does not occur (some detectors match on folded or
/// synthesised anchors), returns the first [`QUOTE_FALLBACK`] characters of
/// `full`, trimmed. Positions are counted in characters, never bytes.
#[must_use]
pub fn quote_window(full: &str, needle: &str) -> String {
    let chars: Vec<char> = full.chars().collect();
    let folded: Vec<char> = chars.iter().map(|&c| fold(c)).collect();
    let needle: Vec<char> = needle.chars().map(fold).collect();

    match find(&folded, &needle) {
        Some(at) => {
            let start = at.saturating_sub(QUOTE_WINDOW);
            let end = (at + needle.len() + QUOTE_WINDOW).min(chars.len());
            chars[start..end].iter().collect::<String>().trim().to_owned()
        }
        None => chars
            .iter()
            .take(QUOTE_FALLBACK)
            .collect::<String>()
            .trim()
            .to_owned(),
    }
}

/// One-to-one lowercase fold, so folded positions line up with the original.
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn find(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_centred_on_match() {
        let text = format!("{}That's understandable.{}", "a".repeat(150), "b".repeat(150));
        let q = quote_window(&text, "that's understandable");
        assert_eq!(q.chars().count(), 90 + "that's understandable".len() + 90);
        assert!(q.contains("That's understandable"));
        assert!(q.starts_with('a') && q.ends_with('b'));
    }

    #[test]
    fn short_text_is_returned_whole_and_trimmed() {
        assert_eq!(
            quote_window("  I can help with that.  ", "i can help"),
            "I can help with that."
        );
    }

    #[test]
    fn missing_needle_falls_back_to_prefix() {
        let text = format!("   {}", "x".repeat(500));
        let q = quote_window(&text, "it’s understandable");
        assert_eq!(q.chars().count(), 197, "200 chars then trimmed");
    }

    #[test]
    fn multibyte_text_does_not_split_chars() {
        let text = format!("{}I’m here for you.{}", "é".repeat(120), "ü".repeat(120));
        let q = quote_window(&text, "i’m here for you");
        assert!(q.contains("I’m here for you"));
        assert_eq!(q.chars().count(), 90 + 16 + 90);
    }

    #[test]
    fn newline_needles_are_located() {
        let q = quote_window("Here is a plan:\n1. Write a letter", "\n1.");
        assert_eq!(q, "Here is a plan:\n1. Write a letter");
    }
}
