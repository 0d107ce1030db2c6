//! Cleans raw oracle output into plain spoken-style prose.
//!
//! Generated text frequently arrives with Markdown artifacts the downstream
//! consumers (log display, speech rendering) cannot use. Sanitization strips
//! emphasis markers, headers, code backticks, and list bullets/numbering,
//! then collapses everything to single-space-separated prose.

/// Strips structural markup and normalizes whitespace. An all-markup input
/// collapses to the empty string; callers must treat that as "nothing to say"
/// rather than transmitting an empty turn.
pub fn clean_for_speech(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '#' | '`'))
        .collect();

    let mut pieces: Vec<&str> = Vec::new();
    for line in stripped.lines() {
        let line = strip_list_prefix(line.trim());
        if !line.is_empty() {
            pieces.push(line);
        }
    }

    let mut out = String::new();
    for piece in pieces {
        for word in piece.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

/// Removes a leading bullet (`-`, `•`) or list numbering (`3.`, `12)`).
/// A number that starts real prose ("40 million is our floor") is kept.
fn strip_list_prefix(line: &str) -> &str {
    let rest = line.trim_start_matches(['-', '•']).trim_start();
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let after = &rest[digits..];
        if let Some(tail) = after.strip_prefix('.').or_else(|| after.strip_prefix(')')) {
            return tail.trim_start();
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_emphasis_and_headers() {
        assert_eq!(
            clean_for_speech("## Opening\n**We propose** a *bold* `deal`."),
            "Opening We propose a bold deal."
        );
    }

    #[test]
    fn strips_bullets_and_numbering() {
        let input = "- First point\n• Second point\n3. Third point\n12) Fourth point";
        assert_eq!(
            clean_for_speech(input),
            "First point Second point Third point Fourth point"
        );
    }

    #[test]
    fn keeps_leading_numbers_that_are_prose() {
        assert_eq!(
            clean_for_speech("40 million is our floor."),
            "40 million is our floor."
        );
    }

    #[test]
    fn collapses_whitespace_across_lines() {
        assert_eq!(
            clean_for_speech("One   two\n\n\nthree\t four"),
            "One two three four"
        );
    }

    #[test]
    fn all_markup_collapses_to_empty() {
        assert_eq!(clean_for_speech("***\n---\n```"), "");
        assert_eq!(clean_for_speech("   \n\n  "), "");
    }
}
