use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_TITLE: &str = "New Note";
pub const MAX_TITLE_GRAPHEMES: usize = 40;

/// First line of the trimmed plain text, cut to 40 graphemes, or
/// [`DEFAULT_TITLE`] when there is no text at all.
pub fn derive_title(plain_text: &str) -> String {
    let trimmed = plain_text.trim();
    let first_line = trimmed.lines().next().unwrap_or_default().trim_end();
    if first_line.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    first_line
        .graphemes(true)
        .take(MAX_TITLE_GRAPHEMES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_gets_placeholder() {
        assert_eq!(derive_title(""), "New Note");
        assert_eq!(derive_title("  \n\t \n"), "New Note");
    }

    #[test]
    fn takes_first_non_blank_line() {
        assert_eq!(derive_title("\n\n  Groceries  \nmilk\neggs"), "Groceries");
        assert_eq!(derive_title("Plan\r\nsecond"), "Plan");
    }

    #[test]
    fn truncates_long_lines_on_grapheme_boundaries() {
        let long = "é".repeat(60);
        let title = derive_title(&long);
        assert_eq!(title.graphemes(true).count(), MAX_TITLE_GRAPHEMES);

        let exact = "a".repeat(40);
        assert_eq!(derive_title(&format!("{exact}bcd")), exact);
    }
}
