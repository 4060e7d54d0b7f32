//! Plain-text views of note markup.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};
use unicode_segmentation::UnicodeSegmentation;

static LINE_BREAKS: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"<br\s*/?>|</(?:p|div|li|h[1-6]|blockquote|pre|tr)\s*>")
        .case_insensitive(true)
        .build()
        .expect("valid line break pattern")
});

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

static OPAQUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[^>]*>|&(?:#\d{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+\d*);")
        .expect("valid opaque pattern")
});

static ENTITIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#(\d{1,7})|#[xX]([0-9a-fA-F]{1,6})|(amp|lt|gt|quot|apos|nbsp|#39));")
        .expect("valid entity pattern")
});

static NON_FILENAME: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"[^a-z0-9]")
        .case_insensitive(true)
        .build()
        .expect("valid filename pattern")
});

/// Renders markup the way a reader sees it: block ends and `<br>` become
/// newlines, other tags vanish, entities are decoded.
pub fn plain_text(markup: &str) -> String {
    let with_breaks = LINE_BREAKS.replace_all(markup, "\n");
    let stripped = TAGS.replace_all(&with_breaks, "");
    decode_entities(&stripped).into_owned()
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    ENTITIES.replace_all(text, |caps: &Captures| {
        if let Some(dec) = caps.get(1) {
            return dec
                .as_str()
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default();
        }
        if let Some(hex) = caps.get(2) {
            return u32::from_str_radix(hex.as_str(), 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default();
        }
        let named = match caps.get(3).map(|m| m.as_str()) {
            Some("amp") => "&",
            Some("lt") => "<",
            Some("gt") => ">",
            Some("quot") => "\"",
            Some("apos") | Some("#39") => "'",
            Some("nbsp") => " ",
            _ => "",
        };
        named.to_string()
    })
}

/// Replaces every literal `find` in the text between tags. Tags and
/// entities are copied through untouched. Returns the new markup and the
/// number of replacements.
pub fn replace_in_text(markup: &str, find: &str, replacement: &str) -> (String, usize) {
    if find.is_empty() {
        return (markup.to_string(), 0);
    }
    let mut out = String::with_capacity(markup.len());
    let mut count = 0;
    let mut last = 0;
    for opaque in OPAQUE.find_iter(markup) {
        count += replace_segment(&markup[last..opaque.start()], find, replacement, &mut out);
        out.push_str(opaque.as_str());
        last = opaque.end();
    }
    count += replace_segment(&markup[last..], find, replacement, &mut out);
    (out, count)
}

fn replace_segment(segment: &str, find: &str, replacement: &str, out: &mut String) -> usize {
    let hits = segment.matches(find).count();
    if hits == 0 {
        out.push_str(segment);
    } else {
        out.push_str(&segment.replace(find, replacement));
    }
    hits
}

/// Turns plain text into markup line by line.
pub fn text_to_markup(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "<br>")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextStats {
    pub chars: usize,
    pub words: usize,
}

impl TextStats {
    pub fn of(plain_text: &str) -> Self {
        let trimmed = plain_text.trim();
        Self {
            chars: plain_text.graphemes(true).count(),
            words: if trimmed.is_empty() {
                0
            } else {
                trimmed.split_whitespace().count()
            },
        }
    }
}

/// File name used when exporting a note as plain text.
pub fn export_file_name(title: &str) -> String {
    let title = title.trim();
    let base = if title.is_empty() { "notepad" } else { title };
    format!("{}.txt", NON_FILENAME.replace_all(base, "_").to_lowercase())
}
