//! Share links: a note's markup carried in the `note` query parameter.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use url::Url;

use crate::error::NoteError;

pub const SHARE_PARAM: &str = "note";

/// Percent-encodes `content` and wraps it in URL-safe base64.
pub fn encode(content: &str) -> String {
    let escaped = urlencoding::encode(content);
    URL_SAFE_NO_PAD.encode(escaped.as_bytes())
}

/// Inverse of [`encode`]. Also reads tokens written with the standard base64
/// alphabet, with or without padding, including ones where query decoding
/// turned `+` into a space.
pub fn decode(token: &str) -> Result<String, NoteError> {
    let cleaned: String = token
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|ch| if ch == ' ' { '+' } else { ch })
        .collect();

    let engine = if cleaned.contains(|ch: char| ch == '+' || ch == '/') {
        &STANDARD_NO_PAD
    } else {
        &URL_SAFE_NO_PAD
    };
    let bytes = engine
        .decode(cleaned.as_bytes())
        .map_err(|err| NoteError::corrupt(format!("invalid base64: {err}")))?;

    if !bytes.is_ascii() {
        return Err(NoteError::corrupt("token is not percent-encoded text"));
    }
    check_escapes(&bytes)?;

    let escaped = String::from_utf8(bytes)
        .map_err(|err| NoteError::corrupt(format!("invalid text: {err}")))?;
    urlencoding::decode(&escaped)
        .map(|content| content.into_owned())
        .map_err(|err| NoteError::corrupt(format!("escaped bytes are not UTF-8: {err}")))
}

fn check_escapes(bytes: &[u8]) -> Result<(), NoteError> {
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            let valid = bytes
                .get(idx + 1..idx + 3)
                .map(|pair| pair.iter().all(u8::is_ascii_hexdigit))
                .unwrap_or(false);
            if !valid {
                return Err(NoteError::corrupt(format!("malformed escape at byte {idx}")));
            }
            idx += 3;
        } else {
            idx += 1;
        }
    }
    Ok(())
}

/// `base` with the share token for `content` in its `note` parameter.
pub fn share_url(base: &Url, content: &str) -> Url {
    let mut url = base.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != SHARE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept);
        pairs.append_pair(SHARE_PARAM, &encode(content));
    }
    url
}

/// The share token in `url`, if it carries a non-empty one.
pub fn extract_token(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == SHARE_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// `url` without its share parameter; other parameters are left alone.
pub fn strip_share_param(url: &Url) -> Url {
    let mut stripped = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != SHARE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

/// Accepts either a full share URL or a bare token.
pub fn token_from_input(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match Url::parse(input) {
        Ok(url) => extract_token(&url),
        Err(_) => Some(input.to_string()),
    }
}
