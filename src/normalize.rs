//! Deterministic text normalization applied to every extracted page or blob.
//!
//! Characters outside the allow-list (ASCII letters and digits, space,
//! Latin-1 supplement / Latin extended letters up to `U+01B0`, Vietnamese
//! precomposed letters `U+1EA0..=U+1EF9`, and common ASCII punctuation) act
//! as separators. Surviving runs are joined with single spaces and all
//! whitespace is collapsed, so extracting the same bytes twice always yields
//! the same string and therefore the same chunk boundaries.

const ALLOWED_PUNCTUATION: &str = "`~!@#$%^&*()_-+=[]{}|\\;:'\",.<>/?";

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == ' '
        || ('\u{00C0}'..='\u{01B0}').contains(&c)
        || ('\u{1EA0}'..='\u{1EF9}').contains(&c)
        || ALLOWED_PUNCTUATION.contains(c)
}

/// Strip disallowed characters and collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if is_allowed(c) && c != ' ' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }

    out
}
