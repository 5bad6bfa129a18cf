//! Text utilities shared by anchor matching, rendering and fingerprinting.

use unicode_normalization::char::{decompose_canonical, is_combining_mark};

/// Accent-folded, upper-cased projection of a string.
///
/// Keeps a map from every folded character back to the character index in
/// the source string, so a match found in the folded text can be located in
/// the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldedText {
    /// The folded text
    pub text: String,
    origin: Vec<usize>,
    source_len: usize,
}

impl FoldedText {
    /// Map a byte offset in the folded text to a char index in the source.
    pub fn source_char_index(&self, folded_byte: usize) -> usize {
        let folded_char = self.text[..folded_byte.min(self.text.len())].chars().count();
        self.origin
            .get(folded_char)
            .copied()
            .unwrap_or(self.source_len)
    }

    /// Number of characters in the folded text.
    pub fn char_len(&self) -> usize {
        self.origin.len()
    }
}

/// Fold accents and letter case: canonical decomposition, combining marks
/// dropped, upper-cased.
pub fn fold(source: &str) -> FoldedText {
    let mut text = String::with_capacity(source.len());
    let mut origin = Vec::with_capacity(source.len());
    let mut source_len = 0;

    for (index, ch) in source.chars().enumerate() {
        source_len = index + 1;
        let mut base = Vec::with_capacity(2);
        decompose_canonical(ch, |c| {
            if !is_combining_mark(c) {
                base.push(c);
            }
        });
        for c in base {
            for upper in c.to_uppercase() {
                text.push(upper);
                origin.push(index);
            }
        }
    }

    FoldedText {
        text,
        origin,
        source_len,
    }
}

/// Shorthand for `fold(text).text`.
pub fn fold_accents(text: &str) -> String {
    fold(text).text
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escape text for inclusion in HTML markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Reverse of [`escape_html`] plus the numeric entities models tend to emit.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(end) = rest.find(';').filter(|&e| e <= 10) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Remove markup tags, turning block-level boundaries into newlines.
pub fn strip_tags(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut chars = markup.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '<' {
            out.push(ch);
            continue;
        }
        let mut tag = String::new();
        for c in chars.by_ref() {
            if c == '>' {
                break;
            }
            tag.push(c);
        }
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        let closing = tag.starts_with('/');
        match name.as_str() {
            "br" => out.push('\n'),
            "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "tr" | "li" | "div"
                if closing && !out.ends_with('\n') && !out.is_empty() =>
            {
                out.push('\n')
            }
            "td" | "th" if closing => out.push('\t'),
            _ => {}
        }
    }

    unescape_html(out.trim_end_matches(['\n', '\t']))
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Truncate markup to at most `max_chars` characters without ending inside
/// a tag or an entity.
pub fn truncate_markup(markup: &str, max_chars: usize) -> &str {
    let cut = truncate_chars(markup, max_chars);
    if cut.len() == markup.len() {
        return cut;
    }
    let mut end = cut.len();
    if let Some(open) = cut.rfind('<') {
        if cut.rfind('>').map_or(true, |close| close < open) {
            end = open;
        }
    }
    if let Some(amp) = cut[..end].rfind('&') {
        if !cut[amp..end].contains(';') {
            end = amp;
        }
    }
    &cut[..end]
}
