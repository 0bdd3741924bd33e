//! Title normalization: `Main title [tag1] [tag2]…`.

/// Normalize a raw title: smart quotes to ASCII, whitespace collapsed, a
/// single space inserted before and between bracketed tags. Does not
/// validate bracket structure; use [`split_tags`] for that.
pub fn normalize(title: &str) -> String {
    let ascii_quotes = smart_quotes_to_ascii(title);
    let collapsed: String = ascii_quotes.split_whitespace().collect::<Vec<_>>().join(" ");
    space_before_brackets(&collapsed)
}

fn smart_quotes_to_ascii(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            other => other,
        })
        .collect()
}

fn space_before_brackets(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if c == '[' {
            if let Some(p) = prev {
                if p != ' ' {
                    out.push(' ');
                }
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Split `Main title [tag1] [tag2]` into `(stem, [tag1, tag2, ...])`.
/// Rejects nested or empty brackets by leaving them embedded in the stem
/// (they just won't parse out as tags).
pub fn split_tags(title: &str) -> (String, Vec<String>) {
    let normalized = normalize(title);
    let mut stem_end = normalized.len();
    let mut tags = Vec::new();
    let bytes = normalized.as_bytes();
    let mut i = normalized.len();

    loop {
        // Walk backward over trailing "[...] " groups.
        let trimmed_end = normalized[..i].trim_end();
        if !trimmed_end.ends_with(']') {
            break;
        }
        let Some(open) = trimmed_end.rfind('[') else { break };
        let inner = &trimmed_end[open + 1..trimmed_end.len() - 1];
        if inner.is_empty() || inner.contains('[') || inner.contains(']') {
            break;
        }
        tags.push(inner.to_string());
        stem_end = open;
        i = open;
        let _ = bytes;
    }

    tags.reverse();
    let stem = normalized[..stem_end].trim_end().to_string();
    (stem, tags)
}

/// Re-join a stem and its tags back into `Main title [tag1] [tag2]`.
pub fn join_tags(stem: &str, tags: &[String]) -> String {
    let mut out = stem.to_string();
    for tag in tags {
        out.push_str(" [");
        out.push_str(tag);
        out.push(']');
    }
    out
}

/// Append a guest credit to a title, inserted before any trailing bracketed
/// tags: `"Song [Live]"` + `"Some Guest"` -> `"Song (w/ Some Guest) [Live]"`.
pub fn append_guest_credit(title: &str, guest: &str) -> String {
    let (stem, tags) = split_tags(title);
    let with_credit = format!("{} (w/ {})", stem, guest);
    join_tags(&with_credit, &tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_smart_quotes_and_collapses_whitespace() {
        assert_eq!(normalize("Rock\u{2019}n\u{2019}  Roll"), "Rock'n'Roll");
    }

    #[test]
    fn normalize_inserts_a_space_before_a_tight_bracket() {
        assert_eq!(normalize("Song[Live]"), "Song [Live]");
    }

    #[test]
    fn split_tags_peels_off_multiple_trailing_bracket_groups() {
        let (stem, tags) = split_tags("Song Title [Live] [Radio Edit]");
        assert_eq!(stem, "Song Title");
        assert_eq!(tags, vec!["Live".to_string(), "Radio Edit".to_string()]);
    }

    #[test]
    fn split_tags_ignores_an_empty_bracket() {
        let (stem, tags) = split_tags("Song Title []");
        assert_eq!(stem, "Song Title []");
        assert!(tags.is_empty());
    }

    #[test]
    fn append_guest_credit_inserts_before_trailing_tags() {
        let result = append_guest_credit("Song Title [Live]", "Some Guest");
        assert_eq!(result, "Song Title (w/ Some Guest) [Live]");
    }

    #[test]
    fn append_guest_credit_with_no_tags() {
        assert_eq!(append_guest_credit("Song Title", "Some Guest"), "Song Title (w/ Some Guest)");
    }
}
