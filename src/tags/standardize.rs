//! Read-side and write-side tag standardization rules (base spec §4.3).

use super::{FrameValue, TagSet, WHITELISTED_TEXT_FRAMES};

/// Collapse runs of whitespace to a single space and strip the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Applied to every file's tags as they're read: whitespace is collapsed,
/// frames that end up empty are dropped, and (conceptually) the encoding is
/// forced to UTF-8 — true automatically here since [`super::codec`] only
/// ever decodes into owned `String`s.
pub fn standardize_on_read(tags: &mut TagSet) {
    let cleaned: Vec<_> = tags
        .clone()
        .into_frames()
        .into_iter()
        .filter_map(|mut frame| {
            match &mut frame.value {
                FrameValue::Text(s) => {
                    *s = collapse_whitespace(s);
                    if s.is_empty() {
                        return None;
                    }
                }
                FrameValue::ExtendedText { value, .. } => {
                    *value = collapse_whitespace(value);
                    if value.is_empty() {
                        return None;
                    }
                }
                _ => {}
            }
            Some(frame)
        })
        .collect();
    *tags = TagSet::from_frames(cleaned);
}

/// `TBPM` is coerced: trim a trailing " BPM" suffix, parse as a float,
/// round to the nearest integer, and drop the frame entirely if the result
/// is not positive.
pub fn coerce_bpm(tags: &mut TagSet) {
    let Some(raw) = tags.get_text("TBPM") else {
        return;
    };
    let trimmed = raw.trim().trim_end_matches(" BPM").trim();
    let parsed = trimmed.parse::<f64>().ok().map(|f| f.round() as i64);
    match parsed {
        Some(bpm) if bpm > 0 => tags.set_text("TBPM", bpm.to_string()),
        _ => tags.remove("TBPM"),
    }
}

/// Drop any frame on `blacklist`, drop any frame id that isn't on the
/// archive's whitelist, and always drop `TFLT`/`TLEN`/`TOWN`/`UFID` and any
/// `TXXX` entry (the importer rewrites all of these from measured values).
pub fn strip_for_import(tags: &TagSet, blacklist: &[String]) -> TagSet {
    let kept = tags
        .frames()
        .iter()
        .filter(|f| !blacklist.iter().any(|b| b == &f.id))
        .filter(|f| f.id != "TFLT" && f.id != "TLEN" && f.id != "TOWN" && f.id != "UFID")
        .filter(|f| f.id != "TXXX")
        .filter(|f| WHITELISTED_TEXT_FRAMES.contains(&f.id.as_str()))
        .cloned()
        .collect();
    TagSet::from_frames(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_internal_and_trims_edge_whitespace() {
        assert_eq!(collapse_whitespace("  a   b\tc  "), "a b c");
    }

    #[test]
    fn standardize_on_read_drops_frames_left_empty() {
        let mut tags = TagSet::new();
        tags.set_text("TIT2", "   ");
        tags.set_text("TPE1", "  Real Artist  ");
        standardize_on_read(&mut tags);
        assert_eq!(tags.get_text("TIT2"), None);
        assert_eq!(tags.get_text("TPE1"), Some("Real Artist"));
    }

    #[test]
    fn coerce_bpm_trims_suffix_and_rounds() {
        let mut tags = TagSet::new();
        tags.set_text("TBPM", "120.6 BPM");
        coerce_bpm(&mut tags);
        assert_eq!(tags.get_text("TBPM"), Some("121"));
    }

    #[test]
    fn coerce_bpm_drops_non_positive_values() {
        let mut tags = TagSet::new();
        tags.set_text("TBPM", "0");
        coerce_bpm(&mut tags);
        assert_eq!(tags.get_text("TBPM"), None);
    }

    #[test]
    fn strip_for_import_keeps_only_whitelisted_and_non_blacklisted_frames() {
        let mut tags = TagSet::new();
        tags.set_text("TPE1", "Artist");
        tags.set_text("TOWN", "someone else");
        tags.set_text("COMM", "a comment frame, not whitelisted");
        tags.set_txxx("whatever", "value");

        let stripped = strip_for_import(&tags, &[]);
        assert_eq!(stripped.get_text("TPE1"), Some("Artist"));
        assert!(!stripped.contains("TOWN"));
        assert!(!stripped.contains("COMM"));
        assert!(stripped.get_txxx("whatever").is_none());
    }

    #[test]
    fn strip_for_import_honors_an_explicit_blacklist() {
        let mut tags = TagSet::new();
        tags.set_text("TPE1", "Artist");
        let stripped = strip_for_import(&tags, &["TPE1".to_string()]);
        assert!(!stripped.contains("TPE1"));
    }
}
