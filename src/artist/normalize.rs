//! Resolve a raw, possibly-unwhitelisted artist name against the whitelist:
//! exact match, comma-order swap, a small table of known-tricky remaps, and
//! (failing all of those) a nearest-neighbor suggestion for a human to
//! confirm.

use super::whitelist::{canonicalize, Whitelist};

/// Raw names the whitelist wouldn't otherwise resolve on its own, mapped to
/// a display name that is guaranteed to canonicalize into the whitelist.
/// Kept tiny and explicit rather than a heuristic: these are cases where no
/// mechanical rule gets the right answer.
const MANUAL_MAPPINGS: &[(&str, &str)] = &[("prince", "The Artist Formerly Known as Prince")];

/// Resolve `raw` to the whitelist's stored display form, trying (in order):
/// an exact canonical match, a "Last, First Rest" <-> "First Rest Last"
/// reorder, and the manual mapping table.
pub fn standardize(whitelist: &Whitelist, raw: &str) -> Option<String> {
    if let Some(hit) = whitelist.resolve_canonical(&canonicalize(raw)) {
        return Some(hit.to_string());
    }

    if let Some(reordered) = try_comma_reorder(whitelist, raw) {
        return Some(reordered);
    }

    let canon = canonicalize(raw);
    if let Some((_, target)) = MANUAL_MAPPINGS.iter().find(|(k, _)| canonicalize(k) == canon) {
        if let Some(hit) = whitelist.resolve_canonical(&canonicalize(target)) {
            return Some(hit.to_string());
        }
    }

    None
}

fn try_comma_reorder(whitelist: &Whitelist, raw: &str) -> Option<String> {
    let (last, first_rest) = raw.split_once(", ")?;
    let first_rest = first_rest.trim();
    let last = last.trim();

    // "Hooker, John Lee" -> "John Lee Hooker"
    let candidate = format!("{} {}", first_rest, last);
    if let Some(hit) = whitelist.resolve_canonical(&canonicalize(&candidate)) {
        return Some(hit.to_string());
    }

    // "Hooker, John Lee" -> "John Hooker Lee" (firstname, lastname, rest)
    if let Some((first, rest)) = first_rest.split_once(' ') {
        let candidate = format!("{} {} {}", first, last, rest);
        if let Some(hit) = whitelist.resolve_canonical(&canonicalize(&candidate)) {
            return Some(hit.to_string());
        }
    }

    None
}

const SEPARATORS: &[&str] = &["feat.", "feat", "ft.", "ft", "featuring", "with", "w/", "and", "&"];

/// Split a raw artist credit into (head, guest) at the longest prefix whose
/// head standardizes to a whitelisted artist. Returns the whole name with
/// no guest if nothing splits cleanly.
pub fn split(whitelist: &Whitelist, raw: &str) -> (String, Option<String>) {
    let lower = raw.to_lowercase();
    let mut candidates: Vec<(usize, usize)> = Vec::new(); // (head_len, sep_len)

    for sep in SEPARATORS {
        let mut search_from = 0;
        while let Some(pos) = lower[search_from..].find(sep) {
            let abs = search_from + pos;
            let before_ok = abs == 0 || lower.as_bytes()[abs - 1] == b' ' || lower.as_bytes()[abs - 1] == b'(';
            let after = abs + sep.len();
            let after_ok = after == lower.len() || lower.as_bytes()[after] == b' ';
            if before_ok && after_ok && abs > 0 {
                candidates.push((abs, sep.len()));
            }
            search_from = abs + sep.len().max(1);
        }
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    for (head_len, sep_len) in candidates {
        let head = raw[..head_len].trim().trim_end_matches('(').trim();
        if head.is_empty() {
            continue;
        }
        if standardize(whitelist, head).is_some() || whitelist.contains_canonical(&canonicalize(head)) {
            let guest = raw[head_len + sep_len..]
                .trim()
                .trim_end_matches(')')
                .trim();
            let guest = if guest.is_empty() { None } else { Some(guest.to_string()) };
            return (head.to_string(), guest);
        }
    }

    (raw.to_string(), None)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = tmp;
        }
    }
    row[b.len()]
}

/// Nearest whitelist entry by edit distance on the canonical form, accepted
/// only if the distance is small both in absolute terms and relative to the
/// name's length. Meant for surfacing a one-click fix to a human reviewer,
/// never applied automatically.
pub fn suggest(whitelist: &Whitelist, raw: &str) -> Option<String> {
    let canon = canonicalize(raw);
    let mut best: Option<(usize, &str)> = None;

    for entry in whitelist.entries() {
        let entry_canon = canonicalize(entry);
        let len_diff = canon.len().abs_diff(entry_canon.len());
        if let Some((best_dist, _)) = best {
            if len_diff > best_dist {
                continue;
            }
        }
        let dist = levenshtein(&canon, &entry_canon);
        let denom = canon.len().max(entry_canon.len()).max(1);
        if dist <= 10 && (dist as f64) / (denom as f64) <= 0.25 {
            if best.is_none() || dist < best.unwrap().0 {
                best = Some((dist, entry));
            }
        }
    }

    best.map(|(_, name)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wl() -> Whitelist {
        Whitelist::from_names(
            [
                "Tom Petty & the Heartbreakers".to_string(),
                "John Lee Hooker".to_string(),
                "The Fall".to_string(),
            ]
            .into_iter(),
        )
    }

    #[test]
    fn standardize_resolves_an_exact_canonical_match() {
        assert_eq!(
            standardize(&wl(), "tom petty and the heartbreakers"),
            Some("Tom Petty & the Heartbreakers".to_string())
        );
    }

    #[test]
    fn standardize_reorders_a_lastname_comma_firstname_credit() {
        assert_eq!(standardize(&wl(), "Hooker, John Lee"), Some("John Lee Hooker".to_string()));
    }

    #[test]
    fn standardize_strips_a_leading_the_through_the_comma_form() {
        assert_eq!(standardize(&wl(), "fall, the"), Some("The Fall".to_string()));
    }

    #[test]
    fn split_peels_a_featuring_credit_off_a_whitelisted_head() {
        let (head, guest) = split(&wl(), "John Lee Hooker feat. Some Guest");
        assert_eq!(head, "John Lee Hooker");
        assert_eq!(guest.as_deref(), Some("Some Guest"));
    }

    #[test]
    fn split_returns_the_whole_name_when_nothing_splits() {
        let (head, guest) = split(&wl(), "Some Unknown Band");
        assert_eq!(head, "Some Unknown Band");
        assert!(guest.is_none());
    }

    #[test]
    fn suggest_finds_a_close_misspelling() {
        assert_eq!(suggest(&wl(), "Jon Lee Hooker"), Some("John Lee Hooker".to_string()));
    }

    #[test]
    fn suggest_returns_none_when_nothing_is_close_enough() {
        assert_eq!(suggest(&wl(), "Completely Different Artist Name"), None);
    }
}
